//! Scoped managed references.

use crate::env;
use crate::interface::Ref;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::marker::PhantomData;

/// Local reference to a managed object, deleted when dropped.
///
/// Local references are only valid on the thread and during the native call that created them,
/// hence [Local] is neither [Send] nor [Sync].
pub struct Local {
    raw: Ref,
    _thread_bound: PhantomData<*const ()>,
}

impl Local {
    pub fn null() -> Self {
        Self::wrap_local(Ref::NULL)
    }

    /// Creates a new local reference to `object`.
    pub fn wrap(object: Ref) -> Self {
        if object.is_null() {
            Self::null()
        } else {
            Self::wrap_local(env::current().new_local_ref(object))
        }
    }

    /// Takes ownership of a fresh local reference returned by the runtime.
    pub fn wrap_local(object: Ref) -> Self {
        Self {
            raw: object,
            _thread_bound: PhantomData,
        }
    }

    pub fn as_raw(&self) -> Ref {
        self.raw
    }

    /// Gives up ownership of the reference without deleting it.
    pub fn into_raw(self) -> Ref {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    /// Checks if both references point to the same managed object.
    pub fn same_object(&self, other: &Local) -> bool {
        if self.is_null() || other.is_null() {
            self.is_null() == other.is_null()
        } else {
            env::current().is_same_object(self.raw, other.raw)
        }
    }
}

impl Default for Local {
    fn default() -> Self {
        Self::null()
    }
}

impl Clone for Local {
    fn clone(&self) -> Self {
        Self::wrap(self.raw)
    }
}

impl Drop for Local {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            env::current().delete_local_ref(self.raw);
        }
    }
}

impl PartialEq for Local {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Debug for Local {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Local({:p})", self.raw.as_raw())
    }
}
