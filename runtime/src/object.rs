//! Reference-counted proxies of managed objects.
//!
//! A [Proxy] is embedded in every native type bridged to a managed class and counts the native
//! references to it, see [Ptr](crate::pointer::Ptr). It runs in one of two modes fixed at
//! construction:
//!
//! * Wrapper mode ([Proxy::wrap]): the proxy holds a global reference for its whole lifetime. The
//!   count starts at 0 and the native side destroys the proxy, releasing the managed object, when
//!   the count drops back to 0.
//! * Live mode ([Proxy::live]): the managed object owns the native instance, whose address is
//!   stored in a `long` field of the managed object. The count starts at 1 for this implicit
//!   reference and the proxy only holds a weak reference, so the managed object stays collectable.
//!   Going from 1 to 2 promotes the weak reference to a global one, going from 2 back to 1 demotes
//!   it again. The finalizer of the managed object releases the implicit reference.

use crate::config::WeakReferences;
use crate::env;
use crate::interface::FieldId;
use crate::interface::Ref;
use crate::interface::Type;
use crate::interface::Value;
use crate::weak;
use std::ffi::c_void;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::sync::Mutex;
use std::sync::MutexGuard;

pub struct Proxy {
    state: Mutex<State>,
    weak: Option<Weak>,
    field: FieldId,
}

struct State {
    count: usize,

    /// Global reference, null while a live proxy is weakly bound.
    strong: Ref,
}

struct Weak {
    handle: Ref,
    strategy: WeakReferences,
}

impl Proxy {
    /// Creates a proxy in wrapper mode.
    pub fn wrap(object: Ref) -> Self {
        if object.is_null() {
            env::fatal("Tried to wrap a null object.");
        }
        let strong = env::current().new_global_ref(object);
        if strong.is_null() {
            env::fatal("Failed to create a global reference.");
        }
        Self {
            state: Mutex::new(State { count: 0, strong }),
            weak: None,
            field: FieldId::NULL,
        }
    }

    /// Creates a proxy in live mode for an object whose `field` will hold the native address.
    pub fn live(object: Ref, field: FieldId) -> Self {
        Self::live_with(object, field, env::config().weak_references)
    }

    /// Same as [Proxy::live] but weakly references `object` through `strategy` instead of the
    /// configured one.
    pub fn live_with(object: Ref, field: FieldId, strategy: WeakReferences) -> Self {
        if object.is_null() {
            env::fatal("Tried to bind a null object.");
        }
        if field.is_null() {
            env::fatal("Tried to bind an object without an instance field.");
        }
        let handle = weak::create(object, strategy);
        log::debug!("Bound a live object with {:?} weak references", strategy);
        Self {
            state: Mutex::new(State {
                count: 1,
                strong: Ref::NULL,
            }),
            weak: Some(Weak { handle, strategy }),
            field,
        }
    }

    /// Reads the native address stored in a live object.
    pub fn live_instance(object: Ref, field: FieldId) -> *mut c_void {
        if object.is_null() {
            return std::ptr::null_mut();
        }
        match env::current().get_field(object, field, Type::Long) {
            Value::Long(address) => address as usize as *mut c_void,
            value => env::fatal(&format!("Instance field holds {:?}.", value)),
        }
    }

    pub fn retain(&self) {
        let mut state = self.lock();
        state.count += 1;
        log::trace!("Retained a proxy, count {}", state.count);

        if state.count != 2 {
            return;
        }
        if let Some(weak) = &self.weak {
            let strong = weak::resolve(weak.handle, weak.strategy);
            if strong.is_null() {
                state.count -= 1;
                drop(state);
                env::fatal("Tried to retain a collected object.");
            }
            state.strong = strong;
            log::debug!("Promoted a live object to a global reference");
        }
    }

    /// Returns `true` if the count dropped to 0, in which case the caller must destroy the proxy.
    pub fn release(&self) -> bool {
        let mut state = self.lock();
        if state.count == 0 {
            drop(state);
            env::fatal("Released an object without references.");
        }
        state.count -= 1;
        log::trace!("Released a proxy, count {}", state.count);

        if state.count == 1 && self.weak.is_some() && !state.strong.is_null() {
            env::current().delete_global_ref(state.strong);
            state.strong = Ref::NULL;
            log::debug!("Demoted a live object to a weak reference");
        }
        state.count == 0
    }

    /// Returns the global reference to the managed object.
    ///
    /// Aborts if a live object is only weakly bound, that is if no [Ptr](crate::pointer::Ptr)
    /// points to it.
    pub fn handle(&self) -> Ref {
        let strong = self.lock().strong;
        if strong.is_null() {
            env::fatal("Tried to get weakly referenced object.");
        }
        strong
    }

    /// Stores the address of the native instance into the live object.
    ///
    /// Aborts if the object already owns a native instance.
    pub fn publish(&self, address: *const c_void) {
        let object = self.handle();
        if !Self::live_instance(object, self.field).is_null() {
            env::fatal("Object already has a native instance.");
        }
        env::current().set_field(object, self.field, Value::Long(address as usize as i64));
    }

    pub fn is_live(&self) -> bool {
        self.weak.is_some()
    }

    pub fn reference_count(&self) -> usize {
        self.lock().count
    }

    pub fn is_strongly_bound(&self) -> bool {
        !self.lock().strong.is_null()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("Failed to lock the proxy state")
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        let strong = match self.state.get_mut() {
            Ok(state) => state.strong,
            Err(poisoned) => poisoned.into_inner().strong,
        };
        let env = env::current();
        if !strong.is_null() {
            env.delete_global_ref(strong);
        }

        // Detach from the managed object, its finalizer must not find this instance again.
        if let Some(weak) = self.weak.take() {
            let object = weak::resolve(weak.handle, weak.strategy);
            if !object.is_null() {
                env.set_field(object, self.field, Value::Long(0));
                env.delete_global_ref(object);
            }
            weak::destroy(weak.handle, weak.strategy);
            log::debug!("Unbound a live object");
        }
    }
}

impl Debug for Proxy {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Proxy")
            .field("count", &state.count)
            .field("strong", &state.strong)
            .field("live", &self.weak.is_some())
            .finish()
    }
}
