//! Shared pointers to bridged objects and the native callback guards.

use crate::binding::Binding;
use crate::env;
use crate::exception;
use crate::exception::Error;
use crate::exception::Result;
use crate::interface::Ref;
use crate::interface::Type;
use crate::interface::Value;
use crate::local::Local;
use crate::object::Proxy;
use std::ffi::c_void;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::ptr::NonNull;

/// How a [Bridged] type relates to its managed objects.
pub enum Kind<T> {
    /// Native instances are created on demand around existing managed objects.
    Wrapper(fn(Proxy) -> T),

    /// Native instances are owned by their managed objects.
    Live,
}

/// Native type bound to a managed class.
///
/// # Safety
///
/// [proxy](Bridged::proxy) must always return the same [Proxy], created in the mode matching
/// [KIND](Bridged::KIND) for an object of the class described by [binding](Bridged::binding).
pub unsafe trait Bridged: Send + Sync + Sized + 'static {
    const KIND: Kind<Self>;

    fn binding() -> &'static Binding;

    fn proxy(&self) -> &Proxy;
}

fn is_live<T: Bridged>() -> bool {
    matches!(T::KIND, Kind::Live)
}

/// Reference-counted pointer to a [Bridged] instance.
///
/// The instance is destroyed when the last native reference to it goes away, except for live
/// instances, which their managed object keeps until it is finalized.
pub struct Ptr<T: Bridged> {
    raw: Option<NonNull<T>>,
}

unsafe impl<T: Bridged> Send for Ptr<T> {}
unsafe impl<T: Bridged> Sync for Ptr<T> {}

impl<T: Bridged> Ptr<T> {
    pub fn null() -> Self {
        Self { raw: None }
    }

    /// Moves `value` to the heap and points to it.
    ///
    /// Live instances get their address published to their managed object.
    pub fn new(value: T) -> Self {
        if value.proxy().is_live() != is_live::<T>() {
            env::fatal("Proxy mode does not match the bridged type.");
        }
        let raw = Box::into_raw(Box::new(value));
        let ptr = unsafe { Self::from_raw(raw) };
        if is_live::<T>() {
            ptr.proxy().publish(raw as *const c_void);
        }
        ptr
    }

    /// Points to the native instance of a managed object.
    ///
    /// For wrapper types, a new instance is created around `object`. For live types, the
    /// instance is looked up in the instance field and the pointer is empty if there is none.
    ///
    /// # Safety
    ///
    /// `object` must be null or an instance of the class bound to `T`.
    pub unsafe fn wrap(object: Ref) -> Self {
        if object.is_null() {
            return Self::null();
        }
        match T::KIND {
            Kind::Wrapper(construct) => Self::new(construct(Proxy::wrap(object))),
            Kind::Live => {
                let field = T::binding().instance_field();
                Self::from_raw(Proxy::live_instance(object, field) as *mut T)
            }
        }
    }

    /// Adds a reference to an instance already owned by another [Ptr] or by a managed object.
    ///
    /// # Safety
    ///
    /// `raw` must be null or allocated by [Ptr::new] and not yet destroyed.
    pub unsafe fn from_raw(raw: *mut T) -> Self {
        let raw = NonNull::new(raw);
        if let Some(instance) = raw {
            instance.as_ref().proxy().retain();
        }
        Self { raw }
    }

    /// Gives up this reference without releasing it, leaving the pointer empty.
    pub fn detach(&mut self) -> *mut T {
        match self.raw.take() {
            Some(raw) => raw.as_ptr(),
            None => std::ptr::null_mut(),
        }
    }

    /// Releases the instance, leaving the pointer empty.
    pub fn reset(&mut self) {
        if let Some(raw) = self.raw.take() {
            unsafe { release(raw) }
        }
    }

    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.raw, &mut other.raw)
    }

    /// Borrows the instance, or returns `None` if the pointer is empty.
    pub fn instance(&self) -> Option<&T> {
        self.raw.map(|raw| unsafe { &*raw.as_ptr() })
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_none()
    }

    /// Returns the global reference of the managed object, or a null one if the pointer is empty.
    pub fn handle(&self) -> Ref {
        match self.instance() {
            Some(instance) => instance.proxy().handle(),
            None => Ref::NULL,
        }
    }

    pub fn to_local(&self) -> Local {
        Local::wrap(self.handle())
    }
}

unsafe fn release<T: Bridged>(raw: NonNull<T>) {
    if raw.as_ref().proxy().release() {
        log::debug!("Destroying a native instance");
        drop(Box::from_raw(raw.as_ptr()));
    }
}

impl<T: Bridged> Default for Ptr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: Bridged> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        match self.raw {
            Some(raw) => unsafe { Self::from_raw(raw.as_ptr()) },
            None => Self::null(),
        }
    }
}

impl<T: Bridged> Drop for Ptr<T> {
    fn drop(&mut self) {
        self.reset()
    }
}

impl<T: Bridged> Deref for Ptr<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.instance().expect("Dereferenced an empty pointer")
    }
}

impl<T: Bridged> PartialEq for Ptr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: Bridged> Eq for Ptr<T> {}

impl<T: Bridged> Debug for Ptr<T> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.raw {
            Some(raw) => write!(f, "Ptr({:p})", raw.as_ptr()),
            None => write!(f, "Ptr(null)"),
        }
    }
}

impl<T: Bridged> From<&Ptr<T>> for Value {
    fn from(src: &Ptr<T>) -> Self {
        Value::Object(src.handle())
    }
}

/// Finalizer registered for every live class.
///
/// Releases the reference the managed object holds on its native instance, then runs the
/// finalizer of the superclass.
pub extern "system" fn finalize<T: Bridged>(_env: *mut c_void, this: Ref) {
    guard(|| {
        let binding = T::binding();
        let instance = Proxy::live_instance(this, binding.instance_field()) as *mut T;
        if let Some(raw) = NonNull::new(instance) {
            log::debug!("Finalizing an instance of `{}`", binding.name());
            unsafe { release(raw) }
        }
        if let Some((class, method)) = binding.super_finalizer() {
            env::current().call_nonvirtual_method(this, class, method, Type::Void, &[]);
            exception::check()?;
        }
        Ok(())
    })
}

/// Runs the body of a native callback.
///
/// An [Error] or a panic escaping `body` is raised as a managed exception and the default value
/// is returned instead.
pub fn guard<R: Default>(body: impl FnOnce() -> Result<R>) -> R {
    match std::panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            exception::raise(&err);
            R::default()
        }
        Err(payload) => {
            exception::raise_panic(payload.as_ref());
            R::default()
        }
    }
}

/// Runs the body of a native method of a live class on the instance bound to `this`.
pub fn callback<T, R, F>(this: Ref, body: F) -> R
where
    T: Bridged,
    R: Default,
    F: FnOnce(&T) -> Result<R>,
{
    guard(|| {
        let this = unsafe { Ptr::<T>::wrap(this) };
        match this.instance() {
            Some(instance) => body(instance),
            None => Err(Error::native("Native instance not bound.")),
        }
    })
}
