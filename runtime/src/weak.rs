//! Weak references to managed objects.

use crate::binding::Binding;
use crate::binding::ClassDescriptor;
use crate::config::WeakReferences;
use crate::env;
use crate::interface::Ref;
use crate::local::Local;

static WEAK_REFERENCE: Binding = Binding::new(describe_weak_reference);

fn describe_weak_reference() -> ClassDescriptor {
    ClassDescriptor::new("java/lang/ref/WeakReference")
        .constructor("new", "(Ljava/lang/Object;)V")
        .method("get", "get", "()Ljava/lang/Object;")
}

/// Creates a weak reference to `object`.
pub fn create(object: Ref, strategy: WeakReferences) -> Ref {
    let env = env::current();
    let weak = match strategy {
        WeakReferences::Native => env.new_weak_global_ref(object),
        WeakReferences::Emulated => {
            match WEAK_REFERENCE.new_object("new", &[object.into()]) {
                Ok(reference) => env.new_global_ref(reference.as_raw()),
                Err(err) => {
                    log::warn!("Failed to construct a `WeakReference`: {}", err);
                    Ref::NULL
                }
            }
        }
    };
    if weak.is_null() {
        env::fatal("Failed to create a weak reference.");
    }
    weak
}

/// Returns a new global reference to the object, or a null one if it was collected.
pub fn resolve(weak: Ref, strategy: WeakReferences) -> Ref {
    let env = env::current();
    match strategy {
        WeakReferences::Native => env.new_global_ref(weak),
        WeakReferences::Emulated => match WEAK_REFERENCE.call::<Local>(weak, "get", &[]) {
            Ok(object) if object.is_null() => Ref::NULL,
            Ok(object) => env.new_global_ref(object.as_raw()),
            Err(err) => {
                log::warn!("`WeakReference.get()` failed: {}", err);
                Ref::NULL
            }
        },
    }
}

pub fn destroy(weak: Ref, strategy: WeakReferences) {
    let env = env::current();
    match strategy {
        WeakReferences::Native => env.delete_weak_global_ref(weak),
        WeakReferences::Emulated => env.delete_global_ref(weak),
    }
}
