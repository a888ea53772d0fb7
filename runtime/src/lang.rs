//! Classes of `java.lang` and the operations every object supports.

use crate::binding::Binding;
use crate::binding::ClassDescriptor;
use crate::env;
use crate::exception::check;
use crate::exception::Error;
use crate::exception::Result;
use crate::interface::Ref;
use crate::local::Local;
use crate::pointer::Bridged;
use crate::pointer::Ptr;

/// Declares a wrapper type around a managed class.
///
/// ```ignore
/// static THREAD: Binding = Binding::new(describe_thread);
///
/// wrapper!(
///     /// `java.lang.Thread`
///     Thread,
///     THREAD
/// );
/// ```
#[macro_export]
macro_rules! wrapper {
    ($(#[$meta:meta])* $name:ident, $binding:ident) => {
        $(#[$meta])*
        pub struct $name($crate::object::Proxy);

        unsafe impl $crate::pointer::Bridged for $name {
            const KIND: $crate::pointer::Kind<Self> = $crate::pointer::Kind::Wrapper($name);

            fn binding() -> &'static $crate::binding::Binding {
                &$binding
            }

            fn proxy(&self) -> &$crate::object::Proxy {
                &self.0
            }
        }
    };
}

/// [Bridged] type of a subclass of `java.lang.Throwable`.
///
/// # Safety
///
/// The class bound to the implementor must be a subclass of `java.lang.Throwable`.
pub unsafe trait Exception: Bridged {}

static OBJECT: Binding = Binding::new(describe_object);
static CLASS: Binding = Binding::new(describe_class);
static STRING: Binding = Binding::new(describe_string);
static THROWABLE: Binding = Binding::new(describe_throwable);
static RUNTIME_EXCEPTION: Binding = Binding::new(describe_runtime_exception);
static CLASS_CAST_EXCEPTION: Binding = Binding::new(describe_class_cast_exception);

fn describe_object() -> ClassDescriptor {
    ClassDescriptor::new("java/lang/Object")
        .constructor("new", "()V")
        .method("equals", "equals", "(Ljava/lang/Object;)Z")
        .method("getClass", "getClass", "()Ljava/lang/Class;")
        .method("hashCode", "hashCode", "()I")
        .method("notify", "notify", "()V")
        .method("notifyAll", "notifyAll", "()V")
        .method("toString", "toString", "()Ljava/lang/String;")
        .method("wait", "wait", "()V")
        .method("waitTimeout", "wait", "(J)V")
        .method("waitTimeoutNanos", "wait", "(JI)V")
}

fn describe_class() -> ClassDescriptor {
    ClassDescriptor::new("java/lang/Class")
        .method("getName", "getName", "()Ljava/lang/String;")
        .static_method("forName", "forName", "(Ljava/lang/String;)Ljava/lang/Class;")
}

fn describe_string() -> ClassDescriptor {
    ClassDescriptor::new("java/lang/String").method("length", "length", "()I")
}

fn describe_throwable() -> ClassDescriptor {
    ClassDescriptor::new("java/lang/Throwable")
        .constructor("new", "()V")
        .constructor("newWithMessage", "(Ljava/lang/String;)V")
        .method("getCause", "getCause", "()Ljava/lang/Throwable;")
        .method("getMessage", "getMessage", "()Ljava/lang/String;")
        .method("printStackTrace", "printStackTrace", "()V")
}

fn describe_runtime_exception() -> ClassDescriptor {
    ClassDescriptor::new("java/lang/RuntimeException")
        .constructor("new", "(Ljava/lang/String;)V")
}

fn describe_class_cast_exception() -> ClassDescriptor {
    ClassDescriptor::new("java/lang/ClassCastException")
        .constructor("new", "(Ljava/lang/String;)V")
}

wrapper!(
    /// `java.lang.Object`
    Object,
    OBJECT
);

wrapper!(
    /// `java.lang.Class`
    Class,
    CLASS
);

wrapper!(
    /// `java.lang.String`
    JavaString,
    STRING
);

wrapper!(
    /// `java.lang.Throwable`
    Throwable,
    THROWABLE
);

wrapper!(
    /// `java.lang.RuntimeException`
    RuntimeException,
    RUNTIME_EXCEPTION
);

wrapper!(
    /// `java.lang.ClassCastException`
    ClassCastException,
    CLASS_CAST_EXCEPTION
);

unsafe impl Exception for Throwable {}
unsafe impl Exception for RuntimeException {}
unsafe impl Exception for ClassCastException {}

/// Wraps a fresh local reference into a [Ptr], deleting the local reference.
fn adopt<T: Bridged>(object: Local) -> Ptr<T> {
    unsafe { Ptr::wrap(object.as_raw()) }
}

impl Object {
    pub fn new() -> Result<Ptr<Object>> {
        OBJECT.new_object("new", &[]).map(adopt)
    }
}

impl Class {
    /// Loads a class by its binary name such as `java.lang.Thread`.
    pub fn for_name(name: &str) -> Result<Ptr<Class>> {
        let name = JavaString::new(name)?;
        let class: Local = CLASS.call_static("forName", &[(&name).into()])?;
        Ok(adopt(class))
    }

    /// Returns the binary name of this class such as `java.lang.Thread`.
    pub fn name(&self) -> Result<String> {
        let name: Local = CLASS.call(self.0.handle(), "getName", &[])?;
        Ok(env::current().get_string(name.as_raw()))
    }
}

impl JavaString {
    pub fn new(text: &str) -> Result<Ptr<JavaString>> {
        let string = Local::wrap_local(env::current().new_string(text));
        check()?;
        Ok(adopt(string))
    }

    pub fn value(&self) -> String {
        env::current().get_string(self.0.handle())
    }

    /// Returns the number of UTF-16 code units.
    pub fn len(&self) -> Result<i32> {
        STRING.call(self.0.handle(), "length", &[])
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Throwable {
    pub fn new() -> Result<Ptr<Throwable>> {
        THROWABLE.new_object("new", &[]).map(adopt)
    }

    pub fn with_message(message: &str) -> Result<Ptr<Throwable>> {
        let message = JavaString::new(message)?;
        THROWABLE
            .new_object("newWithMessage", &[(&message).into()])
            .map(adopt)
    }

    pub fn message(&self) -> Result<Option<String>> {
        let message: Local = THROWABLE.call(self.0.handle(), "getMessage", &[])?;
        if message.is_null() {
            Ok(None)
        } else {
            Ok(Some(env::current().get_string(message.as_raw())))
        }
    }

    pub fn cause(&self) -> Result<Ptr<Throwable>> {
        THROWABLE.call(self.0.handle(), "getCause", &[]).map(adopt)
    }

    pub fn print_stack_trace(&self) -> Result<()> {
        THROWABLE.call(self.0.handle(), "printStackTrace", &[])
    }
}

impl RuntimeException {
    pub fn new(message: &str) -> Result<Ptr<RuntimeException>> {
        let message = JavaString::new(message)?;
        RUNTIME_EXCEPTION
            .new_object("new", &[(&message).into()])
            .map(adopt)
    }
}

impl ClassCastException {
    pub fn new(message: &str) -> Result<Ptr<ClassCastException>> {
        let message = JavaString::new(message)?;
        CLASS_CAST_EXCEPTION
            .new_object("new", &[(&message).into()])
            .map(adopt)
    }
}

/// Methods of `java.lang.Object`.
impl<T: Bridged> Ptr<T> {
    pub fn equals<U: Bridged>(&self, other: &Ptr<U>) -> Result<bool> {
        OBJECT.call(self.handle(), "equals", &[other.into()])
    }

    pub fn get_class(&self) -> Result<Ptr<Class>> {
        OBJECT.call(self.handle(), "getClass", &[]).map(adopt)
    }

    pub fn hash_code(&self) -> Result<i32> {
        OBJECT.call(self.handle(), "hashCode", &[])
    }

    pub fn notify(&self) -> Result<()> {
        OBJECT.call(self.handle(), "notify", &[])
    }

    pub fn notify_all(&self) -> Result<()> {
        OBJECT.call(self.handle(), "notifyAll", &[])
    }

    pub fn wait(&self) -> Result<()> {
        OBJECT.call(self.handle(), "wait", &[])
    }

    pub fn wait_timeout(&self, millis: i64) -> Result<()> {
        OBJECT.call(self.handle(), "waitTimeout", &[millis.into()])
    }

    pub fn wait_timeout_nanos(&self, millis: i64, nanos: i32) -> Result<()> {
        OBJECT.call(
            self.handle(),
            "waitTimeoutNanos",
            &[millis.into(), nanos.into()],
        )
    }

    pub fn to_java_string(&self) -> Result<Ptr<JavaString>> {
        OBJECT.call(self.handle(), "toString", &[]).map(adopt)
    }

    /// Checks if both pointers refer to the same managed object, two empty pointers included.
    pub fn is_same_object<U: Bridged>(&self, other: &Ptr<U>) -> bool {
        match (self.is_null(), other.is_null()) {
            (true, true) => true,
            (false, false) => env::current().is_same_object(self.handle(), other.handle()),
            _ => false,
        }
    }
}

/// Checks if `object` is an instance of the class bound to `T`. A null object is an instance of
/// nothing.
pub fn is_instance_of<T: Bridged>(object: Ref) -> bool {
    if object.is_null() {
        return false;
    }
    let env = env::current();
    let class = Local::wrap_local(env.get_object_class(object));
    env.is_assignable_from(class.as_raw(), T::binding().class())
}

/// Casts `object` to `T` if it is an instance of the class bound to `T`.
///
/// Returns an empty pointer if `object` is null, and a `ClassCastException` naming the class of
/// `T` if it has another type. Casting to a live type fails if no native instance is bound.
pub fn cast<T: Bridged>(object: Ref) -> Result<Ptr<T>> {
    if object.is_null() {
        return Ok(Ptr::null());
    }
    if is_instance_of::<T>(object) {
        let ptr: Ptr<T> = unsafe { Ptr::wrap(object) };
        if ptr.is_null() {
            return Err(Error::native("Native instance not bound."));
        }
        return Ok(ptr);
    }
    let target = unsafe { Ptr::<Class>::wrap(T::binding().class()) };
    let exception = ClassCastException::new(&target.name()?)?;
    Err(Error::from(exception))
}
