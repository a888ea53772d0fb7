//! Binding tables of managed classes.
//!
//! A [ClassDescriptor] lists the members of a managed class that native code uses, each under a
//! tag of its own, together with the native methods to register. A [Binding] resolves its
//! descriptor the first time it is used. Resolution failures mean the native and managed code do
//! not match and abort the process.

use crate::env;
use crate::exception::check;
use crate::exception::Result;
use crate::interface::FieldId;
use crate::interface::Interface;
use crate::interface::MethodId;
use crate::interface::Native;
use crate::interface::Ref;
use crate::interface::Type;
use crate::interface::Value;
use crate::local::Local;
use crate::pointer::finalize;
use crate::pointer::Bridged;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::ffi::c_void;

struct Member {
    tag: &'static str,
    name: &'static str,
    signature: &'static str,
    is_static: bool,
}

/// Members of a managed class, see [Binding].
pub struct ClassDescriptor {
    name: &'static str,
    methods: Vec<Member>,
    fields: Vec<Member>,
    callbacks: Vec<Native>,
    live: bool,
}

impl ClassDescriptor {
    /// Starts describing a class, named like `java/lang/Object`.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            methods: Default::default(),
            fields: Default::default(),
            callbacks: Default::default(),
            live: false,
        }
    }

    pub fn constructor(self, tag: &'static str, signature: &'static str) -> Self {
        self.member(tag, "<init>", signature, false, true)
    }

    pub fn method(self, tag: &'static str, name: &'static str, signature: &'static str) -> Self {
        self.member(tag, name, signature, false, true)
    }

    pub fn static_method(
        self,
        tag: &'static str,
        name: &'static str,
        signature: &'static str,
    ) -> Self {
        self.member(tag, name, signature, true, true)
    }

    pub fn field(self, tag: &'static str, name: &'static str, signature: &'static str) -> Self {
        self.member(tag, name, signature, false, false)
    }

    pub fn static_field(
        self,
        tag: &'static str,
        name: &'static str,
        signature: &'static str,
    ) -> Self {
        self.member(tag, name, signature, true, false)
    }

    /// Registers `function` as the implementation of a native method.
    pub fn callback(
        mut self,
        name: &'static str,
        signature: &'static str,
        function: *mut c_void,
    ) -> Self {
        self.callbacks.push(Native {
            name: name.into(),
            signature: signature.into(),
            function,
        });
        self
    }

    /// Marks the class as live: it holds the address of its native instance and its finalizer is
    /// implemented natively.
    pub fn live<T: Bridged>(mut self) -> Self {
        self.live = true;
        let finalizer = finalize::<T> as extern "system" fn(*mut c_void, Ref);
        self.callback("finalize", "()V", finalizer as *mut c_void)
    }

    fn member(
        mut self,
        tag: &'static str,
        name: &'static str,
        signature: &'static str,
        is_static: bool,
        is_method: bool,
    ) -> Self {
        let member = Member {
            tag,
            name,
            signature,
            is_static,
        };
        if is_method {
            self.methods.push(member);
        } else {
            self.fields.push(member);
        }
        self
    }
}

/// Resolved method.
#[derive(Clone, Copy, Debug)]
pub struct Method {
    pub id: MethodId,
    pub is_static: bool,
    pub ret: Type,
}

/// Resolved field.
#[derive(Clone, Copy, Debug)]
pub struct Field {
    pub id: FieldId,
    pub is_static: bool,
    pub ty: Type,
}

struct Resolved {
    name: &'static str,
    class: Ref,
    methods: HashMap<&'static str, Method>,
    fields: HashMap<&'static str, Field>,
    instance_field: FieldId,
    super_finalizer: Option<(Ref, MethodId)>,
}

/// Lazily resolved binding table of a managed class, meant to be stored in a `static`.
///
/// ```ignore
/// static THREAD: Binding = Binding::new(describe_thread);
///
/// fn describe_thread() -> ClassDescriptor {
///     ClassDescriptor::new("java/lang/Thread")
///         .constructor("new", "()V")
///         .method("start", "start", "()V")
/// }
/// ```
pub struct Binding {
    describe: fn() -> ClassDescriptor,
    resolved: OnceCell<Resolved>,
}

impl Binding {
    pub const fn new(describe: fn() -> ClassDescriptor) -> Self {
        Self {
            describe,
            resolved: OnceCell::new(),
        }
    }

    fn resolved(&self) -> &Resolved {
        self.resolved.get_or_init(|| resolve((self.describe)()))
    }

    pub fn name(&self) -> &'static str {
        self.resolved().name
    }

    /// Global reference to the class.
    pub fn class(&self) -> Ref {
        self.resolved().class
    }

    pub fn method(&self, tag: &str) -> Method {
        let resolved = self.resolved();
        match resolved.methods.get(tag) {
            Some(method) => *method,
            None => env::fatal(&format!("No method `{}` bound in `{}`.", tag, resolved.name)),
        }
    }

    pub fn field(&self, tag: &str) -> Field {
        let resolved = self.resolved();
        match resolved.fields.get(tag) {
            Some(field) => *field,
            None => env::fatal(&format!("No field `{}` bound in `{}`.", tag, resolved.name)),
        }
    }

    /// Field holding the native address of live instances.
    pub fn instance_field(&self) -> FieldId {
        let resolved = self.resolved();
        if resolved.instance_field.is_null() {
            env::fatal(&format!("`{}` is not a live class.", resolved.name));
        }
        resolved.instance_field
    }

    /// Superclass and finalizer of the superclass of a live class.
    pub fn super_finalizer(&self) -> Option<(Ref, MethodId)> {
        self.resolved().super_finalizer
    }

    /// Constructs an object.
    pub fn new_object(&self, tag: &str, args: &[Value]) -> Result<Local> {
        let method = self.instance_method(tag);
        let object = Local::wrap_local(env::current().new_object(self.class(), method.id, args));
        check()?;
        Ok(object)
    }

    /// Calls an instance method, dispatched on the runtime class of `target`.
    pub fn call<R: FromValue>(&self, target: Ref, tag: &str, args: &[Value]) -> Result<R> {
        let method = self.instance_method(tag);
        self.check_target(target, tag);
        let ret = env::current().call_method(target, method.id, method.ret, args);
        returned(ret)
    }

    /// Calls the implementation of an instance method in this very class.
    pub fn call_nonvirtual<R: FromValue>(
        &self,
        target: Ref,
        tag: &str,
        args: &[Value],
    ) -> Result<R> {
        let method = self.instance_method(tag);
        self.check_target(target, tag);
        let class = self.class();
        let ret = env::current().call_nonvirtual_method(target, class, method.id, method.ret, args);
        returned(ret)
    }

    pub fn call_static<R: FromValue>(&self, tag: &str, args: &[Value]) -> Result<R> {
        let method = self.method(tag);
        if !method.is_static {
            env::fatal(&format!("`{}` is not a static method.", tag));
        }
        let ret = env::current().call_static_method(self.class(), method.id, method.ret, args);
        returned(ret)
    }

    pub fn get_field<R: FromValue>(&self, target: Ref, tag: &str) -> Result<R> {
        let field = self.instance_field_of(tag);
        self.check_target(target, tag);
        returned(env::current().get_field(target, field.id, field.ty))
    }

    pub fn set_field(&self, target: Ref, tag: &str, value: impl Into<Value>) -> Result<()> {
        let field = self.instance_field_of(tag);
        self.check_target(target, tag);
        env::current().set_field(target, field.id, value.into());
        check()
    }

    pub fn get_static<R: FromValue>(&self, tag: &str) -> Result<R> {
        let field = self.static_field_of(tag);
        returned(env::current().get_static_field(self.class(), field.id, field.ty))
    }

    pub fn set_static(&self, tag: &str, value: impl Into<Value>) -> Result<()> {
        let field = self.static_field_of(tag);
        env::current().set_static_field(self.class(), field.id, value.into());
        check()
    }

    fn instance_method(&self, tag: &str) -> Method {
        let method = self.method(tag);
        if method.is_static {
            env::fatal(&format!("`{}` is a static method.", tag));
        }
        method
    }

    fn instance_field_of(&self, tag: &str) -> Field {
        let field = self.field(tag);
        if field.is_static {
            env::fatal(&format!("`{}` is a static field.", tag));
        }
        field
    }

    fn static_field_of(&self, tag: &str) -> Field {
        let field = self.field(tag);
        if !field.is_static {
            env::fatal(&format!("`{}` is not a static field.", tag));
        }
        field
    }

    fn check_target(&self, target: Ref, tag: &str) {
        if target.is_null() {
            env::fatal(&format!("Accessed `{}` of `{}` on a null object.", tag, self.name()));
        }
    }
}

fn returned<R: FromValue>(value: Value) -> Result<R> {
    // Converted before checking so that a returned local reference is not leaked.
    let value = R::from_value(value);
    check()?;
    Ok(value)
}

fn clear_pending(env: &dyn Interface) {
    if env::config().describe_exceptions {
        env.exception_describe();
    }
    env.exception_clear();
}

fn resolve(descriptor: ClassDescriptor) -> Resolved {
    let env = env::current();
    let name = descriptor.name;
    log::debug!("Resolving `{}`", name);

    if !Local::wrap_local(env.exception_occurred()).is_null() {
        clear_pending(env);
        env::fatal(&format!("Exception pending while resolving `{}`.", name));
    }

    let local_class = Local::wrap_local(env.find_class(name));
    if local_class.is_null() {
        clear_pending(env);
        env::fatal(&format!("Failed to find class `{}`.", name));
    }
    let class = env.new_global_ref(local_class.as_raw());

    let mut methods = HashMap::with_capacity(descriptor.methods.len());
    for member in &descriptor.methods {
        let id = env.get_method_id(class, member.name, member.signature, member.is_static);
        if id.is_null() {
            clear_pending(env);
            env::fatal(&format!(
                "Failed to find method `{}.{}{}`.",
                name, member.name, member.signature
            ));
        }
        let ret = match Type::parse_return(member.signature) {
            Some(ret) => ret,
            None => env::fatal(&format!("Invalid signature `{}`.", member.signature)),
        };
        let method = Method {
            id,
            is_static: member.is_static,
            ret,
        };
        if methods.insert(member.tag, method).is_some() {
            env::fatal(&format!("Method `{}` bound twice in `{}`.", member.tag, name));
        }
    }

    let mut fields = HashMap::with_capacity(descriptor.fields.len());
    for member in &descriptor.fields {
        let id = env.get_field_id(class, member.name, member.signature, member.is_static);
        if id.is_null() {
            clear_pending(env);
            env::fatal(&format!(
                "Failed to find field `{}.{}` of type `{}`.",
                name, member.name, member.signature
            ));
        }
        let ty = match Type::parse_field(member.signature) {
            Some(ty) => ty,
            None => env::fatal(&format!("Invalid signature `{}`.", member.signature)),
        };
        let field = Field {
            id,
            is_static: member.is_static,
            ty,
        };
        if fields.insert(member.tag, field).is_some() {
            env::fatal(&format!("Field `{}` bound twice in `{}`.", member.tag, name));
        }
    }

    let mut instance_field = FieldId::NULL;
    let mut super_finalizer = None;
    if descriptor.live {
        let field_name = &env::config().instance_field;
        instance_field = env.get_field_id(class, field_name, "J", false);
        if instance_field.is_null() {
            clear_pending(env);
            env::fatal(&format!("Live class `{}` has no `long {}` field.", name, field_name));
        }

        let superclass = Local::wrap_local(env.get_superclass(class));
        if !superclass.is_null() {
            let method = env.get_method_id(superclass.as_raw(), "finalize", "()V", false);
            if method.is_null() {
                env.exception_clear();
            } else {
                super_finalizer = Some((env.new_global_ref(superclass.as_raw()), method));
            }
        }
    }

    if !descriptor.callbacks.is_empty() {
        let status = env.register_natives(class, &descriptor.callbacks);
        if status != 0 || !Local::wrap_local(env.exception_occurred()).is_null() {
            clear_pending(env);
            env::fatal(&format!("Failed to register native methods of `{}`.", name));
        }
    }

    log::debug!(
        "Resolved `{}` with {} methods, {} fields and {} native methods",
        name,
        methods.len(),
        fields.len(),
        descriptor.callbacks.len()
    );
    Resolved {
        name,
        class,
        methods,
        fields,
        instance_field,
        super_finalizer,
    }
}

/// Conversion from the [Value] returned by the runtime.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Self;
}

macro_rules! from_value {
    ($($target:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $target {
                fn from_value(value: Value) -> Self {
                    match value {
                        Value::$variant(inner) => inner,
                        other => env::fatal(&format!(
                            "Expected {:?}, got {:?}.",
                            Type::$variant,
                            other.ty()
                        )),
                    }
                }
            }
        )*
    };
}

from_value! {
    bool => Boolean,
    i8 => Byte,
    u16 => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
}

impl FromValue for () {
    fn from_value(_: Value) -> Self {}
}

impl FromValue for Value {
    fn from_value(value: Value) -> Self {
        value
    }
}

impl FromValue for Local {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Object(object) => Local::wrap_local(object),
            other => env::fatal(&format!("Expected an object, got {:?}.", other.ty())),
        }
    }
}
