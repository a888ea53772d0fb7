//! Raw entry points of the managed runtime.
//!
//! [Interface] follows the Java Native Interface function table one-to-one: no method translates
//! pending exceptions and no method manages reference lifetimes. The rest of this crate builds
//! those guarantees on top of it, see [exception](crate::exception) and [local](crate::local).

use std::ffi::c_void;
use std::fmt::Debug;
use std::fmt::Formatter;
use thiserror::Error;

/// Opaque reference to a managed object, ABI-compatible with `jobject`.
///
/// Whether a [Ref] is local, global or weak is not tracked by the type; it only matters to the
/// code that created it.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ref(*mut c_void);

// A reference is a token handed out by the runtime. Which thread may dereference it is decided by
// its kind (local references are bound to their thread).
unsafe impl Send for Ref {}
unsafe impl Sync for Ref {}

impl Ref {
    pub const NULL: Ref = Ref(std::ptr::null_mut());

    pub fn from_raw(raw: *mut c_void) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for Ref {
    fn default() -> Self {
        Self::NULL
    }
}

impl Debug for Ref {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Ref({:p})", self.0)
    }
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
        pub struct $name(usize);

        impl $name {
            pub const NULL: $name = $name(0);

            pub fn from_raw(raw: *mut c_void) -> Self {
                Self(raw as usize)
            }

            pub fn as_raw(self) -> *mut c_void {
                self.0 as *mut c_void
            }

            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

opaque_id!(
    /// Resolved method identifier, `jmethodID`.
    MethodId
);
opaque_id!(
    /// Resolved field identifier, `jfieldID`.
    FieldId
);

/// Type tags of the managed runtime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Type {
    Void,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Object,
}

impl Type {
    /// Parses the return type of a method signature such as `(IJ)Ljava/lang/String;`.
    pub fn parse_return(signature: &str) -> Option<Type> {
        let close = signature.find(')')?;
        let mut rest = signature.get(close + 1..)?.as_bytes();
        let ty = Self::parse_one(&mut rest)?;
        if rest.is_empty() {
            Some(ty)
        } else {
            None
        }
    }

    /// Parses the argument types of a method signature.
    pub fn parse_arguments(signature: &str) -> Option<Vec<Type>> {
        let open = signature.strip_prefix('(')?;
        let close = open.find(')')?;
        let mut rest = open.get(..close)?.as_bytes();
        let mut result = Vec::new();
        while !rest.is_empty() {
            match Self::parse_one(&mut rest)? {
                Type::Void => return None,
                ty => result.push(ty),
            }
        }
        Some(result)
    }

    /// Parses a field signature such as `J` or `[Z`.
    pub fn parse_field(signature: &str) -> Option<Type> {
        let mut rest = signature.as_bytes();
        match Self::parse_one(&mut rest)? {
            Type::Void => None,
            ty if rest.is_empty() => Some(ty),
            _ => None,
        }
    }

    fn parse_one(rest: &mut &[u8]) -> Option<Type> {
        let slice: &[u8] = *rest;
        let (&first, tail) = slice.split_first()?;
        *rest = tail;
        let ty = match first {
            b'V' => Type::Void,
            b'Z' => Type::Boolean,
            b'B' => Type::Byte,
            b'C' => Type::Char,
            b'S' => Type::Short,
            b'I' => Type::Int,
            b'J' => Type::Long,
            b'F' => Type::Float,
            b'D' => Type::Double,
            b'L' => {
                let end = tail.iter().position(|c| *c == b';')?;
                *rest = &tail[end + 1..];
                Type::Object
            }
            b'[' => match Self::parse_one(rest)? {
                Type::Void => return None,
                _ => Type::Object,
            },
            _ => return None,
        };
        Some(ty)
    }
}

/// Argument or return value crossing the boundary, tagged with its [Type].
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Value {
    Void,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(Ref),
}

impl Value {
    pub fn ty(&self) -> Type {
        match self {
            Value::Void => Type::Void,
            Value::Boolean(_) => Type::Boolean,
            Value::Byte(_) => Type::Byte,
            Value::Char(_) => Type::Char,
            Value::Short(_) => Type::Short,
            Value::Int(_) => Type::Int,
            Value::Long(_) => Type::Long,
            Value::Float(_) => Type::Float,
            Value::Double(_) => Type::Double,
            Value::Object(_) => Type::Object,
        }
    }

    /// Zero value of a [Type], what the runtime stores in fresh fields and arrays.
    pub fn zero(ty: Type) -> Value {
        match ty {
            Type::Void => Value::Void,
            Type::Boolean => Value::Boolean(false),
            Type::Byte => Value::Byte(0),
            Type::Char => Value::Char(0),
            Type::Short => Value::Short(0),
            Type::Int => Value::Int(0),
            Type::Long => Value::Long(0),
            Type::Float => Value::Float(0.0),
            Type::Double => Value::Double(0.0),
            Type::Object => Value::Object(Ref::NULL),
        }
    }
}

macro_rules! value_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(src: $source) -> Self {
                    Value::$variant(src)
                }
            }
        )*
    };
}

value_from! {
    bool => Boolean,
    i8 => Byte,
    u16 => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    Ref => Object,
}

/// Native function registered as the implementation of a managed method.
#[derive(Clone, Debug)]
pub struct Native {
    pub name: String,
    pub signature: String,
    pub function: *mut c_void,
}

/// Failure to attach the calling thread to the managed runtime.
#[derive(Error, Debug)]
#[error("Failed to attach the current thread: {0}")]
pub struct AttachError(pub String);

/// Function table of the managed runtime.
///
/// Methods operate on behalf of the calling thread. Callers must have called
/// [attach_current_thread](Interface::attach_current_thread) on that thread first, which
/// [env::current](crate::env::current) always does.
pub trait Interface: Send + Sync {
    fn attach_current_thread(&self) -> Result<(), AttachError>;

    /// Reports an unrecoverable error through the runtime. Usually does not return.
    fn fatal_error(&self, message: &str);

    fn new_local_ref(&self, object: Ref) -> Ref;
    fn delete_local_ref(&self, object: Ref);
    fn new_global_ref(&self, object: Ref) -> Ref;
    fn delete_global_ref(&self, object: Ref);
    fn new_weak_global_ref(&self, object: Ref) -> Ref;
    fn delete_weak_global_ref(&self, object: Ref);
    fn is_same_object(&self, first: Ref, second: Ref) -> bool;

    fn exception_occurred(&self) -> Ref;
    fn exception_describe(&self);
    fn exception_clear(&self);
    fn throw(&self, throwable: Ref) -> i32;

    fn find_class(&self, name: &str) -> Ref;
    fn get_superclass(&self, class: Ref) -> Ref;
    fn get_object_class(&self, object: Ref) -> Ref;
    fn is_assignable_from(&self, class: Ref, target: Ref) -> bool;
    fn get_method_id(&self, class: Ref, name: &str, signature: &str, is_static: bool) -> MethodId;
    fn get_field_id(&self, class: Ref, name: &str, signature: &str, is_static: bool) -> FieldId;
    fn register_natives(&self, class: Ref, natives: &[Native]) -> i32;

    fn new_object(&self, class: Ref, constructor: MethodId, args: &[Value]) -> Ref;
    fn call_method(&self, target: Ref, method: MethodId, ret: Type, args: &[Value]) -> Value;
    fn call_static_method(&self, class: Ref, method: MethodId, ret: Type, args: &[Value]) -> Value;
    fn call_nonvirtual_method(
        &self,
        target: Ref,
        class: Ref,
        method: MethodId,
        ret: Type,
        args: &[Value],
    ) -> Value;

    fn get_field(&self, object: Ref, field: FieldId, ty: Type) -> Value;
    fn set_field(&self, object: Ref, field: FieldId, value: Value);
    fn get_static_field(&self, class: Ref, field: FieldId, ty: Type) -> Value;
    fn set_static_field(&self, class: Ref, field: FieldId, value: Value);

    fn new_string(&self, text: &str) -> Ref;
    fn get_string(&self, string: Ref) -> String;

    fn get_array_length(&self, array: Ref) -> i32;
    fn new_primitive_array(&self, element: Type, length: i32) -> Ref;
    fn get_array_region(&self, array: Ref, element: Type, start: i32, length: i32) -> Vec<Value>;
    fn set_array_region(&self, array: Ref, start: i32, values: &[Value]);
    fn new_object_array(&self, length: i32, element_class: Ref, initial: Ref) -> Ref;
    fn get_object_array_element(&self, array: Ref, index: i32) -> Ref;
    fn set_object_array_element(&self, array: Ref, index: i32, value: Ref);
}
