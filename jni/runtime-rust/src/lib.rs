//! Java Native Interface backend of the Javelin runtime.
//!
//! A native library installs the bridge from its `JNI_OnLoad`:
//!
//! ```ignore
//! #[no_mangle]
//! pub extern "system" fn JNI_OnLoad(vm: *mut jni::sys::JavaVM, _: *mut c_void) -> jni::sys::jint {
//!     javelin_runtime_jni::on_load(vm)
//! }
//! ```
//!
//! Calls go to the `JNIEnv` of the calling thread, attached on first use and cached for the
//! lifetime of the thread. Reference and exception bookkeeping goes through [jni::JNIEnv], the
//! rest straight to the function table so that pending exceptions stay untouched.

use javelin_runtime::config::Config;
use javelin_runtime::config::ConfigError;
use javelin_runtime::env;
use javelin_runtime::interface::AttachError;
use javelin_runtime::interface::FieldId;
use javelin_runtime::interface::MethodId;
use javelin_runtime::interface::Native;
use javelin_runtime::interface::Type;
use javelin_runtime::Interface;
use javelin_runtime::Ref;
use javelin_runtime::Value;
use jni::objects::JClass;
use jni::objects::JObject;
use jni::objects::JThrowable;
use jni::sys;
use jni::JNIEnv;
use jni::JavaVM;
use once_cell::sync::OnceCell;
use std::cell::Cell;
use std::ffi::c_void;
use std::ffi::CString;

/// Invokes a function of the `JNIEnv` function table.
macro_rules! jni_call {
    ($env:expr, $function:ident $(, $arg:expr)* $(,)?) => {{
        let env: *mut sys::JNIEnv = $env;
        match (**env).$function {
            Some(function) => function(env $(, $arg)*),
            None => missing(stringify!($function)),
        }
    }};
}

/// Dispatches a method call on its return type.
macro_rules! call_typed {
    ($env:expr, $ret:expr, ($($lead:expr),*), $args:expr, [
        $void:ident, $boolean:ident, $byte:ident, $char:ident, $short:ident,
        $int:ident, $long:ident, $float:ident, $double:ident, $object:ident $(,)?
    ]) => {{
        let env = $env;
        let args = $args;
        match $ret {
            Type::Void => {
                jni_call!(env, $void $(, $lead)*, args);
                Value::Void
            }
            Type::Boolean => Value::Boolean(is_true(jni_call!(env, $boolean $(, $lead)*, args))),
            Type::Byte => Value::Byte(jni_call!(env, $byte $(, $lead)*, args)),
            Type::Char => Value::Char(jni_call!(env, $char $(, $lead)*, args)),
            Type::Short => Value::Short(jni_call!(env, $short $(, $lead)*, args)),
            Type::Int => Value::Int(jni_call!(env, $int $(, $lead)*, args)),
            Type::Long => Value::Long(jni_call!(env, $long $(, $lead)*, args)),
            Type::Float => Value::Float(jni_call!(env, $float $(, $lead)*, args)),
            Type::Double => Value::Double(jni_call!(env, $double $(, $lead)*, args)),
            Type::Object => Value::Object(to_ref(jni_call!(env, $object $(, $lead)*, args))),
        }
    }};
}

/// Reads a field, dispatching on its type.
macro_rules! get_typed {
    ($env:expr, $ty:expr, ($($lead:expr),*), [
        $boolean:ident, $byte:ident, $char:ident, $short:ident,
        $int:ident, $long:ident, $float:ident, $double:ident, $object:ident $(,)?
    ]) => {{
        let env = $env;
        match $ty {
            Type::Void => Value::Void,
            Type::Boolean => Value::Boolean(is_true(jni_call!(env, $boolean $(, $lead)*))),
            Type::Byte => Value::Byte(jni_call!(env, $byte $(, $lead)*)),
            Type::Char => Value::Char(jni_call!(env, $char $(, $lead)*)),
            Type::Short => Value::Short(jni_call!(env, $short $(, $lead)*)),
            Type::Int => Value::Int(jni_call!(env, $int $(, $lead)*)),
            Type::Long => Value::Long(jni_call!(env, $long $(, $lead)*)),
            Type::Float => Value::Float(jni_call!(env, $float $(, $lead)*)),
            Type::Double => Value::Double(jni_call!(env, $double $(, $lead)*)),
            Type::Object => Value::Object(to_ref(jni_call!(env, $object $(, $lead)*))),
        }
    }};
}

/// Writes a field, dispatching on the type of the value.
macro_rules! set_typed {
    ($env:expr, $value:expr, ($($lead:expr),*), [
        $boolean:ident, $byte:ident, $char:ident, $short:ident,
        $int:ident, $long:ident, $float:ident, $double:ident, $object:ident $(,)?
    ]) => {{
        let env = $env;
        match $value {
            Value::Void => {}
            Value::Boolean(value) => jni_call!(env, $boolean $(, $lead)*, value as sys::jboolean),
            Value::Byte(value) => jni_call!(env, $byte $(, $lead)*, value),
            Value::Char(value) => jni_call!(env, $char $(, $lead)*, value),
            Value::Short(value) => jni_call!(env, $short $(, $lead)*, value),
            Value::Int(value) => jni_call!(env, $int $(, $lead)*, value),
            Value::Long(value) => jni_call!(env, $long $(, $lead)*, value),
            Value::Float(value) => jni_call!(env, $float $(, $lead)*, value),
            Value::Double(value) => jni_call!(env, $double $(, $lead)*, value),
            Value::Object(value) => jni_call!(env, $object $(, $lead)*, to_object(value)),
        }
    }};
}

/// Copies a region of a primitive array into [Value]s.
macro_rules! get_region {
    (
        $env:expr,
        $array:expr,
        $start:expr,
        $length:expr,
        $function:ident,
        $zero:expr,
        $wrap:expr
    ) => {{
        let mut buffer = vec![$zero; $length.max(0) as usize];
        jni_call!($env, $function, $array, $start, $length, buffer.as_mut_ptr());
        buffer.into_iter().map($wrap).collect::<Vec<Value>>()
    }};
}

/// Copies [Value]s into a region of a primitive array.
macro_rules! set_region {
    (
        $env:expr,
        $array:expr,
        $start:expr,
        $values:expr,
        $function:ident,
        $variant:ident,
        $element:ty
    ) => {{
        let buffer = $values
            .iter()
            .map(|value| match value {
                Value::$variant(element) => *element as $element,
                other => mismatch(Type::$variant, other),
            })
            .collect::<Vec<$element>>();
        jni_call!($env, $function, $array, $start, buffer.len() as sys::jsize, buffer.as_ptr())
    }};
}

thread_local! {
    static ENV: Cell<*mut sys::JNIEnv> = Cell::new(std::ptr::null_mut());
}

/// [Interface] over a Java virtual machine.
pub struct JniInterface {
    vm: JavaVM,
}

impl JniInterface {
    pub fn new(vm: JavaVM) -> Self {
        Self { vm }
    }

    fn attach(&self) -> Result<*mut sys::JNIEnv, AttachError> {
        let cached = ENV.with(Cell::get);
        if !cached.is_null() {
            return Ok(cached);
        }
        let env = self
            .vm
            .attach_current_thread_permanently()
            .map_err(|err| AttachError(err.to_string()))?;
        let raw = env.get_native_interface();
        ENV.with(|cell| cell.set(raw));
        log::debug!("Attached thread {:?}", std::thread::current().id());
        Ok(raw)
    }

    fn env(&self) -> *mut sys::JNIEnv {
        match self.attach() {
            Ok(env) => env,
            Err(err) => {
                log::error!("{}", err);
                std::process::abort()
            }
        }
    }

    fn wrapper(&self) -> JNIEnv<'_> {
        wrapped("JNIEnv", unsafe { JNIEnv::from_raw(self.env()) })
    }
}

/// Unwraps the result of a [JNIEnv] call that only fails on a broken function table.
fn wrapped<T>(function: &str, result: jni::errors::Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            log::error!("`{}` failed: {}", function, err);
            std::process::abort()
        }
    }
}

/// Turns the result of [JNIEnv::throw] back into the status code it failed with.
fn throw_status(result: jni::errors::Result<()>) -> i32 {
    match result {
        Ok(()) => sys::JNI_OK,
        Err(jni::errors::Error::ThrowFailed(status)) => status,
        Err(err) => wrapped("Throw", Err(err)),
    }
}

fn missing(function: &str) -> ! {
    log::error!("The native interface lacks `{}`.", function);
    std::process::abort()
}

fn mismatch(expected: Type, value: &Value) -> ! {
    env::fatal(&format!(
        "Expected {:?} array elements, got {:?}.",
        expected,
        value.ty()
    ))
}

fn to_ref(object: sys::jobject) -> Ref {
    Ref::from_raw(object as *mut c_void)
}

fn to_object(object: Ref) -> sys::jobject {
    object.as_raw() as sys::jobject
}

fn to_method(method: MethodId) -> sys::jmethodID {
    method.as_raw() as sys::jmethodID
}

fn to_field(field: FieldId) -> sys::jfieldID {
    field.as_raw() as sys::jfieldID
}

/// Converts a name or signature, replacing one with interior nul bytes by an empty string that no
/// lookup matches.
fn c_string(text: &str) -> CString {
    CString::new(text).unwrap_or_else(|err| {
        log::warn!("`{}` contains a nul byte: {}", text, err);
        CString::default()
    })
}

fn to_jvalue(value: &Value) -> sys::jvalue {
    match *value {
        Value::Void => sys::jvalue { j: 0 },
        Value::Boolean(z) => sys::jvalue {
            z: z as sys::jboolean,
        },
        Value::Byte(b) => sys::jvalue { b },
        Value::Char(c) => sys::jvalue { c },
        Value::Short(s) => sys::jvalue { s },
        Value::Int(i) => sys::jvalue { i },
        Value::Long(j) => sys::jvalue { j },
        Value::Float(f) => sys::jvalue { f },
        Value::Double(d) => sys::jvalue { d },
        Value::Object(l) => sys::jvalue { l: to_object(l) },
    }
}

fn arguments(args: &[Value]) -> Vec<sys::jvalue> {
    args.iter().map(to_jvalue).collect()
}

fn is_true(value: sys::jboolean) -> bool {
    value == sys::JNI_TRUE
}

impl Interface for JniInterface {
    fn attach_current_thread(&self) -> Result<(), AttachError> {
        self.attach().map(|_| ())
    }

    fn fatal_error(&self, message: &str) {
        let message = c_string(message);
        unsafe { jni_call!(self.env(), FatalError, message.as_ptr()) }
    }

    fn new_local_ref(&self, object: Ref) -> Ref {
        to_ref(unsafe { jni_call!(self.env(), NewLocalRef, to_object(object)) })
    }

    fn delete_local_ref(&self, object: Ref) {
        let object = JObject::from(to_object(object));
        wrapped("DeleteLocalRef", self.wrapper().delete_local_ref(object))
    }

    fn new_global_ref(&self, object: Ref) -> Ref {
        to_ref(unsafe { jni_call!(self.env(), NewGlobalRef, to_object(object)) })
    }

    fn delete_global_ref(&self, object: Ref) {
        unsafe { jni_call!(self.env(), DeleteGlobalRef, to_object(object)) }
    }

    fn new_weak_global_ref(&self, object: Ref) -> Ref {
        to_ref(unsafe { jni_call!(self.env(), NewWeakGlobalRef, to_object(object)) })
    }

    fn delete_weak_global_ref(&self, object: Ref) {
        unsafe { jni_call!(self.env(), DeleteWeakGlobalRef, to_object(object)) }
    }

    fn is_same_object(&self, first: Ref, second: Ref) -> bool {
        let first = JObject::from(to_object(first));
        let second = JObject::from(to_object(second));
        wrapped("IsSameObject", self.wrapper().is_same_object(first, second))
    }

    fn exception_occurred(&self) -> Ref {
        let throwable = wrapped("ExceptionOccurred", self.wrapper().exception_occurred());
        to_ref(throwable.into_inner())
    }

    fn exception_describe(&self) {
        wrapped("ExceptionDescribe", self.wrapper().exception_describe())
    }

    fn exception_clear(&self) {
        wrapped("ExceptionClear", self.wrapper().exception_clear())
    }

    fn throw(&self, throwable: Ref) -> i32 {
        let throwable = JThrowable::from(to_object(throwable));
        throw_status(self.wrapper().throw(throwable))
    }

    fn find_class(&self, name: &str) -> Ref {
        let name = c_string(name);
        to_ref(unsafe { jni_call!(self.env(), FindClass, name.as_ptr()) })
    }

    fn get_superclass(&self, class: Ref) -> Ref {
        to_ref(unsafe { jni_call!(self.env(), GetSuperclass, to_object(class)) })
    }

    fn get_object_class(&self, object: Ref) -> Ref {
        to_ref(unsafe { jni_call!(self.env(), GetObjectClass, to_object(object)) })
    }

    fn is_assignable_from(&self, class: Ref, target: Ref) -> bool {
        let class = JClass::from(to_object(class));
        let target = JClass::from(to_object(target));
        wrapped("IsAssignableFrom", self.wrapper().is_assignable_from(class, target))
    }

    fn get_method_id(&self, class: Ref, name: &str, signature: &str, is_static: bool) -> MethodId {
        let (name, signature) = (c_string(name), c_string(signature));
        let env = self.env();
        let class = to_object(class);
        let method = unsafe {
            if is_static {
                jni_call!(env, GetStaticMethodID, class, name.as_ptr(), signature.as_ptr())
            } else {
                jni_call!(env, GetMethodID, class, name.as_ptr(), signature.as_ptr())
            }
        };
        MethodId::from_raw(method as *mut c_void)
    }

    fn get_field_id(&self, class: Ref, name: &str, signature: &str, is_static: bool) -> FieldId {
        let (name, signature) = (c_string(name), c_string(signature));
        let env = self.env();
        let class = to_object(class);
        let field = unsafe {
            if is_static {
                jni_call!(env, GetStaticFieldID, class, name.as_ptr(), signature.as_ptr())
            } else {
                jni_call!(env, GetFieldID, class, name.as_ptr(), signature.as_ptr())
            }
        };
        FieldId::from_raw(field as *mut c_void)
    }

    fn register_natives(&self, class: Ref, natives: &[Native]) -> i32 {
        // The strings must outlive the call.
        let names = natives
            .iter()
            .map(|native| (c_string(&native.name), c_string(&native.signature)))
            .collect::<Vec<_>>();
        let methods = natives
            .iter()
            .zip(&names)
            .map(|(native, (name, signature))| sys::JNINativeMethod {
                name: name.as_ptr() as *mut _,
                signature: signature.as_ptr() as *mut _,
                fnPtr: native.function,
            })
            .collect::<Vec<_>>();
        unsafe {
            jni_call!(
                self.env(),
                RegisterNatives,
                to_object(class),
                methods.as_ptr(),
                methods.len() as sys::jint
            )
        }
    }

    fn new_object(&self, class: Ref, constructor: MethodId, args: &[Value]) -> Ref {
        let args = arguments(args);
        to_ref(unsafe {
            jni_call!(
                self.env(),
                NewObjectA,
                to_object(class),
                to_method(constructor),
                args.as_ptr()
            )
        })
    }

    fn call_method(&self, target: Ref, method: MethodId, ret: Type, args: &[Value]) -> Value {
        let args = arguments(args);
        unsafe {
            call_typed!(
                self.env(),
                ret,
                (to_object(target), to_method(method)),
                args.as_ptr(),
                [
                    CallVoidMethodA,
                    CallBooleanMethodA,
                    CallByteMethodA,
                    CallCharMethodA,
                    CallShortMethodA,
                    CallIntMethodA,
                    CallLongMethodA,
                    CallFloatMethodA,
                    CallDoubleMethodA,
                    CallObjectMethodA,
                ]
            )
        }
    }

    fn call_static_method(&self, class: Ref, method: MethodId, ret: Type, args: &[Value]) -> Value {
        let args = arguments(args);
        unsafe {
            call_typed!(
                self.env(),
                ret,
                (to_object(class), to_method(method)),
                args.as_ptr(),
                [
                    CallStaticVoidMethodA,
                    CallStaticBooleanMethodA,
                    CallStaticByteMethodA,
                    CallStaticCharMethodA,
                    CallStaticShortMethodA,
                    CallStaticIntMethodA,
                    CallStaticLongMethodA,
                    CallStaticFloatMethodA,
                    CallStaticDoubleMethodA,
                    CallStaticObjectMethodA,
                ]
            )
        }
    }

    fn call_nonvirtual_method(
        &self,
        target: Ref,
        class: Ref,
        method: MethodId,
        ret: Type,
        args: &[Value],
    ) -> Value {
        let args = arguments(args);
        unsafe {
            call_typed!(
                self.env(),
                ret,
                (to_object(target), to_object(class), to_method(method)),
                args.as_ptr(),
                [
                    CallNonvirtualVoidMethodA,
                    CallNonvirtualBooleanMethodA,
                    CallNonvirtualByteMethodA,
                    CallNonvirtualCharMethodA,
                    CallNonvirtualShortMethodA,
                    CallNonvirtualIntMethodA,
                    CallNonvirtualLongMethodA,
                    CallNonvirtualFloatMethodA,
                    CallNonvirtualDoubleMethodA,
                    CallNonvirtualObjectMethodA,
                ]
            )
        }
    }

    fn get_field(&self, object: Ref, field: FieldId, ty: Type) -> Value {
        unsafe {
            get_typed!(
                self.env(),
                ty,
                (to_object(object), to_field(field)),
                [
                    GetBooleanField,
                    GetByteField,
                    GetCharField,
                    GetShortField,
                    GetIntField,
                    GetLongField,
                    GetFloatField,
                    GetDoubleField,
                    GetObjectField,
                ]
            )
        }
    }

    fn set_field(&self, object: Ref, field: FieldId, value: Value) {
        unsafe {
            set_typed!(
                self.env(),
                value,
                (to_object(object), to_field(field)),
                [
                    SetBooleanField,
                    SetByteField,
                    SetCharField,
                    SetShortField,
                    SetIntField,
                    SetLongField,
                    SetFloatField,
                    SetDoubleField,
                    SetObjectField,
                ]
            )
        }
    }

    fn get_static_field(&self, class: Ref, field: FieldId, ty: Type) -> Value {
        unsafe {
            get_typed!(
                self.env(),
                ty,
                (to_object(class), to_field(field)),
                [
                    GetStaticBooleanField,
                    GetStaticByteField,
                    GetStaticCharField,
                    GetStaticShortField,
                    GetStaticIntField,
                    GetStaticLongField,
                    GetStaticFloatField,
                    GetStaticDoubleField,
                    GetStaticObjectField,
                ]
            )
        }
    }

    fn set_static_field(&self, class: Ref, field: FieldId, value: Value) {
        unsafe {
            set_typed!(
                self.env(),
                value,
                (to_object(class), to_field(field)),
                [
                    SetStaticBooleanField,
                    SetStaticByteField,
                    SetStaticCharField,
                    SetStaticShortField,
                    SetStaticIntField,
                    SetStaticLongField,
                    SetStaticFloatField,
                    SetStaticDoubleField,
                    SetStaticObjectField,
                ]
            )
        }
    }

    fn new_string(&self, text: &str) -> Ref {
        let units = text.encode_utf16().collect::<Vec<u16>>();
        to_ref(unsafe {
            jni_call!(
                self.env(),
                NewString,
                units.as_ptr(),
                units.len() as sys::jsize
            )
        })
    }

    fn get_string(&self, string: Ref) -> String {
        let env = self.env();
        let string = to_object(string);
        unsafe {
            let length = jni_call!(env, GetStringLength, string);
            let mut units = vec![0u16; length.max(0) as usize];
            jni_call!(env, GetStringRegion, string, 0, length, units.as_mut_ptr());
            String::from_utf16_lossy(&units)
        }
    }

    fn get_array_length(&self, array: Ref) -> i32 {
        wrapped("GetArrayLength", self.wrapper().get_array_length(to_object(array)))
    }

    fn new_primitive_array(&self, element: Type, length: i32) -> Ref {
        let env = self.env();
        let array = unsafe {
            match element {
                Type::Boolean => jni_call!(env, NewBooleanArray, length),
                Type::Byte => jni_call!(env, NewByteArray, length),
                Type::Char => jni_call!(env, NewCharArray, length),
                Type::Short => jni_call!(env, NewShortArray, length),
                Type::Int => jni_call!(env, NewIntArray, length),
                Type::Long => jni_call!(env, NewLongArray, length),
                Type::Float => jni_call!(env, NewFloatArray, length),
                Type::Double => jni_call!(env, NewDoubleArray, length),
                Type::Void | Type::Object => {
                    env::fatal(&format!("No primitive arrays of {:?}.", element))
                }
            }
        };
        to_ref(array)
    }

    fn get_array_region(&self, array: Ref, element: Type, start: i32, length: i32) -> Vec<Value> {
        let env = self.env();
        let array = to_object(array);
        unsafe {
            match element {
                Type::Boolean => get_region!(
                    env,
                    array,
                    start,
                    length,
                    GetBooleanArrayRegion,
                    0u8,
                    |z| Value::Boolean(is_true(z))
                ),
                Type::Byte => {
                    get_region!(env, array, start, length, GetByteArrayRegion, 0i8, Value::Byte)
                }
                Type::Char => {
                    get_region!(env, array, start, length, GetCharArrayRegion, 0u16, Value::Char)
                }
                Type::Short => {
                    get_region!(env, array, start, length, GetShortArrayRegion, 0i16, Value::Short)
                }
                Type::Int => {
                    get_region!(env, array, start, length, GetIntArrayRegion, 0i32, Value::Int)
                }
                Type::Long => {
                    get_region!(env, array, start, length, GetLongArrayRegion, 0i64, Value::Long)
                }
                Type::Float => {
                    get_region!(env, array, start, length, GetFloatArrayRegion, 0f32, Value::Float)
                }
                Type::Double => {
                    let wrap = Value::Double;
                    get_region!(env, array, start, length, GetDoubleArrayRegion, 0f64, wrap)
                }
                Type::Void | Type::Object => {
                    env::fatal(&format!("No primitive arrays of {:?}.", element))
                }
            }
        }
    }

    fn set_array_region(&self, array: Ref, start: i32, values: &[Value]) {
        let ty = match values.first() {
            Some(value) => value.ty(),
            None => return,
        };
        let env = self.env();
        let array = to_object(array);
        unsafe {
            match ty {
                Type::Boolean => {
                    set_region!(env, array, start, values, SetBooleanArrayRegion, Boolean, u8)
                }
                Type::Byte => set_region!(env, array, start, values, SetByteArrayRegion, Byte, i8),
                Type::Char => set_region!(env, array, start, values, SetCharArrayRegion, Char, u16),
                Type::Short => {
                    set_region!(env, array, start, values, SetShortArrayRegion, Short, i16)
                }
                Type::Int => set_region!(env, array, start, values, SetIntArrayRegion, Int, i32),
                Type::Long => set_region!(env, array, start, values, SetLongArrayRegion, Long, i64),
                Type::Float => {
                    set_region!(env, array, start, values, SetFloatArrayRegion, Float, f32)
                }
                Type::Double => {
                    set_region!(env, array, start, values, SetDoubleArrayRegion, Double, f64)
                }
                Type::Void | Type::Object => {
                    env::fatal(&format!("No primitive arrays of {:?}.", ty))
                }
            }
        }
    }

    fn new_object_array(&self, length: i32, element_class: Ref, initial: Ref) -> Ref {
        to_ref(unsafe {
            jni_call!(
                self.env(),
                NewObjectArray,
                length,
                to_object(element_class),
                to_object(initial)
            )
        })
    }

    fn get_object_array_element(&self, array: Ref, index: i32) -> Ref {
        to_ref(unsafe {
            jni_call!(
                self.env(),
                GetObjectArrayElement,
                to_object(array),
                index
            )
        })
    }

    fn set_object_array_element(&self, array: Ref, index: i32, value: Ref) {
        unsafe {
            jni_call!(
                self.env(),
                SetObjectArrayElement,
                to_object(array),
                index,
                to_object(value)
            )
        }
    }
}

static INTERFACE: OnceCell<JniInterface> = OnceCell::new();

/// Installs the bridge on `vm`, configured by the file named in
/// [CONFIG_VARIABLE](javelin_runtime::config::CONFIG_VARIABLE).
///
/// Only the first call has any effect.
pub fn initialize(vm: JavaVM) -> Result<(), ConfigError> {
    let config = Config::load()?;
    let interface = INTERFACE.get_or_init(|| JniInterface::new(vm));
    env::initialize_with(interface, config);
    Ok(())
}

/// Body of `JNI_OnLoad`: installs the bridge and returns the required JNI version.
pub fn on_load(vm: *mut sys::JavaVM) -> sys::jint {
    let vm = match unsafe { JavaVM::from_raw(vm) } {
        Ok(vm) => vm,
        Err(err) => {
            log::error!("Invalid virtual machine: {}", err);
            return sys::JNI_ERR;
        }
    };
    match initialize(vm) {
        Ok(()) => sys::JNI_VERSION_1_6,
        Err(err) => {
            log::error!("Failed to initialize: {}", err);
            sys::JNI_ERR
        }
    }
}
