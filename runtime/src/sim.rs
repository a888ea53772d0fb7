//! Simulated virtual machine running the tests.
//!
//! Objects live on a heap guarded by a single lock. Method bodies are either closures or native
//! functions registered through [Interface::register_natives]. Unreachable objects are reclaimed by
//! [Sim::collect], running their finalizers first if they override `Object.finalize()`.

use crate::env;
use crate::interface::AttachError;
use crate::interface::FieldId;
use crate::interface::Interface;
use crate::interface::MethodId;
use crate::interface::Native;
use crate::interface::Ref;
use crate::interface::Type;
use crate::interface::Value;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::collections::HashSet;
use std::ffi::c_void;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::thread::ThreadId;

type ObjId = usize;
type Body = Arc<dyn Fn(&Sim, Ref, &[Value]) -> Value + Send + Sync>;

const OBJECT: &str = "java/lang/Object";
const CLASS: &str = "java/lang/Class";
const STRING: &str = "java/lang/String";
const THROWABLE: &str = "java/lang/Throwable";

const EXCEPTIONS: &[(&str, &str)] = &[
    ("java/lang/Exception", THROWABLE),
    ("java/lang/Error", THROWABLE),
    ("java/lang/RuntimeException", "java/lang/Exception"),
    ("java/lang/ClassNotFoundException", "java/lang/Exception"),
    ("java/lang/ClassCastException", "java/lang/RuntimeException"),
    ("java/lang/IllegalStateException", "java/lang/RuntimeException"),
    ("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
    ("java/lang/IllegalMonitorStateException", "java/lang/RuntimeException"),
    ("java/lang/ArrayIndexOutOfBoundsException", "java/lang/RuntimeException"),
    ("java/lang/NegativeArraySizeException", "java/lang/RuntimeException"),
    ("java/lang/LinkageError", "java/lang/Error"),
    ("java/lang/NoClassDefFoundError", "java/lang/LinkageError"),
    ("java/lang/NoSuchMethodError", "java/lang/LinkageError"),
    ("java/lang/NoSuchFieldError", "java/lang/LinkageError"),
    ("java/lang/UnsatisfiedLinkError", "java/lang/LinkageError"),
];

const PRIMITIVE_ARRAYS: &[(&str, Type)] = &[
    ("[Z", Type::Boolean),
    ("[B", Type::Byte),
    ("[C", Type::Char),
    ("[S", Type::Short),
    ("[I", Type::Int),
    ("[J", Type::Long),
    ("[F", Type::Float),
    ("[D", Type::Double),
];

#[derive(Clone, Copy, Debug)]
enum Stored {
    Prim(Value),
    Obj(Option<ObjId>),
}

enum Payload {
    Plain,
    Str(Vec<u16>),
    Array(Vec<Stored>),
    Class(ClassInfo),
    WeakReference(Option<ObjId>),
}

struct Obj {
    class: ObjId,
    fields: HashMap<usize, Stored>,
    payload: Payload,
}

struct ClassInfo {
    name: String,
    superclass: Option<ObjId>,
    statics: HashMap<usize, Stored>,
}

#[derive(Clone)]
enum Implementation {
    Managed(Body),
    Native(Option<usize>),
}

struct MethodInfo {
    class: ObjId,
    name: String,
    signature: String,
    is_static: bool,
    implementation: Implementation,
}

struct FieldInfo {
    class: ObjId,
    name: String,
    ty: Type,
    is_static: bool,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum RefKind {
    Local(ThreadId),
    Global,
    Weak,
}

struct RefEntry {
    target: Option<ObjId>,
    kind: RefKind,
}

#[derive(Default)]
struct Heap {
    classes: HashMap<String, ObjId>,
    objects: HashMap<ObjId, Obj>,
    next_object: ObjId,
    refs: HashMap<usize, RefEntry>,
    next_ref: usize,
    methods: Vec<MethodInfo>,
    fields: Vec<FieldInfo>,
    pending: HashMap<ThreadId, ObjId>,
    frames: HashMap<ThreadId, Vec<Vec<usize>>>,
    finalized: HashSet<ObjId>,
}

fn thread() -> ThreadId {
    std::thread::current().id()
}

fn object_arg(value: &Value) -> Ref {
    match value {
        Value::Object(object) => *object,
        other => panic!("Expected an object argument, got {:?}", other),
    }
}

impl Heap {
    fn alloc(&mut self, class: ObjId, payload: Payload) -> ObjId {
        self.next_object += 1;
        let id = self.next_object;
        self.objects.insert(
            id,
            Obj {
                class,
                fields: Default::default(),
                payload,
            },
        );
        id
    }

    fn new_ref(&mut self, target: Option<ObjId>, kind: RefKind) -> Ref {
        let target = match target {
            Some(target) => target,
            None => return Ref::NULL,
        };
        self.next_ref += 1;
        let id = self.next_ref;
        self.refs.insert(
            id,
            RefEntry {
                target: Some(target),
                kind,
            },
        );
        if let RefKind::Local(thread) = kind {
            if let Some(frame) = self.frames.get_mut(&thread).and_then(|f| f.last_mut()) {
                frame.push(id);
            }
        }
        Ref::from_raw((id << 4) as *mut c_void)
    }

    fn new_local(&mut self, target: Option<ObjId>) -> Ref {
        self.new_ref(target, RefKind::Local(thread()))
    }

    fn entry(&self, handle: Ref) -> &RefEntry {
        let id = handle.as_raw() as usize >> 4;
        match self.refs.get(&id) {
            Some(entry) => entry,
            None => panic!("Invalid reference {:?}", handle),
        }
    }

    fn delete_ref(&mut self, handle: Ref, kind: RefKind) {
        if handle.is_null() {
            return;
        }
        let actual = self.entry(handle).kind;
        let matches = match (actual, kind) {
            (RefKind::Local(_), RefKind::Local(_)) => true,
            (actual, kind) => actual == kind,
        };
        assert!(matches, "Deleted a {:?} reference as {:?}", actual, kind);
        self.refs.remove(&(handle.as_raw() as usize >> 4));
    }

    fn deref(&self, handle: Ref) -> Option<ObjId> {
        if handle.is_null() {
            None
        } else {
            self.entry(handle).target
        }
    }

    fn target(&self, handle: Ref) -> ObjId {
        match self.deref(handle) {
            Some(target) => target,
            None => panic!("Dereferenced a null reference"),
        }
    }

    fn object(&self, id: ObjId) -> &Obj {
        &self.objects[&id]
    }

    fn object_mut(&mut self, id: ObjId) -> &mut Obj {
        self.objects.get_mut(&id).expect("Object freed")
    }

    fn class_info(&self, class: ObjId) -> &ClassInfo {
        match &self.object(class).payload {
            Payload::Class(info) => info,
            _ => panic!("Not a class"),
        }
    }

    fn class_info_mut(&mut self, class: ObjId) -> &mut ClassInfo {
        match &mut self.object_mut(class).payload {
            Payload::Class(info) => info,
            _ => panic!("Not a class"),
        }
    }

    fn class_named(&self, name: &str) -> ObjId {
        self.classes[name]
    }

    fn is_subclass(&self, class: ObjId, target: ObjId) -> bool {
        let mut current = Some(class);
        while let Some(class) = current {
            if class == target {
                return true;
            }
            current = self.class_info(class).superclass;
        }
        false
    }

    fn find_method(
        &self,
        class: ObjId,
        name: &str,
        signature: &str,
        is_static: bool,
    ) -> Option<usize> {
        let mut current = Some(class);
        while let Some(class) = current {
            let found = self.methods.iter().position(|m| {
                m.class == class
                    && m.name == name
                    && m.signature == signature
                    && m.is_static == is_static
            });
            if found.is_some() {
                return found;
            }
            if name == "<init>" {
                return None;
            }
            current = self.class_info(class).superclass;
        }
        None
    }

    fn find_field(&self, class: ObjId, name: &str, ty: Type, is_static: bool) -> Option<usize> {
        let mut current = Some(class);
        while let Some(class) = current {
            let found = self.fields.iter().position(|f| {
                f.class == class && f.name == name && f.ty == ty && f.is_static == is_static
            });
            if found.is_some() {
                return found;
            }
            current = self.class_info(class).superclass;
        }
        None
    }

    fn define(&mut self, name: &str, superclass: Option<ObjId>) -> ObjId {
        let meta = self.classes.get(CLASS).copied().unwrap_or_default();
        let id = self.alloc(
            meta,
            Payload::Class(ClassInfo {
                name: name.into(),
                superclass,
                statics: Default::default(),
            }),
        );
        self.classes.insert(name.into(), id);
        id
    }

    fn add_method(
        &mut self,
        class: ObjId,
        name: &str,
        signature: &str,
        is_static: bool,
        implementation: Implementation,
    ) {
        self.methods.push(MethodInfo {
            class,
            name: name.into(),
            signature: signature.into(),
            is_static,
            implementation,
        });
    }

    fn add_field(&mut self, class: ObjId, name: &str, signature: &str, is_static: bool) {
        let ty = Type::parse_field(signature).expect("Invalid field signature");
        self.fields.push(FieldInfo {
            class,
            name: name.into(),
            ty,
            is_static,
        });
    }

    fn array_class(&mut self, name: &str) -> ObjId {
        match self.classes.get(name) {
            Some(class) => *class,
            None => {
                let object = self.class_named(OBJECT);
                self.define(name, Some(object))
            }
        }
    }

    fn string(&mut self, text: &str) -> ObjId {
        let class = self.class_named(STRING);
        self.alloc(class, Payload::Str(text.encode_utf16().collect()))
    }

    fn string_value(&self, id: ObjId) -> String {
        match &self.object(id).payload {
            Payload::Str(units) => String::from_utf16_lossy(units),
            _ => panic!("Not a string"),
        }
    }

    fn field_by_name(&self, object: ObjId, name: &str) -> usize {
        let mut current = Some(self.object(object).class);
        while let Some(class) = current {
            let found = self
                .fields
                .iter()
                .position(|f| f.class == class && f.name == name && !f.is_static);
            if let Some(found) = found {
                return found;
            }
            current = self.class_info(class).superclass;
        }
        panic!("No field `{}`", name)
    }

    fn throw_new(&mut self, class: &str, message: &str) {
        let message = self.string(message);
        let class = self.class_named(class);
        let exception = self.alloc(class, Payload::Plain);
        let field = self.field_by_name(exception, "message");
        self.object_mut(exception)
            .fields
            .insert(field, Stored::Obj(Some(message)));
        self.pending.insert(thread(), exception);
    }

    fn assert_no_pending(&self) {
        assert!(
            !self.pending.contains_key(&thread()),
            "Called into the runtime with a pending exception"
        );
    }

    fn is_pending(&self) -> bool {
        self.pending.contains_key(&thread())
    }

    fn store(&self, value: Value) -> Stored {
        match value {
            Value::Object(object) => Stored::Obj(self.deref(object)),
            value => Stored::Prim(value),
        }
    }

    fn load(&mut self, stored: Stored) -> Value {
        match stored {
            Stored::Prim(value) => value,
            Stored::Obj(target) => Value::Object(self.new_local(target)),
        }
    }

    fn push_frame(&mut self) {
        self.frames.entry(thread()).or_default().push(Vec::new());
    }

    fn pop_frame(&mut self) {
        let frame = self
            .frames
            .get_mut(&thread())
            .and_then(|frames| frames.pop())
            .unwrap_or_default();
        for id in frame {
            self.refs.remove(&id);
        }
    }

    fn array(&self, array: Ref) -> &Vec<Stored> {
        match &self.object(self.target(array)).payload {
            Payload::Array(items) => items,
            _ => panic!("Not an array"),
        }
    }

    fn array_mut(&mut self, array: Ref) -> &mut Vec<Stored> {
        let id = self.target(array);
        match &mut self.object_mut(id).payload {
            Payload::Array(items) => items,
            _ => panic!("Not an array"),
        }
    }

    /// Checks `start..start + length` against the bounds of `array`, throwing if out of range.
    fn check_bounds(&mut self, array: Ref, start: i32, length: i32) -> bool {
        let size = self.array(array).len() as i64;
        let (start, length) = (start as i64, length as i64);
        if start < 0 || length < 0 || start + length > size {
            let message = format!(
                "Range [{}, {}) out of bounds for length {}",
                start,
                start + length,
                size
            );
            self.throw_new("java/lang/ArrayIndexOutOfBoundsException", &message);
            false
        } else {
            true
        }
    }

    fn has_finalizer(&self, class: ObjId) -> bool {
        let object = self.class_named(OBJECT);
        match self.find_method(class, "finalize", "()V", false) {
            Some(method) => self.methods[method].class != object,
            None => false,
        }
    }

    fn mark(&self, mut stack: Vec<ObjId>, marked: &mut HashSet<ObjId>) {
        while let Some(id) = stack.pop() {
            if !marked.insert(id) {
                continue;
            }
            let object = match self.objects.get(&id) {
                Some(object) => object,
                None => continue,
            };
            stack.push(object.class);
            let stored = object.fields.values();
            match &object.payload {
                Payload::Array(items) => stack.extend(items.iter().chain(stored).filter_map(obj)),
                Payload::Class(info) => {
                    stack.extend(info.superclass);
                    stack.extend(info.statics.values().chain(stored).filter_map(obj));
                }
                _ => stack.extend(stored.filter_map(obj)),
            }
        }
    }

    /// Frees unreachable objects and returns those to finalize.
    fn collect(&mut self) -> Vec<ObjId> {
        let mut roots = self
            .refs
            .values()
            .filter(|entry| entry.kind != RefKind::Weak)
            .filter_map(|entry| entry.target)
            .collect::<Vec<_>>();
        roots.extend(self.pending.values());
        roots.extend(self.classes.values());

        let mut marked = HashSet::new();
        self.mark(roots, &mut marked);
        let unreachable = self
            .objects
            .keys()
            .copied()
            .filter(|id| !marked.contains(id))
            .collect::<Vec<_>>();

        for object in self.objects.values_mut() {
            if let Payload::WeakReference(Some(referent)) = object.payload {
                if !marked.contains(&referent) {
                    object.payload = Payload::WeakReference(None);
                }
            }
        }

        let finalizable = unreachable
            .iter()
            .copied()
            .filter(|id| !self.finalized.contains(id) && self.has_finalizer(self.object(*id).class))
            .collect::<Vec<_>>();
        let mut kept = marked;
        self.mark(finalizable.clone(), &mut kept);

        for id in unreachable {
            if !kept.contains(&id) {
                self.objects.remove(&id);
                self.finalized.remove(&id);
            }
        }
        for entry in self.refs.values_mut() {
            if let Some(target) = entry.target {
                if !self.objects.contains_key(&target) {
                    entry.target = None;
                }
            }
        }
        self.finalized.extend(finalizable.iter().copied());
        finalizable
    }
}

fn obj(stored: &Stored) -> Option<ObjId> {
    match stored {
        Stored::Obj(target) => *target,
        Stored::Prim(_) => None,
    }
}

fn method_id(index: usize) -> MethodId {
    MethodId::from_raw((index + 1) as *mut c_void)
}

fn method_index(id: MethodId) -> usize {
    id.as_raw() as usize - 1
}

fn field_id(index: usize) -> FieldId {
    FieldId::from_raw((index + 1) as *mut c_void)
}

fn field_index(id: FieldId) -> usize {
    id.as_raw() as usize - 1
}

pub struct Sim {
    heap: Mutex<Heap>,
}

impl Sim {
    pub fn new() -> Self {
        let sim = Self {
            heap: Mutex::new(Default::default()),
        };
        sim.bootstrap();
        sim
    }

    /// Returns the runtime shared by all tests, installing it if needed.
    pub fn get() -> &'static Sim {
        static SIM: OnceCell<Sim> = OnceCell::new();
        let _ = env_logger::builder().is_test(true).try_init();
        let sim = SIM.get_or_init(Sim::new);
        env::initialize(sim);
        sim
    }

    fn heap(&self) -> MutexGuard<Heap> {
        self.heap.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn define(&self, name: &str) -> ClassBuilder {
        ClassBuilder {
            sim: self,
            name: name.into(),
            superclass: OBJECT.into(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Allocates an object without running any constructor and returns a local reference.
    pub fn new_plain(&self, class: &str) -> Ref {
        let mut heap = self.heap();
        let class = heap.class_named(class);
        let id = heap.alloc(class, Payload::Plain);
        heap.new_local(Some(id))
    }

    pub fn construct(&self, class: &str, signature: &str, args: &[Value]) -> Ref {
        let class = self.find_class(class);
        let constructor = self.get_method_id(class, "<init>", signature, false);
        let object = self.new_object(class, constructor, args);
        self.delete_local_ref(class);
        object
    }

    pub fn throw_new(&self, class: &str, message: &str) {
        self.heap().throw_new(class, message)
    }

    pub fn get_by_name(&self, object: Ref, name: &str) -> Value {
        let mut heap = self.heap();
        let id = heap.target(object);
        let field = heap.field_by_name(id, name);
        let stored = heap.object(id).fields.get(&field).copied();
        let stored = stored.unwrap_or_else(|| Stored::Prim(Value::zero(heap.fields[field].ty)));
        match stored {
            Stored::Prim(Value::Object(_)) => Value::Object(Ref::NULL),
            stored => heap.load(stored),
        }
    }

    pub fn set_by_name(&self, object: Ref, name: &str, value: Value) {
        let mut heap = self.heap();
        let id = heap.target(object);
        let field = heap.field_by_name(id, name);
        let stored = heap.store(value);
        heap.object_mut(id).fields.insert(field, stored);
    }

    /// Number of local references held by the calling thread.
    pub fn local_refs(&self) -> usize {
        let thread = thread();
        self.heap()
            .refs
            .values()
            .filter(|entry| entry.kind == RefKind::Local(thread))
            .count()
    }

    pub fn global_refs_to(&self, object: Ref) -> usize {
        self.refs_to(object, RefKind::Global)
    }

    pub fn weak_refs_to(&self, object: Ref) -> usize {
        self.refs_to(object, RefKind::Weak)
    }

    fn refs_to(&self, object: Ref, kind: RefKind) -> usize {
        let heap = self.heap();
        let target = heap.deref(object);
        heap.refs
            .values()
            .filter(|entry| entry.kind == kind && entry.target.is_some() && entry.target == target)
            .count()
    }

    /// Number of live objects of a class, subclasses excluded.
    pub fn instances(&self, class: &str) -> usize {
        let heap = self.heap();
        let class = heap.class_named(class);
        heap.objects.values().filter(|o| o.class == class).count()
    }

    /// Runs a garbage collection and the finalizers of the objects it found unreachable.
    pub fn collect(&self) {
        let finalizable = self.heap().collect();
        for object in finalizable {
            let (this, method) = {
                let mut heap = self.heap();
                heap.push_frame();
                let class = heap.object(object).class;
                let method = heap.find_method(class, "finalize", "()V", false);
                (heap.new_local(Some(object)), method)
            };
            if let Some(method) = method {
                self.invoke(method, this, &[], Type::Void);
            }
            let mut heap = self.heap();
            heap.pending.remove(&thread());
            heap.pop_frame();
        }
    }

    fn invoke(&self, method: usize, this: Ref, args: &[Value], ret: Type) -> Value {
        let (implementation, name, signature) = {
            let heap = self.heap();
            let info = &heap.methods[method];
            (
                info.implementation.clone(),
                info.name.clone(),
                info.signature.clone(),
            )
        };
        let value = match implementation {
            Implementation::Managed(body) => body(self, this, args),
            Implementation::Native(None) => {
                self.throw_new("java/lang/UnsatisfiedLinkError", &name);
                Value::zero(ret)
            }
            Implementation::Native(Some(function)) => {
                self.heap().push_frame();
                let value = unsafe { call_native(function, &signature, this, args) };
                let mut heap = self.heap();
                let returned = match value {
                    Value::Object(object) => Some(heap.deref(object)),
                    _ => None,
                };
                heap.pop_frame();
                match returned {
                    Some(target) => Value::Object(heap.new_local(target)),
                    None => value,
                }
            }
        };
        if self.heap().is_pending() {
            Value::zero(ret)
        } else {
            value
        }
    }

    fn bootstrap(&self) {
        let mut heap = self.heap();
        let object = heap.define(OBJECT, None);
        let class = heap.define(CLASS, Some(object));
        heap.object_mut(object).class = class;
        heap.object_mut(class).class = class;
        heap.define(STRING, Some(object));
        let throwable = heap.define(THROWABLE, Some(object));
        for (name, superclass) in EXCEPTIONS {
            let superclass = heap.class_named(superclass);
            heap.define(name, Some(superclass));
        }
        let weak_reference = heap.define("java/lang/ref/WeakReference", Some(object));
        for (name, _) in PRIMITIVE_ARRAYS {
            heap.define(name, Some(object));
        }
        heap.define("[Ljava/lang/Object;", Some(object));
        drop(heap);

        self.bootstrap_object(object);
        self.bootstrap_class();
        self.bootstrap_string();
        self.bootstrap_throwable(throwable);
        self.bootstrap_weak_reference(weak_reference);
    }

    fn managed(
        &self,
        class: ObjId,
        name: &str,
        signature: &str,
        is_static: bool,
        body: impl Fn(&Sim, Ref, &[Value]) -> Value + Send + Sync + 'static,
    ) {
        let implementation = Implementation::Managed(Arc::new(body));
        self.heap()
            .add_method(class, name, signature, is_static, implementation);
    }

    fn bootstrap_object(&self, object: ObjId) {
        self.managed(object, "<init>", "()V", false, |_, _, _| Value::Void);
        self.managed(object, "equals", "(Ljava/lang/Object;)Z", false, |sim, this, args| {
            Value::Boolean(sim.is_same_object(this, object_arg(&args[0])))
        });
        self.managed(object, "getClass", "()Ljava/lang/Class;", false, |sim, this, _| {
            Value::Object(sim.get_object_class(this))
        });
        self.managed(object, "hashCode", "()I", false, |sim, this, _| {
            Value::Int(sim.heap().target(this) as i32)
        });
        self.managed(object, "toString", "()Ljava/lang/String;", false, |sim, this, _| {
            let text = {
                let heap = sim.heap();
                let id = heap.target(this);
                let class = heap.class_info(heap.object(id).class);
                format!("{}@{:x}", class.name.replace('/', "."), id)
            };
            Value::Object(sim.new_string(&text))
        });
        for (name, signature) in &[
            ("notify", "()V"),
            ("notifyAll", "()V"),
            ("wait", "()V"),
            ("wait", "(J)V"),
            ("wait", "(JI)V"),
        ] {
            self.managed(object, name, signature, false, |sim, _, _| {
                sim.throw_new(
                    "java/lang/IllegalMonitorStateException",
                    "current thread is not owner",
                );
                Value::Void
            });
        }
        self.managed(object, "finalize", "()V", false, |_, _, _| Value::Void);
    }

    fn bootstrap_class(&self) {
        let class = self.heap().class_named(CLASS);
        self.managed(class, "getName", "()Ljava/lang/String;", false, |sim, this, _| {
            let name = {
                let heap = sim.heap();
                heap.class_info(heap.target(this)).name.replace('/', ".")
            };
            Value::Object(sim.new_string(&name))
        });
        self.managed(
            class,
            "forName",
            "(Ljava/lang/String;)Ljava/lang/Class;",
            true,
            |sim, _, args| {
                let name = sim.get_string(object_arg(&args[0]));
                let mut heap = sim.heap();
                let class = heap.classes.get(&name.replace('.', "/")).copied();
                match class {
                    Some(class) => Value::Object(heap.new_local(Some(class))),
                    None => {
                        heap.throw_new("java/lang/ClassNotFoundException", &name);
                        Value::Object(Ref::NULL)
                    }
                }
            },
        );
    }

    fn bootstrap_string(&self) {
        let string = self.heap().class_named(STRING);
        self.managed(string, "length", "()I", false, |sim, this, _| {
            let heap = sim.heap();
            let length = match &heap.object(heap.target(this)).payload {
                Payload::Str(units) => units.len() as i32,
                _ => 0,
            };
            Value::Int(length)
        });
    }

    fn bootstrap_throwable(&self, throwable: ObjId) {
        {
            let mut heap = self.heap();
            heap.add_field(throwable, "message", "Ljava/lang/String;", false);
            heap.add_field(throwable, "cause", "Ljava/lang/Throwable;", false);
        }
        let mut classes = vec![THROWABLE];
        classes.extend(EXCEPTIONS.iter().map(|(name, _)| *name));
        for name in classes {
            let class = self.heap().class_named(name);
            self.managed(class, "<init>", "()V", false, |_, _, _| Value::Void);
            self.managed(class, "<init>", "(Ljava/lang/String;)V", false, |sim, this, args| {
                sim.set_by_name(this, "message", args[0]);
                Value::Void
            });
            self.managed(
                class,
                "<init>",
                "(Ljava/lang/String;Ljava/lang/Throwable;)V",
                false,
                |sim, this, args| {
                    sim.set_by_name(this, "message", args[0]);
                    sim.set_by_name(this, "cause", args[1]);
                    Value::Void
                },
            );
        }
        self.managed(throwable, "getMessage", "()Ljava/lang/String;", false, |sim, this, _| {
            sim.get_by_name(this, "message")
        });
        self.managed(throwable, "getCause", "()Ljava/lang/Throwable;", false, |sim, this, _| {
            sim.get_by_name(this, "cause")
        });
        self.managed(throwable, "printStackTrace", "()V", false, |sim, this, _| {
            let heap = sim.heap();
            eprintln!("{}", describe(&heap, heap.target(this)));
            Value::Void
        });
    }

    fn bootstrap_weak_reference(&self, weak_reference: ObjId) {
        self.managed(
            weak_reference,
            "<init>",
            "(Ljava/lang/Object;)V",
            false,
            |sim, this, args| {
                let mut heap = sim.heap();
                let referent = heap.deref(object_arg(&args[0]));
                let id = heap.target(this);
                heap.object_mut(id).payload = Payload::WeakReference(referent);
                Value::Void
            },
        );
        self.managed(
            weak_reference,
            "get",
            "()Ljava/lang/Object;",
            false,
            |sim, this, _| {
                let mut heap = sim.heap();
                let id = heap.target(this);
                let referent = match heap.object(id).payload {
                    Payload::WeakReference(referent) => referent,
                    _ => None,
                };
                Value::Object(heap.new_local(referent))
            },
        );
    }
}

fn describe(heap: &Heap, exception: ObjId) -> String {
    let class = heap.class_info(heap.object(exception).class).name.replace('/', ".");
    let field = heap.field_by_name(exception, "message");
    match heap.object(exception).fields.get(&field) {
        Some(Stored::Obj(Some(message))) => format!("{}: {}", class, heap.string_value(*message)),
        _ => class,
    }
}

unsafe fn call_native(function: usize, signature: &str, this: Ref, args: &[Value]) -> Value {
    let env = std::ptr::null_mut::<c_void>();
    let arguments = Type::parse_arguments(signature).expect("Invalid signature");
    let ret = Type::parse_return(signature).expect("Invalid signature");
    match (arguments.as_slice(), ret) {
        ([], Type::Void) => {
            let f: extern "system" fn(*mut c_void, Ref) = std::mem::transmute(function);
            f(env, this);
            Value::Void
        }
        ([], Type::Boolean) => {
            let f: extern "system" fn(*mut c_void, Ref) -> bool = std::mem::transmute(function);
            Value::Boolean(f(env, this))
        }
        ([], Type::Int) => {
            let f: extern "system" fn(*mut c_void, Ref) -> i32 = std::mem::transmute(function);
            Value::Int(f(env, this))
        }
        ([], Type::Long) => {
            let f: extern "system" fn(*mut c_void, Ref) -> i64 = std::mem::transmute(function);
            Value::Long(f(env, this))
        }
        ([], Type::Object) => {
            let f: extern "system" fn(*mut c_void, Ref) -> Ref = std::mem::transmute(function);
            Value::Object(f(env, this))
        }
        ([Type::Object], Type::Void) => {
            let f: extern "system" fn(*mut c_void, Ref, Ref) = std::mem::transmute(function);
            f(env, this, object_arg(&args[0]));
            Value::Void
        }
        ([Type::Object], Type::Object) => {
            let f: extern "system" fn(*mut c_void, Ref, Ref) -> Ref =
                std::mem::transmute(function);
            Value::Object(f(env, this, object_arg(&args[0])))
        }
        ([Type::Int], Type::Int) => {
            let f: extern "system" fn(*mut c_void, Ref, i32) -> i32 =
                std::mem::transmute(function);
            match args[0] {
                Value::Int(arg) => Value::Int(f(env, this, arg)),
                other => panic!("Expected an int argument, got {:?}", other),
            }
        }
        ([Type::Long], Type::Long) => {
            let f: extern "system" fn(*mut c_void, Ref, i64) -> i64 =
                std::mem::transmute(function);
            match args[0] {
                Value::Long(arg) => Value::Long(f(env, this, arg)),
                other => panic!("Expected a long argument, got {:?}", other),
            }
        }
        _ => panic!("Unsupported native signature `{}`", signature),
    }
}

/// Declares a class on a [Sim]. Declaring a class twice keeps the first declaration.
pub struct ClassBuilder<'a> {
    sim: &'a Sim,
    name: String,
    superclass: String,
    fields: Vec<(String, String, bool)>,
    methods: Vec<(String, String, bool, Implementation)>,
}

impl ClassBuilder<'_> {
    pub fn extends(mut self, superclass: &str) -> Self {
        self.superclass = superclass.into();
        self
    }

    pub fn field(mut self, name: &str, signature: &str) -> Self {
        self.fields.push((name.into(), signature.into(), false));
        self
    }

    pub fn static_field(mut self, name: &str, signature: &str) -> Self {
        self.fields.push((name.into(), signature.into(), true));
        self
    }

    pub fn method(
        self,
        name: &str,
        signature: &str,
        body: impl Fn(&Sim, Ref, &[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.with_method(name, signature, false, Implementation::Managed(Arc::new(body)))
    }

    pub fn static_method(
        self,
        name: &str,
        signature: &str,
        body: impl Fn(&Sim, Ref, &[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.with_method(name, signature, true, Implementation::Managed(Arc::new(body)))
    }

    /// Declares a method implemented by a native function registered later.
    pub fn native(self, name: &str, signature: &str) -> Self {
        self.with_method(name, signature, false, Implementation::Native(None))
    }

    fn with_method(
        mut self,
        name: &str,
        signature: &str,
        is_static: bool,
        implementation: Implementation,
    ) -> Self {
        self.methods
            .push((name.into(), signature.into(), is_static, implementation));
        self
    }

    pub fn build(self) {
        let mut heap = self.sim.heap();
        if heap.classes.contains_key(&self.name) {
            return;
        }
        let superclass = heap.class_named(&self.superclass);
        let class = heap.define(&self.name, Some(superclass));
        for (name, signature, is_static) in &self.fields {
            heap.add_field(class, name, signature, *is_static);
        }
        for (name, signature, is_static, implementation) in self.methods {
            heap.add_method(class, &name, &signature, is_static, implementation);
        }
    }
}

impl Interface for Sim {
    fn attach_current_thread(&self) -> Result<(), AttachError> {
        Ok(())
    }

    fn fatal_error(&self, message: &str) {
        panic!("fatal error: {}", message)
    }

    fn new_local_ref(&self, object: Ref) -> Ref {
        let mut heap = self.heap();
        let target = heap.deref(object);
        heap.new_local(target)
    }

    fn delete_local_ref(&self, object: Ref) {
        self.heap().delete_ref(object, RefKind::Local(thread()))
    }

    fn new_global_ref(&self, object: Ref) -> Ref {
        let mut heap = self.heap();
        let target = heap.deref(object);
        heap.new_ref(target, RefKind::Global)
    }

    fn delete_global_ref(&self, object: Ref) {
        self.heap().delete_ref(object, RefKind::Global)
    }

    fn new_weak_global_ref(&self, object: Ref) -> Ref {
        let mut heap = self.heap();
        let target = heap.deref(object);
        heap.new_ref(target, RefKind::Weak)
    }

    fn delete_weak_global_ref(&self, object: Ref) {
        self.heap().delete_ref(object, RefKind::Weak)
    }

    fn is_same_object(&self, first: Ref, second: Ref) -> bool {
        let heap = self.heap();
        heap.deref(first) == heap.deref(second)
    }

    fn exception_occurred(&self) -> Ref {
        let mut heap = self.heap();
        let pending = heap.pending.get(&thread()).copied();
        heap.new_local(pending)
    }

    fn exception_describe(&self) {
        let mut heap = self.heap();
        if let Some(exception) = heap.pending.remove(&thread()) {
            eprintln!("Exception in thread {:?} {}", thread(), describe(&heap, exception));
        }
    }

    fn exception_clear(&self) {
        self.heap().pending.remove(&thread());
    }

    fn throw(&self, throwable: Ref) -> i32 {
        let mut heap = self.heap();
        match heap.deref(throwable) {
            Some(exception) => {
                heap.pending.insert(thread(), exception);
                0
            }
            None => -1,
        }
    }

    fn find_class(&self, name: &str) -> Ref {
        let mut heap = self.heap();
        heap.assert_no_pending();
        match heap.classes.get(name).copied() {
            Some(class) => heap.new_local(Some(class)),
            None => {
                heap.throw_new("java/lang/NoClassDefFoundError", name);
                Ref::NULL
            }
        }
    }

    fn get_superclass(&self, class: Ref) -> Ref {
        let mut heap = self.heap();
        let superclass = heap.class_info(heap.target(class)).superclass;
        heap.new_local(superclass)
    }

    fn get_object_class(&self, object: Ref) -> Ref {
        let mut heap = self.heap();
        let class = heap.object(heap.target(object)).class;
        heap.new_local(Some(class))
    }

    fn is_assignable_from(&self, class: Ref, target: Ref) -> bool {
        let heap = self.heap();
        heap.is_subclass(heap.target(class), heap.target(target))
    }

    fn get_method_id(&self, class: Ref, name: &str, signature: &str, is_static: bool) -> MethodId {
        let mut heap = self.heap();
        heap.assert_no_pending();
        let class = heap.target(class);
        match heap.find_method(class, name, signature, is_static) {
            Some(method) => method_id(method),
            None => {
                heap.throw_new("java/lang/NoSuchMethodError", name);
                MethodId::NULL
            }
        }
    }

    fn get_field_id(&self, class: Ref, name: &str, signature: &str, is_static: bool) -> FieldId {
        let mut heap = self.heap();
        heap.assert_no_pending();
        let class = heap.target(class);
        let found = Type::parse_field(signature)
            .and_then(|ty| heap.find_field(class, name, ty, is_static));
        match found {
            Some(field) => field_id(field),
            None => {
                heap.throw_new("java/lang/NoSuchFieldError", name);
                FieldId::NULL
            }
        }
    }

    fn register_natives(&self, class: Ref, natives: &[Native]) -> i32 {
        let mut heap = self.heap();
        heap.assert_no_pending();
        let class = heap.target(class);
        for native in natives {
            let found = heap.methods.iter().position(|m| {
                m.class == class
                    && m.name == native.name
                    && m.signature == native.signature
                    && matches!(m.implementation, Implementation::Native(_))
            });
            match found {
                Some(method) => {
                    heap.methods[method].implementation =
                        Implementation::Native(Some(native.function as usize));
                }
                None => {
                    heap.throw_new("java/lang/NoSuchMethodError", &native.name);
                    return -1;
                }
            }
        }
        0
    }

    fn new_object(&self, class: Ref, constructor: MethodId, args: &[Value]) -> Ref {
        let this = {
            let mut heap = self.heap();
            heap.assert_no_pending();
            let class = heap.target(class);
            let id = heap.alloc(class, Payload::Plain);
            heap.new_local(Some(id))
        };
        self.invoke(method_index(constructor), this, args, Type::Void);
        if self.heap().is_pending() {
            self.delete_local_ref(this);
            Ref::NULL
        } else {
            this
        }
    }

    fn call_method(&self, target: Ref, method: MethodId, ret: Type, args: &[Value]) -> Value {
        let resolved = {
            let heap = self.heap();
            heap.assert_no_pending();
            let declared = &heap.methods[method_index(method)];
            let class = heap.object(heap.target(target)).class;
            heap.find_method(class, &declared.name, &declared.signature, false)
        };
        match resolved {
            Some(resolved) => self.invoke(resolved, target, args, ret),
            None => panic!("Method not found on the target"),
        }
    }

    fn call_static_method(&self, class: Ref, method: MethodId, ret: Type, args: &[Value]) -> Value {
        self.heap().assert_no_pending();
        self.invoke(method_index(method), class, args, ret)
    }

    fn call_nonvirtual_method(
        &self,
        target: Ref,
        _class: Ref,
        method: MethodId,
        ret: Type,
        args: &[Value],
    ) -> Value {
        self.heap().assert_no_pending();
        self.invoke(method_index(method), target, args, ret)
    }

    fn get_field(&self, object: Ref, field: FieldId, ty: Type) -> Value {
        let mut heap = self.heap();
        let id = heap.target(object);
        let index = field_index(field);
        let stored = heap.object(id).fields.get(&index).copied();
        match stored {
            Some(stored) => heap.load(stored),
            None => Value::zero(ty),
        }
    }

    fn set_field(&self, object: Ref, field: FieldId, value: Value) {
        let mut heap = self.heap();
        let id = heap.target(object);
        let stored = heap.store(value);
        heap.object_mut(id).fields.insert(field_index(field), stored);
    }

    fn get_static_field(&self, class: Ref, field: FieldId, ty: Type) -> Value {
        let mut heap = self.heap();
        let class = heap.target(class);
        let stored = heap.class_info(class).statics.get(&field_index(field)).copied();
        match stored {
            Some(stored) => heap.load(stored),
            None => Value::zero(ty),
        }
    }

    fn set_static_field(&self, class: Ref, field: FieldId, value: Value) {
        let mut heap = self.heap();
        let class = heap.target(class);
        let stored = heap.store(value);
        heap.class_info_mut(class)
            .statics
            .insert(field_index(field), stored);
    }

    fn new_string(&self, text: &str) -> Ref {
        let mut heap = self.heap();
        heap.assert_no_pending();
        let id = heap.string(text);
        heap.new_local(Some(id))
    }

    fn get_string(&self, string: Ref) -> String {
        let heap = self.heap();
        heap.string_value(heap.target(string))
    }

    fn get_array_length(&self, array: Ref) -> i32 {
        self.heap().array(array).len() as i32
    }

    fn new_primitive_array(&self, element: Type, length: i32) -> Ref {
        let mut heap = self.heap();
        heap.assert_no_pending();
        if length < 0 {
            heap.throw_new("java/lang/NegativeArraySizeException", &length.to_string());
            return Ref::NULL;
        }
        let name = match PRIMITIVE_ARRAYS.iter().find(|(_, ty)| *ty == element) {
            Some((name, _)) => *name,
            None => panic!("No array of {:?}", element),
        };
        let class = heap.class_named(name);
        let items = vec![Stored::Prim(Value::zero(element)); length as usize];
        let id = heap.alloc(class, Payload::Array(items));
        heap.new_local(Some(id))
    }

    fn get_array_region(&self, array: Ref, element: Type, start: i32, length: i32) -> Vec<Value> {
        let mut heap = self.heap();
        if !heap.check_bounds(array, start, length) {
            return Vec::new();
        }
        heap.array(array)[start as usize..(start + length) as usize]
            .iter()
            .map(|stored| match stored {
                Stored::Prim(value) if value.ty() == element => *value,
                other => panic!("Expected {:?} elements, got {:?}", element, other),
            })
            .collect()
    }

    fn set_array_region(&self, array: Ref, start: i32, values: &[Value]) {
        let mut heap = self.heap();
        if !heap.check_bounds(array, start, values.len() as i32) {
            return;
        }
        let items = heap.array_mut(array);
        for (offset, value) in values.iter().enumerate() {
            items[start as usize + offset] = Stored::Prim(*value);
        }
    }

    fn new_object_array(&self, length: i32, element_class: Ref, initial: Ref) -> Ref {
        let mut heap = self.heap();
        heap.assert_no_pending();
        if length < 0 {
            heap.throw_new("java/lang/NegativeArraySizeException", &length.to_string());
            return Ref::NULL;
        }
        let element = heap.class_info(heap.target(element_class)).name.clone();
        let name = if element.starts_with('[') {
            format!("[{}", element)
        } else {
            format!("[L{};", element)
        };
        let class = heap.array_class(&name);
        let initial = heap.deref(initial);
        let items = vec![Stored::Obj(initial); length as usize];
        let id = heap.alloc(class, Payload::Array(items));
        heap.new_local(Some(id))
    }

    fn get_object_array_element(&self, array: Ref, index: i32) -> Ref {
        let mut heap = self.heap();
        if !heap.check_bounds(array, index, 1) {
            return Ref::NULL;
        }
        let stored = heap.array(array)[index as usize];
        match heap.load(stored) {
            Value::Object(element) => element,
            _ => Ref::NULL,
        }
    }

    fn set_object_array_element(&self, array: Ref, index: i32, value: Ref) {
        let mut heap = self.heap();
        if !heap.check_bounds(array, index, 1) {
            return;
        }
        let stored = Stored::Obj(heap.deref(value));
        heap.array_mut(array)[index as usize] = stored;
    }
}
