//! Managed arrays.

use crate::binding::Binding;
use crate::binding::ClassDescriptor;
use crate::binding::FromValue;
use crate::env;
use crate::exception::check;
use crate::exception::Result;
use crate::interface::Ref;
use crate::interface::Type;
use crate::interface::Value;
use crate::local::Local;
use crate::object::Proxy;
use crate::pointer::Bridged;
use crate::pointer::Kind;
use crate::pointer::Ptr;
use once_cell::sync::OnceCell;
use std::marker::PhantomData;

/// Element type of a primitive array.
pub trait Primitive: Copy + Send + Sync + Into<Value> + FromValue + 'static {
    const TYPE: Type;

    /// Binding of the array class, e.g. `[Z`.
    fn binding() -> &'static Binding;
}

macro_rules! primitive {
    ($($element:ty => $ty:ident, $class:literal, $alias:ident;)*) => {
        $(
            impl Primitive for $element {
                const TYPE: Type = Type::$ty;

                fn binding() -> &'static Binding {
                    fn describe() -> ClassDescriptor {
                        ClassDescriptor::new($class)
                    }
                    static BINDING: Binding = Binding::new(describe);
                    &BINDING
                }
            }

            #[doc = concat!("`", $class, "`")]
            pub type $alias = PrimitiveArray<$element>;
        )*
    };
}

primitive! {
    bool => Boolean, "[Z", BoolArray;
    i8 => Byte, "[B", ByteArray;
    u16 => Char, "[C", CharArray;
    i16 => Short, "[S", ShortArray;
    i32 => Int, "[I", IntArray;
    i64 => Long, "[J", LongArray;
    f32 => Float, "[F", FloatArray;
    f64 => Double, "[D", DoubleArray;
}

/// Array of a primitive type.
pub struct PrimitiveArray<E: Primitive> {
    proxy: Proxy,
    length: OnceCell<i32>,
    _element: PhantomData<E>,
}

unsafe impl<E: Primitive> Bridged for PrimitiveArray<E> {
    const KIND: Kind<Self> = Kind::Wrapper(Self::from_proxy);

    fn binding() -> &'static Binding {
        E::binding()
    }

    fn proxy(&self) -> &Proxy {
        &self.proxy
    }
}

impl<E: Primitive> PrimitiveArray<E> {
    fn from_proxy(proxy: Proxy) -> Self {
        Self {
            proxy,
            length: OnceCell::new(),
            _element: PhantomData,
        }
    }

    /// Allocates an array filled with zeros.
    pub fn new(length: i32) -> Result<Ptr<Self>> {
        let array = Local::wrap_local(env::current().new_primitive_array(E::TYPE, length));
        check()?;
        Ok(unsafe { Ptr::wrap(array.as_raw()) })
    }

    pub fn len(&self) -> i32 {
        *self
            .length
            .get_or_init(|| env::current().get_array_length(self.proxy.handle()))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: i32) -> Result<E> {
        let mut region = self.region(index, 1)?;
        match region.pop() {
            Some(element) => Ok(element),
            None => env::fatal("Array region came back empty."),
        }
    }

    pub fn set(&self, index: i32, element: E) -> Result<()> {
        self.set_region(index, &[element])
    }

    /// Copies `length` elements starting at `start`.
    pub fn region(&self, start: i32, length: i32) -> Result<Vec<E>> {
        let values =
            env::current().get_array_region(self.proxy.handle(), E::TYPE, start, length);
        check()?;
        Ok(values.into_iter().map(E::from_value).collect())
    }

    pub fn set_region(&self, start: i32, elements: &[E]) -> Result<()> {
        let values = elements.iter().map(|e| (*e).into()).collect::<Vec<Value>>();
        env::current().set_array_region(self.proxy.handle(), start, &values);
        check()
    }

    pub fn to_vec(&self) -> Result<Vec<E>> {
        self.region(0, self.len())
    }
}

static OBJECT_ARRAY: Binding = Binding::new(describe_object_array);

fn describe_object_array() -> ClassDescriptor {
    ClassDescriptor::new("[Ljava/lang/Object;")
}

crate::wrapper!(
    /// Array of objects.
    ObjectArray,
    OBJECT_ARRAY
);

impl ObjectArray {
    /// Allocates an array of `element_class` filled with nulls.
    pub fn new(length: i32, element_class: Ref) -> Result<Ptr<ObjectArray>> {
        let array =
            Local::wrap_local(env::current().new_object_array(length, element_class, Ref::NULL));
        check()?;
        Ok(unsafe { Ptr::wrap(array.as_raw()) })
    }

    pub fn len(&self) -> i32 {
        env::current().get_array_length(self.0.handle())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: i32) -> Result<Local> {
        let element =
            Local::wrap_local(env::current().get_object_array_element(self.0.handle(), index));
        check()?;
        Ok(element)
    }

    pub fn set(&self, index: i32, element: Ref) -> Result<()> {
        env::current().set_object_array_element(self.0.handle(), index, element);
        check()
    }
}
