//! Native half of `javelin.sample.Ticker`, see `sample/java`.
//!
//! A `Ticker` is a live object: the managed object owns the native instance, which accumulates
//! ticks and reports each new total back through the overridable `onTick(long)`.

use javelin_runtime::binding::Binding;
use javelin_runtime::binding::ClassDescriptor;
use javelin_runtime::env;
use javelin_runtime::object::Proxy;
use javelin_runtime::pointer::callback;
use javelin_runtime::pointer::guard;
use javelin_runtime::pointer::Bridged;
use javelin_runtime::pointer::Kind;
use javelin_runtime::Error;
use javelin_runtime::Ptr;
use javelin_runtime::Ref;
use javelin_runtime::Result;
use javelin_runtime::Value;
use jni::sys::jint;
use jni::sys::jlong;
use std::ffi::c_void;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

static TICKER: Binding = Binding::new(describe_ticker);

fn describe_ticker() -> ClassDescriptor {
    ClassDescriptor::new("javelin/sample/Ticker")
        .constructor("new", "()V")
        .method("onTick", "onTick", "(J)V")
        .callback("init", "()V", init as *mut c_void)
        .callback("tick", "(I)J", tick as *mut c_void)
        .callback("total", "()J", total as *mut c_void)
        .callback("fail", "(Ljava/lang/String;)V", fail as *mut c_void)
        .live::<Ticker>()
}

pub struct Ticker {
    proxy: Proxy,
    total: AtomicI64,
}

unsafe impl Bridged for Ticker {
    const KIND: Kind<Self> = Kind::Live;

    fn binding() -> &'static Binding {
        &TICKER
    }

    fn proxy(&self) -> &Proxy {
        &self.proxy
    }
}

impl Ticker {
    /// Constructs a managed `Ticker` and returns its native instance.
    pub fn create() -> Result<Ptr<Ticker>> {
        let object = TICKER.new_object("new", &[])?;
        Ok(unsafe { Ptr::wrap(object.as_raw()) })
    }

    pub fn tick(&self, step: i32) -> Result<i64> {
        let total = self.total.fetch_add(step.into(), Ordering::SeqCst) + i64::from(step);
        TICKER.call::<()>(self.proxy.handle(), "onTick", &[Value::Long(total)])?;
        Ok(total)
    }

    pub fn total(&self) -> i64 {
        self.total.load(Ordering::SeqCst)
    }
}

extern "system" fn init(_env: *mut c_void, this: Ref) {
    guard(|| {
        let ticker = Ptr::new(Ticker {
            proxy: Proxy::live(this, TICKER.instance_field()),
            total: AtomicI64::new(0),
        });
        log::debug!("Created {:?}", ticker);
        Ok(())
    })
}

extern "system" fn tick(_env: *mut c_void, this: Ref, step: jint) -> jlong {
    callback(this, |ticker: &Ticker| ticker.tick(step))
}

extern "system" fn total(_env: *mut c_void, this: Ref) -> jlong {
    callback(this, |ticker: &Ticker| Ok(ticker.total()))
}

extern "system" fn fail(_env: *mut c_void, this: Ref, message: Ref) {
    callback(this, |_: &Ticker| -> Result<()> {
        Err(Error::native(env::current().get_string(message)))
    })
}

#[no_mangle]
pub extern "system" fn JNI_OnLoad(vm: *mut jni::sys::JavaVM, _reserved: *mut c_void) -> jint {
    let _ = env_logger::try_init();
    let version = javelin_runtime_jni::on_load(vm);
    if version != jni::sys::JNI_ERR {
        // Registers the native methods before the first `Ticker` gets constructed.
        log::info!("Loaded bindings of `{}`", TICKER.name());
    }
    version
}
