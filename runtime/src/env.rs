//! Process-wide access to the managed runtime.

use crate::config::Config;
use crate::interface::Interface;
use once_cell::sync::Lazy;
use once_cell::sync::OnceCell;

struct Bridge {
    interface: &'static dyn Interface,
    config: Config,
}

static BRIDGE: OnceCell<Bridge> = OnceCell::new();

static DEFAULT_CONFIG: Lazy<Config> = Lazy::new(Default::default);

/// Installs the runtime with the default [Config].
///
/// Only the first call takes effect, subsequent ones are ignored.
pub fn initialize(interface: &'static dyn Interface) {
    initialize_with(interface, Default::default())
}

/// Installs the runtime together with a [Config].
pub fn initialize_with(interface: &'static dyn Interface, config: Config) {
    let mut installed = false;
    BRIDGE.get_or_init(|| {
        installed = true;
        Bridge { interface, config }
    });
    if installed {
        log::debug!("Bridge initialized");
    } else {
        log::debug!("Bridge already initialized, ignoring");
    }
}

pub fn is_initialized() -> bool {
    BRIDGE.get().is_some()
}

/// Returns the runtime, attaching the calling thread to it if necessary.
///
/// Aborts if the bridge is not initialized or the thread cannot be attached.
pub fn current() -> &'static dyn Interface {
    let bridge = match BRIDGE.get() {
        Some(bridge) => bridge,
        None => fatal("Bridge not initialized."),
    };
    if let Err(err) = bridge.interface.attach_current_thread() {
        fatal(&err.to_string());
    }
    bridge.interface
}

pub fn config() -> &'static Config {
    match BRIDGE.get() {
        Some(bridge) => &bridge.config,
        None => &DEFAULT_CONFIG,
    }
}

/// Reports an unrecoverable error and terminates the process.
pub fn fatal(message: &str) -> ! {
    log::error!("{}", message);
    if let Some(bridge) = BRIDGE.get() {
        if bridge.interface.attach_current_thread().is_ok() {
            bridge.interface.fatal_error(message);
        }
    }
    std::process::abort()
}
