//! Exceptions crossing the native boundary.
//!
//! A managed exception pending after a call into the runtime becomes an [Error::Thrown] through
//! [check]. In the opposite direction, an [Error] or a panic escaping a native callback is turned
//! back into a managed exception through [raise] and [raise_panic], so the runtime only ever
//! observes managed exceptions.

use crate::env;
use crate::interface::Ref;
use crate::lang::Exception;
use crate::lang::RuntimeException;
use crate::lang::Throwable;
use crate::local::Local;
use crate::pointer::Ptr;
use std::any::Any;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Message of the managed exception raised for errors carrying no message.
pub const UNKNOWN_EXCEPTION: &str = "Unknown native exception.";

#[derive(Error, Debug)]
pub enum Error {
    /// Exception thrown by managed code, kept alive by a global reference.
    #[error("Exception thrown by managed code")]
    Thrown(Ptr<Throwable>),

    #[error("{0}")]
    Native(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Creates an error of native origin, reaching managed code as a `RuntimeException`.
    pub fn native(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Native(err.into())
    }

    /// Returns the managed exception if there is one.
    pub fn thrown(&self) -> Option<&Ptr<Throwable>> {
        match self {
            Self::Thrown(throwable) => Some(throwable),
            Self::Native(_) => None,
        }
    }
}

impl<T: Exception> From<Ptr<T>> for Error {
    fn from(src: Ptr<T>) -> Self {
        Self::Thrown(unsafe { Ptr::wrap(src.handle()) })
    }
}

/// Clears the pending managed exception and returns it as an [Error].
pub fn check() -> Result<()> {
    let env = env::current();
    let pending = Local::wrap_local(env.exception_occurred());
    if pending.is_null() {
        return Ok(());
    }
    env.exception_clear();
    log::trace!("Caught a managed exception");
    Err(Error::Thrown(unsafe { Ptr::wrap(pending.as_raw()) }))
}

/// Makes `err` pending in the managed runtime.
pub fn raise(err: &Error) {
    match err {
        Error::Thrown(throwable) if !throwable.is_null() => throw(throwable.handle()),
        Error::Thrown(_) => raise_message(UNKNOWN_EXCEPTION),
        Error::Native(err) => raise_message(&err.to_string()),
    }
}

/// Makes a panic pending in the managed runtime as a `RuntimeException`.
pub fn raise_panic(payload: &(dyn Any + Send)) {
    if let Some(message) = payload.downcast_ref::<&str>() {
        raise_message(message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        raise_message(message)
    } else {
        raise_message(UNKNOWN_EXCEPTION)
    }
}

/// Throws a managed exception as is.
pub fn throw(throwable: Ref) {
    let status = env::current().throw(throwable);
    if status != 0 {
        env::fatal(&format!("Throw() failed with {} error.", status));
    }
}

fn raise_message(message: &str) {
    match RuntimeException::new(message) {
        Ok(exception) => throw(exception.handle()),
        Err(Error::Thrown(throwable)) => throw(throwable.handle()),
        Err(Error::Native(err)) => env::fatal(&err.to_string()),
    }
}
