//! Bridge between native code and objects of a Java virtual machine
//!
//! Native code holds managed objects through [Ptr]s, which count references on the native side and
//! keep global references on the managed side. Native types come in two flavors:
//!
//! * Wrappers around existing managed classes, created on demand whenever native code gets hold
//!   of a managed object.
//! * Live types, whose managed objects own them and which implement native methods of their
//!   classes through [callback](pointer::callback).
//!
//! Exceptions thrown by managed code surface as [Error::Thrown], while errors and panics escaping
//! native methods are rethrown as managed exceptions.
//!
//! The bridge talks to the virtual machine through an [Interface] installed once by
//! [env::initialize].

pub mod array;
pub mod binding;
pub mod config;
pub mod env;
pub mod exception;
pub mod interface;
pub mod lang;
pub mod local;
pub mod object;
pub mod pointer;

mod weak;

#[cfg(test)]
mod sim;

pub use exception::Error;
pub use exception::Result;
pub use interface::Interface;
pub use interface::Ref;
pub use interface::Value;
pub use local::Local;
pub use pointer::Bridged;
pub use pointer::Ptr;
