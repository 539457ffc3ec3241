//! Command dispatch module.
//!
//! Serializes admin commands from every inbound source onto one queue.

mod runner;

pub use runner::{CommandDispatcher, DispatchError, DispatchMessage, DispatcherHandle};
