//! Command handling module.
//!
//! Parses admin messages such as `/ban alice bob` and runs them against
//! the record store.

mod handler;
mod types;

pub use handler::CommandHandler;
pub use types::{AdminCommand, CommandResult, ExecuteArgs, RegisterArgs, RenameArgs};
