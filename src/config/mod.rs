//! Configuration module for the keyguard bot.
//!
//! Handles loading and validation of file locations, the command prefix,
//! the web listen address and the ban-all policy.

mod settings;

pub use settings::{BanAllPolicy, BotSettings, ConfigError};
