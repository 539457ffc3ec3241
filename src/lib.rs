//! Keyguard Bot Library
//!
//! An admin bot that approves, bans, renames and removes users identified
//! by a hardware key.
//!
//! This crate provides the core functionality for:
//! - Keeping the key file and the user file aligned line by line
//! - Parsing and executing admin commands
//! - Serializing commands through a single-consumer queue
//! - Serving health checks, raw file reads and a command webhook

pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod store;
pub mod web;
