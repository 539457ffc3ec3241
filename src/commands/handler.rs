//! Command handler implementation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::types::{AdminCommand, CommandResult, ExecuteArgs, RegisterArgs, RenameArgs};
use crate::config::BanAllPolicy;
use crate::store::{RecordStore, STATUS_BAN, STATUS_DELETE, STATUS_SAFE, StoreError};

/// Executes admin commands against the record store.
pub struct CommandHandler {
    /// Command prefix (e.g., "/").
    prefix: String,

    /// The key and user files.
    store: Arc<RecordStore>,

    /// What `banall` does.
    ban_all_policy: BanAllPolicy,

    /// When the handler was created, for uptime reporting.
    started_at: DateTime<Utc>,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(prefix: String, store: Arc<RecordStore>, ban_all_policy: BanAllPolicy) -> Self {
        Self {
            prefix,
            store,
            ban_all_policy,
            started_at: Utc::now(),
        }
    }

    /// Tries to parse and execute a command from a message.
    ///
    /// Returns `None` if the message is not a command.
    pub fn try_handle(&self, message_text: &str) -> Option<CommandResult> {
        let command = AdminCommand::parse(message_text, &self.prefix)?;
        Some(self.execute(command))
    }

    /// Executes a parsed command.
    pub fn execute(&self, command: AdminCommand) -> CommandResult {
        debug!("Handling command: {}", command);
        let mutating = command.is_mutating();

        let result = match command {
            AdminCommand::Register(args) => self.handle_register(args),
            AdminCommand::Grant(names) => self.handle_set_status(&names, STATUS_SAFE),
            AdminCommand::Ban(names) => self.handle_set_status(&names, STATUS_BAN),
            AdminCommand::Deny(names) => self.handle_set_status(&names, STATUS_DELETE),
            AdminCommand::Execute(args) => self.handle_execute(&args),
            AdminCommand::Rename(args) => self.handle_rename(&args),
            AdminCommand::Delete(names) => self.handle_delete(&names),
            AdminCommand::Remove(keys) => self.handle_remove(&keys),
            AdminCommand::BanAll => self.handle_ban_all(),
            AdminCommand::List => self.handle_list(),
            AdminCommand::Audit => self.handle_audit(),
            AdminCommand::Help => self.handle_help(),
            AdminCommand::Info => self.handle_info(),
        };

        if mutating {
            info!(
                "Command result: success={}, count={:?}",
                result.success, result.count
            );
        }

        result
    }

    fn handle_register(&self, args: RegisterArgs) -> CommandResult {
        let status = args.status.as_deref().unwrap_or(STATUS_SAFE);

        match self.store.append(&args.key, &args.name, status) {
            Ok(()) => CommandResult::counted(
                1,
                format!("✅ Registered {} ({}) as {status}", args.name, args.key),
            ),
            Err(e) => store_failure("Register", &e),
        }
    }

    fn handle_set_status(&self, names: &[String], status: &str) -> CommandResult {
        match self.store.batch_update_status(names, status, "") {
            Ok(update) if update.count == 0 => {
                CommandResult::counted(0, format!("No matching users to mark {status}."))
            }
            Ok(update) => CommandResult::counted(
                update.count,
                format!("✓ {status}: {}", update.matched.join(", ")),
            ),
            Err(e) => store_failure("Status update", &e),
        }
    }

    fn handle_execute(&self, args: &ExecuteArgs) -> CommandResult {
        match self
            .store
            .batch_update_status(args.names.as_slice(), &args.status, &args.extra)
        {
            Ok(update) if update.count == 0 => {
                CommandResult::counted(0, "No matching users to update.")
            }
            Ok(update) => CommandResult::counted(
                update.count,
                format!(
                    "⚙️ Set {} on {} user(s): {}",
                    truncate(&args.status, 30),
                    update.count,
                    update.matched.join(", ")
                ),
            ),
            Err(e) => store_failure("Execute", &e),
        }
    }

    fn handle_rename(&self, args: &RenameArgs) -> CommandResult {
        match self.store.rename_user(&args.old_name, &args.new_name) {
            Ok(true) => CommandResult::counted(
                1,
                format!("✓ Renamed {} → {}", args.old_name, args.new_name),
            ),
            Ok(false) => CommandResult::counted(
                0,
                format!("User not found: '{}'. Use 'list' to see users.", args.old_name),
            ),
            Err(e) => store_failure("Rename", &e),
        }
    }

    fn handle_delete(&self, names: &[String]) -> CommandResult {
        match self.store.delete_users(names) {
            Ok(0) => CommandResult::counted(0, "No matching users to delete."),
            Ok(count) => CommandResult::counted(count, format!("🗑 Deleted {count} user(s).")),
            Err(e) => store_failure("Delete", &e),
        }
    }

    fn handle_remove(&self, keys: &[String]) -> CommandResult {
        match self.store.delete_keys(keys) {
            Ok(0) => CommandResult::counted(0, "No matching keys to remove."),
            Ok(count) => CommandResult::counted(count, format!("🗑 Removed {count} record(s).")),
            Err(e) => store_failure("Remove", &e),
        }
    }

    fn handle_ban_all(&self) -> CommandResult {
        match self.ban_all_policy {
            BanAllPolicy::Rewrite => match self.store.clear_all_to_status(STATUS_BAN) {
                Ok(count) => {
                    CommandResult::counted(count, format!("⛔ Banned all {count} user(s)."))
                }
                Err(e) => store_failure("Ban all", &e),
            },
            BanAllPolicy::Truncate => match self.store.truncate_approved() {
                Ok(()) => CommandResult::counted(
                    0,
                    "⛔ All users have been banned (user list cleared).",
                ),
                Err(e) => store_failure("Ban all", &e),
            },
        }
    }

    fn handle_list(&self) -> CommandResult {
        match self.store.list_users() {
            Ok(Some(content)) if !content.trim().is_empty() => {
                CommandResult::success(format!("Users:\n{}", content.trim_end()))
            }
            Ok(_) => CommandResult::success("No users recorded."),
            Err(e) => store_failure("List", &e),
        }
    }

    fn handle_audit(&self) -> CommandResult {
        let audit = match self.store.audit() {
            Ok(audit) => audit,
            Err(e) => return store_failure("Audit", &e),
        };

        let mut lines = vec![
            format!("Keys: {}", audit.key_count),
            format!("Users: {}", audit.user_count),
        ];

        if !audit.malformed_lines.is_empty() {
            let positions: Vec<String> =
                audit.malformed_lines.iter().map(ToString::to_string).collect();
            lines.push(format!("Malformed user lines: {}", positions.join(", ")));
        }

        if audit.is_aligned() {
            lines.insert(0, "✓ Files are aligned.".to_owned());
            CommandResult::success(lines.join("\n"))
        } else {
            lines.insert(
                0,
                "✗ Files are out of step; register, delete and remove are refused.".to_owned(),
            );
            CommandResult::error(lines.join("\n"))
        }
    }

    fn handle_help(&self) -> CommandResult {
        let mut lines = vec![
            format!("Keyguard Bot Commands (prefix: {})", self.prefix),
            String::new(),
        ];

        for (cmd, aliases, desc) in AdminCommand::all_commands() {
            let alias_str = if aliases.is_empty() {
                String::new()
            } else {
                format!(" {aliases}")
            };
            lines.push(format!("  {cmd}{alias_str} - {desc}"));
        }

        CommandResult::success(lines.join("\n"))
    }

    fn handle_info(&self) -> CommandResult {
        let version = env!("CARGO_PKG_VERSION");
        let uptime = (Utc::now() - self.started_at).num_seconds().max(0);
        let message = format!(
            "Keyguard Bot v{version}\n\
             Up for {}\n\
             Keys: {}\n\
             Users: {}\n\
             Ban-all policy: {}",
            format_duration(uptime.unsigned_abs()),
            self.store.keys_path().display(),
            self.store.users_path().display(),
            self.ban_all_policy,
        );
        CommandResult::success(message)
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("prefix", &self.prefix)
            .field("ban_all_policy", &self.ban_all_policy)
            .finish_non_exhaustive()
    }
}

/// Logs a store failure and turns it into a user-facing error.
fn store_failure(operation: &str, err: &StoreError) -> CommandResult {
    match err {
        StoreError::InvalidField { .. } => {
            CommandResult::error(format!("✗ {operation} rejected: {err}"))
        }
        StoreError::LengthMismatch { .. } => {
            warn!("{} refused: {}", operation, err);
            CommandResult::error(format!("✗ {err}. Run 'audit' and repair the files first."))
        }
        StoreError::Io { .. } => {
            warn!("{} failed: {}", operation, err);
            CommandResult::error(format!(
                "✗ {operation} failed: {err}. State unknown, re-read before retrying."
            ))
        }
    }
}

/// Truncates a string to a maximum length, adding "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}

/// Formats a duration in seconds to a human-readable string.
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins == 0 {
            format!("{hours}h")
        } else {
            format!("{hours}h {mins}m")
        }
    }
}
