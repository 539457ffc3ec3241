//! Command types and definitions.

use std::fmt;

use serde::Serialize;

/// Arguments for registering a new key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterArgs {
    pub key: String,
    pub name: String,
    /// Initial status; `SAFE` when omitted.
    pub status: Option<String>,
}

/// Arguments for setting a custom status on several users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteArgs {
    pub names: Vec<String>,
    pub status: String,
    pub extra: String,
}

/// Arguments for renaming a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameArgs {
    pub old_name: String,
    pub new_name: String,
}

/// Available admin commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Add a key and its user to both files.
    Register(RegisterArgs),

    /// Mark users as `SAFE`.
    Grant(Vec<String>),

    /// Mark users as `BAN`.
    Ban(Vec<String>),

    /// Soft-delete users by marking them `DELETE`.
    Deny(Vec<String>),

    /// Set a custom status plus free text on hyphen-separated users.
    Execute(ExecuteArgs),

    /// Rename a user, keeping the status.
    Rename(RenameArgs),

    /// Remove users and their keys.
    Delete(Vec<String>),

    /// Remove records by their hardware key.
    Remove(Vec<String>),

    /// Ban everyone (behaviour depends on the configured policy).
    BanAll,

    /// Show the user file.
    List,

    /// Check that the two files still line up.
    Audit,

    /// Show help information.
    Help,

    /// Show information about the bot.
    Info,
}

impl AdminCommand {
    /// Parses a command from a message text.
    ///
    /// Returns `None` if the message is not a valid command.
    #[must_use]
    pub fn parse(text: &str, prefix: &str) -> Option<Self> {
        let text = text.trim();

        let after_prefix = text.strip_prefix(prefix)?.trim_start();

        let (cmd, args) = match after_prefix.split_once(char::is_whitespace) {
            Some((cmd, args)) => (cmd, Some(args.trim())),
            None => (after_prefix, None),
        };

        // Group chats address commands as `/ban@some_bot`.
        let cmd = cmd.split_once('@').map_or(cmd, |(cmd, _)| cmd).to_lowercase();
        let args = args.filter(|a| !a.is_empty());

        match cmd.as_str() {
            "register" | "add" | "approve" => Self::parse_register(args?),
            "grant" | "safe" | "unban" => Some(Self::Grant(split_names(args?))),
            "ban" => Some(Self::Ban(split_names(args?))),
            "deny" => Some(Self::Deny(split_names(args?))),
            "execute" | "exec" => Self::parse_execute(args?),
            "rename" | "mv" => Self::parse_rename(args?),
            "delete" | "rm" => Some(Self::Delete(split_names(args?))),
            "remove" => Some(Self::Remove(split_names(args?))),
            "banall" => Some(Self::BanAll),
            "list" | "ls" | "users" => Some(Self::List),
            "audit" | "check" => Some(Self::Audit),
            "help" | "h" | "?" | "start" => Some(Self::Help),
            "info" | "about" | "version" => Some(Self::Info),
            _ => None,
        }
    }

    /// Parses register arguments: `<key> <name> [status...]`
    fn parse_register(args: &str) -> Option<Self> {
        let (key, rest) = next_token(args)?;
        let (name, rest) = next_token(rest)?;
        let status = Some(rest.trim()).filter(|s| !s.is_empty()).map(str::to_owned);

        Some(Self::Register(RegisterArgs {
            key: key.to_owned(),
            name: name.to_owned(),
            status,
        }))
    }

    /// Parses execute arguments: `<name-name-...> <status> [extra text]`
    fn parse_execute(args: &str) -> Option<Self> {
        let (joined, rest) = next_token(args)?;
        let (status, extra) = next_token(rest)?;
        let names: Vec<String> = joined
            .split('-')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned)
            .collect();

        if names.is_empty() {
            return None;
        }

        Some(Self::Execute(ExecuteArgs {
            names,
            status: status.to_owned(),
            extra: extra.trim().to_owned(),
        }))
    }

    /// Parses rename arguments: `<old> <new>`
    fn parse_rename(args: &str) -> Option<Self> {
        let mut parts = args.split_whitespace();
        let old_name = parts.next()?.to_owned();
        let new_name = parts.next()?.to_owned();

        if parts.next().is_some() {
            return None;
        }

        Some(Self::Rename(RenameArgs { old_name, new_name }))
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::Grant(_) => "grant",
            Self::Ban(_) => "ban",
            Self::Deny(_) => "deny",
            Self::Execute(_) => "execute",
            Self::Rename(_) => "rename",
            Self::Delete(_) => "delete",
            Self::Remove(_) => "remove",
            Self::BanAll => "banall",
            Self::List => "list",
            Self::Audit => "audit",
            Self::Help => "help",
            Self::Info => "info",
        }
    }

    /// Whether the command changes either file.
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        !matches!(self, Self::List | Self::Audit | Self::Help | Self::Info)
    }

    /// Returns all available commands with their descriptions.
    #[must_use]
    pub fn all_commands() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("register <key> <name> [status]", "(add)", "Register a key for a user"),
            ("grant <name>...", "(unban)", "Mark users as SAFE"),
            ("ban <name>...", "", "Mark users as BAN"),
            ("deny <name>...", "", "Mark users as DELETE"),
            ("execute <a-b-c> <status> [text]", "(exec)", "Set a custom status"),
            ("rename <old> <new>", "(mv)", "Rename a user"),
            ("delete <name>...", "(rm)", "Remove users and their keys"),
            ("remove <key>...", "", "Remove records by key"),
            ("banall", "", "Ban every user"),
            ("list", "(ls)", "Show all users"),
            ("audit", "(check)", "Check key and user files line up"),
            ("info", "", "Show bot information"),
            ("help", "(h, ?)", "Show this help message"),
        ]
    }
}

fn split_names(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_owned).collect()
}

/// Splits off the first whitespace-separated token, returning it and the rest.
fn next_token(args: &str) -> Option<(&str, &str)> {
    let args = args.trim_start();
    if args.is_empty() {
        return None;
    }
    Some(args.split_once(char::is_whitespace).unwrap_or((args, "")))
}

impl fmt::Display for AdminCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register(args) => match &args.status {
                Some(status) => write!(f, "register {} {} {status}", args.key, args.name),
                None => write!(f, "register {} {}", args.key, args.name),
            },
            Self::Grant(names)
            | Self::Ban(names)
            | Self::Deny(names)
            | Self::Delete(names)
            | Self::Remove(names) => write!(f, "{} {}", self.name(), names.join(" ")),
            Self::Execute(args) => write!(
                f,
                "execute {} {} {}",
                args.names.join("-"),
                args.status,
                args.extra
            ),
            Self::Rename(args) => write!(f, "rename {} {}", args.old_name, args.new_name),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Result of command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    /// Whether the command was successful.
    pub success: bool,

    /// Response message to show the user.
    pub message: String,

    /// Number of records affected, for commands that count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl CommandResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            count: None,
        }
    }

    /// Creates a successful result carrying an affected-record count.
    #[must_use]
    pub fn counted(count: usize, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            count: Some(count),
        }
    }

    /// Creates an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            count: None,
        }
    }
}
