//! Record types for the key and user files.

use std::fmt;

/// Separator between the name and the status on a user line.
pub const DELIMITER: &str = " -> ";

/// Status of an approved user.
pub const STATUS_SAFE: &str = "SAFE";

/// Status of a banned user.
pub const STATUS_BAN: &str = "BAN";

/// Status marking a soft-deleted user.
pub const STATUS_DELETE: &str = "DELETE";

/// A single line of the user file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Display name, trimmed.
    pub name: String,

    /// Free-text status (`SAFE`, `BAN`, `DELETE` or anything else).
    pub status: String,
}

impl UserRecord {
    /// Creates a new user record.
    #[must_use]
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
        }
    }

    /// Parses a user line.
    ///
    /// Returns `None` for malformed lines (no `" -> "` delimiter).
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let (name, status) = line.split_once(DELIMITER)?;
        Some(Self::new(name.trim(), status.trim()))
    }

    /// Returns the trimmed name of a user line without allocating.
    #[must_use]
    pub fn name_of(line: &str) -> Option<&str> {
        line.split_once(DELIMITER).map(|(name, _)| name.trim())
    }
}

impl fmt::Display for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{DELIMITER}{}", self.name, self.status)
    }
}

/// Joins a base status with optional free text, trimming the result.
#[must_use]
pub fn compose_status(base: &str, extra: &str) -> String {
    format!("{base} {extra}").trim().to_owned()
}

/// Splits file contents into lines on `\n` only.
///
/// Carriage returns are kept so untouched lines are written back unchanged.
pub(crate) fn split_lines(content: &str) -> Vec<&str> {
    content.split_terminator('\n').collect()
}

/// Joins lines back into file contents, each terminated by `\n`.
pub(crate) fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out
}
