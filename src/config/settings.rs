//! Application settings.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What `banall` does to the user file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BanAllPolicy {
    /// Keep every record and set its status to `BAN`.
    #[default]
    Rewrite,

    /// Empty the user file, leaving the key file alone.
    Truncate,
}

impl FromStr for BanAllPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rewrite" | "ban" => Ok(Self::Rewrite),
            "truncate" | "clear" => Ok(Self::Truncate),
            _ => Err(ConfigError::InvalidBanAllPolicy(s.to_owned())),
        }
    }
}

impl fmt::Display for BanAllPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rewrite => write!(f, "rewrite"),
            Self::Truncate => write!(f, "truncate"),
        }
    }
}

/// Bot-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Path to the key file (one hardware key per line).
    #[serde(default = "default_keys_path")]
    pub keys_path: PathBuf,

    /// Path to the user file (`name -> status` per line).
    #[serde(default = "default_users_path")]
    pub users_path: PathBuf,

    /// Command prefix for bot commands.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Address the web server listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Capacity of the command queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Behaviour of the `banall` command.
    #[serde(default)]
    pub ban_all_policy: BanAllPolicy,
}

fn default_keys_path() -> PathBuf {
    PathBuf::from("KEYS.txt")
}

fn default_users_path() -> PathBuf {
    PathBuf::from("USERS.txt")
}

fn default_command_prefix() -> String {
    "/".to_owned()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_owned()
}

fn default_queue_capacity() -> usize {
    32
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            keys_path: default_keys_path(),
            users_path: default_users_path(),
            command_prefix: default_command_prefix(),
            listen_addr: default_listen_addr(),
            queue_capacity: default_queue_capacity(),
            ban_all_policy: BanAllPolicy::default(),
        }
    }
}

impl BotSettings {
    /// Creates bot settings from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `BAN_ALL_POLICY` is set to an unknown value.
    pub fn from_env_with_defaults() -> Result<Self, ConfigError> {
        let ban_all_policy = match std::env::var("BAN_ALL_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => BanAllPolicy::default(),
        };

        Ok(Self {
            keys_path: std::env::var("KEYS_PATH")
                .map_or_else(|_| default_keys_path(), PathBuf::from),
            users_path: std::env::var("USERS_PATH")
                .map_or_else(|_| default_users_path(), PathBuf::from),
            command_prefix: std::env::var("COMMAND_PREFIX")
                .unwrap_or_else(|_| default_command_prefix()),
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| default_listen_addr()),
            queue_capacity: std::env::var("QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_queue_capacity),
            ban_all_policy,
        })
    }

    /// Parses the listen address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid `host:port` socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(self.listen_addr.clone()))
    }

    /// Checks settings that cannot be expressed in their types.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_prefix.trim().is_empty() {
            return Err(ConfigError::EmptyCommandPrefix);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.keys_path == self.users_path {
            return Err(ConfigError::SameFile(self.keys_path.clone()));
        }
        self.socket_addr()?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid listen address: {0}")]
    InvalidListenAddr(String),

    #[error("Invalid BAN_ALL_POLICY '{0}' (expected 'rewrite' or 'truncate')")]
    InvalidBanAllPolicy(String),

    #[error("Command prefix cannot be empty")]
    EmptyCommandPrefix,

    #[error("Queue capacity must be greater than 0")]
    ZeroQueueCapacity,

    #[error("Key file and user file must be different paths: {}", .0.display())]
    SameFile(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = BotSettings::default();
        assert_eq!(settings.keys_path, PathBuf::from("KEYS.txt"));
        assert_eq!(settings.users_path, PathBuf::from("USERS.txt"));
        assert_eq!(settings.command_prefix, "/");
        assert_eq!(settings.queue_capacity, 32);
        assert_eq!(settings.ban_all_policy, BanAllPolicy::Rewrite);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_ban_all_policy_parse() {
        assert_eq!("rewrite".parse::<BanAllPolicy>().unwrap(), BanAllPolicy::Rewrite);
        assert_eq!("TRUNCATE".parse::<BanAllPolicy>().unwrap(), BanAllPolicy::Truncate);
        assert!("nuke".parse::<BanAllPolicy>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let settings = BotSettings {
            listen_addr: "not an address".to_owned(),
            ..BotSettings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidListenAddr(_))));

        let settings = BotSettings {
            queue_capacity: 0,
            ..BotSettings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::ZeroQueueCapacity)));

        let settings = BotSettings {
            users_path: PathBuf::from("KEYS.txt"),
            ..BotSettings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::SameFile(_))));
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: BotSettings =
            serde_json::from_str(r#"{"ban_all_policy": "truncate"}"#).unwrap();
        assert_eq!(settings.ban_all_policy, BanAllPolicy::Truncate);
        assert_eq!(settings.command_prefix, "/");
    }
}
