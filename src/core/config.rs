//! core::config
//!
//! Repository configuration: flat key/value pairs persisted as JSON.
//!
//! # Recognised keys
//!
//! - `user.name` - identity name for authored commits
//! - `user.email` - identity email for authored commits
//!
//! Unrecognised keys are preserved verbatim. When the identity keys are
//! absent, the `VCS_AUTHOR_NAME` / `VCS_AUTHOR_EMAIL` environment
//! variables are consulted before falling back to placeholders.
//!
//! # Example
//!
//! ```ignore
//! let mut config = Config::load(&paths)?;
//! config.set("user.name", "Ada Lovelace");
//! config.save(&paths)?;
//!
//! let identity = config.identity();
//! assert_eq!(identity.name, "Ada Lovelace");
//! ```

use std::collections::BTreeMap;
use std::fs;

use thiserror::Error;

use crate::core::paths::RepoPaths;

/// Errors from configuration handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading or writing the config file.
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not a JSON string-to-string mapping.
    #[error("malformed config file: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Configured key for the identity name.
pub const KEY_USER_NAME: &str = "user.name";

/// Configured key for the identity email.
pub const KEY_USER_EMAIL: &str = "user.email";

/// The committing user's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// Flat key/value repository configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    values: BTreeMap<String, String>,
}

impl Config {
    /// Load the configuration, returning an empty one when the file
    /// does not exist yet.
    pub fn load(paths: &RepoPaths) -> Result<Self, ConfigError> {
        let path = paths.config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        let values = serde_json::from_str(&content)?;
        Ok(Self { values })
    }

    /// Persist the configuration.
    pub fn save(&self, paths: &RepoPaths) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&self.values)?;
        fs::write(paths.config_path(), content)?;
        Ok(())
    }

    /// Get a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Set a value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Remove a value; returns whether it was present.
    pub fn unset(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    /// Resolve the identity for authored commits.
    ///
    /// Falls back to `VCS_AUTHOR_NAME` / `VCS_AUTHOR_EMAIL` from the
    /// environment, then to placeholders, so commit creation never
    /// fails for lack of configuration.
    pub fn identity(&self) -> Identity {
        let name = self
            .get(KEY_USER_NAME)
            .map(str::to_owned)
            .or_else(|| std::env::var("VCS_AUTHOR_NAME").ok())
            .unwrap_or_else(|| "Unknown".into());
        let email = self
            .get(KEY_USER_EMAIL)
            .map(str::to_owned)
            .or_else(|| std::env::var("VCS_AUTHOR_EMAIL").ok())
            .unwrap_or_else(|| "unknown@example.com".into());
        Identity { name, email }
    }
}
