//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use strand_core::config::{self, ConfigError};

/// Tunables of the connection hub.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Method outcomes remembered per session for replaying re-sent calls.
    pub method_result_retention: usize,
    /// Sessions kept after their connection closes, so a reconnecting
    /// client can resume.
    pub retained_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            method_result_retention: 256,
            retained_sessions: 64,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        config::from_toml_str(contents)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        config::load(path)
    }

    /// Loads `path`, falling back to defaults when it is missing or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        config::load_or_default(path)
    }
}
