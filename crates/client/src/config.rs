//! Client configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use strand_core::config::{self, ConfigError};

/// Tunables of the client state machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Re-send calls that were sent but not answered before a disconnect.
    /// The server answers a repeated call from its session table instead of
    /// running it twice.
    pub resend_pending_methods: bool,
    /// Require every data message to be exactly one past the last one.
    pub strict_sequencing: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            resend_pending_methods: true,
            strict_sequencing: true,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        config::from_toml_str(contents)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        config::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ClientConfig::from_toml_str("strict_sequencing = false").unwrap();
        assert!(config.resend_pending_methods);
        assert!(!config.strict_sequencing);
        assert!(ClientConfig::from_toml_str("retries = 3").is_err());
    }
}
