//! TOML configuration loading shared by the server and client configs.

use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Errors raised while reading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Parses a configuration from TOML text.
pub fn from_toml_str<T: DeserializeOwned>(contents: &str) -> Result<T, ConfigError> {
    Ok(toml::from_str(contents)?)
}

/// Reads and parses a configuration file.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_toml_str(&contents)
}

/// Loads a configuration file, falling back to defaults when it is missing
/// or invalid.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }
    match load(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("config load failed, using defaults: {e}");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Deserialize)]
    #[serde(default)]
    struct Sample {
        retries: u32,
        name: String,
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let sample: Sample = from_toml_str("retries = 3").unwrap();
        assert_eq!(
            sample,
            Sample {
                retries: 3,
                name: String::new()
            }
        );
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = from_toml_str::<Sample>("retries = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let sample: Sample = load_or_default(Path::new("/nonexistent/strand.toml"));
        assert_eq!(sample, Sample::default());
        assert!(matches!(
            load::<Sample>(Path::new("/nonexistent/strand.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
