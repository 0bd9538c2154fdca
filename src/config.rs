//! Shim configuration
//!
//! The export layer reads its configuration once, from the JSON file named by
//! the [`CONFIG_ENV_VAR`] environment variable. Missing keys take their
//! defaults, so `{}` is a valid configuration.
//!
//! ```json
//! { "hex_mode": "lenient", "loop_count": 1 }
//! ```

use crate::error::ConfigError;
use crate::hex::HexMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable holding the path of the JSON configuration file
pub const CONFIG_ENV_VAR: &str = "GME_SHIM_CONFIG";

/// Configuration shared by the session and the built-in engine
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    /// Decoder applied to textual buffer addresses
    pub hex_mode: HexMode,
    /// Extra passes through the loop section of looping songs before the
    /// track reports its end
    pub loop_count: u32,
}

impl ShimConfig {
    /// Parse a configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Configuration named by [`CONFIG_ENV_VAR`], or the defaults
    ///
    /// A file that cannot be read or parsed is reported through `log` and
    /// replaced by the defaults.
    pub fn from_env() -> Self {
        let Some(path) = std::env::var_os(CONFIG_ENV_VAR) else {
            return Self::default();
        };
        match Self::from_file(&path) {
            Ok(config) => {
                log::debug!("loaded shim config from {}: {config:?}", Path::new(&path).display());
                config
            }
            Err(e) => {
                log::warn!("ignoring {CONFIG_ENV_VAR}: {e}");
                Self::default()
            }
        }
    }

    /// Set the textual address decoder
    pub fn hex_mode(mut self, mode: HexMode) -> Self {
        self.hex_mode = mode;
        self
    }

    /// Set the number of extra loop passes
    pub fn loop_count(mut self, count: u32) -> Self {
        self.loop_count = count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_object_gives_defaults() {
        let config = ShimConfig::from_json("{}").unwrap();
        assert_eq!(config, ShimConfig::default());
        assert_eq!(config.hex_mode, HexMode::Strict);
        assert_eq!(config.loop_count, 0);
    }

    #[test]
    fn parses_all_fields() {
        let config = ShimConfig::from_json(r#"{"hex_mode":"lenient","loop_count":3}"#).unwrap();
        assert_eq!(config, ShimConfig::default().hex_mode(HexMode::Lenient).loop_count(3));
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(matches!(
            ShimConfig::from_json(r#"{"hex_mode":"loose"}"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"loop_count":2}"#).unwrap();
        let config = ShimConfig::from_file(file.path()).unwrap();
        assert_eq!(config.loop_count, 2);

        let missing = ShimConfig::from_file("/definitely/not/here.json");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn env_config_falls_back_to_defaults() {
        let mut broken = tempfile::NamedTempFile::new().unwrap();
        broken.write_all(b"{ not json").unwrap();
        std::env::set_var(CONFIG_ENV_VAR, broken.path());
        assert_eq!(ShimConfig::from_env(), ShimConfig::default());

        std::env::set_var(CONFIG_ENV_VAR, "/definitely/not/here.json");
        assert_eq!(ShimConfig::from_env(), ShimConfig::default());

        let mut valid = tempfile::NamedTempFile::new().unwrap();
        valid.write_all(br#"{"hex_mode":"lenient"}"#).unwrap();
        std::env::set_var(CONFIG_ENV_VAR, valid.path());
        assert_eq!(ShimConfig::from_env().hex_mode, HexMode::Lenient);

        std::env::remove_var(CONFIG_ENV_VAR);
        assert_eq!(ShimConfig::from_env(), ShimConfig::default());
    }
}
