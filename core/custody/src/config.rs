//! Custody configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use pagevault_common::{Error, Result};

/// Lifetime of a session token and of the cached password key (24 hours).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;

/// Settings for a key custody deployment.
///
/// Stored as JSON. Missing fields take their defaults, so an empty object is
/// a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    /// SQLite database file. `None` lets the caller pick a location.
    pub database_path: Option<PathBuf>,
    /// Seconds a session token and its cached password key stay valid.
    pub session_ttl_secs: u64,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

impl CustodyConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON
    /// - Zero session TTL
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Session lifetime as a duration.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.session_ttl_secs == 0 {
            return Err(Error::InvalidInput(
                "session_ttl_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = CustodyConfig::default();
        assert_eq!(config.session_ttl(), Duration::from_secs(86_400));
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = CustodyConfig::from_json("{}").unwrap();
        assert_eq!(config, CustodyConfig::default());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let result = CustodyConfig::from_json(r#"{"session_ttl_secs": 0}"#);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"database_path": "/var/lib/pagevault/pages.db", "session_ttl_secs": 600}}"#
        )
        .unwrap();

        let config = CustodyConfig::load(file.path()).unwrap();
        assert_eq!(config.session_ttl_secs, 600);
        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/var/lib/pagevault/pages.db"))
        );

        let restored = CustodyConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = CustodyConfig::load("/nonexistent/pagevault.json");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
