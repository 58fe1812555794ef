//! # Storage Configuration
//!
//! Operator-tunable settings for the storage engines and the connection
//! descriptor that selects one.
//!
//! Descriptor grammar: `driver://dbname[/username[/password]]`.

use crate::VaultError;
use crate::primitives::{
    DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS, SQLITE_FILE_EXTENSION,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// STORAGE CONFIG
// =============================================================================

/// Tuning for the relational engine. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding SQLite database files.
    pub data_dir: PathBuf,
    /// Number of writer threads, each with its own connection.
    pub workers: usize,
    /// Maximum number of queued, not yet applied writes.
    pub queue_capacity: usize,
    /// How long a connection waits on a locked database.
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StorageConfig {
    /// Defaults with a different data directory.
    #[must_use]
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.workers == 0 {
            return Err(VaultError::Connection(
                "invalid storage configuration: workers must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(VaultError::Connection(
                "invalid storage configuration: queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

// =============================================================================
// CONNECTION DESCRIPTOR
// =============================================================================

/// Supported database drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Sqlite,
}

/// A parsed `driver://dbname[/username[/password]]` descriptor.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub driver: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectionDescriptor {
    /// Parse a descriptor string.
    ///
    /// Only the shape is checked here; an unsupported driver is reported
    /// by [`driver`](Self::driver) when a connection is attempted.
    pub fn parse(uri: &str) -> Result<Self, VaultError> {
        let (driver, rest) = uri
            .split_once("://")
            .ok_or_else(|| VaultError::InvalidDescriptor(format!("missing '://' in {:?}", uri)))?;
        if driver.is_empty() {
            return Err(VaultError::InvalidDescriptor("empty driver".to_string()));
        }

        let mut parts = rest.splitn(3, '/');
        let database = parts.next().unwrap_or_default();
        if database.is_empty() {
            return Err(VaultError::InvalidDescriptor(
                "empty database name".to_string(),
            ));
        }
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        let username = parts.next().and_then(non_empty);
        let password = parts.next().and_then(non_empty);

        Ok(Self {
            driver: driver.to_ascii_lowercase(),
            database: database.to_string(),
            username,
            password,
        })
    }

    /// Resolve the driver name.
    pub fn driver(&self) -> Result<Driver, VaultError> {
        match self.driver.as_str() {
            "sqlite" | "sqlite3" => Ok(Driver::Sqlite),
            other => Err(VaultError::Connection(format!(
                "unsupported driver: {}",
                other
            ))),
        }
    }

    /// Location of the SQLite database file under a data directory.
    #[must_use]
    pub fn sqlite_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(format!("{}.{}", self.database, SQLITE_FILE_EXTENSION))
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.driver, self.database)?;
        if let Some(user) = &self.username {
            write!(f, "/{}", user)?;
        }
        if self.password.is_some() {
            f.write_str("/****")?;
        }
        Ok(())
    }
}

// Debug goes through Display so the password never reaches a log line.
impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionDescriptor({})", self)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_descriptor() {
        let d = ConnectionDescriptor::parse("sqlite3://atoms/alice/s3cret").expect("parse");
        assert_eq!(d.driver, "sqlite3");
        assert_eq!(d.database, "atoms");
        assert_eq!(d.username.as_deref(), Some("alice"));
        assert_eq!(d.password.as_deref(), Some("s3cret"));
        assert_eq!(d.driver(), Ok(Driver::Sqlite));
    }

    #[test]
    fn parse_database_only() {
        let d = ConnectionDescriptor::parse("sqlite://atoms").expect("parse");
        assert_eq!(d.database, "atoms");
        assert_eq!(d.username, None);
        assert_eq!(d.password, None);
    }

    #[test]
    fn malformed_descriptors_are_rejected() {
        for uri in ["atoms", "://atoms", "sqlite://", "sqlite:///alice"] {
            assert!(
                matches!(
                    ConnectionDescriptor::parse(uri),
                    Err(VaultError::InvalidDescriptor(_))
                ),
                "{} should not parse",
                uri
            );
        }
    }

    #[test]
    fn unknown_driver_fails_at_connect() {
        let d = ConnectionDescriptor::parse("oracle://atoms").expect("shape is fine");
        assert!(matches!(d.driver(), Err(VaultError::Connection(_))));
    }

    #[test]
    fn password_is_masked() {
        let d = ConnectionDescriptor::parse("sqlite://atoms/alice/s3cret").expect("parse");
        assert_eq!(d.to_string(), "sqlite://atoms/alice/****");
        assert!(!format!("{:?}", d).contains("s3cret"));
    }

    #[test]
    fn sqlite_path_uses_data_dir() {
        let d = ConnectionDescriptor::parse("sqlite://atoms").expect("parse");
        assert_eq!(
            d.sqlite_path(Path::new("/var/lib/av")),
            PathBuf::from("/var/lib/av/atoms.sqlite")
        );
    }

    #[test]
    fn config_defaults_and_validation() {
        let config = StorageConfig::default();
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert!(config.validate().is_ok());

        let zero_workers = StorageConfig {
            workers: 0,
            ..StorageConfig::default()
        };
        assert!(matches!(
            zero_workers.validate(),
            Err(VaultError::Connection(_))
        ));

        let zero_capacity = StorageConfig {
            queue_capacity: 0,
            ..StorageConfig::default()
        };
        assert!(matches!(
            zero_capacity.validate(),
            Err(VaultError::Connection(_))
        ));
    }
}
