//! Store configuration.
//!
//! # Environment variables
//!
//! - `VFS_STORE_ROOT`: sandbox root, and the host directory for the disk backend - required
//! - `VFS_STORE_CASE`: path comparison policy (`sensitive|insensitive`) - default: `sensitive`
//! - `VFS_STORE_COPY_POLL_MS`: delay between copy status polls - default: `100`
//! - `VFS_STORE_BACKEND`: `disk|blob|append-blob|page-blob|share` - default: `disk`

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::core::CaseSensitivity;
use crate::vfs::BlobKind;

const DEFAULT_COPY_POLL_MS: u64 = 100;

const ROOT_VAR: &str = "VFS_STORE_ROOT";
const CASE_VAR: &str = "VFS_STORE_CASE";
const COPY_POLL_VAR: &str = "VFS_STORE_COPY_POLL_MS";
const BACKEND_VAR: &str = "VFS_STORE_BACKEND";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    MissingVariable(String),

    #[error("invalid case sensitivity: {0}. Valid options: sensitive, insensitive")]
    InvalidCase(String),

    #[error("invalid backend: {0}. Valid options: disk, blob, append-blob, page-blob, share")]
    InvalidBackend(String),

    #[error("failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Settings shared by every backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Absolute root every caller path is resolved against. There is no default; an
    /// unset root is rejected when a store is opened.
    pub root: String,
    pub case_sensitivity: CaseSensitivity,
    /// Delay between two status polls of a pending copy.
    pub copy_poll_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: String::new(),
            case_sensitivity: CaseSensitivity::default(),
            copy_poll_interval: Duration::from_millis(DEFAULT_COPY_POLL_MS),
        }
    }
}

impl StoreConfig {
    pub fn new(root: impl Into<String>) -> Self {
        Self::default().with_root(root)
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_case_sensitivity(mut self, case: CaseSensitivity) -> Self {
        self.case_sensitivity = case;
        self
    }

    pub fn with_copy_poll_interval(mut self, interval: Duration) -> Self {
        self.copy_poll_interval = interval;
        self
    }

    /// Loads the configuration from `VFS_STORE_*` variables, with defaults for unset
    /// optional ones. `VFS_STORE_ROOT` must be set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`StoreConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = lookup(ROOT_VAR)
            .filter(|root| !root.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVariable(ROOT_VAR.to_string()))?;
        let mut config = Self::new(root);

        if let Some(case) = lookup(CASE_VAR) {
            config.case_sensitivity = match case.trim().to_lowercase().as_str() {
                "sensitive" => CaseSensitivity::Sensitive,
                "insensitive" => CaseSensitivity::Insensitive,
                _ => return Err(ConfigError::InvalidCase(case)),
            };
        }
        if let Some(millis) = lookup(COPY_POLL_VAR) {
            let millis = millis
                .trim()
                .parse::<u64>()
                .map_err(|err| ConfigError::ParseError {
                    field: COPY_POLL_VAR.to_string(),
                    error: err.to_string(),
                })?;
            config.copy_poll_interval = Duration::from_millis(millis);
        }

        Ok(config)
    }
}

/// Storage implementation selected by [`open_store`](crate::open_store).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Backend {
    /// Local directory tree under the configured root.
    #[default]
    Disk,
    /// Flat object storage with inferred directories.
    Blob(BlobKind),
    /// File share with real directory nodes.
    Share,
}

impl Backend {
    /// Reads `VFS_STORE_BACKEND`, defaulting to [`Backend::Disk`].
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(BACKEND_VAR) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Backend::default()),
        }
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disk" => Ok(Backend::Disk),
            "blob" | "block-blob" => Ok(Backend::Blob(BlobKind::Block)),
            "append-blob" => Ok(Backend::Blob(BlobKind::Append)),
            "page-blob" => Ok(Backend::Blob(BlobKind::Page)),
            "share" => Ok(Backend::Share),
            _ => Err(ConfigError::InvalidBackend(s.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::Disk => "disk",
            Backend::Blob(BlobKind::Block) => "blob",
            Backend::Blob(BlobKind::Append) => "append-blob",
            Backend::Blob(BlobKind::Page) => "page-blob",
            Backend::Share => "share",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[("VFS_STORE_ROOT", "/data")])).unwrap();
        assert_eq!(config, StoreConfig::new("/data"));
        assert_eq!(config.case_sensitivity, CaseSensitivity::Sensitive);
        assert_eq!(config.copy_poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_root_is_required() {
        let err = StoreConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVariable(ref name) if name == "VFS_STORE_ROOT"));

        let err = StoreConfig::from_lookup(lookup(&[("VFS_STORE_ROOT", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVariable(_)));

        assert!(StoreConfig::default().root.is_empty());
    }

    #[test]
    fn test_reads_variables() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("VFS_STORE_ROOT", "/data"),
            ("VFS_STORE_CASE", "Insensitive"),
            ("VFS_STORE_COPY_POLL_MS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.root, "/data");
        assert_eq!(config.case_sensitivity, CaseSensitivity::Insensitive);
        assert_eq!(config.copy_poll_interval, Duration::from_millis(5));
    }

    #[test]
    fn test_invalid_values() {
        let err = StoreConfig::from_lookup(lookup(&[
            ("VFS_STORE_ROOT", "/data"),
            ("VFS_STORE_CASE", "maybe"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCase(_)));

        let err = StoreConfig::from_lookup(lookup(&[
            ("VFS_STORE_ROOT", "/data"),
            ("VFS_STORE_COPY_POLL_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::new("/srv")
            .with_case_sensitivity(CaseSensitivity::Insensitive)
            .with_copy_poll_interval(Duration::ZERO);
        assert_eq!(config.root, "/srv");
        assert_eq!(config.copy_poll_interval, Duration::ZERO);
    }

    #[test]
    fn test_backend_names() {
        for backend in [
            Backend::Disk,
            Backend::Blob(BlobKind::Block),
            Backend::Blob(BlobKind::Append),
            Backend::Blob(BlobKind::Page),
            Backend::Share,
        ] {
            assert_eq!(backend.to_string().parse::<Backend>().unwrap(), backend);
        }
        assert!("ftp".parse::<Backend>().is_err());
    }
}
