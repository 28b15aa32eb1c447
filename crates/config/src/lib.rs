//! Configuration loading for quire repositories.
//!
//! Values are layered, later layers winning:
//!
//! 1. built-in defaults,
//! 2. a configuration file (TOML, YAML or JSON, picked by extension),
//! 3. environment variables prefixed with `QUIRE_` (e.g. `QUIRE_REPOSITORY`).
//!
//! ```toml
//! repository = "/home/me/papers"
//! documents = "/home/me/papers/doc"
//! create = true
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "QUIRE_";
/// Document directory name used when `documents` is not configured.
pub const DEFAULT_DOCUMENTS_DIR: &str = "doc";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Repository root holding the metadata, bibliography and cache areas.
    pub repository: PathBuf,
    /// Document root. Defaults to `<repository>/doc`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<PathBuf>,
    /// Create missing roots instead of failing.
    #[serde(default)]
    pub create: bool,
    /// Overrides the version string cache entries are stamped with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_version: Option<String>,
}

// Only the optional fields; `repository` has no sensible default.
#[derive(Serialize)]
struct Defaults {
    create: bool,
}

impl Config {
    pub fn new(repository: impl Into<PathBuf>) -> Self {
        Self { repository: repository.into(), documents: None, create: false, cache_version: None }
    }

    /// Resolved document root.
    pub fn documents(&self) -> PathBuf {
        self.documents.clone().unwrap_or_else(|| self.repository.join(DEFAULT_DOCUMENTS_DIR))
    }

    /// Platform configuration file location (e.g. `~/.config/quire/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "quire").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Build the layered [`Figment`] without extracting it.
    ///
    /// `file` is added only if it exists; use [`load`](Self::load) to require it.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Defaults { create: false }));
        if let Some(file) = file.filter(|f| f.is_file()) {
            figment = match file.extension().and_then(|e| e.to_str()) {
                Some("toml") => figment.merge(Toml::file(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Load configuration from `file` (which must exist) or, when `None`,
    /// from [`default_path`](Self::default_path) if present, then apply
    /// environment overrides.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file = match file {
            Some(file) if !file.is_file() => exn::bail!(ErrorKind::NotFound(file.to_path_buf())),
            Some(file) => Some(file.to_path_buf()),
            None => Self::default_path(),
        };
        tracing::debug!(file = ?file, "Loading configuration");
        Self::from_figment(&Self::figment(file.as_deref())?)
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract().map_err(|e| ErrorKind::Invalid(e.to_string()))?;
        if config.repository.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("repository must not be empty".to_string()));
        }
        Ok(config)
    }
}
