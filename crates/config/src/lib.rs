//! Configuration for the tagstash analysis cache.
//!
//! Sources are layered, lowest priority first:
//! 1. Built-in defaults ([`Config::default`]).
//! 2. An optional config file, format picked by extension (`.toml`, `.yaml`,
//!    `.yml`, `.json`).
//! 3. Environment variables prefixed with `TAGSTASH_`, using `__` to reach
//!    nested keys (`TAGSTASH_STORE__BACKEND=sqlite`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "TAGSTASH_";
const DEFAULT_STORE_FILE: &str = "analysis.db";
const LOCK_SUFFIX: &str = ".lock";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub lock: LockConfig,
    pub key: KeyConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Location of the store file.
    pub path: PathBuf,
    /// Storage engine name. Unset means the preferred engine of this build.
    pub backend: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path(), backend: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Location of the lock file. Unset means the store path plus `.lock`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub strategy: KeyStrategy,
}

/// How cache keys are derived from a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyStrategy {
    /// Path, modification time and size. Cheap, but blind to edits that keep
    /// both the size and the (second-resolution) timestamp.
    #[default]
    Fingerprint,
    /// Path, BLAKE3 hash of the contents and size. Reads every file in full.
    ContentHash,
}

fn default_store_path() -> PathBuf {
    ProjectDirs::from("", "", "tagstash")
        .map(|dirs| dirs.cache_dir().join(DEFAULT_STORE_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_FILE))
}

impl Config {
    /// Load configuration from defaults, an optional file, and the environment.
    ///
    /// A file that is named but missing is an error rather than being skipped.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            if !file.is_file() {
                exn::bail!(ErrorKind::NotFound(file.to_path_buf()));
            }
            figment = match file.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file_exact(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(file)),
                Some("json") => figment.merge(Json::file_exact(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
            };
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        tracing::debug!(?config, "Configuration loaded");
        Ok(config)
    }

    /// The lock file path, derived from the store path unless set explicitly.
    pub fn lock_path(&self) -> PathBuf {
        self.lock.path.clone().unwrap_or_else(|| {
            let mut name = OsString::from(self.store.path.as_os_str());
            name.push(LOCK_SUFFIX);
            PathBuf::from(name)
        })
    }
}
