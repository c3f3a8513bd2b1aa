//! Layered configuration.
//!
//! Sources are merged in this order, later ones winning:
//! 1. built-in defaults;
//! 2. a configuration file: either the path given explicitly, or any of
//!    `reel.toml`, `reel.yaml`, `reel.yml`, `reel.json` in the platform
//!    configuration directory;
//! 3. environment variables prefixed with `REEL_`, with `__` separating
//!    nested keys (`REEL_API__API_KEY`, `REEL_SYNC__HYDRATION_DELAY_MS`).
//!
//! Loading never validates; call [`Config::validate`] before talking to the
//! remote API.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use reel_assets::ImageSize;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "REEL_";
const FILE_STEM: &str = "reel";
const DATABASE_FILE: &str = "FlipTreeCoreData.sqlite";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", FILE_STEM)
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub images: ImagesConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
}

/// The remote listing API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub discover_url: String,
    pub api_key: String,
    pub language: String,
    pub sort_by: String,
    pub include_adult: bool,
    pub include_video: bool,
    /// Large on purpose: full-resolution artwork over a slow link should
    /// finish rather than time out.
    pub request_timeout_secs: u64,
}
impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            discover_url: "https://api.themoviedb.org/3/discover/movie".to_string(),
            api_key: String::new(),
            language: "en-US".to_string(),
            sort_by: "popularity.desc".to_string(),
            include_adult: false,
            include_video: false,
            request_timeout_secs: 100_000,
        }
    }
}
impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// The image host and which resolution tier each artwork kind uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    pub base_url: String,
    pub poster: ImageSize,
    pub backdrop: ImageSize,
}
impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            base_url: "https://image.tmdb.org/t/p".to_string(),
            poster: ImageSize::W185,
            backdrop: ImageSize::Original,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database: PathBuf,
}
impl Default for StoreConfig {
    fn default() -> Self {
        let database = match project_dirs() {
            Some(dirs) => dirs.data_dir().join(DATABASE_FILE),
            None => PathBuf::from(DATABASE_FILE),
        };
        Self { database }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Pause between merging a page and hydrating its artwork.
    pub hydration_delay_ms: u64,
    /// How often the connectivity monitor probes the API host.
    pub probe_interval_secs: u64,
}
impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            hydration_delay_ms: 1000,
            probe_interval_secs: 5,
        }
    }
}
impl SyncConfig {
    pub fn hydration_delay(&self) -> Duration {
        Duration::from_millis(self.hydration_delay_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

fn file_provider(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

impl Config {
    /// Load the configuration from defaults, a file and the environment.
    ///
    /// An explicit `path` must exist; the default locations are optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let files = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => vec![path.to_path_buf()],
            None => Self::default_files(),
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        for file in &files {
            tracing::debug!(path = %file.display(), "Merging configuration file");
            figment = file_provider(figment, file)?;
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract().or_raise(|| ErrorKind::Load)
    }

    /// Candidate files in the platform configuration directory.
    fn default_files() -> Vec<PathBuf> {
        let Some(dirs) = project_dirs() else {
            return Vec::new();
        };
        ["toml", "yaml", "yml", "json"]
            .into_iter()
            .map(|ext| dirs.config_dir().join(format!("{FILE_STEM}.{ext}")))
            .filter(|path| path.is_file())
            .collect()
    }

    /// Check the values needed to talk to the remote API.
    pub fn validate(&self) -> Result<()> {
        if self.api.api_key.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("api.api_key"));
        }
        if self.api.request_timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("api.request_timeout_secs"));
        }
        reel_remote::parse_endpoint(&self.api.discover_url).or_raise(|| ErrorKind::Invalid("api.discover_url"))?;
        reel_remote::parse_endpoint(&self.images.base_url).or_raise(|| ErrorKind::Invalid("images.base_url"))?;
        Ok(())
    }
}
