use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Collection roots the catalog is allowed to manage.
    #[serde(default)]
    pub album_roots: Vec<AlbumRootConfig>,

    /// Show per-album and per-tag item counts (costs one query per refresh).
    #[serde(default = "default_show_item_counts")]
    pub show_item_counts: bool,

    #[serde(default)]
    pub sidecar: SidecarConfig,

    #[serde(default)]
    pub trash: TrashConfig,

    #[serde(default)]
    pub thumbnails: ThumbnailConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlbumRootConfig {
    pub id: i32,
    pub path: PathBuf,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SidecarConfig {
    /// Suffix of the metadata sidecar written next to every image, without the dot.
    #[serde(default = "default_primary_suffix")]
    pub primary_suffix: String,

    /// Additional sidecar extensions (e.g. "pp3", "dop") that travel with an image.
    #[serde(default)]
    pub extensions: Vec<String>,
}

fn default_primary_suffix() -> String {
    "xmp".to_string()
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            primary_suffix: default_primary_suffix(),
            extensions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashConfig {
    #[serde(default = "default_trash_path")]
    pub path: PathBuf,
}

fn default_trash_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("photocat/.trash")
}

impl Default for TrashConfig {
    fn default() -> Self {
        Self {
            path: default_trash_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    #[serde(default = "default_thumb_cache_path")]
    pub path: PathBuf,
}

fn default_thumb_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("photocat/thumbnails")
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            path: default_thumb_cache_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_watch_enabled")]
    pub enabled: bool,

    /// Interval at which the controlling loop drains dirty paths and job events.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_watch_enabled() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: default_watch_enabled(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "photocat::album=debug".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files when journald is not used.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Prefer journald on Linux.
    #[serde(default = "default_journald")]
    pub journald: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_journald() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            journald: default_journald(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("photocat")
        .join("catalog.db")
}

fn default_show_item_counts() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            album_roots: Vec::new(),
            show_item_counts: default_show_item_counts(),
            sidecar: SidecarConfig::default(),
            trash: TrashConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load from `PHOTOCAT_CONFIG` or the default location, creating a default file when missing.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var_os("PHOTOCAT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(Self::config_path);
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid config file {}", config_path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("photocat")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
