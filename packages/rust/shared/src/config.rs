//! Application configuration for Curator.
//!
//! User config lives at `~/.curator/curator.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CuratorError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "curator.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".curator";

// ---------------------------------------------------------------------------
// Config structs (matching curator.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Curation service endpoint settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// QA item pagination.
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Defaults for new dataset generations.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Similarity analysis/cleaning settings.
    #[serde(default)]
    pub similarity: SimilarityConfig,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the curation service.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Transport timeout per request. Generation can take minutes.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Use the older `POST /generate/dataset/url` route.
    #[serde(default)]
    pub legacy_generate_route: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            legacy_generate_route: false,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".into()
}
fn default_timeout_secs() -> u64 {
    300
}

/// `[pagination]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Items per page for QA listings.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> u32 {
    10
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Target language for generated pairs (e.g. "en", "fr").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,

    /// Model used for QA generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_qa: Option<String>,

    /// Model used for source text cleaning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_cleaning: Option<String>,

    /// Duplicate threshold sent with the generation request.
    #[serde(default = "default_generation_threshold")]
    pub similarity_threshold: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            target_language: None,
            model_qa: None,
            model_cleaning: None,
            similarity_threshold: default_generation_threshold(),
        }
    }
}

fn default_generation_threshold() -> f64 {
    0.9
}

/// `[similarity]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Threshold for analyze/clean; the service default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

// ---------------------------------------------------------------------------
// Client config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime HTTP client configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the curation service.
    pub base_url: String,
    /// Transport timeout per request.
    pub timeout: Duration,
    /// Use the legacy generation route.
    pub legacy_generate_route: bool,
}

impl From<&AppConfig> for ClientConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.api.base_url.clone(),
            timeout: Duration::from_secs(config.api.timeout_secs),
            legacy_generate_route: config.api.legacy_generate_route,
        }
    }
}

impl ClientConfig {
    /// Client config pointing at `base_url` with default settings otherwise.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::from(&AppConfig::default())
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.curator/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| CuratorError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.curator/curator.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CuratorError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        CuratorError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CuratorError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CuratorError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CuratorError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject settings the client cannot work with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let base = Url::parse(&config.api.base_url).map_err(|e| {
        CuratorError::config(format!("invalid api.base_url '{}': {e}", config.api.base_url))
    })?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(CuratorError::config(format!(
            "api.base_url must be http or https, got '{}'",
            base.scheme()
        )));
    }

    if config.pagination.page_size == 0 {
        return Err(CuratorError::config("pagination.page_size must be at least 1"));
    }

    let thresholds = [
        ("generation.similarity_threshold", Some(config.generation.similarity_threshold)),
        ("similarity.threshold", config.similarity.threshold),
    ];
    for (key, value) in thresholds {
        if let Some(v) = value {
            if !(0.0..=1.0).contains(&v) {
                return Err(CuratorError::config(format!(
                    "{key} must be within 0.0..=1.0, got {v}"
                )));
            }
        }
    }

    Ok(())
}
