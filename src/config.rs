//! Configuration module for the municipality search service.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `MS_` and use double underscores
//! to separate nested levels:
//! - `MS_DATA__EMBEDDINGS=/srv/emb.npy` sets `data.embeddings`
//! - `MS_SEARCH__MAX_TOP_K=50` sets `search.max_top_k`
//! - `MS_SERVER__BIND=0.0.0.0:8000` sets `server.bind`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding the settings file, searched for in the current
/// directory and its ancestors.
pub const CONFIG_DIR: &str = ".munisearch";

const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "MS_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .munisearch is located).
    /// Relative data paths are resolved against it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Snapshot file locations
    #[serde(default)]
    pub data: DataConfig,

    /// Query encoder settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Search request limits
    #[serde(default)]
    pub search: SearchConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DataConfig {
    /// Embedding matrix (.npy, or .json array of arrays)
    #[serde(default = "default_embeddings_path")]
    pub embeddings: PathBuf,

    /// Code → row index mapping (JSON object)
    #[serde(default = "default_mapping_path")]
    pub mapping: PathBuf,

    /// Municipality metadata table (CSV with code, name, prefecture)
    #[serde(default = "default_metadata_path")]
    pub metadata: PathBuf,

    /// Integrity manifest. Defaults to `manifest.json` next to the matrix,
    /// checked only if it exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,

    /// Reject mapping gaps and duplicate rows instead of repairing them
    #[serde(default)]
    pub strict_mapping: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    /// fastembed model name
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Where downloaded model files are cached
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Show a progress bar while the model downloads
    #[serde(default = "default_true")]
    pub show_download_progress: bool,

    /// Text prepended to every query before encoding
    #[serde(default)]
    pub query_prefix: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Result count when a request does not specify one
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Upper bound applied to requested result counts (unbounded if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_top_k: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// HTTP server bind address
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Per-request deadline for encode + rank, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_embeddings_path() -> PathBuf {
    PathBuf::from("data/cleaned/municipality_embeddings.npy")
}
fn default_mapping_path() -> PathBuf {
    PathBuf::from("data/cleaned/municipality_embedding_map.json")
}
fn default_metadata_path() -> PathBuf {
    PathBuf::from("data/cleaned/municipalities_cleaned.csv")
}
fn default_model_name() -> String {
    "MultilingualE5Small".to_string()
}
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("munisearch").join("models"))
        .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("models"))
}
fn default_true() -> bool {
    true
}
fn default_top_k() -> usize {
    5
}
fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            data: DataConfig::default(),
            model: ModelConfig::default(),
            search: SearchConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            embeddings: default_embeddings_path(),
            mapping: default_mapping_path(),
            metadata: default_metadata_path(),
            manifest: None,
            strict_mapping: false,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            cache_dir: default_cache_dir(),
            show_download_progress: true,
            query_prefix: String::new(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SearchConfig {
    /// Requested count, defaulted and clamped to `max_top_k`.
    #[must_use]
    pub fn effective_top_k(&self, requested: Option<usize>) -> usize {
        let k = requested.unwrap_or(self.default_top_k);
        match self.max_top_k {
            Some(max) => k.min(max),
            None => k,
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .munisearch directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If workspace_root is not set in config, detect it
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        let path = path.as_ref();
        Self::figment(path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = path
                        .parent()
                        .filter(|dir| dir.ends_with(CONFIG_DIR))
                        .and_then(Path::parent)
                        .map(Path::to_path_buf);
                }
                settings
            })
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Use double underscore (__) to separate nested levels
            // Single underscore (_) remains as is within field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".") // Double underscore becomes dot
                    .into()
            }))
    }

    /// Find the workspace root by looking for .munisearch directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the workspace root directory (where .munisearch is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'munisearch init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Resolve a configured path against the workspace root.
    #[must_use]
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.workspace_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Manifest location: the configured path, or `manifest.json` beside the matrix.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        match &self.data.manifest {
            Some(path) => self.resolve_path(path),
            None => self
                .resolve_path(&self.data.embeddings)
                .with_file_name(crate::vector::MANIFEST_FILE_NAME),
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# munisearch configuration file

# Version of the configuration schema
version = 1

[data]
# Embedding matrix produced by the pipeline (.npy float32 N x D, or .json)
embeddings = "data/cleaned/municipality_embeddings.npy"

# Municipality code -> matrix row
mapping = "data/cleaned/municipality_embedding_map.json"

# Display metadata (CSV with code, name, prefecture columns)
metadata = "data/cleaned/municipalities_cleaned.csv"

# Optional integrity manifest; defaults to manifest.json beside the matrix
# manifest = "data/cleaned/manifest.json"

# Fail startup on mapping gaps and duplicate rows instead of filling them
strict_mapping = false

[model]
# Must be the model that produced the embedding matrix
name = "MultilingualE5Small"

# Model download cache
cache_dir = "{}"

show_download_progress = true

# Text prepended to every query (E5 models expect "query: ")
query_prefix = ""

[search]
# Result count when a request does not ask for one
default_top_k = 5

# Upper bound on requested result counts (unbounded when unset)
# max_top_k = 100

[server]
bind = "127.0.0.1:8080"

# Deadline for one search request, in milliseconds
request_timeout_ms = 30000
"#,
            default_cache_dir().display()
        );

        std::fs::write(&config_path, template)?;

        if force {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
        }

        Ok(config_path)
    }
}
