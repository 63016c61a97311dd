//! Application configuration for leadfill.
//!
//! User config lives at `~/.leadfill/leadfill.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LeadfillError, Result};
use crate::types::DEFAULT_COLUMNS;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadfill.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadfill";

// ---------------------------------------------------------------------------
// Config structs (matching leadfill.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Lookup sources and their timing.
    #[serde(default)]
    pub lookup: LookupConfig,

    /// Output projection and resume policy.
    #[serde(default)]
    pub output: OutputConfig,
}

/// How enriched records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// JSON list appended to after every batch.
    #[default]
    Json,
    /// JSON list written once at the end of the run.
    JsonSnapshot,
    /// CSV table with a header row, written once at the end of the run.
    Table,
    /// Excel workbook with a header row, written once at the end of the run.
    Xlsx,
}

impl OutputFormat {
    /// Whether the format is flushed batch by batch.
    pub fn is_incremental(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Parallel workers, each with its own lookup session.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Records per flushed batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Run lookup sessions without a visible window.
    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default)]
    pub output_format: OutputFormat,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: default_batch_size(),
            headless: true,
            output_format: OutputFormat::default(),
        }
    }
}

fn default_workers() -> usize {
    1
}
fn default_batch_size() -> usize {
    50
}
fn default_true() -> bool {
    true
}

/// `[lookup]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Providers applied to every record, in order.
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound for one provider call on one record.
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    /// Pause before each registry lookup.
    #[serde(default = "default_pacing")]
    pub pacing_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Company registry search endpoint; the query is appended.
    #[serde(default = "default_registry_url")]
    pub registry_base_url: String,

    /// Web search endpoint; the query is appended.
    #[serde(default = "default_search_url")]
    pub search_base_url: String,

    /// Web search endpoint restricted to the phone directory.
    #[serde(default = "default_directory_url")]
    pub directory_search_url: String,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            request_timeout_secs: default_request_timeout(),
            provider_timeout_secs: default_provider_timeout(),
            pacing_ms: default_pacing(),
            user_agent: default_user_agent(),
            registry_base_url: default_registry_url(),
            search_base_url: default_search_url(),
            directory_search_url: default_directory_url(),
        }
    }
}

impl LookupConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

fn default_providers() -> Vec<String> {
    vec!["registry".into(), "network".into()]
}
fn default_request_timeout() -> u64 {
    30
}
fn default_provider_timeout() -> u64 {
    15
}
fn default_pacing() -> u64 {
    2500
}
fn default_user_agent() -> String {
    concat!("leadfill/", env!("CARGO_PKG_VERSION")).into()
}
fn default_registry_url() -> String {
    "https://www.pappers.fr/recherche?q=".into()
}
fn default_search_url() -> String {
    "https://www.google.com/search?q=".into()
}
fn default_directory_url() -> String {
    "https://www.google.com/search?q=site%3Apagesjaunes.fr/pagesblanches+".into()
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Ordered keys of every output element.
    #[serde(default = "default_columns")]
    pub columns: Vec<String>,

    /// Skip input records already flushed to an existing output file.
    #[serde(default = "default_true")]
    pub resume: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            resume: true,
        }
    }
}

fn default_columns() -> Vec<String> {
    DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Session config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Settings for one isolated lookup session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub headless: bool,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl From<&AppConfig> for SessionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            headless: config.defaults.headless,
            user_agent: config.lookup.user_agent.clone(),
            request_timeout: Duration::from_secs(config.lookup.request_timeout_secs),
        }
    }
}

impl AppConfig {
    /// Reject settings the run cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.defaults.workers == 0 {
            return Err(LeadfillError::validation("workers must be at least 1"));
        }
        if self.defaults.batch_size == 0 {
            return Err(LeadfillError::validation("batch_size must be at least 1"));
        }
        if self.output.columns.is_empty() {
            return Err(LeadfillError::validation("output.columns must not be empty"));
        }
        if self.lookup.providers.is_empty() {
            return Err(LeadfillError::validation("lookup.providers must not be empty"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadfill/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadfillError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadfill/leadfill.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| LeadfillError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LeadfillError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadfillError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadfillError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadfillError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
