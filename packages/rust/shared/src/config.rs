//! Application configuration for assetenrich.
//!
//! User config lives at `~/.assetenrich/assetenrich.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::date::{DEFAULT_PREFIXES, DateNormalizer};
use crate::error::{EnrichError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "assetenrich.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".assetenrich";

/// Placeholder substituted with the lookup key in `lookup.url_template`.
pub const KEY_PLACEHOLDER: &str = "{key}";

// ---------------------------------------------------------------------------
// Config structs (matching assetenrich.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Batch defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Input spreadsheet layout and filter.
    #[serde(default)]
    pub source: SourceConfig,

    /// Lookup provider settings.
    #[serde(default)]
    pub lookup: LookupConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Number of concurrent lookup workers.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Per-lookup timeout in seconds.
    #[serde(default = "default_lookup_timeout_secs")]
    pub lookup_timeout_secs: u64,

    /// JSON checkpoint written after each batch.
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: String,

    /// Append-only failure log.
    #[serde(default = "default_failure_log_path")]
    pub failure_log_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            lookup_timeout_secs: default_lookup_timeout_secs(),
            checkpoint_path: default_checkpoint_path(),
            failure_log_path: default_failure_log_path(),
        }
    }
}

fn default_pool_size() -> usize {
    5
}
fn default_lookup_timeout_secs() -> u64 {
    30
}
fn default_checkpoint_path() -> String {
    "records.json".into()
}
fn default_failure_log_path() -> String {
    "error.log".into()
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Column used to select which rows are enriched.
    #[serde(default = "default_category_column")]
    pub category_column: String,

    /// Case-insensitive substring the category column must contain.
    #[serde(default = "default_category")]
    pub category: String,

    /// Column holding the asset id.
    #[serde(default = "default_identity_column")]
    pub identity_column: String,

    /// Column holding the serial number.
    #[serde(default = "default_lookup_key_column")]
    pub lookup_key_column: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            category_column: default_category_column(),
            category: default_category(),
            identity_column: default_identity_column(),
            lookup_key_column: default_lookup_key_column(),
        }
    }
}

fn default_category_column() -> String {
    "Manufacturer".into()
}
fn default_category() -> String {
    "Dell".into()
}
fn default_identity_column() -> String {
    "Asset ID".into()
}
fn default_lookup_key_column() -> String {
    "Serial number".into()
}

/// `[lookup]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Page URL; `{key}` is replaced with the serial number.
    #[serde(default = "default_url_template")]
    pub url_template: String,

    /// CSS selector of the element holding the warranty date.
    #[serde(default = "default_selector")]
    pub selector: String,

    /// Status words stripped from the scraped text before parsing.
    #[serde(default = "default_strip_prefixes")]
    pub strip_prefixes: Vec<String>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
            selector: default_selector(),
            strip_prefixes: default_strip_prefixes(),
        }
    }
}

fn default_url_template() -> String {
    "https://www.dell.com/support/productsmfe/en-us/productdetails?selection={key}\
     &assettype=svctag&appname=warranty&inccomponents=false&isolated=false"
        .into()
}
fn default_selector() -> String {
    "#ps-inlineWarranty p".into()
}
fn default_strip_prefixes() -> Vec<String> {
    DEFAULT_PREFIXES.iter().map(|p| p.to_string()).collect()
}

impl LookupConfig {
    /// Date normalizer configured with this section's prefixes.
    pub fn normalizer(&self) -> DateNormalizer {
        DateNormalizer::new(self.strip_prefixes.iter().cloned())
    }

    /// Resolve the lookup URL for a key.
    pub fn url_for(&self, key: &str) -> Result<Url> {
        let raw = self.url_template.replace(KEY_PLACEHOLDER, key);
        Url::parse(&raw).map_err(|e| EnrichError::lookup(key, format!("invalid lookup URL {raw}: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Batch config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime batch configuration, merged from the config file and CLI flags.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Number of concurrent lookup workers.
    pub pool_size: usize,
    /// Upper bound on a single lookup.
    pub lookup_timeout: Duration,
    /// JSON checkpoint path.
    pub checkpoint_path: PathBuf,
    /// Failure log path.
    pub failure_log_path: PathBuf,
}

impl From<&AppConfig> for BatchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            pool_size: config.defaults.pool_size,
            lookup_timeout: Duration::from_secs(config.defaults.lookup_timeout_secs),
            checkpoint_path: PathBuf::from(&config.defaults.checkpoint_path),
            failure_log_path: PathBuf::from(&config.defaults.failure_log_path),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.assetenrich/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| EnrichError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.assetenrich/assetenrich.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| EnrichError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| EnrichError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EnrichError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| EnrichError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EnrichError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configurations the batch cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.defaults.pool_size == 0 {
        return Err(EnrichError::config("defaults.pool_size must be at least 1"));
    }
    if config.defaults.lookup_timeout_secs == 0 {
        return Err(EnrichError::config(
            "defaults.lookup_timeout_secs must be at least 1",
        ));
    }
    if !config.lookup.url_template.contains(KEY_PLACEHOLDER) {
        return Err(EnrichError::config(format!(
            "lookup.url_template must contain {KEY_PLACEHOLDER}"
        )));
    }
    if config.lookup.selector.trim().is_empty() {
        return Err(EnrichError::config("lookup.selector must not be empty"));
    }
    Ok(())
}
