//! Application configuration for lexenrich.
//!
//! User config lives at `~/.lexenrich/lexenrich.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{LexError, Result};
use crate::types::{DEFAULT_MODEL_TAG, DEFAULT_SOURCE_TAG};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lexenrich.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lexenrich";

/// Table and column names end up in SQL text, so they must be bare identifiers.
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}_][\p{L}\p{N}_]*$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Config structs (matching lexenrich.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Relational store connection and table layout.
    #[serde(default)]
    pub store: StoreConfig,

    /// Batch run parameters.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Text-generation service settings.
    #[serde(default)]
    pub llm: LlmConfig,
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Local database file. Ignored when `url` is set.
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Remote libSQL URL (e.g. `libsql://lexicon.turso.io`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Name of the env var holding the remote auth token.
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,

    /// Lexical entry table.
    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_id_column")]
    pub id_column: String,

    #[serde(default = "default_term_column")]
    pub term_column: String,

    #[serde(default = "default_document_column")]
    pub document_column: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            url: None,
            auth_token_env: default_auth_token_env(),
            table: default_table(),
            id_column: default_id_column(),
            term_column: default_term_column(),
            document_column: default_document_column(),
        }
    }
}

fn default_store_path() -> String {
    "lexicon.db".into()
}
fn default_auth_token_env() -> String {
    "LIBSQL_AUTH_TOKEN".into()
}
fn default_table() -> String {
    "chn_wordlist".into()
}
fn default_id_column() -> String {
    "id".into()
}
fn default_term_column() -> String {
    "词语".into()
}
fn default_document_column() -> String {
    "XML含义".into()
}

/// `[batch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Resume checkpoint: only records with `id > start_index` are processed.
    #[serde(default)]
    pub start_index: i64,

    /// Fixed worker pool size.
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Source tag whose definition is sent for enrichment.
    #[serde(default = "default_source_tag")]
    pub source_tag: String,

    /// Source tag written on generated meaning entries.
    #[serde(default = "default_model_tag")]
    pub model_tag: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            start_index: 0,
            workers: default_workers(),
            source_tag: default_source_tag(),
            model_tag: default_model_tag(),
        }
    }
}

fn default_workers() -> u32 {
    14
}
fn default_source_tag() -> String {
    DEFAULT_SOURCE_TAG.into()
}
fn default_model_tag() -> String {
    DEFAULT_MODEL_TAG.into()
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout. Unset means the HTTP client's default (none).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: None,
        }
    }
}

fn default_base_url() -> String {
    "https://api.deepseek.com/v1".into()
}
fn default_model() -> String {
    "deepseek-chat".into()
}
fn default_api_key_env() -> String {
    "DEEPSEEK_API_KEY".into()
}

// ---------------------------------------------------------------------------
// Runtime settings (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime batch configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Resume checkpoint (exclusive lower bound on record ids).
    pub start_index: i64,
    /// Worker pool size.
    pub workers: usize,
    /// Source tag to extract the short definition from.
    pub source_tag: String,
    /// Source tag for appended generated entries.
    pub model_tag: String,
    /// Skip the service call and the write-back.
    pub dry_run: bool,
}

impl From<&AppConfig> for BatchSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            start_index: config.batch.start_index,
            workers: config.batch.workers as usize,
            source_tag: config.batch.source_tag.clone(),
            model_tag: config.batch.model_tag.clone(),
            dry_run: false,
        }
    }
}

/// Validated table layout for the record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub id_column: String,
    pub term_column: String,
    pub document_column: String,
}

impl TableSchema {
    /// Build a schema, rejecting anything that is not a bare identifier.
    pub fn new(
        table: impl Into<String>,
        id_column: impl Into<String>,
        term_column: impl Into<String>,
        document_column: impl Into<String>,
    ) -> Result<Self> {
        let schema = Self {
            table: table.into(),
            id_column: id_column.into(),
            term_column: term_column.into(),
            document_column: document_column.into(),
        };
        for name in [
            &schema.table,
            &schema.id_column,
            &schema.term_column,
            &schema.document_column,
        ] {
            validate_identifier(name)?;
        }
        Ok(schema)
    }
}

impl TryFrom<&StoreConfig> for TableSchema {
    type Error = LexError;

    fn try_from(config: &StoreConfig) -> Result<Self> {
        Self::new(
            config.table.as_str(),
            config.id_column.as_str(),
            config.term_column.as_str(),
            config.document_column.as_str(),
        )
    }
}

/// Check that `name` is safe to splice into SQL as a table or column name.
pub fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(LexError::validation(format!(
            "'{name}' is not a valid table or column name"
        )))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lexenrich/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| LexError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lexenrich/lexenrich.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| LexError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| LexError::config(format!("failed to parse {}: {e}", path.display())))?;

    url::Url::parse(&config.llm.base_url)
        .map_err(|e| LexError::config(format!("invalid llm.base_url: {e}")))?;
    TableSchema::try_from(&config.store)?;
    if config.batch.workers == 0 {
        return Err(LexError::config("batch.workers must be at least 1"));
    }

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LexError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| LexError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LexError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the text-generation API key from the env var named in config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(LexError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}
