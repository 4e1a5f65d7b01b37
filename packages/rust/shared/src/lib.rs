//! Shared types, error model, and configuration for lexenrich.
//!
//! This crate is the foundation depended on by all other lexenrich crates.
//! It provides:
//! - [`LexError`]: the unified error type
//! - Domain types ([`LexicalRecord`], [`RecordStage`])
//! - Configuration ([`AppConfig`], [`BatchSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BatchConfig, BatchSettings, LlmConfig, StoreConfig, TableSchema, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_api_key,
    validate_identifier,
};
pub use error::{LexError, Result, StoreErrorKind};
pub use types::{DEFAULT_MODEL_TAG, DEFAULT_SOURCE_TAG, LexicalRecord, RecordStage};
