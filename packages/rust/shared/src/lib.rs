//! Shared types, error model, and configuration for assetenrich.
//!
//! This crate is the foundation depended on by all other assetenrich crates.
//! It provides:
//! - [`EnrichError`]: the unified error type
//! - Domain types ([`Record`], [`EnrichmentState`], [`PersistedRecord`], [`ExportRow`], [`BatchId`])
//! - Date normalization ([`DateNormalizer`], [`display`])
//! - Configuration ([`AppConfig`], [`BatchConfig`], config loading)

pub mod config;
pub mod date;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BatchConfig, DefaultsConfig, KEY_PLACEHOLDER, LookupConfig, SourceConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, validate_config,
};
pub use date::{DISPLAY_FORMAT, DateNormalizer, PROVIDER_FORMAT, display};
pub use error::{EnrichError, Result};
pub use types::{BatchId, EnrichmentState, ExportRow, PersistedRecord, Record};
