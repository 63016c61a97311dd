//! Shared types, error model, and configuration for leadfill.
//!
//! This crate is the foundation depended on by all other leadfill crates.
//! It provides:
//! - [`LeadfillError`]: the unified error type
//! - Domain types ([`Record`], [`FieldUpdates`], [`EnrichmentOutcome`], [`Chunk`], [`RunId`])
//! - Configuration ([`AppConfig`], [`SessionConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, LookupConfig, OutputConfig, OutputFormat, SessionConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{LeadfillError, Result};
pub use types::{
    Chunk, DEFAULT_COLUMNS, EnrichmentOutcome, FieldUpdates, NO_DATA_MARKER, Record, RunId,
    fields, split_person_name,
};
