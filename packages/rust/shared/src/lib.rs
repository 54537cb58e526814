//! Shared types, error model, and configuration for neuraltheft.
//!
//! This crate is the foundation depended on by all other neuraltheft crates.
//! It provides:
//! - [`HarvestError`] — the unified error type
//! - Record types ([`CollectedRecord`], [`EnrichedRecord`], [`RunId`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)
//! - [`handoff`] — cancellation-aware stage-to-stage transfer

pub mod config;
pub mod error;
pub mod handoff;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CredentialsConfig, DefaultsConfig, LogLevel, MAX_RATE_PER_MINUTE,
    MIN_RATE_PER_MINUTE, RunConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, load_dotenv, load_env_file, resolve_credential,
};
pub use error::{HarvestError, Result};
pub use types::{CollectedRecord, EnrichedRecord, RunId};
