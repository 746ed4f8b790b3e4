//! Shared types, error model, and configuration for Curator.
//!
//! This crate is the foundation depended on by all other Curator crates.
//! It provides:
//! - [`CuratorError`]: the unified error type
//! - Domain and wire types ([`Dataset`], [`QaItem`], [`QaPage`], [`StageOutput`], ...)
//! - Configuration ([`AppConfig`], [`ClientConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, ClientConfig, GenerationConfig, PaginationConfig, SimilarityConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, validate_config,
};
pub use error::{CuratorError, Result};
pub use types::{
    AnalysisResult, CleanedPair, CleaningResult, Dataset, DatasetId, DeleteDatasetResponse,
    GenerationRequest, GenerationResult, QaItem, QaPage, QaPair, RemovedRecord, SimilarityPair,
    Stage, StageOutput, StageStatus,
};
