//! Configuration for the retrieval core
//!
//! - **retrieve**: the versioned per-query `RetrieveConfig` and its wire map
//! - **weights**: per-strategy fusion weights and graph traversal settings
//! - **graph** / **reranking**: outbound service settings
//! - **file**: engine settings and TOML file loading

pub mod file;
mod fields;
mod graph;
mod reranking;
mod retrieve;
mod weights;

pub use file::{EngineSettings, Settings, settings_file_path};
pub use graph::GraphSearchConfig;
pub use reranking::RerankingModelConfig;
pub use retrieve::{
    CURRENT_VERSION, RerankingMode, RerankingModel, RetrieveConfig, RetrieveConfigBuilder,
    SearchMethod,
};
pub use weights::{GraphSetting, KeywordSetting, VectorSetting, Weights};
