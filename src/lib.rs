//! Beacon Retrieval - knowledge-base retrieval and reranking core
//!
//! Given a query and a set of knowledge bases, the engine runs one or more
//! retrieval strategies concurrently and fuses their results into a single
//! ranked, deduplicated, threshold-filtered list of fragments.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │       RetrievalEngine::retrieve(query, kbs, cfg)     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Dispatcher   Semantic │ FullText │ Graph  (tokio)  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Fusion   merge │ weighted score │ rerank model     │
//! │            threshold ─► sort ─► top_k                │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod rerank;
pub mod result;
pub mod retry;
pub mod strategy;

pub use config::{RetrieveConfig, SearchMethod, Settings};
pub use engine::{RetrievalEngine, RetrievalReport};
pub use error::{ConfigError, Error, Result};
pub use result::{KnowledgeRetrievalResult, RetrievalType};
