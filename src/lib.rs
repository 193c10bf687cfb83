//! # semcode - Local semantic code search
//!
//! An indexing-and-retrieval engine for natural-language search over a
//! source tree. Everything runs on your machine: AST-aware chunking via
//! tree-sitter, local ONNX embeddings, an HNSW vector index, and a hybrid
//! retrieval pipeline with lexical boosting and cross-encoder reranking.
//!
//! ## Features
//!
//! - **100% Local**: embeddings and reranking run through the ONNX runtime
//! - **AST-aware chunks**: functions, classes and impls with names,
//!   signatures and docstrings, not blind text windows
//! - **Incremental**: content hashing plus a debounced file watcher keep
//!   the index consistent with a mutating tree
//! - **Hybrid retrieval**: dense vectors + lexical boosting + reranking,
//!   with keyword fallback when the embedder is unavailable
//! - **Tool surface**: a single `semantic_search` operation for AI
//!   developer tools
//!
//! ## Example
//!
//! ```no_run
//! use semcode::{
//!     Config, EmbeddingProvider, FastEmbedder, IndexManager, Metrics, ProgressChannel,
//!     SearchOptions, Searcher, VectorStore,
//! };
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::new(PathBuf::from("."));
//!     let embedder = Arc::new(FastEmbedder::new(&config)?);
//!     let store = Arc::new(VectorStore::open(config.clone(), embedder.dimension())?);
//!     let metrics = Arc::new(Metrics::new());
//!     let progress = ProgressChannel::new();
//!
//!     let manager = IndexManager::new(
//!         config,
//!         Arc::clone(&store),
//!         embedder.clone(),
//!         Arc::clone(&metrics),
//!         progress.clone(),
//!     );
//!     manager.ensure_indexed().await?;
//!
//!     let searcher = Searcher::new(store, embedder, None, metrics, progress);
//!     let results = searcher
//!         .hybrid_search("authentication handler", &SearchOptions::default())
//!         .await?;
//!
//!     for result in results {
//!         println!(
//!             "{}:{} (score: {:.2})",
//!             result.record.file_path, result.record.start_line, result.combined_score
//!         );
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod chunker;
pub mod config;
pub mod embedder;
pub mod error;
pub mod filter;
pub mod indexer;
pub mod languages;
pub mod metrics;
pub mod paths;
pub mod progress;
pub mod reranker;
pub mod searcher;
pub mod store;
pub mod tool;
pub mod watcher;

// Re-export commonly used types
pub use cache::TtlLru;
pub use chunker::{Chunk, Chunker};
pub use config::{Config, EmbeddingModel, LogFormat, LogLevel};
pub use embedder::{EmbedBatchOutcome, EmbeddingProvider, FastEmbedder};
pub use error::{ErrorKind, Result, SemcodeError};
pub use filter::{build_filter, validate_filter_pattern, FilterOptions};
pub use indexer::IndexManager;
pub use languages::Lang;
pub use metrics::{Metrics, MetricsSnapshot, ScanReport};
pub use progress::{ProgressChannel, ProgressEvent};
pub use reranker::{CrossEncoderReranker, RerankProvider};
pub use searcher::{
    format_results, format_results_json, HybridResult, IndexStats, SearchOptions, Searcher,
};
pub use store::{Record, VectorStore};
pub use tool::{SemanticSearchRequest, SemanticSearchResponse, ToolErrorResponse, ToolHandler};
pub use watcher::IndexWatcher;
