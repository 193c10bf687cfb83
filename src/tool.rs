//! The `semantic_search` tool surface
//!
//! Validates tool-call inputs, triggers lazy indexing, runs the retrieval
//! pipeline, and translates engine results into the external wire shape.
//! The transport itself (line-delimited JSON in `main.rs`) stays thin.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SemcodeError};
use crate::filter::{build_filter, FilterOptions};
use crate::indexer::IndexManager;
use crate::paths::is_within_root;
use crate::searcher::{SearchOptions, Searcher, DEFAULT_LIMIT, MAX_LIMIT};

/// Tool-call input, external naming.
#[derive(Debug, Clone, Deserialize)]
pub struct SemanticSearchRequest {
    pub query: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub file_pattern: Option<String>,
}

/// One result row on the wire.
#[derive(Debug, Serialize)]
pub struct SearchResultItem {
    pub file: String,
    pub start_line: usize,
    pub end_line: usize,
    pub name: Option<String>,
    pub node_type: String,
    pub score: f32,
    pub content: String,
    pub signature: Option<String>,
    pub from_fallback: bool,
}

#[derive(Debug, Serialize)]
pub struct IndexStatsPayload {
    pub total_chunks: usize,
    pub indexed: bool,
}

/// Tool-call output, external naming.
#[derive(Debug, Serialize)]
pub struct SemanticSearchResponse {
    pub results: Vec<SearchResultItem>,
    pub total_results: usize,
    pub query: String,
    pub index_stats: IndexStatsPayload,
}

/// Error payload carrying the stable kind tag.
#[derive(Debug, Serialize)]
pub struct ToolErrorResponse {
    pub error: ToolError,
}

#[derive(Debug, Serialize)]
pub struct ToolError {
    pub kind: &'static str,
    pub message: String,
}

impl ToolErrorResponse {
    pub fn from_error(err: &SemcodeError) -> Self {
        Self {
            error: ToolError {
                kind: err.kind().as_str(),
                message: err.to_string(),
            },
        }
    }
}

/// Owns the process-lifetime engine objects and serves tool calls.
pub struct ToolHandler {
    manager: Arc<IndexManager>,
    searcher: Searcher,
}

impl ToolHandler {
    pub fn new(manager: Arc<IndexManager>, searcher: Searcher) -> Self {
        Self { manager, searcher }
    }

    pub fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }

    /// Serve one `semantic_search` call.
    ///
    /// Inputs are validated before any indexing happens, so a rejected
    /// request leaves the store untouched.
    pub async fn semantic_search(
        &self,
        request: SemanticSearchRequest,
    ) -> Result<SemanticSearchResponse> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SemcodeError::Config("query must not be empty".into()));
        }

        if let Some(path) = request.path.as_deref() {
            let root = &self.manager.config().root;
            if !is_within_root(Path::new(path), root) {
                return Err(SemcodeError::PathTraversal(path.to_string()));
            }
        }

        // Surface filter problems before the lazy scan mutates anything
        build_filter(&FilterOptions {
            path: request.path.clone(),
            file_pattern: request.file_pattern.clone(),
        })?;

        let limit = request.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        self.manager.ensure_indexed().await?;

        let options = SearchOptions {
            limit,
            path: request.path.clone(),
            file_pattern: request.file_pattern.clone(),
            ..Default::default()
        };
        let results = self.searcher.hybrid_search(query, &options).await?;
        debug!(query, results = results.len(), "tool call served");

        let stats = self.searcher.stats().await?;
        let items: Vec<SearchResultItem> = results
            .into_iter()
            .map(|r| SearchResultItem {
                file: r.record.file_path,
                start_line: r.record.start_line,
                end_line: r.record.end_line,
                name: r.record.name,
                node_type: r.record.node_kind,
                score: r.combined_score,
                content: r.record.content,
                signature: r.record.signature,
                from_fallback: r.from_fallback,
            })
            .collect();

        Ok(SemanticSearchResponse {
            total_results: items.len(),
            results: items,
            query: query.to_string(),
            index_stats: IndexStatsPayload {
                total_chunks: stats.chunks,
                indexed: stats.chunks > 0,
            },
        })
    }
}
