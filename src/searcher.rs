//! Hybrid retrieval pipeline and result formatting
//!
//! Fuses dense vector similarity with lexical boosting and optional
//! cross-encoder reranking. When the embedder is unavailable the pipeline
//! degrades to keyword search, flagging each result as a fallback.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use colored::*;
use tracing::{debug, warn};

use crate::cache::TtlLru;
use crate::embedder::EmbeddingProvider;
use crate::error::{Result, SemcodeError};
use crate::filter::{build_filter, FilterOptions};
use crate::metrics::Metrics;
use crate::progress::ProgressChannel;
use crate::reranker::{apply_rerank, lexical_boost, RerankProvider, Scored};
use crate::store::{Record, VectorStore};

/// Default result count.
pub const DEFAULT_LIMIT: usize = 10;

/// Hard ceiling on requested results.
pub const MAX_LIMIT: usize = 50;

/// How many candidates to oversample for the reranker.
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 5;

const QUERY_CACHE_CAPACITY: usize = 128;
const QUERY_CACHE_TTL: Duration = Duration::from_secs(300);

/// Options for a hybrid search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub path: Option<String>,
    pub file_pattern: Option<String>,
    pub use_reranking: bool,
    pub candidate_multiplier: usize,
    pub fallback_to_keyword: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            path: None,
            file_pattern: None,
            use_reranking: true,
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
            fallback_to_keyword: true,
        }
    }
}

/// One ranked search result with its component scores.
#[derive(Debug, Clone)]
pub struct HybridResult {
    pub record: Record,
    pub combined_score: f32,
    pub vector_score: f32,
    pub keyword_score: f32,
    pub from_fallback: bool,
}

/// Index statistics
pub struct IndexStats {
    /// Number of indexed files
    pub files: usize,
    /// Number of stored chunks
    pub chunks: usize,
}

/// Hybrid semantic searcher
pub struct Searcher {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn RerankProvider>>,
    query_cache: Mutex<TtlLru<String, Vec<f32>>>,
    metrics: Arc<Metrics>,
    progress: ProgressChannel,
}

impl Searcher {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn RerankProvider>>,
        metrics: Arc<Metrics>,
        progress: ProgressChannel,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            query_cache: Mutex::new(TtlLru::new(QUERY_CACHE_CAPACITY, Some(QUERY_CACHE_TTL))),
            metrics,
            progress,
        }
    }

    /// Run the full retrieval pipeline for a query.
    pub async fn hybrid_search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<HybridResult>> {
        let started = Instant::now();
        let limit = options.limit.clamp(1, MAX_LIMIT);

        // Filters are validated before anything else runs; security
        // failures never degrade into a partial search.
        let predicate = build_filter(&FilterOptions {
            path: options.path.clone(),
            file_pattern: options.file_pattern.clone(),
        })?;

        if self.store.is_empty().await? {
            self.progress.note("index is empty; nothing to search yet");
            self.metrics.record_search(elapsed_ms(started), 0, false);
            return Ok(vec![]);
        }

        let vector = match self.query_vector(query) {
            Ok(v) => v,
            Err(e) if e.is_embedder_failure() && options.fallback_to_keyword => {
                warn!(error = %e, "embedder unavailable, using keyword fallback");
                self.progress
                    .note("embedder unavailable; results come from keyword search");

                let hits = self
                    .store
                    .full_text_search(query, limit * 2, predicate.as_deref())
                    .await?;
                let results: Vec<HybridResult> = hits
                    .into_iter()
                    .take(limit)
                    .map(|(record, score)| HybridResult {
                        record,
                        combined_score: score,
                        vector_score: 0.0,
                        keyword_score: score,
                        from_fallback: true,
                    })
                    .collect();

                self.metrics
                    .record_search(elapsed_ms(started), results.len(), true);
                return Ok(results);
            }
            Err(e) if e.is_embedder_failure() => {
                return Err(SemcodeError::EmbeddingGeneration(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        let fetch = if options.use_reranking {
            limit * options.candidate_multiplier.max(1)
        } else {
            limit
        };

        let hits = self
            .store
            .vector_search(&vector, fetch, predicate.as_deref())
            .await?;

        let mut candidates: Vec<Scored> = hits
            .into_iter()
            .map(|(record, score)| Scored::from_vector_hit(record, score))
            .collect();

        lexical_boost(query, &mut candidates);
        candidates.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let final_candidates = if options.use_reranking && candidates.len() > limit {
            match &self.reranker {
                Some(reranker) => {
                    match apply_rerank(reranker.as_ref(), query, candidates.clone(), limit) {
                        Ok(reranked) => reranked,
                        Err(e) => {
                            warn!(error = %e, "rerank failed, keeping boosted ordering");
                            candidates.truncate(limit);
                            candidates
                        }
                    }
                }
                None => {
                    candidates.truncate(limit);
                    candidates
                }
            }
        } else {
            candidates.truncate(limit);
            candidates
        };

        let results: Vec<HybridResult> = final_candidates
            .into_iter()
            .map(|c| HybridResult {
                record: c.record,
                combined_score: c.combined_score,
                vector_score: c.vector_score,
                keyword_score: c.keyword_score,
                from_fallback: false,
            })
            .collect();

        debug!(
            query,
            results = results.len(),
            latency_ms = elapsed_ms(started),
            "search completed"
        );
        self.metrics
            .record_search(elapsed_ms(started), results.len(), false);
        Ok(results)
    }

    /// Embed the query, consulting the TTL cache first.
    fn query_vector(&self, query: &str) -> Result<Vec<f32>> {
        {
            let mut cache = self.query_cache.lock().expect("query cache lock");
            if let Some(v) = cache.get(&query.to_string()) {
                return Ok(v.clone());
            }
        }
        let vector = self.embedder.embed_query(query)?;
        self.query_cache
            .lock()
            .expect("query cache lock")
            .insert(query.to_string(), vector.clone());
        Ok(vector)
    }

    /// Get index statistics
    pub async fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            files: self.store.indexed_files().await?.len(),
            chunks: self.store.count().await?,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

/// Format search results for terminal display
pub fn format_results(results: &[HybridResult], show_content: bool) -> String {
    let mut output = String::new();

    for (i, result) in results.iter().enumerate() {
        let record = &result.record;
        let file_display = format!(
            "{}:{}",
            record.file_path,
            if record.start_line == record.end_line {
                format!("{}", record.start_line)
            } else {
                format!("{}-{}", record.start_line, record.end_line)
            }
        );

        let score_pct = (result.combined_score * 100.0) as u32;
        let score_color = if score_pct >= 80 {
            "green"
        } else if score_pct >= 60 {
            "yellow"
        } else {
            "red"
        };

        let label = record
            .name
            .as_deref()
            .map(|n| format!(" {n}"))
            .unwrap_or_default();
        let fallback = if result.from_fallback {
            " [keyword]".dimmed().to_string()
        } else {
            String::new()
        };

        output.push_str(&format!(
            "\n{} {}{} ({}%){}\n",
            format!("[{}]", i + 1).dimmed(),
            file_display.cyan().bold(),
            label.yellow(),
            format!("{}", score_pct).color(score_color),
            fallback
        ));

        if show_content {
            output.push_str(&format!("{}\n", "-".repeat(60).dimmed()));

            let lines: Vec<&str> = record.content.lines().collect();
            let max_lines = 15;
            let show_lines = if lines.len() > max_lines {
                &lines[..max_lines]
            } else {
                &lines
            };

            for (j, line) in show_lines.iter().enumerate() {
                let line_num = record.start_line + j;
                output.push_str(&format!("{} {}\n", format!("{:4}", line_num).dimmed(), line));
            }

            if lines.len() > max_lines {
                output.push_str(&format!(
                    "{}\n",
                    format!("     ... ({} more lines)", lines.len() - max_lines).dimmed()
                ));
            }
        }
    }

    output
}

/// Format results as JSON
pub fn format_results_json(results: &[HybridResult]) -> Result<String> {
    use serde::Serialize;

    #[derive(Serialize)]
    struct JsonResult<'a> {
        file: &'a str,
        start_line: usize,
        end_line: usize,
        name: Option<&'a str>,
        node_type: &'a str,
        score: f32,
        content: &'a str,
        signature: Option<&'a str>,
        from_fallback: bool,
    }

    let json_results: Vec<JsonResult> = results
        .iter()
        .map(|r| JsonResult {
            file: &r.record.file_path,
            start_line: r.record.start_line,
            end_line: r.record.end_line,
            name: r.record.name.as_deref(),
            node_type: &r.record.node_kind,
            score: r.combined_score,
            content: &r.record.content,
            signature: r.record.signature.as_deref(),
            from_fallback: r.from_fallback,
        })
        .collect();

    Ok(serde_json::to_string_pretty(&json_results)?)
}
