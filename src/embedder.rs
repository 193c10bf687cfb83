//! Local embedding generation using fastembed (ONNX runtime)
//!
//! Generates embeddings entirely locally - no API calls required.
//! Documents and queries are prefixed with distinct markers to match the
//! model's two-tower conditioning. All returned vectors are unit-normalized.

use crate::config::{Config, EmbeddingModel};
use crate::error::{Result, SemcodeError};
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tracing::info;

/// Marker prepended to documents before tokenization.
pub const DOCUMENT_PREFIX: &str = "search_document: ";

/// Marker prepended to queries before tokenization.
pub const QUERY_PREFIX: &str = "search_query: ";

/// Upper bound on texts per underlying model call.
pub const EMBED_BATCH_SIZE: usize = 32;

/// A failed item within a batch: its input index and the error message.
#[derive(Debug, Clone)]
pub struct EmbedFailure {
    pub index: usize,
    pub message: String,
}

/// Partial-success result of a batch embedding call.
///
/// Successful vectors are `(input index, vector)` pairs; failed items appear
/// only in `failures`. A failed item is never replaced with a zero-vector.
#[derive(Debug, Default)]
pub struct EmbedBatchOutcome {
    pub vectors: Vec<(usize, Vec<f32>)>,
    pub failures: Vec<EmbedFailure>,
}

impl EmbedBatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Vector producer used by the indexer and the retrieval pipeline.
///
/// The engine holds one process-lifetime implementation; tests inject fakes.
pub trait EmbeddingProvider: Send + Sync {
    /// Declared output dimension.
    fn dimension(&self) -> usize;

    /// Embed a single query string.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a single document string.
    fn embed_document(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of documents with partial-success reporting.
    fn embed_batch(&self, texts: &[String]) -> EmbedBatchOutcome;
}

/// Local embedder over fastembed with ONNX runtime
pub struct FastEmbedder {
    model: Arc<TextEmbedding>,
    dimension: usize,
}

impl FastEmbedder {
    /// Create a new embedder with the configured model.
    ///
    /// On first use, downloads the model from HuggingFace (~30-470MB) into
    /// the configured cache directory. Subsequent uses load from cache.
    pub fn new(config: &Config) -> Result<Self> {
        info!(model = config.model.model_name(), "loading embedding model");

        let fastembed_model = match config.model {
            EmbeddingModel::AllMiniLmL6V2 => FastEmbedModel::AllMiniLML6V2,
            EmbeddingModel::BgeSmallEnV15 => FastEmbedModel::BGESmallENV15,
            EmbeddingModel::NomicEmbedTextV15 => FastEmbedModel::NomicEmbedTextV15,
            EmbeddingModel::MultilingualE5Small => FastEmbedModel::MultilingualE5Small,
        };

        let model = TextEmbedding::try_new(
            InitOptions::new(fastembed_model)
                .with_cache_dir(config.model_cache_dir.clone())
                .with_show_download_progress(false),
        )
        .map_err(|e| SemcodeError::ModelLoad(e.to_string()))?;

        let dimension = config.model.dimension();
        info!(dimension, "embedding model loaded");

        Ok(Self {
            model: Arc::new(model),
            dimension,
        })
    }

    fn embed_one(&self, text: String) -> Result<Vec<f32>> {
        let embeddings = self
            .model
            .embed(vec![text], None)
            .map_err(|e| SemcodeError::EmbeddingGeneration(e.to_string()))?;

        let mut vector = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| SemcodeError::EmbeddingGeneration("no embedding returned".into()))?;
        normalize(&mut vector);
        Ok(vector)
    }
}

impl EmbeddingProvider for FastEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(format!("{QUERY_PREFIX}{text}"))
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(format!("{DOCUMENT_PREFIX}{text}"))
    }

    fn embed_batch(&self, texts: &[String]) -> EmbedBatchOutcome {
        let mut outcome = EmbedBatchOutcome::default();

        for (batch_no, batch) in texts.chunks(EMBED_BATCH_SIZE).enumerate() {
            let offset = batch_no * EMBED_BATCH_SIZE;
            let prefixed: Vec<String> = batch
                .iter()
                .map(|t| format!("{DOCUMENT_PREFIX}{t}"))
                .collect();

            match self.model.embed(prefixed, None) {
                Ok(embeddings) => {
                    for (i, mut vector) in embeddings.into_iter().enumerate() {
                        normalize(&mut vector);
                        outcome.vectors.push((offset + i, vector));
                    }
                }
                Err(e) => {
                    // The whole sub-batch failed; report each index so the
                    // caller can retry or skip those items.
                    for i in 0..batch.len() {
                        outcome.failures.push(EmbedFailure {
                            index: offset + i,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        outcome
    }
}

/// Normalize embedding vector to unit length (for cosine similarity)
pub fn normalize(embedding: &mut [f32]) {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in embedding.iter_mut() {
            *x /= norm;
        }
    }
}

/// Compute cosine similarity between two normalized vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
