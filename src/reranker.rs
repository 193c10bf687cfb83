//! Candidate reranking: lexical boosting and cross-encoder scoring
//!
//! The lexical boost is a cheap heuristic layered onto vector scores; the
//! cross-encoder scores query/candidate pairs jointly and is more accurate
//! but slower. Cross-encoder failure is never fatal - the pipeline falls
//! back to the boosted ordering.

use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use tracing::info;

use crate::config::Config;
use crate::error::{Result, SemcodeError};
use crate::store::Record;

/// Scale applied to the summed token weights before adding to the vector
/// score.
const BOOST_SCALE: f32 = 0.05;

/// Token match weights.
const NAME_EXACT_WEIGHT: f32 = 3.0;
const NAME_SUBSTRING_WEIGHT: f32 = 2.5;
const SIGNATURE_WEIGHT: f32 = 2.0;
const CONTENT_WEIGHT: f32 = 1.0;

/// A candidate moving through the boost/rerank stages.
#[derive(Debug, Clone)]
pub struct Scored {
    pub record: Record,
    pub vector_score: f32,
    pub keyword_score: f32,
    pub combined_score: f32,
}

impl Scored {
    pub fn from_vector_hit(record: Record, vector_score: f32) -> Self {
        Self {
            record,
            vector_score,
            keyword_score: 0.0,
            combined_score: vector_score,
        }
    }
}

/// Split a query into lowercase word tokens.
///
/// Tokens are matched literally afterwards, so regex-special characters in
/// the query are inert.
pub fn tokenize_query(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Add lexical boosts to candidate scores.
///
/// Per matched token: weight 3 in `name` (exact word above substring),
/// 2 in `signature`, 1 in `content`. The scaled sum is added to the vector
/// score and the result clamped to [0, 1]. An empty query changes nothing.
pub fn lexical_boost(query: &str, candidates: &mut [Scored]) {
    let tokens = tokenize_query(query);
    if tokens.is_empty() {
        return;
    }

    for candidate in candidates.iter_mut() {
        let name = candidate
            .record
            .name
            .as_deref()
            .unwrap_or("")
            .to_lowercase();
        // Underscores stay inside words so `login_helper` is a substring
        // match for "login", not an exact one.
        let name_words: Vec<&str> = name
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|w| !w.is_empty())
            .collect();
        let signature = candidate
            .record
            .signature
            .as_deref()
            .unwrap_or("")
            .to_lowercase();
        let content = candidate.record.content.to_lowercase();

        let mut boost = 0.0_f32;
        for token in &tokens {
            if name_words.iter().any(|w| w == token) {
                boost += NAME_EXACT_WEIGHT;
            } else if name.contains(token.as_str()) {
                boost += NAME_SUBSTRING_WEIGHT;
            }
            if signature.contains(token.as_str()) {
                boost += SIGNATURE_WEIGHT;
            }
            if content.contains(token.as_str()) {
                boost += CONTENT_WEIGHT;
            }
        }

        candidate.keyword_score = (boost * BOOST_SCALE).clamp(0.0, 1.0);
        candidate.combined_score =
            (candidate.vector_score + boost * BOOST_SCALE).clamp(0.0, 1.0);
    }
}

/// Cross-encoder scorer for query/candidate pairs.
///
/// One process-lifetime implementation exists; tests inject fakes.
pub trait RerankProvider: Send + Sync {
    /// Score each document against the query. Returns one score per input
    /// document, in input order.
    fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;
}

/// Local cross-encoder over fastembed's reranker models.
pub struct CrossEncoderReranker {
    model: TextRerank,
}

impl CrossEncoderReranker {
    /// Load the reranker model, downloading into the configured cache on
    /// first use.
    pub fn new(config: &Config) -> Result<Self> {
        info!("loading cross-encoder reranker");
        let model = TextRerank::try_new(
            RerankInitOptions::new(RerankerModel::BGERerankerBase)
                .with_cache_dir(config.model_cache_dir.clone())
                .with_show_download_progress(false),
        )
        .map_err(|e| SemcodeError::ModelLoad(e.to_string()))?;
        Ok(Self { model })
    }
}

impl RerankProvider for CrossEncoderReranker {
    fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        let docs: Vec<&str> = documents.iter().map(String::as_str).collect();
        let results = self
            .model
            .rerank(query, docs, false, None)
            .map_err(|e| SemcodeError::EmbeddingGeneration(e.to_string()))?;

        let mut scores = vec![0.0_f32; documents.len()];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                // Raw cross-encoder logits; squash into [0, 1]
                *slot = sigmoid(result.score);
            }
        }
        Ok(scores)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Rerank candidates with the cross-encoder, keeping the top `k`.
///
/// The new score replaces `combined_score`. Errors propagate so the caller
/// can fall back to the boosted ordering.
pub fn apply_rerank(
    provider: &dyn RerankProvider,
    query: &str,
    mut candidates: Vec<Scored>,
    k: usize,
) -> Result<Vec<Scored>> {
    if candidates.is_empty() {
        return Ok(candidates);
    }

    let documents: Vec<String> = candidates
        .iter()
        .map(|c| match &c.record.name {
            Some(name) => format!("{name}\n{}", c.record.content),
            None => c.record.content.clone(),
        })
        .collect();

    let scores = provider.rerank(query, &documents)?;
    for (candidate, score) in candidates.iter_mut().zip(scores) {
        candidate.combined_score = score;
    }

    candidates.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(k);
    Ok(candidates)
}
