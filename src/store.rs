//! Vector store facade over usearch (HNSW) with bm25 full-text search
//!
//! Records are keyed by string chunk id; an internal u64 key maps each id
//! into the HNSW index and the bm25 engine. Filter predicates produced by
//! the filter builder are parsed here against a closed grammar - nothing
//! else is accepted.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bm25::{Document, Language as Bm25Language, SearchEngineBuilder};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::chunker::Chunk;
use crate::config::Config;
use crate::error::{Result, SemcodeError};
use crate::languages::Lang;

/// A persisted chunk: the chunk fields plus its vector and change-detection
/// hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub file_path: String,
    pub language: Option<Lang>,
    pub node_kind: String,
    pub name: Option<String>,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Unit-normalized embedding, length equals the store dimension
    pub vector: Vec<f32>,
    /// Hash of the full file content the chunk was derived from
    pub content_hash: String,
    /// Unix seconds at ingest time
    pub indexed_at: u64,
}

impl Record {
    /// Build a record from a chunk and its embedding.
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>, content_hash: String) -> Self {
        Self {
            id: chunk.id,
            file_path: chunk.file_path,
            language: chunk.language,
            node_kind: chunk.node_kind,
            name: chunk.name,
            signature: chunk.signature,
            docstring: chunk.docstring,
            content: chunk.content,
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            vector,
            content_hash,
            indexed_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Text fed to the full-text engine.
    fn searchable_text(&self) -> String {
        let mut text = String::new();
        if let Some(name) = &self.name {
            text.push_str(name);
            text.push(' ');
        }
        if let Some(sig) = &self.signature {
            text.push_str(sig);
            text.push(' ');
        }
        text.push_str(&self.content);
        text
    }
}

/// State serialized alongside the usearch file.
#[derive(Serialize, Deserialize)]
struct PersistedState {
    records: HashMap<String, Record>,
    keys: HashMap<String, u64>,
    next_key: u64,
    dimension: usize,
}

struct StoreInner {
    index: Index,
    text: bm25::SearchEngine<u64>,
    records: HashMap<String, Record>,
    keys: HashMap<String, u64>,
    ids_by_key: HashMap<u64, String>,
    next_key: u64,
    dimension: usize,
    config: Config,
}

/// Vector store for semantic search
///
/// Closing takes the write lock, which drains all in-flight operations
/// before resources are released; afterwards every call fails with a
/// store-closed error.
pub struct VectorStore {
    inner: RwLock<Option<StoreInner>>,
}

fn index_options(dimension: usize) -> IndexOptions {
    IndexOptions {
        dimensions: dimension,
        metric: MetricKind::Cos,
        quantization: ScalarKind::F32,
        connectivity: 16,     // M parameter for HNSW
        expansion_add: 128,   // ef_construction
        expansion_search: 64, // ef
        multi: false,
    }
}

fn build_text_engine(records: &HashMap<String, Record>, keys: &HashMap<String, u64>) -> bm25::SearchEngine<u64> {
    let docs: Vec<Document<u64>> = records
        .iter()
        .filter_map(|(id, record)| {
            keys.get(id).map(|key| Document {
                id: *key,
                contents: record.searchable_text(),
            })
        })
        .collect();
    SearchEngineBuilder::<u64>::with_documents(Bm25Language::English, docs).build()
}

impl VectorStore {
    /// Open the store at the configured index directory, loading persisted
    /// state when present.
    pub fn open(config: Config, dimension: usize) -> Result<Self> {
        let index_path = config.index_path();
        let records_path = config.records_path();

        let inner = if index_path.exists() && records_path.exists() {
            info!(path = %index_path.display(), "loading persisted index");

            let state_bytes = std::fs::read(&records_path)?;
            let state: PersistedState = bincode::deserialize(&state_bytes)?;

            if state.dimension != dimension {
                return Err(SemcodeError::Store(format!(
                    "index dimension {} does not match embedder dimension {dimension}; \
                     delete {} to rebuild",
                    state.dimension,
                    config.index_dir.display()
                )));
            }

            let index = Index::new(&index_options(dimension))
                .map_err(|e| SemcodeError::Store(e.to_string()))?;
            index
                .load(&index_path.to_string_lossy())
                .map_err(|e| SemcodeError::Store(e.to_string()))?;

            let ids_by_key = state.keys.iter().map(|(id, k)| (*k, id.clone())).collect();
            let text = build_text_engine(&state.records, &state.keys);

            info!(
                records = state.records.len(),
                vectors = index.size(),
                "index loaded"
            );

            StoreInner {
                index,
                text,
                ids_by_key,
                records: state.records,
                keys: state.keys,
                next_key: state.next_key,
                dimension,
                config,
            }
        } else {
            let index = Index::new(&index_options(dimension))
                .map_err(|e| SemcodeError::Store(e.to_string()))?;
            let text = build_text_engine(&HashMap::new(), &HashMap::new());
            StoreInner {
                index,
                text,
                records: HashMap::new(),
                keys: HashMap::new(),
                ids_by_key: HashMap::new(),
                next_key: 0,
                dimension,
                config,
            }
        };

        Ok(Self {
            inner: RwLock::new(Some(inner)),
        })
    }

    /// Insert or replace records, idempotent by id.
    pub async fn upsert(&self, records: Vec<Record>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut guard = self.inner.write().await;
        let inner = guard.as_mut().ok_or(SemcodeError::StoreClosed)?;

        for record in &records {
            validate_record_id(&record.id)?;
            if record.vector.len() != inner.dimension {
                return Err(SemcodeError::Store(format!(
                    "vector length {} does not match store dimension {} (id {})",
                    record.vector.len(),
                    inner.dimension,
                    record.id
                )));
            }
        }

        let new_size = inner.index.size() + records.len();
        inner
            .index
            .reserve(new_size)
            .map_err(|e| SemcodeError::Store(e.to_string()))?;

        for record in records {
            let key = match inner.keys.get(&record.id) {
                Some(existing) => {
                    // Replace in place: drop the old vector first
                    let _ = inner.index.remove(*existing);
                    *existing
                }
                None => {
                    let key = inner.next_key;
                    inner.next_key += 1;
                    inner.keys.insert(record.id.clone(), key);
                    inner.ids_by_key.insert(key, record.id.clone());
                    key
                }
            };

            inner
                .index
                .add(key, &record.vector)
                .map_err(|e| SemcodeError::Store(e.to_string()))?;
            inner.text.upsert(Document {
                id: key,
                contents: record.searchable_text(),
            });
            debug!(id = %record.id, file = %record.file_path, "record upserted");
            inner.records.insert(record.id.clone(), record);
        }

        Ok(())
    }

    /// Remove every record belonging to a file path. Returns the number
    /// removed.
    pub async fn delete_by_file_path(&self, file_path: &str) -> Result<usize> {
        let mut guard = self.inner.write().await;
        let inner = guard.as_mut().ok_or(SemcodeError::StoreClosed)?;

        let ids: Vec<String> = inner
            .records
            .values()
            .filter(|r| r.file_path == file_path)
            .map(|r| r.id.clone())
            .collect();

        for id in &ids {
            if let Some(key) = inner.keys.remove(id) {
                let _ = inner.index.remove(key);
                inner.text.remove(&key);
                inner.ids_by_key.remove(&key);
            }
            inner.records.remove(id);
        }

        debug!(file = file_path, removed = ids.len(), "records deleted");
        Ok(ids.len())
    }

    /// Search by vector similarity, ordered by descending cosine score.
    ///
    /// The optional predicate must come from the filter builder; anything
    /// else fails with an invalid-filter error.
    pub async fn vector_search(
        &self,
        vector: &[f32],
        k: usize,
        predicate: Option<&str>,
    ) -> Result<Vec<(Record, f32)>> {
        let predicate = predicate.map(Predicate::parse).transpose()?;

        let guard = self.inner.read().await;
        let inner = guard.as_ref().ok_or(SemcodeError::StoreClosed)?;

        if inner.index.size() == 0 {
            return Ok(vec![]);
        }

        // Predicates filter after the ANN pass, so oversample when one is
        // present.
        let fetch = if predicate.is_some() { k * 4 } else { k };
        let fetch = fetch.min(inner.index.size());

        let matches = inner
            .index
            .search(vector, fetch)
            .map_err(|e| SemcodeError::Store(e.to_string()))?;

        let mut results = Vec::new();
        for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            let Some(id) = inner.ids_by_key.get(key) else {
                continue;
            };
            let Some(record) = inner.records.get(id) else {
                continue;
            };
            if let Some(p) = &predicate {
                if !p.matches(record) {
                    continue;
                }
            }
            let score = (1.0 - distance).clamp(0.0, 1.0);
            results.push((record.clone(), score));
            if results.len() == k {
                break;
            }
        }

        Ok(results)
    }

    /// Ranked full-text search with scores normalized to [0, 1].
    ///
    /// Uses bm25 ranking; when the engine yields nothing, falls back to
    /// ranked substring matching over content, name, and signature.
    pub async fn full_text_search(
        &self,
        query: &str,
        k: usize,
        predicate: Option<&str>,
    ) -> Result<Vec<(Record, f32)>> {
        let predicate = predicate.map(Predicate::parse).transpose()?;

        let guard = self.inner.read().await;
        let inner = guard.as_ref().ok_or(SemcodeError::StoreClosed)?;

        let fetch = if predicate.is_some() { k * 4 } else { k };
        let hits = inner.text.search(query, fetch);

        let mut scored: Vec<(Record, f32)> = if hits.is_empty() {
            substring_ranked(query, inner.records.values())
        } else {
            hits.into_iter()
                .filter_map(|hit| {
                    let id = inner.ids_by_key.get(&hit.document.id)?;
                    let record = inner.records.get(id)?;
                    Some((record.clone(), hit.score))
                })
                .collect()
        };

        if let Some(p) = &predicate {
            scored.retain(|(record, _)| p.matches(record));
        }

        // Normalize to [0, 1] against the best hit
        let max = scored
            .iter()
            .map(|(_, s)| *s)
            .fold(0.0_f32, f32::max);
        if max > 0.0 {
            for (_, score) in scored.iter_mut() {
                *score = (*score / max).clamp(0.0, 1.0);
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Total number of records.
    pub async fn count(&self) -> Result<usize> {
        let guard = self.inner.read().await;
        let inner = guard.as_ref().ok_or(SemcodeError::StoreClosed)?;
        Ok(inner.records.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.count().await? == 0)
    }

    /// Map of indexed file paths to their content hashes.
    pub async fn indexed_files(&self) -> Result<HashMap<String, String>> {
        let guard = self.inner.read().await;
        let inner = guard.as_ref().ok_or(SemcodeError::StoreClosed)?;
        Ok(inner
            .records
            .values()
            .map(|r| (r.file_path.clone(), r.content_hash.clone()))
            .collect())
    }

    /// Persist current state without closing.
    pub async fn save(&self) -> Result<()> {
        let guard = self.inner.read().await;
        let inner = guard.as_ref().ok_or(SemcodeError::StoreClosed)?;
        persist(inner)
    }

    /// Drain in-flight operations, persist, and release resources.
    ///
    /// Acquiring the write lock waits for every outstanding reader and
    /// writer, which is the drain protocol. Subsequent operations fail with
    /// a store-closed error.
    pub async fn close(&self) -> Result<()> {
        let mut guard = self.inner.write().await;
        if let Some(inner) = guard.take() {
            persist(&inner)?;
            info!(records = inner.records.len(), "store closed");
        }
        Ok(())
    }
}

fn persist(inner: &StoreInner) -> Result<()> {
    std::fs::create_dir_all(&inner.config.index_dir)?;

    inner
        .index
        .save(&inner.config.index_path().to_string_lossy())
        .map_err(|e| SemcodeError::Store(e.to_string()))?;

    let state = PersistedState {
        records: inner.records.clone(),
        keys: inner.keys.clone(),
        next_key: inner.next_key,
        dimension: inner.dimension,
    };
    let bytes = bincode::serialize(&state)?;
    std::fs::write(inner.config.records_path(), bytes)?;
    Ok(())
}

fn validate_record_id(id: &str) -> Result<()> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SemcodeError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Ranked substring matching over content, name, and signature; the
/// full-text fallback when bm25 yields nothing.
fn substring_ranked<'a>(
    query: &str,
    records: impl Iterator<Item = &'a Record>,
) -> Vec<(Record, f32)> {
    let tokens: Vec<String> = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect();
    if tokens.is_empty() {
        return vec![];
    }

    let mut out = Vec::new();
    for record in records {
        let name = record.name.as_deref().unwrap_or("").to_lowercase();
        let signature = record.signature.as_deref().unwrap_or("").to_lowercase();
        let content = record.content.to_lowercase();

        let mut score = 0.0_f32;
        for token in &tokens {
            if name.contains(token.as_str()) {
                score += 3.0;
            }
            if signature.contains(token.as_str()) {
                score += 2.0;
            }
            if content.contains(token.as_str()) {
                score += 1.0;
            }
        }
        if score > 0.0 {
            out.push((record.clone(), score));
        }
    }
    out
}

/// A parsed filter predicate.
///
/// Only the closed grammar the filter builder emits is accepted:
/// `id LIKE '<pattern>'` and `language = '<lang>'` joined by ` AND `.
#[derive(Debug, PartialEq)]
pub(crate) struct Predicate {
    conditions: Vec<Condition>,
}

#[derive(Debug, PartialEq)]
enum Condition {
    IdLike(String),
    LanguageEq(String),
}

impl Predicate {
    pub(crate) fn parse(input: &str) -> Result<Self> {
        let mut conditions = Vec::new();
        for clause in input.split(" AND ") {
            if let Some(pattern) = clause
                .strip_prefix("id LIKE '")
                .and_then(|rest| rest.strip_suffix('\''))
            {
                if pattern.is_empty()
                    || !pattern
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '%'))
                {
                    return Err(SemcodeError::InvalidFilter(clause.to_string()));
                }
                conditions.push(Condition::IdLike(pattern.to_string()));
            } else if let Some(lang) = clause
                .strip_prefix("language = '")
                .and_then(|rest| rest.strip_suffix('\''))
            {
                if lang.is_empty() || !lang.chars().all(|c| c.is_ascii_lowercase()) {
                    return Err(SemcodeError::InvalidFilter(clause.to_string()));
                }
                conditions.push(Condition::LanguageEq(lang.to_string()));
            } else {
                return Err(SemcodeError::InvalidFilter(clause.to_string()));
            }
        }
        if conditions.is_empty() {
            return Err(SemcodeError::InvalidFilter(input.to_string()));
        }
        Ok(Self { conditions })
    }

    pub(crate) fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| match c {
            Condition::IdLike(pattern) => like_match(pattern, &record.id),
            Condition::LanguageEq(lang) => {
                record.language.map(|l| l.id()) == Some(lang.as_str())
            }
        })
    }
}

/// SQL LIKE semantics: `%` matches any run, `_` matches one character.
/// Literal matching otherwise - no regex involved.
fn like_match(pattern: &str, value: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let v: Vec<char> = value.chars().collect();
    let (mut pi, mut vi) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while vi < v.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == v[vi]) {
            pi += 1;
            vi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some(pi);
            mark = vi;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            vi = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DIM: usize = 4;

    fn test_store(dir: &std::path::Path) -> VectorStore {
        let config = Config::new(dir.to_path_buf());
        VectorStore::open(config, DIM).unwrap()
    }

    fn record(id: &str, file_path: &str, content: &str, vector: [f32; DIM]) -> Record {
        let mut v = vector.to_vec();
        crate::embedder::normalize(&mut v);
        Record {
            id: id.to_string(),
            file_path: file_path.to_string(),
            language: Some(Lang::TypeScript),
            node_kind: "function_declaration".to_string(),
            name: None,
            signature: None,
            docstring: None,
            content: content.to_string(),
            start_line: 1,
            end_line: 3,
            vector: v,
            content_hash: "hash1".to_string(),
            indexed_at: 0,
        }
    }

    #[tokio::test]
    async fn upsert_and_count() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        assert!(store.is_empty().await.unwrap());

        store
            .upsert(vec![
                record("a_ts_L1", "a.ts", "function a() {}", [1.0, 0.0, 0.0, 0.0]),
                record("b_ts_L1", "b.ts", "function b() {}", [0.0, 1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        assert!(!store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_id() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        store
            .upsert(vec![record(
                "a_ts_L1",
                "a.ts",
                "version one",
                [1.0, 0.0, 0.0, 0.0],
            )])
            .await
            .unwrap();
        store
            .upsert(vec![record(
                "a_ts_L1",
                "a.ts",
                "version two",
                [0.0, 1.0, 0.0, 0.0],
            )])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let results = store
            .vector_search(&unit([0.0, 1.0, 0.0, 0.0]), 1, None)
            .await
            .unwrap();
        assert_eq!(results[0].0.content, "version two");
    }

    #[tokio::test]
    async fn delete_then_upsert_leaves_only_v2() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        store
            .upsert(vec![
                record("f_ts_L1", "f.ts", "function a(){return 1}", [1.0, 0.0, 0.0, 0.0]),
                record("f_ts_L5", "f.ts", "function helper(){}", [0.0, 1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        store.delete_by_file_path("f.ts").await.unwrap();
        store
            .upsert(vec![record(
                "f_ts_L1",
                "f.ts",
                "function b(){return 2}",
                [0.0, 0.0, 1.0, 0.0],
            )])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let results = store
            .vector_search(&unit([0.0, 0.0, 1.0, 0.0]), 10, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].0.content.contains("function b"));
    }

    #[tokio::test]
    async fn vector_search_orders_by_similarity() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        store
            .upsert(vec![
                record("x_ts_L1", "x.ts", "close match", [1.0, 0.1, 0.0, 0.0]),
                record("y_ts_L1", "y.ts", "far match", [0.0, 0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store
            .vector_search(&unit([1.0, 0.0, 0.0, 0.0]), 2, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.id, "x_ts_L1");
        assert!(results[0].1 > results[1].1);
        for (_, score) in &results {
            assert!((0.0..=1.0).contains(score));
        }
    }

    #[tokio::test]
    async fn language_predicate_filters() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let mut py = record("m_py_L1", "m.py", "def m(): pass  # padding", [0.0, 1.0, 0.0, 0.0]);
        py.language = Some(Lang::Python);
        let mut go = record("m_go_L1", "m.go", "func m() {}", [0.0, 0.0, 1.0, 0.0]);
        go.language = Some(Lang::Go);

        store
            .upsert(vec![
                record("m_ts_L1", "m.ts", "function m() {}", [1.0, 0.0, 0.0, 0.0]),
                py,
                go,
            ])
            .await
            .unwrap();

        let results = store
            .vector_search(
                &unit([0.5, 0.5, 0.5, 0.0]),
                10,
                Some("language = 'typescript'"),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.language, Some(Lang::TypeScript));
    }

    #[tokio::test]
    async fn id_prefix_predicate_filters() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        store
            .upsert(vec![
                record(
                    "src_auth_login_ts_L1",
                    "src/auth/login.ts",
                    "login handler",
                    [1.0, 0.0, 0.0, 0.0],
                ),
                record(
                    "src_api_user_ts_L1",
                    "src/api/user.ts",
                    "user endpoint",
                    [0.0, 1.0, 0.0, 0.0],
                ),
                record(
                    "test_auth_test_ts_L1",
                    "test/auth.test.ts",
                    "auth tests",
                    [0.0, 0.0, 1.0, 0.0],
                ),
            ])
            .await
            .unwrap();

        let results = store
            .vector_search(
                &unit([1.0, 1.0, 1.0, 0.0]),
                10,
                Some("id LIKE 'src_auth%'"),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.file_path, "src/auth/login.ts");
    }

    #[tokio::test]
    async fn malformed_predicate_rejected() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        store
            .upsert(vec![record("a_ts_L1", "a.ts", "content here", [1.0, 0.0, 0.0, 0.0])])
            .await
            .unwrap();

        let err = store
            .vector_search(
                &unit([1.0, 0.0, 0.0, 0.0]),
                5,
                Some("id LIKE 'a' OR '1'='1'"),
            )
            .await
            .unwrap_err();
        assert!(err.is_security_failure());
    }

    #[tokio::test]
    async fn full_text_search_finds_keywords() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        store
            .upsert(vec![
                record(
                    "login_ts_L1",
                    "login.ts",
                    "function login(username, password) { authenticate(); }",
                    [1.0, 0.0, 0.0, 0.0],
                ),
                record(
                    "query_ts_L1",
                    "query.ts",
                    "function queryUsers(filter) { return db.find(filter); }",
                    [0.0, 1.0, 0.0, 0.0],
                ),
            ])
            .await
            .unwrap();

        let results = store.full_text_search("login password", 5, None).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].0.id, "login_ts_L1");
        for (_, score) in &results {
            assert!((0.0..=1.0).contains(score));
        }
    }

    #[tokio::test]
    async fn invalid_id_rejected() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let bad = record("bad id!", "a.ts", "content", [1.0, 0.0, 0.0, 0.0]);
        let err = store.upsert(vec![bad]).await.unwrap_err();
        assert!(matches!(err, SemcodeError::InvalidId(_)));
    }

    #[tokio::test]
    async fn wrong_dimension_rejected() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let mut bad = record("a_ts_L1", "a.ts", "content", [1.0, 0.0, 0.0, 0.0]);
        bad.vector = vec![1.0, 0.0];
        let err = store.upsert(vec![bad]).await.unwrap_err();
        assert!(matches!(err, SemcodeError::Store(_)));
    }

    #[tokio::test]
    async fn close_drains_then_rejects() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        store
            .upsert(vec![record("a_ts_L1", "a.ts", "content", [1.0, 0.0, 0.0, 0.0])])
            .await
            .unwrap();

        store.close().await.unwrap();
        let err = store.count().await.unwrap_err();
        assert!(matches!(err, SemcodeError::StoreClosed));
        let err = store
            .upsert(vec![record("b_ts_L1", "b.ts", "content", [0.0, 1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, SemcodeError::StoreClosed));
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = test_store(dir.path());
            store
                .upsert(vec![record(
                    "a_ts_L1",
                    "a.ts",
                    "persisted content",
                    [1.0, 0.0, 0.0, 0.0],
                )])
                .await
                .unwrap();
            store.close().await.unwrap();
        }

        let store = test_store(dir.path());
        assert_eq!(store.count().await.unwrap(), 1);
        let files = store.indexed_files().await.unwrap();
        assert_eq!(files.get("a.ts").map(String::as_str), Some("hash1"));
    }

    fn unit(v: [f32; DIM]) -> Vec<f32> {
        let mut v = v.to_vec();
        crate::embedder::normalize(&mut v);
        v
    }

    #[test]
    fn like_match_wildcards() {
        assert!(like_match("src_auth%", "src_auth_login_ts_L1"));
        assert!(!like_match("src_auth%", "test_auth_ts_L1"));
        assert!(like_match("%login%", "src_auth_login_ts_L1"));
        assert!(like_match("a_c", "abc"));
        assert!(!like_match("a_c", "abbc"));
        assert!(like_match("%", "anything"));
        assert!(!like_match("", "x"));
        assert!(like_match("", ""));
    }

    #[test]
    fn predicate_parse_rejects_foreign_clauses() {
        assert!(Predicate::parse("1=1").is_err());
        assert!(Predicate::parse("id LIKE 'a'; DROP TABLE--'").is_err());
        assert!(Predicate::parse("language = 'TypeScript'").is_err());
        assert!(Predicate::parse("").is_err());

        let p = Predicate::parse("id LIKE 'src%' AND language = 'rust'").unwrap();
        assert_eq!(p.conditions.len(), 2);
    }
}
