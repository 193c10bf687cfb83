//! Index management: discovery, incremental ingest, and lifecycle
//!
//! Walks the root respecting .gitignore and the configured ignore globs,
//! hashes file content for change detection, and keeps the vector store
//! consistent through delete-then-upsert ingests. Writes to the same path
//! are serialized; across paths a bounded worker pool runs in parallel.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunker::Chunker;
use crate::config::{should_index_file, Config};
use crate::embedder::EmbeddingProvider;
use crate::error::{Result, SemcodeError};
use crate::metrics::{Metrics, ScanReport};
use crate::paths::{normalize_separators, strip_bom};
use crate::progress::{ProgressChannel, ProgressEvent};
use crate::store::{Record, VectorStore};

/// A file staged for ingestion: content read, BOM stripped, hash computed.
#[derive(Debug)]
struct StagedFile {
    relative_path: String,
    content: String,
    hash: String,
}

/// Owns the write path of the index.
///
/// The retrieval pipeline reads the same store but never mutates it.
pub struct IndexManager {
    config: Config,
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Arc<Chunker>,
    metrics: Arc<Metrics>,
    progress: ProgressChannel,
    cancel: CancellationToken,
    workers: Arc<Semaphore>,
    path_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    initialized: Mutex<bool>,
}

impl IndexManager {
    pub fn new(
        config: Config,
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        metrics: Arc<Metrics>,
        progress: ProgressChannel,
    ) -> Self {
        let chunker = Arc::new(Chunker::new(config.chunk_target_size));
        let workers = Arc::new(Semaphore::new(config.workers.max(1)));
        Self {
            config,
            store,
            embedder,
            chunker,
            metrics,
            progress,
            cancel: CancellationToken::new(),
            workers,
            path_locks: std::sync::Mutex::new(HashMap::new()),
            initialized: Mutex::new(false),
        }
    }

    pub fn store(&self) -> Arc<VectorStore> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the initial scan once. Later calls return immediately, so the
    /// first search pays the indexing cost and the rest do not.
    pub async fn ensure_indexed(&self) -> Result<()> {
        let mut initialized = self.initialized.lock().await;
        if *initialized {
            return Ok(());
        }
        self.scan().await?;
        *initialized = true;
        Ok(())
    }

    /// Walk the root and bring the store up to date with the file tree.
    ///
    /// Per-file failures are counted and logged; they never abort the scan.
    pub async fn scan(&self) -> Result<ScanReport> {
        let started = Instant::now();
        let files = self.discover().await?;
        let total = files.len();

        info!(total, root = %self.config.root.display(), "scan started");
        self.progress
            .send(ProgressEvent::ScanStarted { total_files: total });

        let known = self.store.indexed_files().await?;

        // Purge records for files that disappeared since the last scan
        let current: HashSet<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        for stale in known.keys().filter(|p| !current.contains(p.as_str())) {
            self.store.delete_by_file_path(stale).await?;
            debug!(file = %stale, "removed deleted file from index");
        }

        let mut report = ScanReport {
            files_scanned: total,
            ..Default::default()
        };

        let mut tasks = tokio::task::JoinSet::new();
        for (position, file) in files.into_iter().enumerate() {
            // Cancellation takes effect between files, never mid-file
            if self.cancel.is_cancelled() {
                warn!("scan cancelled after {position} files");
                break;
            }

            if known.get(&file.relative_path) == Some(&file.hash) {
                debug!(file = %file.relative_path, "unchanged, skipping");
                continue;
            }

            let permit = Arc::clone(&self.workers)
                .acquire_owned()
                .await
                .map_err(|e| SemcodeError::Store(e.to_string()))?;
            let store = Arc::clone(&self.store);
            let embedder = Arc::clone(&self.embedder);
            let chunker = Arc::clone(&self.chunker);
            let metrics = Arc::clone(&self.metrics);
            let progress = self.progress.clone();
            let lock = self.path_lock(&file.relative_path);

            tasks.spawn(async move {
                let _permit = permit;
                let _guard = lock.lock().await;
                let path = file.relative_path.clone();
                let outcome =
                    ingest_content(&store, &embedder, &chunker, &metrics, file).await;
                match &outcome {
                    Ok(chunks) => progress.send(ProgressEvent::FileIndexed {
                        path,
                        chunks: *chunks,
                        position,
                        total,
                    }),
                    Err(e) => progress.send(ProgressEvent::FileFailed {
                        path,
                        message: e.to_string(),
                    }),
                }
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(chunks)) => {
                    report.files_indexed += 1;
                    report.chunks_created += chunks;
                }
                Ok(Err(e)) => {
                    report.errors += 1;
                    warn!(error = %e, "file ingest failed");
                }
                Err(e) => {
                    report.errors += 1;
                    warn!(error = %e, "ingest task panicked");
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        info!(%report, "scan finished");
        self.progress.send(ProgressEvent::ScanCompleted {
            files: report.files_indexed,
            chunks: report.chunks_created,
            errors: report.errors,
            duration_ms: report.duration_ms,
        });

        self.metrics.record_scan(report.clone());
        self.store.save().await?;
        Ok(report)
    }

    /// Re-ingest a single file after a watcher event. Missing files are
    /// treated as deletions.
    pub async fn ingest_path(&self, abs_path: &Path) -> Result<()> {
        let relative_path = self.relative_path(abs_path);
        let lock = self.path_lock(&relative_path);
        let _guard = lock.lock().await;

        let bytes = match tokio::fs::read(abs_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let removed = self.store.delete_by_file_path(&relative_path).await?;
                if removed > 0 {
                    info!(file = %relative_path, removed, "file deleted, records purged");
                }
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let content = strip_bom(&String::from_utf8_lossy(&bytes)).to_string();
        let hash = content_hash(&content);

        let known = self.store.indexed_files().await?;
        if known.get(&relative_path) == Some(&hash) {
            debug!(file = %relative_path, "content unchanged, skipping reingest");
            return Ok(());
        }

        let staged = StagedFile {
            relative_path: relative_path.clone(),
            content,
            hash,
        };
        let chunks = ingest_content(
            &self.store,
            &self.embedder,
            &self.chunker,
            &self.metrics,
            staged,
        )
        .await?;
        info!(file = %relative_path, chunks, "file reindexed");
        Ok(())
    }

    /// Map of indexed file paths to content hashes.
    pub async fn indexed_files(&self) -> Result<HashMap<String, String>> {
        self.store.indexed_files().await
    }

    /// Stop accepting work, then drain and close the store.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();
        self.store.close().await
    }

    /// Discover indexable files under the root (blocking walk + parallel
    /// read, off the async runtime).
    async fn discover(&self) -> Result<Vec<StagedFile>> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || discover_files(&config))
            .await
            .map_err(|e| SemcodeError::Store(e.to_string()))?
    }

    fn relative_path(&self, abs_path: &Path) -> String {
        let rel = abs_path.strip_prefix(&self.config.root).unwrap_or(abs_path);
        normalize_separators(&rel.to_string_lossy())
    }

    fn path_lock(&self, relative_path: &str) -> Arc<Mutex<()>> {
        let mut locks = self.path_locks.lock().expect("path lock table");
        Arc::clone(
            locks
                .entry(relative_path.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

/// Chunk, embed, and store one file's content. Stale records for the path
/// are purged first so the store never holds a mix of versions.
async fn ingest_content(
    store: &VectorStore,
    embedder: &Arc<dyn EmbeddingProvider>,
    chunker: &Arc<Chunker>,
    metrics: &Metrics,
    file: StagedFile,
) -> Result<usize> {
    let StagedFile {
        relative_path,
        content,
        hash,
    } = file;

    let chunk_input = content;
    let chunker = Arc::clone(chunker);
    let path_for_chunks = relative_path.clone();
    let chunks = tokio::task::spawn_blocking(move || chunker.chunk(&chunk_input, &path_for_chunks))
        .await
        .map_err(|e| {
            metrics.record_chunk_error();
            SemcodeError::Chunker {
                file: relative_path.clone(),
                message: e.to_string(),
            }
        })?;

    if chunks.is_empty() {
        // Nothing chunkable; still drop any stale records for the path
        store.delete_by_file_path(&relative_path).await?;
        return Ok(0);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let embed_with = Arc::clone(embedder);
    let outcome = tokio::task::spawn_blocking(move || embed_with.embed_batch(&texts))
        .await
        .map_err(|e| SemcodeError::EmbeddingGeneration(e.to_string()))?;

    for failure in &outcome.failures {
        metrics.record_embed_error();
        warn!(
            file = %relative_path,
            index = failure.index,
            message = %failure.message,
            "chunk embedding failed"
        );
    }

    let mut by_index: HashMap<usize, Vec<f32>> = outcome.vectors.into_iter().collect();
    let records: Vec<Record> = chunks
        .into_iter()
        .enumerate()
        .filter_map(|(i, chunk)| {
            by_index
                .remove(&i)
                .map(|vector| Record::from_chunk(chunk, vector, hash.clone()))
        })
        .collect();

    if records.is_empty() {
        return Err(SemcodeError::EmbeddingGeneration(format!(
            "no chunk of {relative_path} could be embedded"
        )));
    }

    let stored = records.len();
    store.delete_by_file_path(&relative_path).await?;
    store.upsert(records).await?;
    Ok(stored)
}

/// Blocking discovery: walk the tree, then read candidates in parallel.
fn discover_files(config: &Config) -> Result<Vec<StagedFile>> {
    let root = config
        .root
        .canonicalize()
        .unwrap_or_else(|_| config.root.clone());

    let mut overrides = OverrideBuilder::new(&root);
    for pattern in &config.ignore_patterns {
        // Leading "!" inverts an override into an ignore rule
        overrides
            .add(&format!("!{pattern}"))
            .map_err(|e| SemcodeError::Config(format!("bad ignore pattern {pattern}: {e}")))?;
    }
    // The index itself must never be indexed
    overrides
        .add("!.semantic-code/**")
        .map_err(|e| SemcodeError::Config(e.to_string()))?;
    let overrides = overrides
        .build()
        .map_err(|e| SemcodeError::Config(e.to_string()))?;

    let walker = WalkBuilder::new(&root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .ignore(true)
        .parents(true)
        .overrides(overrides)
        .build();

    let file_paths: Vec<PathBuf> = walker
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().map(|ft| ft.is_file()).unwrap_or(false)
                && should_index_file(entry.path())
        })
        .filter(|entry| {
            entry
                .metadata()
                .map(|m| m.len() <= config.max_file_size)
                .unwrap_or(false)
        })
        .map(|entry| entry.path().to_path_buf())
        .collect();

    // Read files in parallel
    let staged: Vec<StagedFile> = file_paths
        .par_iter()
        .filter_map(|path| {
            let bytes = std::fs::read(path).ok()?;
            let content = strip_bom(&String::from_utf8_lossy(&bytes)).to_string();
            let relative_path = normalize_separators(
                &path
                    .strip_prefix(&root)
                    .unwrap_or(path)
                    .to_string_lossy(),
            );
            let hash = content_hash(&content);
            Some(StagedFile {
                relative_path,
                content,
                hash,
            })
        })
        .collect();

    debug!(files = staged.len(), "discovery complete");
    Ok(staged)
}

/// SHA-256 hex digest used as the change-detection token.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
