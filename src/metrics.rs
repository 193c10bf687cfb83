//! Bounded metric collection for searches and indexing runs
//!
//! Samples are kept in fixed-size ring buffers; counters are atomic so the
//! watcher and queryer can record concurrently without locks on the hot
//! path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

/// Maximum retained samples per series.
const MAX_SAMPLES: usize = 1000;

/// One recorded search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchSample {
    pub latency_ms: u64,
    pub result_count: usize,
    pub from_fallback: bool,
}

/// One completed indexing pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub chunks_created: usize,
    pub errors: usize,
    pub duration_ms: u64,
}

impl std::fmt::Display for ScanReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} files scanned, {} indexed, {} chunks, {} errors in {}ms",
            self.files_scanned, self.files_indexed, self.chunks_created, self.errors,
            self.duration_ms
        )
    }
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub searches: u64,
    pub fallback_searches: u64,
    pub chunk_errors: u64,
    pub embed_errors: u64,
    pub recent_searches: Vec<SearchSample>,
    pub recent_scans: Vec<ScanReport>,
}

/// Shared metric sink for the engine.
#[derive(Default)]
pub struct Metrics {
    searches: AtomicU64,
    fallback_searches: AtomicU64,
    chunk_errors: AtomicU64,
    embed_errors: AtomicU64,
    search_samples: Mutex<VecDeque<SearchSample>>,
    scan_reports: Mutex<VecDeque<ScanReport>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_search(&self, latency_ms: u64, result_count: usize, from_fallback: bool) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        if from_fallback {
            self.fallback_searches.fetch_add(1, Ordering::Relaxed);
        }
        push_bounded(
            &self.search_samples,
            SearchSample {
                latency_ms,
                result_count,
                from_fallback,
            },
        );
    }

    pub fn record_scan(&self, report: ScanReport) {
        push_bounded(&self.scan_reports, report);
    }

    pub fn record_chunk_error(&self) {
        self.chunk_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_embed_error(&self) {
        self.embed_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            searches: self.searches.load(Ordering::Relaxed),
            fallback_searches: self.fallback_searches.load(Ordering::Relaxed),
            chunk_errors: self.chunk_errors.load(Ordering::Relaxed),
            embed_errors: self.embed_errors.load(Ordering::Relaxed),
            recent_searches: self
                .search_samples
                .lock()
                .map(|q| q.iter().cloned().collect())
                .unwrap_or_default(),
            recent_scans: self
                .scan_reports
                .lock()
                .map(|q| q.iter().cloned().collect())
                .unwrap_or_default(),
        }
    }
}

fn push_bounded<T>(queue: &Mutex<VecDeque<T>>, sample: T) {
    if let Ok(mut q) = queue.lock() {
        if q.len() >= MAX_SAMPLES {
            q.pop_front();
        }
        q.push_back(sample);
    }
}
