//! File system watcher for live index updates
//!
//! Watches the root for changes and drives incremental ingest through the
//! index manager. Events are debounced to coalesce editor save-storms; a
//! rename arrives as a deletion of the old path and an add of the new one,
//! which the manager's missing-file handling covers.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, DebouncedEventKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::should_index_file;
use crate::error::{Result, SemcodeError};
use crate::indexer::IndexManager;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Live index updater driven by file-system events.
pub struct IndexWatcher {
    handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl IndexWatcher {
    /// Start watching the manager's root.
    ///
    /// Events under the index directory are ignored, as are files outside
    /// the indexable extension set.
    pub fn start(manager: Arc<IndexManager>) -> Result<Self> {
        let root = manager
            .config()
            .root
            .canonicalize()
            .unwrap_or_else(|_| manager.config().root.clone());
        let index_dir = manager.config().index_dir.clone();
        let debounce = Duration::from_millis(manager.config().debounce_ms);

        let (tx, mut rx) = mpsc::channel::<PathBuf>(EVENT_CHANNEL_CAPACITY);

        let event_index_dir = index_dir.clone();
        let mut debouncer = new_debouncer(
            debounce,
            move |events: std::result::Result<Vec<DebouncedEvent>, notify::Error>| {
                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(error = %e, "watch error");
                        return;
                    }
                };

                let paths: HashSet<PathBuf> = events
                    .into_iter()
                    .filter(|e| {
                        e.kind == DebouncedEventKind::Any
                            && should_index_file(&e.path)
                            && !e.path.starts_with(&event_index_dir)
                    })
                    .map(|e| e.path)
                    .collect();

                for path in paths {
                    // The pump applies backpressure; a full channel just
                    // delays the event past the next debounce window.
                    let _ = tx.blocking_send(path);
                }
            },
        )
        .map_err(|e| SemcodeError::Watch(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| SemcodeError::Watch(e.to_string()))?;

        info!(root = %root.display(), "watching for changes");

        let cancel = manager.cancellation_token();
        let pump_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            // Keep the debouncer alive for the lifetime of the pump; its
            // drop stops event delivery.
            let _debouncer = debouncer;
            loop {
                tokio::select! {
                    _ = pump_cancel.cancelled() => {
                        debug!("watcher cancelled");
                        break;
                    }
                    maybe_path = rx.recv() => {
                        let Some(path) = maybe_path else { break };
                        if let Err(e) = manager.ingest_path(&path).await {
                            warn!(path = %path.display(), error = %e, "reingest failed");
                        }
                    }
                }
            }
        });

        Ok(Self { handle, cancel })
    }

    /// Stop accepting events and wait for the in-flight ingest to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}
