//! Progress event stream
//!
//! Long-running operations publish events to a broadcast channel the caller
//! may subscribe to or ignore. Sending never blocks and never fails the
//! operation - a send with no subscribers is simply dropped.

use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Events emitted during indexing and search.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The initial scan discovered its work list.
    ScanStarted { total_files: usize },
    /// One file finished ingesting.
    FileIndexed {
        path: String,
        chunks: usize,
        position: usize,
        total: usize,
    },
    /// One file failed; the scan continues.
    FileFailed { path: String, message: String },
    /// The scan finished.
    ScanCompleted {
        files: usize,
        chunks: usize,
        errors: usize,
        duration_ms: u64,
    },
    /// Free-form note, e.g. degraded-mode announcements.
    Note(String),
}

/// Cloneable handle publishing progress events.
#[derive(Clone)]
pub struct ProgressChannel {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressChannel {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to future events. Dropping the receiver is fine.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. No-op when nobody is listening.
    pub fn send(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }

    pub fn note(&self, message: impl Into<String>) {
        self.send(ProgressEvent::Note(message.into()));
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let channel = ProgressChannel::new();
        let mut rx = channel.subscribe();

        channel.send(ProgressEvent::ScanStarted { total_files: 3 });
        channel.note("halfway");

        match rx.recv().await.unwrap() {
            ProgressEvent::ScanStarted { total_files } => assert_eq!(total_files, 3),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            ProgressEvent::Note(note) => assert_eq!(note, "halfway"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn send_without_subscribers_is_silent() {
        let channel = ProgressChannel::new();
        channel.note("nobody listening");
    }
}
