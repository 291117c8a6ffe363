use std::sync::atomic::{AtomicU64, Ordering};

/// Progress reported each time a channel position is advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Data changes covered by the acknowledged batch. Zero for marker-only batches.
    pub processed_records: u64,
}

impl ProgressUpdate {
    pub fn new(processed_records: u64) -> Self {
        Self { processed_records }
    }
}

/// Callback owned by the job that created a channel.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, update: ProgressUpdate);
}

/// Listener that accumulates updates; handy for reports and tests.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    processed_records: AtomicU64,
    updates: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub processed_records: u64,
    pub updates: u64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed_records: self.processed_records.load(Ordering::Acquire),
            updates: self.updates.load(Ordering::Acquire),
        }
    }
}

impl ProgressListener for ProgressTracker {
    fn on_progress(&self, update: ProgressUpdate) {
        self.processed_records
            .fetch_add(update.processed_records, Ordering::AcqRel);
        self.updates.fetch_add(1, Ordering::AcqRel);
    }
}
