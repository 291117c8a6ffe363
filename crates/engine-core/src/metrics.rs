use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    batches_delivered: AtomicU64,
    records_delivered: AtomicU64,
    batches_acknowledged: AtomicU64,
    inline_acknowledgements: AtomicU64,
    ack_misses: AtomicU64,
    ack_evictions: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub batches_delivered: u64,
    pub records_delivered: u64,
    pub batches_acknowledged: u64,
    pub inline_acknowledgements: u64,
    pub ack_misses: u64,
    pub ack_evictions: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn record_delivery(&self, records: u64) {
        self.inner.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.inner
            .records_delivered
            .fetch_add(records, Ordering::Relaxed);
    }

    pub fn increment_acknowledged(&self) {
        self.inner
            .batches_acknowledged
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_inline_acknowledged(&self) {
        self.inner
            .inline_acknowledgements
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_ack_misses(&self) {
        self.inner.ack_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_ack_evictions(&self) {
        self.inner.ack_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_delivered: self.inner.batches_delivered.load(Ordering::Relaxed),
            records_delivered: self.inner.records_delivered.load(Ordering::Relaxed),
            batches_acknowledged: self.inner.batches_acknowledged.load(Ordering::Relaxed),
            inline_acknowledgements: self.inner.inline_acknowledgements.load(Ordering::Relaxed),
            ack_misses: self.inner.ack_misses.load(Ordering::Relaxed),
            ack_evictions: self.inner.ack_evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
