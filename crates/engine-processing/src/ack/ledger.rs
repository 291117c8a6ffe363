use crate::{ack::AckPosition, importer::pair::ChannelProgressPair};
use engine_config::AckCacheSettings;
use engine_core::metrics::Metrics;
use model::core::identifiers::AckToken;
use moka::{notification::RemovalCause, policy::EvictionPolicy, sync::Cache};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::warn;

/// A batch handed to the sink and still waiting for its acknowledgment.
#[derive(Debug, Clone)]
pub struct AckLedgerEntry {
    pub pair: ChannelProgressPair,
    pub position: AckPosition,
    registered_at: Instant,
}

impl AckLedgerEntry {
    pub fn new(pair: ChannelProgressPair, position: AckPosition) -> Self {
        Self {
            pair,
            position,
            registered_at: Instant::now(),
        }
    }
}

/// Bounded, time-expiring map from ack token to the channel position it covers.
///
/// Lossy: an entry evicted for age or capacity is gone for good and its channel
/// is never advanced past that batch. Evictions are logged and counted but not
/// otherwise surfaced.
pub struct AckLedger {
    cache: Cache<AckToken, Arc<AckLedgerEntry>>,
    ttl: Duration,
}

impl AckLedger {
    pub fn new(settings: &AckCacheSettings, metrics: Metrics) -> Self {
        Self::with_limits(settings.capacity, settings.ttl(), metrics)
    }

    pub fn with_limits(capacity: u64, ttl: Duration, metrics: Metrics) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            // Capacity evictions drop the least recently registered entry.
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(
                move |token: Arc<AckToken>, entry: Arc<AckLedgerEntry>, cause| {
                    if matches!(cause, RemovalCause::Expired | RemovalCause::Size) {
                        metrics.increment_ack_evictions();
                        warn!(
                            ack_token = %token,
                            channel = %entry.pair.name(),
                            records = entry.position.data_change_count,
                            cause = ?cause,
                            "Unacknowledged batch evicted; channel progress will stall at this batch"
                        );
                    }
                },
            )
            .build();

        Self { cache, ttl }
    }

    pub fn register(&self, token: AckToken, entry: AckLedgerEntry) {
        self.cache.insert(token, Arc::new(entry));
    }

    /// Removes and returns the entry for `token`. Unknown, expired and already
    /// consumed tokens all yield `None`.
    pub fn take(&self, token: &AckToken) -> Option<Arc<AckLedgerEntry>> {
        self.cache
            .remove(token)
            .filter(|entry| entry.registered_at.elapsed() < self.ttl)
    }

    pub fn contains(&self, token: &AckToken) -> bool {
        self.cache.contains_key(token)
    }

    /// Number of entries still awaiting acknowledgment, after pending
    /// housekeeping (expiry, eviction) has run.
    pub fn pending(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}
