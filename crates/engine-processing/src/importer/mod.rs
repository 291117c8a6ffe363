use crate::{
    ack::{AckLedger, AckLedgerEntry, AckPosition},
    error::ImporterError,
    registry::ImporterRegistry,
};
use engine_config::{ImporterSettings, OrderingMode};
use engine_core::{
    connectors::sink::Sink,
    metrics::Metrics,
    rate_limit::{OperationKind, QpsRateLimiter, RateLimiter},
};
use model::{
    core::identifiers::{AckToken, ImporterId},
    records::record::Record,
};
use pair::ChannelProgressPair;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod merge;
pub mod ordered;
pub mod pair;
pub mod unordered;

#[cfg(test)]
mod tests;

/// Lifecycle of one importer, published through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImporterState {
    Idle,
    Running,
    /// Every channel emitted its completion marker.
    Finished,
    /// `stop()` ended the loop.
    Stopped,
    Failed,
}

impl ImporterState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImporterState::Finished | ImporterState::Stopped | ImporterState::Failed
        )
    }
}

impl fmt::Display for ImporterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImporterState::Idle => "idle",
            ImporterState::Running => "running",
            ImporterState::Finished => "finished",
            ImporterState::Stopped => "stopped",
            ImporterState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Drains a fixed set of channels into one sink and tracks every delivered
/// batch until its acknowledgment comes back.
pub struct Importer {
    id: ImporterId,
    settings: ImporterSettings,
    pairs: Mutex<Option<Vec<ChannelProgressPair>>>,
    sink: Arc<dyn Sink>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    ledger: AckLedger,
    registry: Arc<ImporterRegistry>,
    cancel: CancellationToken,
    state: watch::Sender<ImporterState>,
    sink_closed: AtomicBool,
    metrics: Metrics,
}

impl Importer {
    pub fn builder(
        settings: ImporterSettings,
        sink: Arc<dyn Sink>,
        registry: Arc<ImporterRegistry>,
    ) -> ImporterBuilder {
        ImporterBuilder::new(settings, sink, registry)
    }

    pub fn importer_id(&self) -> &ImporterId {
        &self.id
    }

    pub fn settings(&self) -> &ImporterSettings {
        &self.settings
    }

    pub fn state(&self) -> ImporterState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ImporterState> {
        self.state.subscribe()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Batches delivered to the sink and not yet acknowledged.
    pub fn pending_acknowledgements(&self) -> u64 {
        self.ledger.pending()
    }

    /// Registers the importer and runs its loop until every channel completes
    /// or `stop()` is called.
    ///
    /// The importer stays registered after a natural finish so that late
    /// acknowledgments for delivered batches still resolve; `stop()` removes it.
    pub async fn start(self: &Arc<Self>) -> Result<(), ImporterError> {
        let pairs = self
            .pairs
            .lock()
            .await
            .take()
            .ok_or_else(|| ImporterError::AlreadyStarted(self.id.to_string()))?;

        if self.cancel.is_cancelled() {
            self.state.send_replace(ImporterState::Stopped);
            return Ok(());
        }

        self.registry.register(Arc::clone(self));
        self.state.send_replace(ImporterState::Running);
        info!(
            importer_id = %self.id,
            channels = pairs.len(),
            ordering = ?self.settings.ordering,
            "Importer started"
        );

        let result = match self.settings.ordering {
            OrderingMode::Unordered => self.run_unordered(pairs).await,
            OrderingMode::Ordered => self.run_ordered(pairs).await,
        };

        self.close_sink().await;

        let state = match &result {
            Ok(()) if self.cancel.is_cancelled() => ImporterState::Stopped,
            Ok(()) => ImporterState::Finished,
            Err(err) => {
                error!(importer_id = %self.id, error = %err, "Importer failed");
                ImporterState::Failed
            }
        };
        self.state.send_replace(state);
        info!(importer_id = %self.id, state = %state, "Importer loop exited");

        result
    }

    /// Requests loop termination, deregisters the importer and releases the sink.
    ///
    /// The loop observes the request between cycles, so an in-flight fetch or
    /// sink write finishes first.
    pub async fn stop(&self) {
        info!(importer_id = %self.id, "Stopping importer");
        self.cancel.cancel();
        self.registry.deregister(&self.id);
        self.close_sink().await;

        // Never-started importers have no loop to publish the final state.
        self.state.send_if_modified(|state| {
            if *state == ImporterState::Idle {
                *state = ImporterState::Stopped;
                true
            } else {
                false
            }
        });
    }

    /// Resolves `token` against the ack ledger and advances its channel.
    ///
    /// Unknown, expired and repeated tokens are silently ignored. A channel that
    /// refuses the acknowledgment is logged; the entry is consumed either way.
    pub async fn acknowledge(&self, token: &AckToken) {
        let Some(entry) = self.ledger.take(token) else {
            self.metrics.increment_ack_misses();
            debug!(importer_id = %self.id, ack_token = %token, "Ack token not found");
            return;
        };

        let position = &entry.position;
        match entry
            .pair
            .advance(&position.last_record, position.data_change_count)
            .await
        {
            Ok(()) => {
                self.metrics.increment_acknowledged();
                debug!(
                    importer_id = %self.id,
                    ack_token = %token,
                    channel = %entry.pair.name(),
                    records = position.data_change_count,
                    "Batch acknowledged"
                );
            }
            Err(err) => {
                error!(
                    importer_id = %self.id,
                    ack_token = %token,
                    channel = %entry.pair.name(),
                    error = %err,
                    "Channel rejected acknowledgment"
                );
            }
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) async fn throttle(&self) -> Result<(), ImporterError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.intercept(OperationKind::Write, 1).await?;
        }
        Ok(())
    }

    /// Registers the ledger entry, then hands `records` to the sink. The entry
    /// must exist before the write so that a fast acknowledgment can resolve it.
    pub(crate) async fn deliver(
        &self,
        pair: &ChannelProgressPair,
        position: AckPosition,
        records: Vec<Record>,
    ) -> Result<(), ImporterError> {
        let token = AckToken::generate(&self.id);
        debug!(
            importer_id = %self.id,
            ack_token = %token,
            channel = %pair.name(),
            records = records.len(),
            "Delivering batch"
        );

        self.ledger
            .register(token.clone(), AckLedgerEntry::new(pair.clone(), position));
        self.metrics.record_delivery(records.len() as u64);

        self.sink
            .write(&token, records)
            .await
            .map_err(|source| ImporterError::Sink {
                token: token.to_string(),
                source,
            })
    }

    /// Acknowledges a batch without a round trip through the sink. Used for
    /// batches with no data changes, which no downstream consumer will confirm.
    pub(crate) async fn acknowledge_inline(
        &self,
        pair: &ChannelProgressPair,
        records: &[Record],
    ) -> Result<(), ImporterError> {
        let Some(last) = records.last() else {
            return Ok(());
        };

        pair.advance(last, 0)
            .await
            .map_err(|source| ImporterError::Channel {
                channel: pair.name().to_string(),
                source,
            })?;
        self.metrics.increment_inline_acknowledged();
        debug!(
            importer_id = %self.id,
            channel = %pair.name(),
            position = %last.position(),
            "Marker-only batch acknowledged in-line"
        );
        Ok(())
    }

    async fn close_sink(&self) {
        if self.sink_closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.sink.close().await {
            warn!(importer_id = %self.id, error = %err, "Failed to close sink");
        }
    }
}

impl fmt::Debug for Importer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Importer")
            .field("id", &self.id)
            .field("ordering", &self.settings.ordering)
            .field("state", &self.state())
            .finish()
    }
}

pub struct ImporterBuilder {
    settings: ImporterSettings,
    sink: Arc<dyn Sink>,
    registry: Arc<ImporterRegistry>,
    pairs: Vec<ChannelProgressPair>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    metrics: Option<Metrics>,
    cancel: Option<CancellationToken>,
}

/// Token bucket described by `settings.rate_limit`, if one is configured.
pub(crate) fn settings_rate_limiter(
    settings: &ImporterSettings,
) -> Result<Option<Arc<dyn RateLimiter>>, ImporterError> {
    let Some(limits) = &settings.rate_limit else {
        return Ok(None);
    };
    let limiter: Arc<dyn RateLimiter> = Arc::new(QpsRateLimiter::new(limits)?);
    Ok(Some(limiter))
}

impl ImporterBuilder {
    pub fn new(
        settings: ImporterSettings,
        sink: Arc<dyn Sink>,
        registry: Arc<ImporterRegistry>,
    ) -> Self {
        Self {
            settings,
            sink,
            registry,
            pairs: Vec::new(),
            rate_limiter: None,
            metrics: None,
            cancel: None,
        }
    }

    /// Adds a channel. Channels are serviced in the order they are added.
    pub fn channel(mut self, pair: ChannelProgressPair) -> Self {
        self.pairs.push(pair);
        self
    }

    pub fn channels(mut self, pairs: impl IntoIterator<Item = ChannelProgressPair>) -> Self {
        self.pairs.extend(pairs);
        self
    }

    /// Overrides the limiter built from `settings.rate_limit`.
    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Links `stop()` to a parent token; cancelling the parent stops the loop.
    pub fn cancel_token(mut self, parent: &CancellationToken) -> Self {
        self.cancel = Some(parent.child_token());
        self
    }

    pub fn build(self) -> Result<Arc<Importer>, ImporterError> {
        self.settings.validate()?;

        let rate_limiter = match self.rate_limiter {
            Some(limiter) => Some(limiter),
            None => settings_rate_limiter(&self.settings)?,
        };

        let metrics = self.metrics.unwrap_or_default();
        let ledger = AckLedger::new(&self.settings.ack_cache, metrics.clone());
        let (state, _) = watch::channel(ImporterState::Idle);

        Ok(Arc::new(Importer {
            id: ImporterId::generate(),
            settings: self.settings,
            pairs: Mutex::new(Some(self.pairs)),
            sink: self.sink,
            rate_limiter,
            ledger,
            registry: self.registry,
            cancel: self.cancel.unwrap_or_default(),
            state,
            sink_closed: AtomicBool::new(false),
            metrics,
        }))
    }
}
