use crate::{
    ack::AckPosition,
    error::ImporterError,
    importer::{pair::ChannelProgressPair, settings_rate_limiter},
};
use async_trait::async_trait;
use engine_config::ImporterSettings;
use engine_core::{
    error::SinkError,
    rate_limit::{OperationKind, RateLimiter},
};
use model::{
    core::identifiers::ImporterId,
    records::{
        batch::{ends_with_completion, has_data_change, without_placeholders},
        record::Record,
    },
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Per-subscriber stream to one remote client.
///
/// The connector confirms receipt by calling
/// [`SocketSinkImporter::acknowledge_last_delivered`] once the peer has acked
/// over the wire.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn send(&self, records: Vec<Record>) -> Result<(), SinkError>;

    /// Frees per-subscriber resources. Called once when the importer stops.
    async fn release(&self);
}

/// Single channel to single socket client: fetch, send, and let the connector
/// acknowledge. No merge and no ack ledger.
pub struct SocketSinkImporter {
    id: ImporterId,
    pair: ChannelProgressPair,
    connector: Arc<dyn StreamConnector>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    batch_size: usize,
    fetch_timeout: Duration,
    cancel: CancellationToken,
    released: AtomicBool,
}

impl SocketSinkImporter {
    pub fn new(
        settings: &ImporterSettings,
        pair: ChannelProgressPair,
        connector: Arc<dyn StreamConnector>,
    ) -> Result<Self, ImporterError> {
        settings.validate()?;
        let rate_limiter = settings_rate_limiter(settings)?;
        Ok(Self {
            id: ImporterId::generate(),
            pair,
            connector,
            rate_limiter,
            batch_size: settings.batch_size,
            fetch_timeout: settings.socket_fetch_timeout(),
            cancel: CancellationToken::new(),
            released: AtomicBool::new(false),
        })
    }

    /// Replaces the limiter built from the settings.
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn importer_id(&self) -> &ImporterId {
        &self.id
    }

    pub async fn start(&self) -> Result<(), ImporterError> {
        info!(importer_id = %self.id, channel = %self.pair.name(), "Socket importer started");
        let result = self.run().await;
        if let Err(err) = &result {
            error!(importer_id = %self.id, error = %err, "Socket importer failed");
        }
        self.release().await;
        result
    }

    pub async fn stop(&self) {
        info!(importer_id = %self.id, "Stopping socket importer");
        self.cancel.cancel();
        self.release().await;
    }

    /// Advances the channel through `position` and reports its data changes.
    /// Channel failures are logged; the connector has nothing to retry.
    pub async fn acknowledge_last_delivered(&self, position: AckPosition) {
        if let Err(err) = self
            .pair
            .advance(&position.last_record, position.data_change_count)
            .await
        {
            error!(
                importer_id = %self.id,
                channel = %self.pair.name(),
                error = %err,
                "Channel rejected acknowledgment"
            );
        }
    }

    async fn run(&self) -> Result<(), ImporterError> {
        while !self.cancel.is_cancelled() {
            let fetched = self
                .pair
                .channel()
                .fetch(self.batch_size, self.fetch_timeout)
                .await
                .map_err(|source| ImporterError::Channel {
                    channel: self.pair.name().to_string(),
                    source,
                })?;

            let records = without_placeholders(fetched);
            if records.is_empty() {
                continue;
            }

            if let Some(limiter) = &self.rate_limiter {
                limiter.intercept(OperationKind::Write, 1).await?;
            }

            let completes = ends_with_completion(&records);
            if has_data_change(&records) {
                debug!(importer_id = %self.id, records = records.len(), "Sending batch");
                self.connector
                    .send(records)
                    .await
                    .map_err(|source| ImporterError::Connector {
                        channel: self.pair.name().to_string(),
                        source,
                    })?;
            } else if let Some(position) = AckPosition::for_batch(&records) {
                self.acknowledge_last_delivered(position).await;
            }

            if completes {
                info!(importer_id = %self.id, channel = %self.pair.name(), "Channel completed");
                break;
            }
        }

        Ok(())
    }

    async fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.connector.release().await;
        }
    }
}
