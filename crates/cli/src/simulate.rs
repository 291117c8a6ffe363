use crate::error::CliError;
use async_trait::async_trait;
use engine_config::{ImporterSettings, OrderingMode};
use engine_core::{
    connectors::{channel::Channel, memory::MemoryChannel, sink::Sink},
    error::SinkError,
    metrics::{Metrics, MetricsSnapshot},
    progress::{ProgressListener, ProgressTracker},
};
use engine_processing::{
    importer::{Importer, ImporterState, pair::ChannelProgressPair},
    registry::ImporterRegistry,
};
use engine_runtime::execution::executor::PipelineExecutor;
use model::{
    core::{
        identifiers::AckToken,
        value::{FieldValue, Value},
    },
    records::{
        record::{DataChange, Position, Record, Tsn},
        row::RowData,
    },
};
use serde::Serialize;
use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Records pushed to a channel per producer write.
const PRODUCER_CHUNK: u64 = 16;

#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub channels: usize,
    pub changes: u64,
    pub ack_latency: Duration,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub importer_id: String,
    pub ordering: OrderingMode,
    pub state: String,
    pub elapsed_ms: u128,
    pub channels: Vec<ChannelReport>,
    pub metrics: MetricsReport,
}

#[derive(Debug, Serialize)]
pub struct ChannelReport {
    pub name: String,
    pub committed_position: Option<u64>,
    pub acknowledged_changes: u64,
    pub progress_updates: u64,
}

#[derive(Debug, Serialize)]
pub struct MetricsReport {
    pub batches_delivered: u64,
    pub records_delivered: u64,
    pub batches_acknowledged: u64,
    pub inline_acknowledgements: u64,
    pub ack_misses: u64,
    pub ack_evictions: u64,
}

impl From<MetricsSnapshot> for MetricsReport {
    fn from(s: MetricsSnapshot) -> Self {
        Self {
            batches_delivered: s.batches_delivered,
            records_delivered: s.records_delivered,
            batches_acknowledged: s.batches_acknowledged,
            inline_acknowledgements: s.inline_acknowledgements,
            ack_misses: s.ack_misses,
            ack_evictions: s.ack_evictions,
        }
    }
}

/// Sink standing in for a downstream consumer: forwards each batch's token
/// to a task that confirms it after a delay.
struct ForwardingSink {
    tx: Mutex<Option<mpsc::UnboundedSender<AckToken>>>,
}

impl ForwardingSink {
    fn new(tx: mpsc::UnboundedSender<AckToken>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }
}

#[async_trait]
impl Sink for ForwardingSink {
    async fn write(&self, ack_token: &AckToken, records: Vec<Record>) -> Result<(), SinkError> {
        debug!(ack_token = %ack_token, records = records.len(), "Forwarding batch downstream");
        let guard = self
            .tx
            .lock()
            .map_err(|_| SinkError::Other("sink lock poisoned".into()))?;
        let tx = guard.as_ref().ok_or(SinkError::Closed)?;
        tx.send(ack_token.clone()).map_err(|_| SinkError::Closed)
    }

    async fn close(&self) -> Result<(), SinkError> {
        // Dropping the sender lets the consumer drain and exit.
        self.tx
            .lock()
            .map_err(|_| SinkError::Other("sink lock poisoned".into()))?
            .take();
        Ok(())
    }
}

fn generated_change(channel: usize, channels: usize, seq: u64) -> Record {
    let table = format!("table_{channel}");
    let row = RowData::new(
        &table,
        vec![
            FieldValue::new("id", Value::Uint(seq)),
            FieldValue::new("payload", Value::String(format!("row-{channel}-{seq}"))),
        ],
    );
    // TSNs interleave across channels so the ordered merge has work to do.
    let tsn = seq * channels as u64 + channel as u64 + 1;
    DataChange::insert(Position(seq + 1), Tsn(tsn), row).into()
}

fn spawn_producer(
    idx: usize,
    params: &SimulationParams,
    channel: Arc<MemoryChannel>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let channels = params.channels;
    let changes = params.changes;

    tokio::spawn(async move {
        let mut seq = 0;
        while seq < changes {
            let end = (seq + PRODUCER_CHUNK).min(changes);
            let batch: Vec<Record> = (seq..end)
                .map(|s| generated_change(idx, channels, s))
                .collect();
            seq = end;

            tokio::select! {
                _ = channel.push(batch) => {}
                _ = cancel.cancelled() => return,
            }
        }

        let done = vec![Record::Completion {
            position: Position(changes + 1),
        }];
        tokio::select! {
            _ = channel.push(done) => {}
            _ = cancel.cancelled() => {}
        }
        debug!(channel = %channel.name(), "Producer finished");
    })
}

fn spawn_consumer(
    mut rx: mpsc::UnboundedReceiver<AckToken>,
    registry: Arc<ImporterRegistry>,
    latency: Duration,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut confirmed = 0;
        while let Some(token) = rx.recv().await {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            registry.acknowledge(&token).await;
            confirmed += 1;
        }
        confirmed
    })
}

pub async fn run(
    settings: ImporterSettings,
    params: SimulationParams,
    cancel: CancellationToken,
) -> Result<SimulationReport, CliError> {
    if params.channels == 0 {
        return Err(CliError::InvalidArgument(
            "--channels must be at least 1".into(),
        ));
    }

    let started = Instant::now();
    let registry = Arc::new(ImporterRegistry::new());
    let metrics = Metrics::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let capacity = settings.batch_size.saturating_mul(4).max(PRODUCER_CHUNK as usize);

    let channels: Vec<Arc<MemoryChannel>> = (0..params.channels)
        .map(|i| Arc::new(MemoryChannel::new(format!("channel-{i}"), capacity)))
        .collect();
    let trackers: Vec<Arc<ProgressTracker>> = channels
        .iter()
        .map(|_| Arc::new(ProgressTracker::new()))
        .collect();

    let pairs = channels.iter().zip(&trackers).map(|(channel, tracker)| {
        let channel: Arc<dyn Channel> = channel.clone();
        let listener: Arc<dyn ProgressListener> = tracker.clone();
        ChannelProgressPair::new(channel, listener)
    });

    let importer = Importer::builder(
        settings.clone(),
        Arc::new(ForwardingSink::new(tx)),
        registry.clone(),
    )
    .channels(pairs)
    .metrics(metrics.clone())
    .cancel_token(&cancel)
    .build()?;

    info!(
        importer_id = %importer.importer_id(),
        channels = params.channels,
        changes = params.changes,
        ordering = ?settings.ordering,
        "Starting simulation"
    );

    let producers: Vec<_> = channels
        .iter()
        .enumerate()
        .map(|(idx, channel)| spawn_producer(idx, &params, channel.clone(), cancel.clone()))
        .collect();
    let consumer = spawn_consumer(rx, registry.clone(), params.ack_latency);

    let outcome = PipelineExecutor::new(cancel.clone())
        .with_importer(importer.clone())
        .run()
        .await;

    // The sink is closed once the loop exits, so the consumer drains what is
    // in flight and stops.
    let confirmed = consumer.await?;
    for producer in producers {
        producer.await?;
    }
    importer.stop().await;
    outcome?;

    info!(confirmed, "Downstream consumer drained");

    let mut reports = Vec::with_capacity(channels.len());
    for (channel, tracker) in channels.iter().zip(&trackers) {
        let progress = tracker.snapshot();
        reports.push(ChannelReport {
            name: channel.name().to_string(),
            committed_position: channel.committed_position().await.map(|p| p.0),
            acknowledged_changes: progress.processed_records,
            progress_updates: progress.updates,
        });
    }

    let state = importer.state();
    if state == ImporterState::Finished {
        info!("All channels drained");
    }

    Ok(SimulationReport {
        importer_id: importer.importer_id().to_string(),
        ordering: settings.ordering,
        state: state.to_string(),
        elapsed_ms: started.elapsed().as_millis(),
        channels: reports,
        metrics: metrics.snapshot().into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(channels: usize, changes: u64) -> SimulationParams {
        SimulationParams {
            channels,
            changes,
            ack_latency: Duration::from_millis(1),
        }
    }

    fn settings(ordering: OrderingMode) -> ImporterSettings {
        ImporterSettings::default()
            .with_ordering(ordering)
            .with_batch_size(32)
            .with_fetch_timeout(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn every_change_is_acknowledged_in_both_modes() {
        for ordering in [OrderingMode::Unordered, OrderingMode::Ordered] {
            let report = run(settings(ordering), params(3, 100), CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(report.state, "finished", "{ordering:?}");
            assert_eq!(report.channels.len(), 3);
            for channel in &report.channels {
                assert_eq!(channel.acknowledged_changes, 100);
                assert_eq!(channel.committed_position, Some(101));
            }
            assert!(report.metrics.records_delivered >= 300);
            assert_eq!(report.metrics.ack_misses, 0);
        }
    }

    #[tokio::test]
    async fn cancellation_stops_the_run() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = run(settings(OrderingMode::Ordered), params(2, 1_000_000), cancel)
            .await
            .unwrap();

        assert_eq!(report.state, "stopped");
    }

    #[tokio::test]
    async fn zero_channels_is_rejected() {
        let err = run(
            settings(OrderingMode::Unordered),
            params(0, 1),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument(_)));
    }
}
