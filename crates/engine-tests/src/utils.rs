use async_trait::async_trait;
use engine_config::{ImporterSettings, OrderingMode};
use engine_core::{
    connectors::{channel::Channel, memory::MemoryChannel, sink::Sink},
    error::{ChannelError, SinkError},
    progress::{ProgressListener, ProgressTracker, ProgressUpdate},
};
use engine_processing::{
    importer::{Importer, pair::ChannelProgressPair},
    registry::ImporterRegistry,
};
use engine_runtime::execution::spawn::spawn_importer;
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
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tokio::sync::Mutex;

/// Fetch wait used by every test importer; keeps idle cycles short.
pub const FETCH_TIMEOUT: Duration = Duration::from_millis(10);

pub fn change(table: &str, pos: u64, tsn: u64) -> Record {
    DataChange::insert(
        Position(pos),
        Tsn(tsn),
        RowData::new(table, vec![FieldValue::new("id", Value::Uint(pos))]),
    )
    .into()
}

pub fn completion(pos: u64) -> Record {
    Record::Completion {
        position: Position(pos),
    }
}

pub fn placeholder(pos: u64) -> Record {
    Record::Placeholder {
        position: Position(pos),
    }
}

pub fn settings(ordering: OrderingMode) -> ImporterSettings {
    ImporterSettings::default()
        .with_ordering(ordering)
        .with_fetch_timeout(FETCH_TIMEOUT)
}

/// TSNs of every data change the sink received, in delivery order.
pub fn delivered_tsns(batches: &[(AckToken, Vec<Record>)]) -> Vec<u64> {
    batches
        .iter()
        .flat_map(|(_, records)| records.iter().filter_map(Record::tsn))
        .map(|tsn| tsn.0)
        .collect()
}

/// Sink that keeps every batch it was handed.
#[derive(Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<(AckToken, Vec<Record>)>>,
}

impl RecordingSink {
    pub async fn batches(&self) -> Vec<(AckToken, Vec<Record>)> {
        self.batches.lock().await.clone()
    }

    pub async fn tokens(&self) -> Vec<AckToken> {
        self.batches
            .lock()
            .await
            .iter()
            .map(|(token, _)| token.clone())
            .collect()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn write(&self, ack_token: &AckToken, records: Vec<Record>) -> Result<(), SinkError> {
        self.batches
            .lock()
            .await
            .push((ack_token.clone(), records));
        Ok(())
    }
}

/// Channel that replays a fixed list of batches and records every
/// acknowledgment it receives.
pub struct ScriptedChannel {
    name: String,
    script: Mutex<VecDeque<Vec<Record>>>,
    acknowledged: Mutex<Vec<Vec<Record>>>,
}

impl ScriptedChannel {
    pub fn new(name: &str, script: Vec<Vec<Record>>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            acknowledged: Mutex::new(Vec::new()),
        }
    }

    pub async fn acknowledged(&self) -> Vec<Vec<Record>> {
        self.acknowledged.lock().await.clone()
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _: usize, timeout: Duration) -> Result<Vec<Record>, ChannelError> {
        let next = self.script.lock().await.pop_front();
        match next {
            Some(batch) => Ok(batch),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
        }
    }

    async fn peek(&self) -> Result<Vec<Record>, ChannelError> {
        Ok(self.script.lock().await.front().cloned().unwrap_or_default())
    }

    async fn poll(&self) -> Result<Vec<Record>, ChannelError> {
        Ok(self.script.lock().await.pop_front().unwrap_or_default())
    }

    async fn acknowledge(&self, records: &[Record]) -> Result<(), ChannelError> {
        self.acknowledged.lock().await.push(records.to_vec());
        Ok(())
    }
}

/// Listener that keeps every update in arrival order.
#[derive(Default)]
pub struct RecordingListener {
    updates: std::sync::Mutex<Vec<u64>>,
}

impl RecordingListener {
    pub fn updates(&self) -> Vec<u64> {
        self.updates
            .lock()
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }
}

impl ProgressListener for RecordingListener {
    fn on_progress(&self, update: ProgressUpdate) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(update.processed_records);
        }
    }
}

/// One importer over in-memory channels, with everything a test inspects.
pub struct Harness {
    pub importer: Arc<Importer>,
    pub registry: Arc<ImporterRegistry>,
    pub sink: Arc<RecordingSink>,
    pub channels: Vec<Arc<MemoryChannel>>,
    pub trackers: Vec<Arc<ProgressTracker>>,
}

impl Harness {
    pub fn new(settings: ImporterSettings, channel_names: &[&str]) -> Self {
        Self::with_registry(settings, channel_names, Arc::new(ImporterRegistry::new()))
    }

    pub fn with_registry(
        settings: ImporterSettings,
        channel_names: &[&str],
        registry: Arc<ImporterRegistry>,
    ) -> Self {
        let sink = Arc::new(RecordingSink::default());
        let channels: Vec<_> = channel_names
            .iter()
            .map(|name| Arc::new(MemoryChannel::new(*name, 1024)))
            .collect();
        let trackers: Vec<_> = channels
            .iter()
            .map(|_| Arc::new(ProgressTracker::new()))
            .collect();

        let pairs = channels.iter().zip(&trackers).map(|(channel, tracker)| {
            let channel: Arc<dyn Channel> = channel.clone();
            let tracker: Arc<dyn ProgressListener> = tracker.clone();
            ChannelProgressPair::new(channel, tracker)
        });

        let importer = Importer::builder(settings, sink.clone(), registry.clone())
            .channels(pairs)
            .build()
            .expect("valid test settings");

        Self {
            importer,
            registry,
            sink,
            channels,
            trackers,
        }
    }

    pub async fn push(&self, channel: usize, records: Vec<Record>) {
        self.channels[channel].push(records).await;
    }

    /// Runs the importer until every channel has completed.
    pub async fn run_to_completion(&self) {
        let handle = spawn_importer(self.importer.clone());
        tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .expect("importer did not finish in time")
            .expect("importer failed");
    }

    pub async fn acknowledge_all(&self) {
        for token in self.sink.tokens().await {
            self.registry.acknowledge(&token).await;
        }
    }
}
