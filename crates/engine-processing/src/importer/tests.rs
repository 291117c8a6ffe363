use super::*;
use crate::importer::pair::ChannelProgressPair;
use async_trait::async_trait;
use engine_config::OrderingMode;
use engine_core::{
    connectors::memory::MemoryChannel,
    error::{RateLimitError, SinkError},
    progress::ProgressTracker,
};
use model::{
    core::value::{FieldValue, Value},
    records::{
        record::{DataChange, Position, Tsn},
        row::RowData,
    },
};
use std::{sync::atomic::AtomicUsize, time::Duration};

#[derive(Default)]
struct RecordingSink {
    batches: std::sync::Mutex<Vec<(AckToken, Vec<Record>)>>,
    closes: AtomicUsize,
    fail: bool,
}

impl RecordingSink {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn batches(&self) -> Vec<(AckToken, Vec<Record>)> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn write(&self, ack_token: &AckToken, records: Vec<Record>) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::Protocol("peer went away".into()));
        }
        self.batches
            .lock()
            .unwrap()
            .push((ack_token.clone(), records));
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct CountingLimiter {
    calls: AtomicUsize,
}

#[async_trait]
impl RateLimiter for CountingLimiter {
    async fn intercept(&self, kind: OperationKind, permits: u32) -> Result<(), RateLimitError> {
        assert_eq!(kind, OperationKind::Write);
        assert_eq!(permits, 1);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn change(pos: u64, tsn: u64) -> Record {
    DataChange::insert(
        Position(pos),
        Tsn(tsn),
        RowData::new("orders", vec![FieldValue::new("id", Value::Uint(pos))]),
    )
    .into()
}

fn completion(pos: u64) -> Record {
    Record::Completion {
        position: Position(pos),
    }
}

fn settings(ordering: OrderingMode) -> ImporterSettings {
    ImporterSettings::default()
        .with_ordering(ordering)
        .with_fetch_timeout(Duration::from_millis(10))
}

struct Fixture {
    importer: Arc<Importer>,
    registry: Arc<ImporterRegistry>,
    sink: Arc<RecordingSink>,
    channel: Arc<MemoryChannel>,
    tracker: Arc<ProgressTracker>,
}

fn fixture(settings: ImporterSettings, sink: RecordingSink) -> Fixture {
    let registry = Arc::new(ImporterRegistry::new());
    let sink = Arc::new(sink);
    let channel = Arc::new(MemoryChannel::new("orders", 64));
    let tracker = Arc::new(ProgressTracker::new());

    let importer = Importer::builder(settings, sink.clone(), registry.clone())
        .channel(ChannelProgressPair::new(channel.clone(), tracker.clone()))
        .build()
        .unwrap();

    Fixture {
        importer,
        registry,
        sink,
        channel,
        tracker,
    }
}

#[tokio::test]
async fn delivered_batch_advances_channel_only_after_ack() {
    let f = fixture(settings(OrderingMode::Unordered), RecordingSink::default());
    f.channel
        .push(vec![change(1, 1), change(2, 2), completion(3)])
        .await;

    f.importer.start().await.unwrap();

    let batches = f.sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].1.len(), 3);
    assert_eq!(f.channel.committed_position().await, None);
    assert_eq!(f.importer.pending_acknowledgements(), 1);

    f.registry.acknowledge(&batches[0].0).await;

    assert_eq!(f.channel.committed_position().await, Some(Position(3)));
    assert_eq!(f.tracker.snapshot().processed_records, 2);
    assert_eq!(f.importer.state(), ImporterState::Finished);
    assert_eq!(f.importer.metrics().snapshot().batches_acknowledged, 1);
}

#[tokio::test]
async fn finished_importer_stays_routable_until_stopped() {
    let f = fixture(settings(OrderingMode::Unordered), RecordingSink::default());
    f.channel.push(vec![change(1, 1), completion(2)]).await;

    f.importer.start().await.unwrap();
    assert!(f.registry.find(f.importer.importer_id()).is_some());

    f.importer.stop().await;
    assert!(f.registry.is_empty());
}

#[tokio::test]
async fn second_start_is_rejected() {
    let f = fixture(settings(OrderingMode::Unordered), RecordingSink::default());
    f.channel.push(vec![completion(1)]).await;

    f.importer.start().await.unwrap();
    let err = f.importer.start().await.unwrap_err();
    assert!(matches!(err, ImporterError::AlreadyStarted(_)));
}

#[tokio::test]
async fn stop_ends_loop_and_closes_sink_once() {
    let f = fixture(settings(OrderingMode::Unordered), RecordingSink::default());
    let mut state = f.importer.subscribe_state();

    let running = tokio::spawn({
        let importer = f.importer.clone();
        async move { importer.start().await }
    });

    state
        .wait_for(|s| *s == ImporterState::Running)
        .await
        .unwrap();
    f.importer.stop().await;
    running.await.unwrap().unwrap();

    assert_eq!(f.importer.state(), ImporterState::Stopped);
    assert_eq!(f.sink.closes.load(Ordering::SeqCst), 1);
    assert!(f.registry.is_empty());
}

#[tokio::test]
async fn stop_before_start_skips_the_loop() {
    let f = fixture(settings(OrderingMode::Ordered), RecordingSink::default());
    f.channel.push(vec![change(1, 1)]).await;

    f.importer.stop().await;
    f.importer.start().await.unwrap();

    assert_eq!(f.importer.state(), ImporterState::Stopped);
    assert!(f.sink.batches().is_empty());
    assert!(f.registry.is_empty());
}

#[tokio::test]
async fn sink_failure_fails_the_importer() {
    let f = fixture(settings(OrderingMode::Unordered), RecordingSink::failing());
    f.channel.push(vec![change(1, 1)]).await;

    let err = f.importer.start().await.unwrap_err();

    assert!(matches!(err, ImporterError::Sink { .. }));
    assert_eq!(f.importer.state(), ImporterState::Failed);
    assert_eq!(f.sink.closes.load(Ordering::SeqCst), 1);
    assert_eq!(f.channel.committed_position().await, None);
}

#[tokio::test]
async fn unknown_token_is_ignored_and_counted() {
    let f = fixture(settings(OrderingMode::Unordered), RecordingSink::default());

    f.importer
        .acknowledge(&AckToken::generate(f.importer.importer_id()))
        .await;

    assert_eq!(f.importer.metrics().snapshot().ack_misses, 1);
    assert_eq!(f.channel.acknowledgement_count().await, 0);
}

#[tokio::test]
async fn ordered_sink_sees_only_data_but_ack_covers_whole_batch() {
    let f = fixture(settings(OrderingMode::Ordered), RecordingSink::default());
    f.channel
        .push(vec![
            Record::Placeholder {
                position: Position(1),
            },
            change(2, 7),
            completion(3),
        ])
        .await;

    f.importer.start().await.unwrap();

    let batches = f.sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].1, vec![change(2, 7)]);

    f.importer.acknowledge(&batches[0].0).await;
    assert_eq!(f.channel.committed_position().await, Some(Position(3)));
    assert_eq!(f.tracker.snapshot().processed_records, 1);
}

#[tokio::test]
async fn rate_limiter_is_consulted_for_every_non_empty_batch() {
    let registry = Arc::new(ImporterRegistry::new());
    let channel = Arc::new(MemoryChannel::new("orders", 64));
    let limiter = Arc::new(CountingLimiter::default());
    channel.push(vec![change(1, 1), change(2, 2)]).await;
    channel.push(vec![change(3, 3), completion(4)]).await;

    let importer = Importer::builder(
        settings(OrderingMode::Unordered).with_batch_size(2),
        Arc::new(RecordingSink::default()),
        registry,
    )
    .channel(ChannelProgressPair::new(
        channel,
        Arc::new(ProgressTracker::new()),
    ))
    .rate_limiter(limiter.clone())
    .build()
    .unwrap();

    importer.start().await.unwrap();

    assert_eq!(limiter.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn invalid_settings_are_rejected_at_build() {
    let result = Importer::builder(
        ImporterSettings::default().with_batch_size(0),
        Arc::new(RecordingSink::default()),
        Arc::new(ImporterRegistry::new()),
    )
    .build();

    assert!(matches!(result, Err(ImporterError::Settings(_))));
}
