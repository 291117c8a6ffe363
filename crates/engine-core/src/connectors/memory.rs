use crate::{connectors::channel::Channel, error::ChannelError};
use async_trait::async_trait;
use model::records::{
    batch::ends_with_completion,
    record::{Position, Record},
};
use std::{collections::VecDeque, time::Duration};
use tokio::{
    sync::{Mutex, Notify},
    time::{Instant, timeout},
};
use tracing::debug;

#[derive(Debug, Default)]
struct ChannelState {
    batches: VecDeque<Vec<Record>>,
    buffered: usize,
    committed: Option<Position>,
    acknowledgements: u64,
}

impl ChannelState {
    fn take_up_to(&mut self, limit: usize) -> Vec<Record> {
        let mut out = Vec::new();
        while out.len() < limit {
            let Some(mut front) = self.batches.pop_front() else {
                break;
            };
            let want = limit - out.len();
            if front.len() > want {
                let rest = front.split_off(want);
                self.batches.push_front(rest);
            }
            out.extend(front);
        }
        self.buffered -= out.len();
        out
    }

    fn pop_batch(&mut self) -> Vec<Record> {
        let batch = self.batches.pop_front().unwrap_or_default();
        self.buffered -= batch.len();
        batch
    }
}

/// In-process channel bounded by the number of buffered records.
///
/// Producers push whole batches; a push waits while the buffer is full, except
/// that a single oversized batch is always admitted into an empty buffer.
#[derive(Debug)]
pub struct MemoryChannel {
    name: String,
    capacity: usize,
    state: Mutex<ChannelState>,
    data_ready: Notify,
    space_ready: Notify,
}

impl MemoryChannel {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            state: Mutex::new(ChannelState::default()),
            data_ready: Notify::new(),
            space_ready: Notify::new(),
        }
    }

    pub async fn push(&self, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }

        loop {
            {
                let mut state = self.state.lock().await;
                if state.buffered == 0 || state.buffered + records.len() <= self.capacity {
                    state.buffered += records.len();
                    state.batches.push_back(records);
                    break;
                }
            }
            self.space_ready.notified().await;
        }

        self.data_ready.notify_one();
    }

    /// Position the channel has been acknowledged through, if any.
    pub async fn committed_position(&self) -> Option<Position> {
        self.state.lock().await.committed
    }

    pub async fn acknowledgement_count(&self) -> u64 {
        self.state.lock().await.acknowledgements
    }

    pub async fn buffered(&self) -> usize {
        self.state.lock().await.buffered
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        batch_size: usize,
        wait: Duration,
    ) -> Result<Vec<Record>, ChannelError> {
        let deadline = Instant::now() + wait;
        let mut out = Vec::new();

        loop {
            let taken = self.state.lock().await.take_up_to(batch_size - out.len());
            if !taken.is_empty() {
                out.extend(taken);
                self.space_ready.notify_one();
            }

            // Nothing can follow a completion marker.
            if out.len() >= batch_size || ends_with_completion(&out) {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let _ = timeout(deadline - now, self.data_ready.notified()).await;
        }

        Ok(out)
    }

    async fn peek(&self) -> Result<Vec<Record>, ChannelError> {
        let state = self.state.lock().await;
        Ok(state.batches.front().cloned().unwrap_or_default())
    }

    async fn poll(&self) -> Result<Vec<Record>, ChannelError> {
        let batch = self.state.lock().await.pop_batch();
        if !batch.is_empty() {
            self.space_ready.notify_one();
        }
        Ok(batch)
    }

    async fn acknowledge(&self, records: &[Record]) -> Result<(), ChannelError> {
        let Some(last) = records.iter().map(Record::position).max() else {
            return Ok(());
        };

        let mut state = self.state.lock().await;
        state.committed = Some(state.committed.map_or(last, |current| current.max(last)));
        state.acknowledgements += 1;
        debug!(channel = %self.name, position = %last, "Channel acknowledged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{
        core::value::{FieldValue, Value},
        records::{
            record::{DataChange, Tsn},
            row::RowData,
        },
    };
    use std::sync::Arc;

    fn change(pos: u64) -> Record {
        DataChange::insert(
            Position(pos),
            Tsn(pos),
            RowData::new("t", vec![FieldValue::new("id", Value::Uint(pos))]),
        )
        .into()
    }

    #[tokio::test]
    async fn fetch_splits_batches_at_batch_size() {
        let channel = MemoryChannel::new("c", 16);
        channel.push(vec![change(1), change(2), change(3)]).await;

        let first = channel.fetch(2, Duration::from_millis(10)).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].position(), Position(2));

        let second = channel.fetch(2, Duration::from_millis(10)).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(channel.buffered().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_returns_empty_after_timeout() {
        let channel = MemoryChannel::new("c", 16);
        let started = Instant::now();

        let out = channel.fetch(10, Duration::from_secs(2)).await.unwrap();

        assert!(out.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn fetch_stops_at_completion() {
        let channel = MemoryChannel::new("c", 16);
        channel
            .push(vec![change(1), Record::Completion { position: Position(2) }])
            .await;

        let out = channel.fetch(100, Duration::from_secs(60)).await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn fetch_wakes_on_push() {
        let channel = Arc::new(MemoryChannel::new("c", 16));
        let producer = channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push(vec![change(1)]).await;
        });

        let out = channel.fetch(1, Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn peek_does_not_consume_but_poll_does() {
        let channel = MemoryChannel::new("c", 16);
        channel.push(vec![change(1), change(2)]).await;
        channel.push(vec![change(3)]).await;

        assert_eq!(channel.peek().await.unwrap().len(), 2);
        assert_eq!(channel.peek().await.unwrap().len(), 2);
        assert_eq!(channel.poll().await.unwrap().len(), 2);
        assert_eq!(channel.poll().await.unwrap().len(), 1);
        assert!(channel.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn push_waits_for_space() {
        let channel = Arc::new(MemoryChannel::new("c", 2));
        channel.push(vec![change(1), change(2)]).await;

        let producer = channel.clone();
        let pending = tokio::spawn(async move { producer.push(vec![change(3)]).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        channel.poll().await.unwrap();
        pending.await.unwrap();
        assert_eq!(channel.buffered().await, 1);
    }

    #[tokio::test]
    async fn acknowledge_only_moves_forward() {
        let channel = MemoryChannel::new("c", 16);

        channel.acknowledge(&[change(5)]).await.unwrap();
        channel.acknowledge(&[change(3)]).await.unwrap();
        channel.acknowledge(&[]).await.unwrap();

        assert_eq!(channel.committed_position().await, Some(Position(5)));
        assert_eq!(channel.acknowledgement_count().await, 2);
    }
}
