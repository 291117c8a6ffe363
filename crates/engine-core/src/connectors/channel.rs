use crate::error::ChannelError;
use async_trait::async_trait;
use model::records::record::Record;
use std::time::Duration;

/// A bounded, per-source queue of records written by a capture producer and
/// drained by exactly one importer.
///
/// Records come out in arrival order. `peek` and `poll` work on whole batches as
/// the producer pushed them; `fetch` works on individual records.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Takes up to `batch_size` records, waiting at most `timeout` for them.
    async fn fetch(&self, batch_size: usize, timeout: Duration)
    -> Result<Vec<Record>, ChannelError>;

    /// Returns the next buffered batch without removing it. Never blocks.
    async fn peek(&self) -> Result<Vec<Record>, ChannelError>;

    /// Removes and returns the next buffered batch. Never blocks.
    async fn poll(&self) -> Result<Vec<Record>, ChannelError>;

    /// Advances the durable read position through the given records.
    async fn acknowledge(&self, records: &[Record]) -> Result<(), ChannelError>;
}
