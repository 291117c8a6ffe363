use crate::error::SinkError;
use async_trait::async_trait;
use model::{core::identifiers::AckToken, records::record::Record};

/// Destination of delivered batches.
///
/// A sink confirms durable receipt out of band by handing `ack_token` back to
/// the issuing importer.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn write(&self, ack_token: &AckToken, records: Vec<Record>) -> Result<(), SinkError>;

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
