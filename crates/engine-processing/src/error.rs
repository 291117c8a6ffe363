use crate::importer::merge::MergeError;
use engine_config::SettingsError;
use engine_core::error::{ChannelError, RateLimitError, SinkError};
use model::error::RecordError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImporterError {
    #[error("Channel '{channel}' failed: {source}")]
    Channel {
        channel: String,
        #[source]
        source: ChannelError,
    },

    #[error("Failed to write batch '{token}' to sink: {source}")]
    Sink {
        token: String,
        #[source]
        source: SinkError,
    },

    #[error("Failed to stream batch from channel '{channel}': {source}")]
    Connector {
        channel: String,
        #[source]
        source: SinkError,
    },

    #[error("Rate limiter failed: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("Channel '{channel}' broke the record contract: {source}")]
    MissingDataChange {
        channel: String,
        #[source]
        source: RecordError,
    },

    #[error("Ordering merge rejected a batch from channel '{channel}': {source}")]
    Merge {
        channel: String,
        #[source]
        source: MergeError,
    },

    #[error("Invalid importer settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Importer '{0}' was already started")]
    AlreadyStarted(String),
}
