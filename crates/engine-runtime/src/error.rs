use engine_processing::error::ImporterError;
use thiserror::Error;

/// Errors surfaced to whatever supervises a set of importers.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The importer task panicked or was aborted.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// The importer loop terminated with an error.
    #[error("Importer error: {0}")]
    Importer(#[from] ImporterError),
}
