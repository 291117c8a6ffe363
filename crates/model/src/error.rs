use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// A batch that must carry at least one data change had none.
    #[error("Batch of {records} record(s) contains no data change")]
    MissingDataChange { records: usize },
}
