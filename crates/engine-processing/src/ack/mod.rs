use model::records::{
    batch::data_change_count,
    record::Record,
};

pub mod ledger;

pub use ledger::{AckLedger, AckLedgerEntry};

/// What acknowledging one delivered batch means for its channel: advance
/// through `last_record` and report `data_change_count` processed changes.
#[derive(Debug, Clone, PartialEq)]
pub struct AckPosition {
    pub last_record: Record,
    pub data_change_count: usize,
}

impl AckPosition {
    pub fn new(last_record: Record, data_change_count: usize) -> Self {
        Self {
            last_record,
            data_change_count,
        }
    }

    /// Position covering a whole batch, or `None` for an empty batch.
    pub fn for_batch(records: &[Record]) -> Option<Self> {
        records
            .last()
            .map(|last| Self::new(last.clone(), data_change_count(records)))
    }
}
