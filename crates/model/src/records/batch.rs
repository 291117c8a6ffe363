use crate::{
    error::RecordError,
    records::record::{DataChange, Record},
};

/// Drops placeholders, keeping the arrival order of everything else.
pub fn without_placeholders(records: Vec<Record>) -> Vec<Record> {
    records.into_iter().filter(|r| !r.is_placeholder()).collect()
}

/// Keeps only data changes; completion and placeholder markers are dropped.
pub fn data_changes_only(records: Vec<Record>) -> Vec<Record> {
    records.into_iter().filter(Record::is_data_change).collect()
}

pub fn data_change_count(records: &[Record]) -> usize {
    records.iter().filter(|r| r.is_data_change()).count()
}

pub fn has_data_change(records: &[Record]) -> bool {
    records.iter().any(Record::is_data_change)
}

pub fn ends_with_completion(records: &[Record]) -> bool {
    records.last().is_some_and(Record::is_completion)
}

/// Whether the batch carries its channel's completion marker anywhere,
/// including ahead of trailing placeholders.
pub fn has_completion(records: &[Record]) -> bool {
    records.iter().any(Record::is_completion)
}

/// The first data change of a batch. A batch without one is a producer
/// contract violation when the caller needs its TSN.
pub fn first_data_change(records: &[Record]) -> Result<&DataChange, RecordError> {
    records
        .iter()
        .find_map(Record::as_data_change)
        .ok_or(RecordError::MissingDataChange {
            records: records.len(),
        })
}
