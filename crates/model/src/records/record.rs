use crate::records::row::RowData;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Producer-assigned read position inside one channel. Acknowledging a record
/// advances the channel's committed position through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position(pub u64);

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction sequence number, assigned per source at commit time.
///
/// Only comparable within one source stream; equal values across sources carry
/// no ordering meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tsn(pub u64);

impl fmt::Display for Tsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChange {
    pub position: Position,
    pub tsn: Tsn,
    pub table: String,
    pub operation: Operation,
    pub before: Option<RowData>,
    pub after: Option<RowData>,
}

impl DataChange {
    pub fn insert(position: Position, tsn: Tsn, after: RowData) -> Self {
        Self {
            position,
            tsn,
            table: after.entity.clone(),
            operation: Operation::Insert,
            before: None,
            after: Some(after),
        }
    }

    pub fn update(position: Position, tsn: Tsn, before: RowData, after: RowData) -> Self {
        Self {
            position,
            tsn,
            table: after.entity.clone(),
            operation: Operation::Update,
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn delete(position: Position, tsn: Tsn, before: RowData) -> Self {
        Self {
            position,
            tsn,
            table: before.entity.clone(),
            operation: Operation::Delete,
            before: Some(before),
            after: None,
        }
    }
}

/// The unit flowing through a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    /// A captured row-level change.
    DataChange(DataChange),
    /// The channel will produce nothing after this record.
    Completion { position: Position },
    /// Nothing to deliver right now, but the channel is alive. Never reaches a sink.
    Placeholder { position: Position },
}

impl Record {
    pub fn position(&self) -> Position {
        match self {
            Record::DataChange(change) => change.position,
            Record::Completion { position } | Record::Placeholder { position } => *position,
        }
    }

    pub fn tsn(&self) -> Option<Tsn> {
        match self {
            Record::DataChange(change) => Some(change.tsn),
            Record::Completion { .. } | Record::Placeholder { .. } => None,
        }
    }

    pub fn as_data_change(&self) -> Option<&DataChange> {
        match self {
            Record::DataChange(change) => Some(change),
            Record::Completion { .. } | Record::Placeholder { .. } => None,
        }
    }

    pub fn is_data_change(&self) -> bool {
        matches!(self, Record::DataChange(_))
    }

    pub fn is_completion(&self) -> bool {
        matches!(self, Record::Completion { .. })
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Record::Placeholder { .. })
    }
}

impl From<DataChange> for Record {
    fn from(change: DataChange) -> Self {
        Record::DataChange(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::{FieldValue, Value};

    fn row(id: i64) -> RowData {
        RowData::new("orders", vec![FieldValue::new("id", Value::Int(id))])
    }

    #[test]
    fn constructors_shape_row_images() {
        let insert = DataChange::insert(Position(1), Tsn(10), row(1));
        assert!(insert.before.is_none() && insert.after.is_some());
        assert_eq!(insert.table, "orders");

        let update = DataChange::update(Position(2), Tsn(11), row(1), row(2));
        assert!(update.before.is_some() && update.after.is_some());

        let delete = DataChange::delete(Position(3), Tsn(12), row(2));
        assert_eq!(delete.operation, Operation::Delete);
        assert!(delete.after.is_none());
    }

    #[test]
    fn only_data_changes_carry_a_tsn() {
        let change: Record = DataChange::insert(Position(4), Tsn(5), row(1)).into();
        assert_eq!(change.tsn(), Some(Tsn(5)));
        assert_eq!(change.position(), Position(4));

        let done = Record::Completion { position: Position(9) };
        assert_eq!(done.tsn(), None);
        assert_eq!(done.position(), Position(9));
        assert!(done.is_completion());
    }

    #[test]
    fn records_serialize_with_a_kind_tag() {
        let json = serde_json::to_value(Record::Placeholder {
            position: Position(3),
        })
        .unwrap();
        assert_eq!(json["kind"], "placeholder");
        assert_eq!(json["position"], 3);
    }
}
