use model::{
    error::RecordError,
    records::{
        batch::first_data_change,
        record::{Record, Tsn},
    },
};
use std::{cmp::Reverse, collections::BinaryHeap};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error(transparent)]
    MissingDataChange(#[from] RecordError),

    #[error("channel #{0} already has a batch waiting in the merge")]
    SlotOccupied(usize),

    #[error("channel #{0} is not part of this merge")]
    UnknownChannel(usize),
}

/// K-way merge of channel batches by the TSN of each batch's first data change.
///
/// Channels are addressed by index. Each channel owns one slot, so at most one
/// batch per channel is held in memory at any time; this also keeps a channel's
/// own batches in fetch order. Equal TSNs pop in insertion order.
#[derive(Debug)]
pub struct OrderingMerge {
    heap: BinaryHeap<Reverse<(Tsn, u64, usize)>>,
    slots: Vec<Option<Vec<Record>>>,
    finished: Vec<bool>,
    next_seq: u64,
}

impl OrderingMerge {
    pub fn new(channels: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(channels),
            slots: vec![None; channels],
            finished: vec![false; channels],
            next_seq: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Smallest TSN currently held, if any.
    pub fn oldest_tsn(&self) -> Option<Tsn> {
        self.heap.peek().map(|Reverse((tsn, _, _))| *tsn)
    }

    pub fn has_pending(&self, channel: usize) -> bool {
        self.slots.get(channel).is_some_and(Option::is_some)
    }

    /// Queues a batch for `channel`, keyed by its first data change.
    pub fn push(&mut self, channel: usize, records: Vec<Record>) -> Result<Tsn, MergeError> {
        let slot = self
            .slots
            .get_mut(channel)
            .ok_or(MergeError::UnknownChannel(channel))?;
        if slot.is_some() {
            return Err(MergeError::SlotOccupied(channel));
        }

        let tsn = first_data_change(&records)?.tsn;
        *slot = Some(records);
        self.heap.push(Reverse((tsn, self.next_seq, channel)));
        self.next_seq += 1;
        Ok(tsn)
    }

    /// Removes the batch with the globally smallest TSN.
    pub fn pop(&mut self) -> Option<(usize, Vec<Record>)> {
        let Reverse((_, _, channel)) = self.heap.pop()?;
        let records = self.slots[channel].take()?;
        Some((channel, records))
    }

    pub fn mark_finished(&mut self, channel: usize) {
        if let Some(flag) = self.finished.get_mut(channel) {
            *flag = true;
        }
    }

    pub fn is_finished(&self, channel: usize) -> bool {
        self.finished.get(channel).copied().unwrap_or(true)
    }

    pub fn all_finished(&self) -> bool {
        self.finished.iter().all(|f| *f)
    }
}
