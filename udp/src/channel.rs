use std::collections::BTreeMap;

use crate::sequence::{sequence_greater_than, sequence_less_than};

/// Reliable-ordered channel carrying peer-management system messages
pub const CHANNEL_CONFIG: u8 = 0;
/// Reliable-ordered channel for `TransferMode::Reliable`
pub const CHANNEL_RELIABLE: u8 = 1;
/// Unreliable sequenced channel; stale packets are dropped, never late
pub const CHANNEL_UNRELIABLE: u8 = 2;
/// Unreliable channel with no ordering at all
pub const CHANNEL_UNORDERED: u8 = 3;
/// Application channels configured via `set_channel_count` start here
pub const FIRST_CUSTOM_CHANNEL: u8 = 4;

/// In-order delivery for one reliable channel of one remote connection.
///
/// Incoming items may arrive duplicated or out of order; `receive` buffers
/// anything ahead of the expected sequence and releases a contiguous run
/// once the gap fills. Duplicates and already-delivered sequences vanish.
pub struct OrderedReceiver<T> {
    next_seq: u16,
    pending: BTreeMap<u16, T>,
}

impl<T> OrderedReceiver<T> {
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            pending: BTreeMap::new(),
        }
    }

    pub fn receive(&mut self, seq: u16, item: T) -> Vec<T> {
        if sequence_less_than(seq, self.next_seq) {
            return Vec::new();
        }
        // BTreeMap keys compare plainly, not with wrapping arithmetic, but
        // a pending entry never sits more than half the sequence space
        // ahead of next_seq, so plain removal by key stays correct
        self.pending.entry(seq).or_insert(item);

        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next_seq) {
            ready.push(item);
            self.next_seq = self.next_seq.wrapping_add(1);
        }
        ready
    }
}

impl<T> Default for OrderedReceiver<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Newest-wins delivery for one sequenced-unreliable channel: an item older
/// than the newest delivered one is dropped instead of arriving late
pub struct SequencedReceiver {
    newest_seq: Option<u16>,
}

impl SequencedReceiver {
    pub fn new() -> Self {
        Self { newest_seq: None }
    }

    /// Returns whether an item with this sequence should be delivered
    pub fn accept(&mut self, seq: u16) -> bool {
        match self.newest_seq {
            Some(newest) if !sequence_greater_than(seq, newest) => false,
            _ => {
                self.newest_seq = Some(seq);
                true
            }
        }
    }
}

impl Default for SequencedReceiver {
    fn default() -> Self {
        Self::new()
    }
}
