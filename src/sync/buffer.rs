//! Diffs held back until a snapshot and its gate event are known

use std::collections::VecDeque;

use crate::orderbook::DiffEvent;

/// Arrival-ordered queue of pending diffs
#[derive(Debug, Default)]
pub struct PendingDiffs {
    events: VecDeque<DiffEvent>,
}

impl PendingDiffs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: DiffEvent) {
        self.events.push_back(event);
    }

    pub fn front(&self) -> Option<&DiffEvent> {
        self.events.front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop events already covered by a book at `last_update_id`; returns how many
    pub fn prune_covered(&mut self, last_update_id: u64) -> usize {
        let before = self.events.len();
        self.events.retain(|e| e.final_update_id > last_update_id);
        before - self.events.len()
    }

    /// True when the head event bridges `last_update_id` to the stream
    pub fn head_bridges(&self, last_update_id: u64) -> bool {
        self.front().map_or(false, |e| e.bridges(last_update_id))
    }

    pub fn overflowed(&self, max_pending: usize) -> bool {
        self.events.len() > max_pending
    }

    /// Take every pending event in arrival order
    pub fn drain(&mut self) -> impl Iterator<Item = DiffEvent> + '_ {
        self.events.drain(..)
    }
}
