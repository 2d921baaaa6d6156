//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Table of commands awaiting their response.
//!

use crate::devices::astelco::decode::SemanticKind;
use crate::devices::astelco::protocol::{DeviceAxis, PositionKind};
use crate::devices::DeviceError;
use crate::properties::TextField;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::{HashMap, VecDeque};

/// Maximum number of commands awaiting a response; beyond that the oldest one is forgotten.
pub const HISTORY_CAPACITY: usize = 1000;

/// Tells the response listener what to do with the value returned for a command.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Annotation {
    pub field: TextField,
    pub kind: SemanticKind,
    /// Axis state slot receiving the numeric value (if any).
    pub axis: Option<(DeviceAxis, PositionKind)>
}

impl Annotation {
    pub fn text(field: TextField, kind: SemanticKind) -> Annotation {
        Annotation{ field, kind, axis: None }
    }

    pub fn axis_value(field: TextField, axis: DeviceAxis, position: PositionKind) -> Annotation {
        Annotation{ field, kind: SemanticKind::AxisValue, axis: Some((axis, position)) }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub raw: String,
    pub axis_value: Option<f64>
}

pub struct Pending {
    /// `None` for commands not expected to return data (SET).
    pub annotation: Option<Annotation>,
    pub waiter: Option<Sender<Reply>>
}

/// Receives the decoded reply to a single command.
pub struct Completion {
    id: u32,
    receiver: Receiver<Reply>
}

/// The sender goes into the pending entry, the receiver into a `Completion`.
pub fn reply_channel() -> (Sender<Reply>, Receiver<Reply>) {
    crossbeam::channel::bounded(1)
}

impl Completion {
    pub fn new(id: u32, receiver: Receiver<Reply>) -> Completion {
        Completion{ id, receiver }
    }

    pub fn wait(&self, timeout: std::time::Duration) -> Result<Reply, DeviceError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) => Err(DeviceError::ResponseTimeout(self.id)),
            // entry retired or evicted without a value
            Err(RecvTimeoutError::Disconnected) => Err(DeviceError::InvalidResponse(
                format!("command {} finished without returning a value", self.id)
            ))
        }
    }
}

pub struct PendingTable {
    entries: HashMap<u32, Pending>,
    /// Ids in issue order; may contain ids already consumed.
    order: VecDeque<u32>,
    capacity: usize
}

impl PendingTable {
    pub fn new() -> PendingTable {
        PendingTable::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> PendingTable {
        PendingTable{ entries: HashMap::new(), order: VecDeque::new(), capacity: capacity.max(1) }
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn contains(&self, id: u32) -> bool { self.entries.contains_key(&id) }

    pub fn insert(&mut self, id: u32, pending: Pending) {
        if self.entries.insert(id, pending).is_some() {
            log::warn!("command id {} reused while still awaiting a response", id);
        } else {
            self.order.push_back(id);
        }

        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => if self.entries.remove(&oldest).is_some() {
                    log::warn!("no response to command {}; forgetting it", oldest);
                },
                None => break
            }
        }

        if self.order.len() > 2 * self.capacity {
            let entries = &self.entries;
            self.order.retain(|id| entries.contains_key(id));
        }
    }

    /// Removes and returns the entry for `id`.
    pub fn take(&mut self, id: u32) -> Option<Pending> {
        self.entries.remove(&id)
    }

    /// Forgets the entry for `id`; a waiter, if any, observes failure. Returns false if there was none.
    pub fn retire(&mut self, id: u32) -> bool {
        self.entries.remove(&id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn untracked() -> Pending {
        Pending{ annotation: None, waiter: None }
    }

    #[test]
    fn given_entry_take_removes_it() {
        let mut table = PendingTable::new();
        table.insert(5, Pending{
            annotation: Some(Annotation::text(TextField::Uptime, SemanticKind::Uninitialized)),
            waiter: None
        });

        let entry = table.take(5).unwrap();
        assert_eq!(TextField::Uptime, entry.annotation.unwrap().field);
        assert!(table.take(5).is_none());
        assert_eq!(0, table.len());
    }

    #[test]
    fn given_capacity_exceeded_evict_oldest() {
        let mut table = PendingTable::with_capacity(3);
        for id in 1..=4 { table.insert(id, untracked()); }

        assert_eq!(3, table.len());
        assert!(!table.contains(1));
        assert!(table.contains(2) && table.contains(4));
    }

    #[test]
    fn given_consumed_entries_eviction_skips_them() {
        let mut table = PendingTable::with_capacity(2);
        table.insert(1, untracked());
        table.insert(2, untracked());
        assert!(table.retire(1));
        table.insert(3, untracked());

        assert!(table.contains(2) && table.contains(3));
        assert!(!table.retire(1));
    }

    #[test]
    fn given_many_consumed_entries_order_stays_bounded() {
        let mut table = PendingTable::with_capacity(4);
        for id in 1..100 {
            table.insert(id, untracked());
            table.take(id);
        }
        assert!(table.order.len() <= 8);
    }

    #[test]
    fn given_reply_completion_receives_it() {
        let (sender, receiver) = reply_channel();
        let completion = Completion::new(8, receiver);
        sender.send(Reply{ raw: "1.5".into(), axis_value: Some(1.5) }).unwrap();
        assert_eq!(Some(1.5), completion.wait(std::time::Duration::from_millis(10)).unwrap().axis_value);
    }

    #[test]
    fn given_retired_entry_completion_fails() {
        let mut table = PendingTable::new();
        let (sender, receiver) = reply_channel();
        let completion = Completion::new(8, receiver);
        table.insert(8, Pending{ annotation: None, waiter: Some(sender) });
        table.retire(8);

        assert!(matches!(completion.wait(std::time::Duration::from_secs(1)), Err(DeviceError::InvalidResponse(_))));
    }

    #[test]
    fn given_no_reply_completion_times_out() {
        let (_sender, receiver) = reply_channel();
        let completion = Completion::new(9, receiver);
        assert!(matches!(completion.wait(std::time::Duration::from_millis(10)), Err(DeviceError::ResponseTimeout(9))));
    }
}
