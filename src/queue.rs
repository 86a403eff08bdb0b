//! Index-addressable message log.

use crate::error::ErrorSet;
use crate::grow;
use crate::protocol::{Actor, Time, UNDEFINED};

/// One position in a [`MessageQueue`].
///
/// A position starts as a not-ready hole and becomes immutable once a
/// message is committed to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub ready: bool,
    pub time: Time,
    pub actor: Actor,
    pub data: Vec<u8>,
}

/// Sparse, index-addressable log of session messages.
///
/// Committing past the current length zero-fills the intermediate
/// positions as not-ready holes, so messages arriving out of order
/// land at their final index immediately.
#[derive(Debug, Default)]
pub struct MessageQueue {
    entries: Vec<Entry>,
}

impl MessageQueue {
    pub fn new() -> MessageQueue {
        MessageQueue::default()
    }

    #[inline]
    pub fn len(&self) -> i64 {
        self.entries.len() as i64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, index: i64) -> Option<&Entry> {
        if index < 0 {
            return None;
        }
        self.entries.get(index as usize)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    /// Pushes a ready entry at the tail and returns its index.
    pub fn append(&mut self, time: Time, actor: Actor, data: Vec<u8>) -> Result<i64, ErrorSet> {
        let index = self.entries.len() as i64;
        grow::try_push(
            &mut self.entries,
            Entry {
                ready: true,
                time,
                actor,
                data,
            },
        )?;
        Ok(index)
    }

    /// Idempotent commit at an explicit index.
    ///
    /// An [`UNDEFINED`] index drops the message silently (service
    /// messages are never stored). Once a position is ready the
    /// existing entry wins and later commits are ignored.
    pub fn insert(
        &mut self,
        index: i64,
        time: Time,
        actor: Actor,
        data: &[u8],
    ) -> Result<(), ErrorSet> {
        if index == UNDEFINED {
            return Ok(());
        }
        if index < 0 {
            return Err(ErrorSet::INVALID_MESSAGE_INDEX);
        }
        let index = index as usize;
        if let Some(entry) = self.entries.get(index) {
            // TODO: compare checksums of the stored and incoming
            // payloads instead of keeping the first writer blindly.
            if entry.ready {
                return Ok(());
            }
        }
        let data = grow::try_copied(data)?;
        if index >= self.entries.len() {
            grow::try_resize_with(&mut self.entries, index + 1, Entry::default)?;
        }
        self.entries[index] = Entry {
            ready: true,
            time,
            actor,
            data,
        };
        Ok(())
    }

    /// Re-stamps the actor of every entry. Used when a client learns
    /// its assigned actor after queueing messages locally.
    pub fn restamp_actor(&mut self, actor: Actor) {
        for entry in &mut self.entries {
            entry.actor = actor;
        }
    }

    /// Re-stamps the time of every entry from `from` to the tail.
    pub fn restamp_time_from(&mut self, from: i64, time: Time) {
        let from = from.max(0) as usize;
        for entry in self.entries.iter_mut().skip(from) {
            entry.time = time;
        }
    }
}
