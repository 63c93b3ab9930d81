//! Ordered index of outstanding requests for one [crate::Kind].
//!
//! Entries are keyed by the end of their range. Because entries never overlap, the entry with
//! the smallest end greater than an offset is the only one that can contain that offset, and
//! every entry intersecting a range can be found by walking forward from there while the entry
//! starts before the range ends.

use crate::Token;
use std::{
    collections::BTreeMap,
    ops::Bound::{Excluded, Unbounded},
};

/// An outstanding request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    pub offset: u64,
    pub end: u64,
    pub token: Token,
}

impl Entry {
    /// Returns true if `offset` lies within the entry.
    pub fn contains(&self, offset: u64) -> bool {
        self.offset <= offset && offset < self.end
    }
}

/// Non-overlapping outstanding requests, ordered by range.
#[derive(Default)]
pub struct Index {
    map: BTreeMap<u64, Entry>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns the entry with the smallest end greater than `offset`.
    pub fn upper_bound(&self, offset: u64) -> Option<Entry> {
        self.map
            .range((Excluded(offset), Unbounded))
            .next()
            .map(|(_, entry)| *entry)
    }

    /// Returns the entry containing `offset`, if any.
    pub fn containing(&self, offset: u64) -> Option<Entry> {
        self.upper_bound(offset)
            .filter(|entry| entry.contains(offset))
    }

    /// Returns all entries intersecting `[offset, end)`, in order.
    pub fn intersecting(&self, offset: u64, end: u64) -> impl Iterator<Item = Entry> + '_ {
        self.map
            .range((Excluded(offset), Unbounded))
            .map(|(_, entry)| *entry)
            .take_while(move |entry| entry.offset < end)
    }

    /// Returns true if a batch covering `[offset, end)` has reached the boundary of an
    /// outstanding entry and should not grow any further.
    ///
    /// A batch that starts inside an entry stops once it covers the rest of that entry. A batch
    /// that starts before an entry stops once it touches it.
    pub fn reaches_boundary(&self, offset: u64, end: u64) -> bool {
        match self.upper_bound(offset) {
            Some(entry) if entry.offset <= offset => entry.end <= end,
            Some(entry) => entry.offset <= end,
            None => false,
        }
    }

    /// Returns the largest end `<= end` such that `[offset, end)` is either contained in a
    /// single entry or intersects none.
    pub fn clamp(&self, offset: u64, end: u64) -> u64 {
        match self.upper_bound(offset) {
            Some(entry) if entry.offset <= offset => end.min(entry.end),
            Some(entry) => end.min(entry.offset),
            None => end,
        }
    }

    /// Track a new outstanding entry.
    ///
    /// Panics if the entry overlaps an existing one.
    pub fn insert(&mut self, offset: u64, end: u64, token: Token) {
        assert!(offset < end, "empty range");
        if let Some(next) = self.upper_bound(offset) {
            assert!(
                next.offset >= end,
                "overlapping request: [{offset}, {end}) and [{}, {})",
                next.offset,
                next.end
            );
        }
        self.map.insert(end, Entry { offset, end, token });
    }

    /// Remove the entry ending at `end`.
    pub fn remove(&mut self, end: u64) -> Option<Entry> {
        self.map.remove(&end)
    }

    /// Hand the entry ending at `end` over to another token.
    ///
    /// Panics if there is no such entry.
    pub fn replace(&mut self, end: u64, token: Token) -> Token {
        let entry = self.map.get_mut(&end).expect("missing outstanding request");
        std::mem::replace(&mut entry.token, token)
    }

    /// Remove and return the first entry.
    pub fn pop_first(&mut self) -> Option<Entry> {
        self.map.pop_first().map(|(_, entry)| entry)
    }

    /// Iterate over all entries, in order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.map.values()
    }
}
