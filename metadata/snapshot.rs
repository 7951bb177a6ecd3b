/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::HashMap;

use parking_lot::Mutex;
use time::OffsetDateTime;

use super::Entity;

/// Derived totals a snapshot can memoize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Aggregate {
    StartedMemoryBytes,
    StartedDiskBytes,
    StartedInstances,
}

/// Memo state of one aggregate. A replaced snapshot takes its memo with it,
/// so invalidation is the swap itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateState {
    Uncomputed,
    Computed(u64),
}

/// Every record of one kind from one completed reload.
#[derive(Debug)]
pub struct Snapshot<T> {
    records: Vec<T>,
    index: HashMap<String, usize>,
    generation: u64,
    loaded_at: Option<OffsetDateTime>,
    aggregates: Mutex<HashMap<Aggregate, u64>>,
}

impl<T: Entity> Default for Snapshot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Entity> Snapshot<T> {
    /// The snapshot a cache publishes before its first successful reload.
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            generation: 0,
            loaded_at: None,
            aggregates: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_records(records: Vec<T>, generation: u64, loaded_at: OffsetDateTime) -> Self {
        let mut index = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            // First occurrence wins, same as a front-to-back scan.
            index.entry(record.guid().to_string()).or_insert(position);
        }
        Self {
            records,
            index,
            generation,
            loaded_at: Some(loaded_at),
            aggregates: Mutex::new(HashMap::new()),
        }
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 0 until the first reload lands.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> Option<OffsetDateTime> {
        self.loaded_at
    }

    pub fn get(&self, guid: &str) -> Option<&T> {
        self.index
            .get(guid)
            .and_then(|position| self.records.get(*position))
    }

    pub fn find_by_id(&self, guid: &str) -> T {
        self.get(guid).cloned().unwrap_or_default()
    }

    pub fn aggregate_state(&self, which: Aggregate) -> AggregateState {
        match self.aggregates.lock().get(&which) {
            Some(value) => AggregateState::Computed(*value),
            None => AggregateState::Uncomputed,
        }
    }

    /// Returns the memoized value, running `compute` only on first access.
    /// Zero is a legitimate cached value.
    pub fn aggregate_with(&self, which: Aggregate, compute: impl FnOnce(&[T]) -> u64) -> u64 {
        let mut aggregates = self.aggregates.lock();
        *aggregates
            .entry(which)
            .or_insert_with(|| compute(&self.records))
    }
}
