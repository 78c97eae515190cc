use std::collections::VecDeque;

use super::entity::EntitySnapshot;

pub const DEFAULT_HISTORY: usize = 6;

/// Newest-first history of received transform samples for one remote entity.
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    snapshots: VecDeque<EntitySnapshot>,
    capacity: usize,
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl SnapshotBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, snapshot: EntitySnapshot) {
        self.snapshots.push_front(snapshot);
        self.snapshots.truncate(self.capacity);
    }

    /// Drops the history and starts over from a single sample.
    pub fn reset_to(&mut self, snapshot: EntitySnapshot) {
        self.snapshots.clear();
        self.snapshots.push_front(snapshot);
    }

    pub fn latest(&self) -> Option<&EntitySnapshot> {
        self.snapshots.front()
    }

    pub fn has_newer_than(&self, target: f64) -> bool {
        self.snapshots.iter().any(|s| s.timestamp > target)
    }

    /// Keeps the buffer from starving: if nothing newer than `target` has
    /// arrived, repeats the latest sample stamped at `now`.
    pub fn ensure_fresh(&mut self, target: f64, now: f64) -> bool {
        if self.has_newer_than(target) {
            return false;
        }
        match self.latest() {
            Some(latest) => {
                let synthetic = latest.restamped(now);
                self.push(synthetic);
                true
            }
            None => false,
        }
    }

    /// Interpolated sample at `target`, taken from the first adjacent pair
    /// (newest to oldest) with `newer.timestamp > target >= older.timestamp`.
    pub fn sample(&self, target: f64) -> Option<EntitySnapshot> {
        let (newer, older) = self
            .snapshots
            .iter()
            .zip(self.snapshots.iter().skip(1))
            .find(|(newer, older)| newer.timestamp > target && target >= older.timestamp)?;

        if newer.timestamp <= older.timestamp {
            return None;
        }

        let scale = ((target - older.timestamp) / (newer.timestamp - older.timestamp)).clamp(0.0, 1.0);
        Some(older.lerp(newer, scale as f32))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntitySnapshot> {
        self.snapshots.iter()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
