use std::collections::{BTreeSet, HashMap};

use crate::config::NetConfig;
use crate::entity::EntityTable;

/// Outcome of comparing our entity set with the authority's listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListDiff {
    /// Known remotely, missing here, and not requested recently.
    pub request: Vec<u8>,
    /// Held here, unknown remotely, and old enough to be stale.
    pub stale: Vec<u8>,
}

/// Checksum and entity-list bookkeeping that repairs divergence between
/// our entity set and the authority's.
#[derive(Debug, Clone)]
pub struct Reconciler {
    requested: HashMap<u8, f64>,
    last_checksum: Option<f64>,
    checksum_interval: f64,
    retry: f64,
    stale_grace: f64,
}

impl Reconciler {
    pub fn new(config: &NetConfig) -> Self {
        Self {
            requested: HashMap::new(),
            last_checksum: None,
            checksum_interval: config.checksum_interval,
            retry: config.spawn_request_retry,
            stale_grace: config.stale_entity_grace,
        }
    }

    /// Count of active entities, saturating at the one-byte wire width.
    pub fn checksum(table: &EntityTable) -> u8 {
        table.active_count().min(u8::MAX as usize) as u8
    }

    /// True once per checksum interval; the first call starts the clock.
    pub fn checksum_due(&mut self, now: f64) -> bool {
        match self.last_checksum {
            None => {
                self.last_checksum = Some(now);
                false
            }
            Some(last) if now - last >= self.checksum_interval => {
                self.last_checksum = Some(now);
                true
            }
            Some(_) => false,
        }
    }

    /// Whether a spawn request for `id` may go out now. Granting one
    /// starts the retry window.
    pub fn may_request(&mut self, id: u8, now: f64) -> bool {
        let allowed = self
            .requested
            .get(&id)
            .is_none_or(|requested_at| now - requested_at >= self.retry);
        if allowed {
            self.requested.insert(id, now);
        }
        allowed
    }

    pub fn spawn_arrived(&mut self, id: u8) {
        self.requested.remove(&id);
    }

    pub fn diff(&mut self, table: &EntityTable, remote: &[u8], now: f64) -> ListDiff {
        let remote: BTreeSet<u8> = remote.iter().copied().collect();

        let request = remote
            .iter()
            .copied()
            .filter(|id| !table.contains(*id))
            .filter(|id| self.may_request(*id, now))
            .collect();

        let stale = table
            .iter()
            .filter(|replica| !remote.contains(&replica.id()))
            .filter(|replica| now - replica.entity.spawn_time >= self.stale_grace)
            .map(|replica| replica.id())
            .collect();

        ListDiff { request, stale }
    }

    pub fn clear(&mut self) {
        self.requested.clear();
        self.last_checksum = None;
    }
}
