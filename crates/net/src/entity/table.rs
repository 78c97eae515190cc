use std::collections::{BTreeMap, HashMap};

use crate::replication::ReplicationController;

use super::kind::ReplicatedKind;
use super::state::Entity;

/// First id handed out to joining clients; everything below belongs to the host.
pub const CLIENT_ID_START: u8 = 128;
pub const CLIENT_BLOCK_SIZE: u8 = 16;
/// Ids are a single byte and 255 means "no entity".
pub const NO_ENTITY: u8 = u8::MAX;

/// A contiguous range of ids a peer may assign to entities it spawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdBlock {
    pub start: u8,
    pub len: u8,
}

impl IdBlock {
    pub const HOST: IdBlock = IdBlock {
        start: 0,
        len: CLIENT_ID_START,
    };

    /// The `index`th client block. The last block is one short so that 255
    /// is never handed out.
    pub fn client(index: u8) -> Option<IdBlock> {
        let start = CLIENT_ID_START as u16 + index as u16 * CLIENT_BLOCK_SIZE as u16;
        if start >= NO_ENTITY as u16 {
            return None;
        }
        let len = (NO_ENTITY as u16 - start).min(CLIENT_BLOCK_SIZE as u16);
        Some(IdBlock {
            start: start as u8,
            len: len as u8,
        })
    }

    /// Validates a client block received off the wire: it must lie in the
    /// client range and stop short of the "no entity" sentinel.
    pub fn try_new(start: u8, len: u8) -> Option<IdBlock> {
        let end = start as u16 + len as u16;
        (start >= CLIENT_ID_START && len > 0 && end <= NO_ENTITY as u16)
            .then_some(IdBlock { start, len })
    }

    pub fn client_block_count() -> u8 {
        let span = (NO_ENTITY - CLIENT_ID_START) as u16;
        span.div_ceil(CLIENT_BLOCK_SIZE as u16) as u8
    }

    pub fn contains(&self, id: u8) -> bool {
        id >= self.start && (id - self.start) < self.len
    }

    pub fn ids(&self) -> impl Iterator<Item = u8> {
        let start = self.start;
        (0..self.len).map_while(move |offset| start.checked_add(offset))
    }
}

/// Hands out ids from this peer's block. A released id is held back for a
/// grace period so stale packets for the old holder cannot hit the new one.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    block: Option<IdBlock>,
    released: HashMap<u8, f64>,
    reuse_grace: f64,
}

impl IdAllocator {
    pub fn new(block: Option<IdBlock>, reuse_grace: f64) -> Self {
        Self {
            block,
            released: HashMap::new(),
            reuse_grace,
        }
    }

    pub fn block(&self) -> Option<IdBlock> {
        self.block
    }

    pub fn assign(&mut self, block: IdBlock) {
        self.block = Some(block);
        self.released.clear();
    }

    pub fn allocate(&mut self, in_use: impl Fn(u8) -> bool, now: f64) -> Option<u8> {
        let block = self.block?;
        let grace = self.reuse_grace;
        self.released.retain(|_, released_at| now - *released_at < grace);

        let id = block
            .ids()
            .find(|id| !in_use(*id) && !self.released.contains_key(id))?;
        Some(id)
    }

    pub fn release(&mut self, id: u8, now: f64) {
        if self.block.is_some_and(|block| block.contains(id)) {
            self.released.insert(id, now);
        }
    }
}

/// An entity together with the replication state that tracks it.
#[derive(Debug)]
pub struct Replica {
    pub entity: Entity,
    pub controller: ReplicationController,
}

impl Replica {
    pub fn id(&self) -> u8 {
        self.entity.id
    }

    pub fn kind(&self) -> ReplicatedKind {
        self.controller.kind()
    }
}

/// The active entity-by-id table. Only mutated from inside a tick or from
/// the game layer between ticks.
#[derive(Debug, Default)]
pub struct EntityTable {
    replicas: BTreeMap<u8, Replica>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses to replace an active entity; the rejected replica is handed back.
    pub fn insert(&mut self, replica: Replica) -> Result<(), Replica> {
        let id = replica.id();
        if self.replicas.contains_key(&id) {
            return Err(replica);
        }
        self.replicas.insert(id, replica);
        Ok(())
    }

    pub fn remove(&mut self, id: u8) -> Option<Replica> {
        self.replicas.remove(&id)
    }

    pub fn get(&self, id: u8) -> Option<&Replica> {
        self.replicas.get(&id)
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut Replica> {
        self.replicas.get_mut(&id)
    }

    pub fn entity(&self, id: u8) -> Option<&Entity> {
        self.replicas.get(&id).map(|r| &r.entity)
    }

    pub fn entity_mut(&mut self, id: u8) -> Option<&mut Entity> {
        self.replicas.get_mut(&id).map(|r| &mut r.entity)
    }

    pub fn contains(&self, id: u8) -> bool {
        self.replicas.contains_key(&id)
    }

    pub fn kind_of(&self, id: u8) -> Option<ReplicatedKind> {
        self.replicas.get(&id).map(Replica::kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Replica> {
        self.replicas.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Replica> {
        self.replicas.values_mut()
    }

    pub fn ids(&self) -> Vec<u8> {
        self.replicas.keys().copied().collect()
    }

    pub fn active_ids(&self) -> Vec<u8> {
        self.replicas
            .values()
            .filter(|r| r.entity.active)
            .map(Replica::id)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.replicas.values().filter(|r| r.entity.active).count()
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    fn replica(id: u8) -> Replica {
        let mut entity = Entity::prop(Vec3::ZERO, "props", "barrel");
        entity.id = id;
        Replica {
            entity,
            controller: ReplicationController::new(id, ReplicatedKind::PhysicsProp, 6),
        }
    }

    #[test]
    fn client_blocks_cover_upper_range_without_sentinel() {
        assert_eq!(IdBlock::client_block_count(), 8);
        assert_eq!(
            IdBlock::client(0),
            Some(IdBlock {
                start: 128,
                len: 16
            })
        );
        let last = IdBlock::client(7).unwrap();
        assert_eq!(last.start, 240);
        assert_eq!(last.len, 15);
        assert!(!last.contains(NO_ENTITY));
        assert!(IdBlock::client(8).is_none());
        assert!(IdBlock::HOST.contains(127));
        assert!(!IdBlock::HOST.contains(128));
    }

    #[test]
    fn wire_blocks_must_fit_the_client_range() {
        assert_eq!(IdBlock::try_new(128, 16), IdBlock::client(0));
        assert_eq!(IdBlock::try_new(240, 15), IdBlock::client(7));
        assert!(IdBlock::try_new(250, 16).is_none());
        assert!(IdBlock::try_new(240, 16).is_none());
        assert!(IdBlock::try_new(0, 16).is_none());
        assert!(IdBlock::try_new(130, 0).is_none());

        let unchecked = IdBlock { start: 250, len: 16 };
        assert_eq!(unchecked.ids().collect::<Vec<_>>(), (250..=255).collect::<Vec<_>>());
    }

    #[test]
    fn allocator_skips_used_and_recently_released() {
        let mut ids = IdAllocator::new(Some(IdBlock::HOST), 5.0);
        let used = [0u8, 1];

        assert_eq!(ids.allocate(|id| used.contains(&id), 0.0), Some(2));

        ids.release(2, 1.0);
        assert_eq!(ids.allocate(|id| used.contains(&id), 3.0), Some(3));
        assert_eq!(ids.allocate(|id| used.contains(&id), 6.0), Some(2));
    }

    #[test]
    fn allocator_without_block_hands_out_nothing() {
        let mut ids = IdAllocator::new(None, 5.0);
        assert_eq!(ids.allocate(|_| false, 0.0), None);

        ids.assign(IdBlock::client(2).unwrap());
        assert_eq!(ids.allocate(|_| false, 0.0), Some(160));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut table = EntityTable::new();
        assert!(table.insert(replica(4)).is_ok());

        let rejected = table.insert(replica(4)).unwrap_err();
        assert_eq!(rejected.id(), 4);
        assert_eq!(table.len(), 1);
        assert_eq!(table.active_count(), 1);
        assert_eq!(table.kind_of(4), Some(ReplicatedKind::PhysicsProp));
    }
}
