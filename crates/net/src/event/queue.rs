use std::collections::VecDeque;

use super::types::NetEvent;

pub struct EventQueue {
    pending: VecDeque<NetEvent>,
    max_pending: usize,
}

impl EventQueue {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(max_pending.min(64)),
            max_pending,
        }
    }

    pub fn push(&mut self, event: NetEvent) {
        if self.pending.len() >= self.max_pending {
            self.evict_oldest_droppable();
        }
        self.pending.push_back(event);
    }

    fn evict_oldest_droppable(&mut self) {
        let index = self
            .pending
            .iter()
            .position(NetEvent::is_droppable)
            .unwrap_or(0);
        if let Some(event) = self.pending.remove(index) {
            log::debug!("event queue full, dropping {event:?}");
        }
    }

    pub fn drain(&mut self) -> impl Iterator<Item = NetEvent> + '_ {
        self.pending.drain(..)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_drops_droppable_first() {
        let mut queue = EventQueue::new(2);
        queue.push(NetEvent::EntityDeleted { id: 1 });
        queue.push(NetEvent::EntitySpawned {
            id: 2,
            kind: crate::entity::ReplicatedKind::Bot,
        });
        queue.push(NetEvent::EntityKilled { id: 3 });

        let events: Vec<_> = queue.drain().collect();
        assert_eq!(
            events,
            vec![
                NetEvent::EntityDeleted { id: 1 },
                NetEvent::EntityKilled { id: 3 }
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_without_droppable_drops_oldest() {
        let mut queue = EventQueue::new(1);
        queue.push(NetEvent::Disconnected);
        queue.push(NetEvent::ServerFull);
        assert_eq!(queue.drain().collect::<Vec<_>>(), vec![NetEvent::ServerFull]);
    }
}
