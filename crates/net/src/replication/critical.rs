use crate::wire::Packet;

/// Delta bodies that must reach the next broadcast even though they were
/// built on a frame that is not sent. Each body is keyed by the sequence
/// number of the build that produced it, so it is queued at most once.
#[derive(Debug, Clone, Default)]
pub struct CriticalQueue {
    packets: Vec<(u64, Packet)>,
}

impl CriticalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sequence: u64, packet: Packet) -> bool {
        if self.packets.iter().any(|(seq, _)| *seq == sequence) {
            return false;
        }
        self.packets.push((sequence, packet));
        true
    }

    /// Moves every queued body into `out`, oldest first. Returns whether
    /// anything was flushed.
    pub fn flush_into(&mut self, out: &mut Packet) -> bool {
        let flushed = !self.packets.is_empty();
        for (_, packet) in self.packets.drain(..) {
            out.add(&packet);
        }
        flushed
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn clear(&mut self) {
        self.packets.clear();
    }
}
