use std::collections::HashMap;
use std::net::SocketAddr;

use crate::entity::IdBlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Registered but still loading; receives broadcasts, no keepalives.
    Registered,
    Ready,
}

#[derive(Debug, Clone)]
pub struct Peer {
    pub addr: SocketAddr,
    pub username: String,
    pub state: PeerState,
    pub id_block: Option<IdBlock>,
    pub last_receive_time: f64,
    pub last_send_time: f64,
}

impl Peer {
    pub fn new(addr: SocketAddr, username: String, now: f64) -> Self {
        Self {
            addr,
            username,
            state: PeerState::Registered,
            id_block: None,
            last_receive_time: now,
            last_send_time: now,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == PeerState::Ready
    }

    pub fn is_timed_out(&self, timeout: f64, now: f64) -> bool {
        now - self.last_receive_time > timeout
    }
}

/// Everyone this process exchanges datagrams with. On a client this holds
/// only the host.
#[derive(Debug)]
pub struct PeerTable {
    peers: HashMap<SocketAddr, Peer>,
    max_peers: usize,
    timeout: f64,
}

impl PeerTable {
    pub fn new(max_peers: usize, timeout: f64) -> Self {
        Self {
            peers: HashMap::new(),
            max_peers,
            timeout,
        }
    }

    /// Registers `addr`, or returns the existing entry. `None` when full.
    pub fn register(&mut self, addr: SocketAddr, username: &str, now: f64) -> Option<&mut Peer> {
        if !self.peers.contains_key(&addr) && self.peers.len() >= self.max_peers {
            return None;
        }
        Some(
            self.peers
                .entry(addr)
                .or_insert_with(|| Peer::new(addr, username.to_string(), now)),
        )
    }

    /// Lowest client id block not held by a registered peer.
    pub fn free_block(&self) -> Option<IdBlock> {
        (0..IdBlock::client_block_count())
            .filter_map(IdBlock::client)
            .find(|block| !self.peers.values().any(|p| p.id_block == Some(*block)))
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&Peer> {
        self.peers.get(addr)
    }

    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut Peer> {
        self.peers.get_mut(addr)
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.peers.contains_key(addr)
    }

    pub fn remove(&mut self, addr: &SocketAddr) -> Option<Peer> {
        self.peers.remove(addr)
    }

    pub fn touch(&mut self, addr: &SocketAddr, now: f64) {
        if let Some(peer) = self.peers.get_mut(addr) {
            peer.last_receive_time = now;
        }
    }

    pub fn mark_sent(&mut self, addr: &SocketAddr, now: f64) {
        if let Some(peer) = self.peers.get_mut(addr) {
            peer.last_send_time = now;
        }
    }

    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.peers.keys().copied().collect()
    }

    /// Ready peers that have not been sent anything for longer than `idle`.
    pub fn idle_ready(&self, idle: f64, now: f64) -> Vec<SocketAddr> {
        self.peers
            .values()
            .filter(|p| p.is_ready() && now - p.last_send_time > idle)
            .map(|p| p.addr)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn cleanup_timed_out(&mut self, now: f64) -> Vec<Peer> {
        let timed_out: Vec<SocketAddr> = self
            .peers
            .values()
            .filter(|p| p.is_timed_out(self.timeout, now))
            .map(|p| p.addr)
            .collect();

        timed_out
            .iter()
            .filter_map(|addr| self.peers.remove(addr))
            .collect()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }

    pub fn ready_count(&self) -> usize {
        self.peers.values().filter(|p| p.is_ready()).count()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
