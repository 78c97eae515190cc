use std::net::SocketAddr;

use crate::config::NetConfig;
use crate::entity::{IdAllocator, IdBlock};
use crate::wire::Packet;

use super::peers::PeerTable;
use super::protocol::pack_datagrams;
use super::stats::NetworkStats;
use super::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetMode {
    Authority,
    Client { host: SocketAddr },
}

/// Everything one session shares across the replication layer: who we
/// are, how we talk, and to whom. Built once per session and passed to
/// every `NetManager` call that touches the network.
pub struct NetContext {
    pub mode: NetMode,
    pub transport: Box<dyn Transport>,
    pub peers: PeerTable,
    pub ids: IdAllocator,
    pub stats: NetworkStats,
    pub username: String,
}

impl NetContext {
    pub fn authority(transport: Box<dyn Transport>, config: &NetConfig) -> Self {
        Self {
            mode: NetMode::Authority,
            transport,
            peers: PeerTable::new(config.max_clients, config.peer_timeout),
            ids: IdAllocator::new(Some(IdBlock::HOST), config.id_reuse_grace),
            stats: NetworkStats::default(),
            username: String::from("host"),
        }
    }

    /// A client holds no ids until the host confirms its registration.
    pub fn client(transport: Box<dyn Transport>, host: SocketAddr, config: &NetConfig) -> Self {
        Self {
            mode: NetMode::Client { host },
            transport,
            peers: PeerTable::new(1, config.peer_timeout),
            ids: IdAllocator::new(None, config.id_reuse_grace),
            stats: NetworkStats::default(),
            username: String::new(),
        }
    }

    pub fn is_authority(&self) -> bool {
        self.mode == NetMode::Authority
    }

    pub fn host(&self) -> Option<SocketAddr> {
        match self.mode {
            NetMode::Authority => None,
            NetMode::Client { host } => Some(host),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// Sends `sections` to `addr`, packed into as few datagrams as fit.
    /// Failures are logged and counted; the tick carries on.
    pub fn send_to(&mut self, addr: SocketAddr, sections: &[Packet], now: f64) {
        for datagram in pack_datagrams(sections) {
            self.send_datagram(addr, datagram.as_bytes(), now);
        }
    }

    pub fn send_datagram(&mut self, addr: SocketAddr, bytes: &[u8], now: f64) {
        match self.transport.send_to(bytes, addr) {
            Ok(sent) => {
                self.stats.record_sent(sent);
                self.peers.mark_sent(&addr, now);
            }
            Err(e) => {
                self.stats.send_errors += 1;
                log::warn!("send to {addr} failed: {e}");
            }
        }
    }

    /// Sends `sections` to every peer except `except`.
    pub fn broadcast(&mut self, sections: &[Packet], except: Option<SocketAddr>, now: f64) {
        let datagrams = pack_datagrams(sections);
        if datagrams.is_empty() {
            return;
        }
        for addr in self.peers.addrs() {
            if Some(addr) == except {
                continue;
            }
            for datagram in &datagrams {
                self.send_datagram(addr, datagram.as_bytes(), now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::{PacketTag, bare};
    use crate::net::transport::MemoryNetwork;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn broadcast_skips_sender() {
        let network = MemoryNetwork::new();
        let config = NetConfig::default();
        let mut ctx = NetContext::authority(Box::new(network.endpoint(addr(1))), &config);
        let _a = network.endpoint(addr(2));
        let _b = network.endpoint(addr(3));
        ctx.peers.register(addr(2), "a", 0.0);
        ctx.peers.register(addr(3), "b", 0.0);

        ctx.broadcast(&[bare(PacketTag::Empty)], Some(addr(2)), 1.0);
        assert_eq!(network.pending(addr(2)), 0);
        assert_eq!(network.pending(addr(3)), 1);
        assert_eq!(ctx.stats().packets_sent, 1);
        assert_eq!(ctx.peers.get(&addr(3)).unwrap().last_send_time, 1.0);
    }

    #[test]
    fn client_starts_without_ids() {
        let network = MemoryNetwork::new();
        let ctx = NetContext::client(
            Box::new(network.endpoint(addr(5))),
            addr(1),
            &NetConfig::default(),
        );
        assert!(!ctx.is_authority());
        assert_eq!(ctx.host(), Some(addr(1)));
        assert_eq!(ctx.ids.block(), None);
    }
}
