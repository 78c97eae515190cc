use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::{Arc, Mutex, MutexGuard};

use super::protocol::RECV_BUFFER_SIZE;

/// Unreliable datagram delivery. Sends and receives never block; `receive`
/// returns everything that has arrived since the last call.
pub trait Transport {
    fn local_addr(&self) -> SocketAddr;
    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize>;
    fn receive(&mut self) -> io::Result<Vec<(Vec<u8>, SocketAddr)>>;
}

/// Drops a share of outgoing datagrams to exercise the recovery paths.
#[derive(Debug, Clone, Default)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    /// 0 to 100.
    pub loss_percent: f32,
}

impl PacketLossSimulation {
    pub fn with_loss(loss_percent: f32) -> Self {
        Self {
            enabled: loss_percent > 0.0,
            loss_percent,
        }
    }

    pub fn should_drop(&self) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        if self.loss_percent >= 100.0 {
            return true;
        }
        rand_percent() * 100.0 < self.loss_percent
    }
}

pub fn rand_percent() -> f32 {
    rand_u64() as f32 / u64::MAX as f32
}

pub fn rand_u64() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hash, Hasher};
    use std::time::Instant;

    let mut hasher = RandomState::new().build_hasher();
    Instant::now().hash(&mut hasher);
    hasher.finish()
}

pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    recv_buffer: Vec<u8>,
    loss: PacketLossSimulation,
}

impl UdpTransport {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            recv_buffer: vec![0u8; RECV_BUFFER_SIZE],
            loss: PacketLossSimulation::default(),
        })
    }

    pub fn set_loss_simulation(&mut self, loss: PacketLossSimulation) {
        self.loss = loss;
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        if self.loss.should_drop() {
            return Ok(data.len());
        }
        self.socket.send_to(data, addr)
    }

    fn receive(&mut self) -> io::Result<Vec<(Vec<u8>, SocketAddr)>> {
        let mut datagrams = Vec::new();

        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    if size == 0 {
                        continue;
                    }
                    datagrams.push((self.recv_buffer[..size].to_vec(), addr));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                // A previous send hit a closed port; the socket itself is fine.
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(datagrams)
    }
}

#[derive(Debug, Default)]
struct Mailboxes {
    inboxes: HashMap<SocketAddr, VecDeque<(Vec<u8>, SocketAddr)>>,
    offline: HashSet<SocketAddr>,
}

/// An in-process datagram network for driving several peers from one
/// thread. Addresses are only labels.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<Mailboxes>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(&self, addr: SocketAddr) -> MemoryTransport {
        self.lock().inboxes.entry(addr).or_default();
        MemoryTransport {
            network: self.clone(),
            addr,
            loss: PacketLossSimulation::default(),
        }
    }

    /// While offline, everything sent to or from `addr` is lost.
    pub fn set_online(&self, addr: SocketAddr, online: bool) {
        let mut mailboxes = self.lock();
        if online {
            mailboxes.offline.remove(&addr);
        } else {
            mailboxes.offline.insert(addr);
        }
    }

    pub fn pending(&self, addr: SocketAddr) -> usize {
        self.lock().inboxes.get(&addr).map_or(0, VecDeque::len)
    }

    fn lock(&self) -> MutexGuard<'_, Mailboxes> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct MemoryTransport {
    network: MemoryNetwork,
    addr: SocketAddr,
    loss: PacketLossSimulation,
}

impl MemoryTransport {
    pub fn set_loss_simulation(&mut self, loss: PacketLossSimulation) {
        self.loss = loss;
    }
}

impl Transport for MemoryTransport {
    fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        if self.loss.should_drop() {
            return Ok(data.len());
        }
        let mut mailboxes = self.network.lock();
        if mailboxes.offline.contains(&self.addr) || mailboxes.offline.contains(&addr) {
            return Ok(data.len());
        }
        // Unknown destinations swallow the datagram, as UDP would.
        if let Some(inbox) = mailboxes.inboxes.get_mut(&addr) {
            inbox.push_back((data.to_vec(), self.addr));
        }
        Ok(data.len())
    }

    fn receive(&mut self) -> io::Result<Vec<(Vec<u8>, SocketAddr)>> {
        let mut mailboxes = self.network.lock();
        Ok(mailboxes
            .inboxes
            .get_mut(&self.addr)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn memory_network_delivers_in_order() {
        let network = MemoryNetwork::new();
        let mut a = network.endpoint(addr(1));
        let mut b = network.endpoint(addr(2));

        a.send_to(&[1], addr(2)).unwrap();
        a.send_to(&[2, 2], addr(2)).unwrap();
        assert_eq!(network.pending(addr(2)), 2);

        let received = b.receive().unwrap();
        assert_eq!(received, vec![(vec![1], addr(1)), (vec![2, 2], addr(1))]);
        assert!(b.receive().unwrap().is_empty());
    }

    #[test]
    fn offline_endpoint_loses_traffic() {
        let network = MemoryNetwork::new();
        let mut a = network.endpoint(addr(1));
        let mut b = network.endpoint(addr(2));

        network.set_online(addr(2), false);
        a.send_to(&[1], addr(2)).unwrap();
        b.send_to(&[1], addr(1)).unwrap();
        assert!(b.receive().unwrap().is_empty());
        assert!(a.receive().unwrap().is_empty());

        network.set_online(addr(2), true);
        a.send_to(&[3], addr(2)).unwrap();
        assert_eq!(b.receive().unwrap().len(), 1);
    }

    #[test]
    fn full_loss_drops_everything() {
        let network = MemoryNetwork::new();
        let mut a = network.endpoint(addr(1));
        let _b = network.endpoint(addr(2));
        a.set_loss_simulation(PacketLossSimulation::with_loss(100.0));

        for _ in 0..20 {
            a.send_to(&[0], addr(2)).unwrap();
        }
        assert_eq!(network.pending(addr(2)), 0);
    }

    #[test]
    fn udp_transport_binds_nonblocking() {
        let mut transport = UdpTransport::bind("127.0.0.1:0").unwrap();
        assert!(transport.receive().unwrap().is_empty());
        assert_ne!(transport.local_addr().port(), 0);
    }
}
