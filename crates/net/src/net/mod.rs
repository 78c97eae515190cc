mod context;
mod manager;
mod peers;
pub mod protocol;
mod reconcile;
mod section;
mod stats;
mod transport;

pub use context::{NetContext, NetMode};
pub use manager::NetManager;
pub use peers::{Peer, PeerState, PeerTable};
pub use protocol::{
    ChatMessage, DEFAULT_PORT, MAX_PACKET_SIZE, MatchResult, PacketTag, RECV_BUFFER_SIZE,
    SERVER_TICK, SetupInfo, pack_datagrams,
};
pub use reconcile::{ListDiff, Reconciler};
pub use section::{DecodedDatagram, Section, decode_sections};
pub use stats::{NetworkStats, StatsReporter};
pub use transport::{
    MemoryNetwork, MemoryTransport, PacketLossSimulation, Transport, UdpTransport, rand_percent,
};
