pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod net;
pub mod replication;
pub mod snapshot;
pub mod wire;

pub use config::NetConfig;
pub use entity::{
    ActorState, Capabilities, Entity, EntityTable, IdBlock, Profile, ReplicatedKind, TeamState,
    Transform,
};
pub use error::NetError;
pub use event::{EventQueue, NetEvent};
pub use net::{
    ChatMessage, DEFAULT_PORT, MatchResult, MemoryNetwork, NetContext, NetManager, NetMode,
    NetworkStats, PacketLossSimulation, SERVER_TICK, SetupInfo, Transport, UdpTransport,
};
pub use replication::{Lifecycle, ReplicationController};
pub use snapshot::{EntitySnapshot, SnapshotBuffer};
pub use wire::{Packet, PacketReader, WireError};
