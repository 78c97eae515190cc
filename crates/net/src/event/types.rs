use std::net::SocketAddr;

use crate::entity::{IdBlock, ReplicatedKind};
use crate::net::{ChatMessage, MatchResult, SetupInfo};

/// Something the game layer needs to react to, produced while a tick runs.
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    PeerConnected {
        addr: SocketAddr,
        username: String,
    },
    PeerDisconnected {
        addr: SocketAddr,
        username: String,
        timed_out: bool,
    },
    PeerReady {
        addr: SocketAddr,
    },
    /// The host accepted us and handed out an id block.
    Registered {
        block: IdBlock,
    },
    ServerFull,
    SetupReceived(SetupInfo),
    ChatReceived(ChatMessage),
    MatchEnded(MatchResult),
    EntitySpawned {
        id: u8,
        kind: ReplicatedKind,
    },
    EntityDeleted {
        id: u8,
    },
    EntityKilled {
        id: u8,
    },
    /// The session with the host is over.
    Disconnected,
}

impl NetEvent {
    /// Events that may be dropped when the queue overflows.
    pub fn is_droppable(&self) -> bool {
        matches!(self, Self::ChatReceived(_) | Self::EntitySpawned { .. })
    }
}
