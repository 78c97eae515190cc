use crate::entity::NO_ENTITY;
use crate::wire::{Packet, PacketReader, WireEncode, WireError};

/// Sections are packed into datagrams up to this size. A single section
/// larger than this is still sent on its own.
pub const MAX_PACKET_SIZE: usize = 1200;
pub const RECV_BUFFER_SIZE: usize = 65_507;
pub const DEFAULT_PORT: u16 = 27015;
pub const SERVER_TICK: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketTag {
    Controller = 0,
    Spawn = 1,
    Delete = 2,
    RequestSpawnPacket = 3,
    Setup = 4,
    Chat = 5,
    EndMatch = 6,
    NewClient = 7,
    Disconnect = 8,
    ServerFull = 9,
    ConfirmRegister = 10,
    Empty = 11,
    ClientReady = 12,
    EntityChecksum = 13,
    RequestEntityList = 14,
    EntityList = 15,
}

impl TryFrom<u8> for PacketTag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let tag = match value {
            0 => Self::Controller,
            1 => Self::Spawn,
            2 => Self::Delete,
            3 => Self::RequestSpawnPacket,
            4 => Self::Setup,
            5 => Self::Chat,
            6 => Self::EndMatch,
            7 => Self::NewClient,
            8 => Self::Disconnect,
            9 => Self::ServerFull,
            10 => Self::ConfirmRegister,
            11 => Self::Empty,
            12 => Self::ClientReady,
            13 => Self::EntityChecksum,
            14 => Self::RequestEntityList,
            15 => Self::EntityList,
            other => return Err(other),
        };
        Ok(tag)
    }
}

impl PacketTag {
    /// Whether the authority forwards a datagram ending in this section to
    /// its other peers. Connection management and reconciliation traffic is
    /// strictly point to point.
    pub fn is_relayed(self) -> bool {
        matches!(
            self,
            Self::Controller | Self::Spawn | Self::Delete | Self::Chat | Self::EndMatch
        )
    }
}

impl WireEncode for PacketTag {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }
}

/// A section consisting of nothing but its tag.
pub fn bare(tag: PacketTag) -> Packet {
    let mut packet = Packet::new();
    packet.add(tag);
    packet
}

pub fn request_spawn(id: u8) -> Packet {
    let mut packet = Packet::new();
    packet.add(PacketTag::RequestSpawnPacket).add(id);
    packet
}

pub fn entity_checksum(count: u8) -> Packet {
    let mut packet = Packet::new();
    packet.add(PacketTag::EntityChecksum).add(count);
    packet
}

pub fn entity_list(ids: &[u8]) -> Packet {
    let mut packet = Packet::new();
    packet
        .add(PacketTag::EntityList)
        .add(ids.len().min(u8::MAX as usize) as u8);
    for id in ids.iter().take(u8::MAX as usize) {
        packet.add(*id);
    }
    packet
}

pub fn new_client(username: &str) -> Packet {
    let mut packet = Packet::new();
    packet.add(PacketTag::NewClient).add(username);
    packet
}

pub fn confirm_register(block_start: u8, block_len: u8) -> Packet {
    let mut packet = Packet::new();
    packet
        .add(PacketTag::ConfirmRegister)
        .add(block_start)
        .add(block_len);
    packet
}

/// Match parameters the host hands a joining client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupInfo {
    pub team_id: u8,
    pub map_name: String,
    pub score_limit: u16,
    pub respawn: bool,
    pub game_type: u8,
}

impl SetupInfo {
    pub fn write(&self, packet: &mut Packet) {
        packet
            .add(PacketTag::Setup)
            .add(self.team_id)
            .add(&self.map_name)
            .add(self.score_limit)
            .add(self.respawn)
            .add(self.game_type);
    }

    pub fn read(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            team_id: reader.read()?,
            map_name: reader.read()?,
            score_limit: reader.read()?,
            respawn: reader.read()?,
            game_type: reader.read()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub username: String,
    pub message: String,
}

impl ChatMessage {
    pub fn write(&self, packet: &mut Packet) {
        packet
            .add(PacketTag::Chat)
            .add(&self.username)
            .add(&self.message);
    }

    pub fn read(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            username: reader.read()?,
            message: reader.read()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub game_over: bool,
    pub winner: Option<u8>,
    /// `(team id, placement)`; team ids must not be 255.
    pub placements: Vec<(u8, u8)>,
}

impl MatchResult {
    pub fn write(&self, packet: &mut Packet) {
        packet
            .add(PacketTag::EndMatch)
            .add(self.game_over)
            .add(self.winner);
        for &(team, place) in self.placements.iter().filter(|(t, _)| *t != NO_ENTITY) {
            packet.add(team).add(place);
        }
        packet.add(NO_ENTITY);
    }

    pub fn read(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let game_over = reader.read()?;
        let winner = reader.read()?;
        let mut placements = Vec::new();
        loop {
            let team: u8 = reader.read()?;
            if team == NO_ENTITY {
                break;
            }
            placements.push((team, reader.read()?));
        }
        Ok(Self {
            game_over,
            winner,
            placements,
        })
    }
}

/// Packs whole sections into as few datagrams as fit under
/// [`MAX_PACKET_SIZE`]. Sections keep their order and are never split.
pub fn pack_datagrams(sections: &[Packet]) -> Vec<Packet> {
    let mut datagrams = Vec::new();
    let mut current = Packet::new();
    for section in sections.iter().filter(|s| !s.is_empty()) {
        if !current.is_empty() && current.len() + section.len() > MAX_PACKET_SIZE {
            datagrams.push(std::mem::take(&mut current));
        }
        current.add(section);
    }
    if !current.is_empty() {
        datagrams.push(current);
    }
    datagrams
}
