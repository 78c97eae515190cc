use std::collections::HashMap;

use crate::entity::ReplicatedKind;
use crate::replication::{DeleteDescriptor, DeltaUpdate, DescriptorError, SpawnDescriptor};
use crate::wire::PacketReader;

use super::protocol::{ChatMessage, MatchResult, PacketTag, SetupInfo};

/// One decoded top-level section of a datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    Controller(DeltaUpdate),
    /// A delta for an id this process does not know. Its fields cannot be
    /// skipped, so nothing after it in the datagram is readable.
    UnknownController(u8),
    Spawn(SpawnDescriptor),
    Delete(DeleteDescriptor),
    RequestSpawn(u8),
    Setup(SetupInfo),
    Chat(ChatMessage),
    EndMatch(MatchResult),
    NewClient { username: String },
    Disconnect,
    ServerFull,
    ConfirmRegister { block_start: u8, block_len: u8 },
    Empty,
    ClientReady,
    EntityChecksum(u8),
    RequestEntityList,
    EntityList(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedDatagram {
    pub sections: Vec<Section>,
    /// Relay flag of the last section read.
    pub relay: bool,
}

/// Decodes a whole datagram before anything is applied, so a datagram is
/// either applied completely or not at all. `kind_of` resolves the kind of
/// an already known entity; spawns earlier in the same datagram are
/// consulted after it.
pub fn decode_sections(
    bytes: &[u8],
    kind_of: impl Fn(u8) -> Option<ReplicatedKind>,
    now: f64,
) -> Result<DecodedDatagram, DescriptorError> {
    let mut reader = PacketReader::new(bytes);
    let mut sections = Vec::new();
    let mut relay = false;
    let mut spawned: HashMap<u8, ReplicatedKind> = HashMap::new();

    while !reader.is_empty() {
        let raw: u8 = reader.read()?;
        let Ok(tag) = PacketTag::try_from(raw) else {
            log::debug!("unknown section tag {raw}, ignoring the rest of the datagram");
            break;
        };
        relay = tag.is_relayed();

        let section = match tag {
            PacketTag::Controller => {
                let id: u8 = reader.read()?;
                match kind_of(id).or_else(|| spawned.get(&id).copied()) {
                    Some(kind) => Section::Controller(DeltaUpdate::read(&mut reader, id, kind, now)?),
                    None => {
                        sections.push(Section::UnknownController(id));
                        break;
                    }
                }
            }
            PacketTag::Spawn => {
                let descriptor = SpawnDescriptor::read(&mut reader)?;
                spawned.insert(descriptor.id, descriptor.kind);
                Section::Spawn(descriptor)
            }
            PacketTag::Delete => Section::Delete(DeleteDescriptor::read(&mut reader)?),
            PacketTag::RequestSpawnPacket => Section::RequestSpawn(reader.read()?),
            PacketTag::Setup => Section::Setup(SetupInfo::read(&mut reader)?),
            PacketTag::Chat => Section::Chat(ChatMessage::read(&mut reader)?),
            PacketTag::EndMatch => Section::EndMatch(MatchResult::read(&mut reader)?),
            PacketTag::NewClient => Section::NewClient {
                username: reader.read()?,
            },
            PacketTag::Disconnect => Section::Disconnect,
            PacketTag::ServerFull => Section::ServerFull,
            PacketTag::ConfirmRegister => Section::ConfirmRegister {
                block_start: reader.read()?,
                block_len: reader.read()?,
            },
            PacketTag::Empty => Section::Empty,
            PacketTag::ClientReady => Section::ClientReady,
            PacketTag::EntityChecksum => Section::EntityChecksum(reader.read()?),
            PacketTag::RequestEntityList => Section::RequestEntityList,
            PacketTag::EntityList => {
                let count: u8 = reader.read()?;
                let ids = (0..count)
                    .map(|_| reader.read::<u8>())
                    .collect::<Result<Vec<_>, _>>()?;
                Section::EntityList(ids)
            }
        };
        sections.push(section);
    }

    Ok(DecodedDatagram { sections, relay })
}
