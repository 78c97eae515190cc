use glam::Vec3;

use crate::entity::{
    ActorState, ComponentState, Entity, NO_ENTITY, Profile, ReplicatedKind, TeamState, Transform,
};
use crate::net::PacketTag;
use crate::snapshot::EntitySnapshot;
use crate::wire::{
    HighResVec3, HighResVec4, LowResVec3, Packet, PacketReader, SmallVec3, Standard, StandardQuat,
    StandardVec3, WireError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("unknown replicated kind tag {0}")]
    UnknownKind(u8),
}

/// Counted lists carry a one-byte count; anything past 255 entries is not sent.
fn capped<T>(items: &[T]) -> &[T] {
    &items[..items.len().min(u8::MAX as usize)]
}

fn list_len<T>(items: &[T]) -> u8 {
    capped(items).len() as u8
}

/// Everything a receiver needs to construct an entity it has never seen.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnDescriptor {
    pub kind: ReplicatedKind,
    pub id: u8,
    pub transform: Transform,
    pub profile: Profile,
    pub payload: Vec<u8>,
}

impl SpawnDescriptor {
    /// Captures the current state of `entity` as `kind`. A profile that does
    /// not belong to `kind` is replaced by that kind's default.
    pub fn capture(entity: &Entity, kind: ReplicatedKind) -> Self {
        let profile = if entity.profile.matches(kind) {
            entity.profile.clone()
        } else {
            Profile::default_for(kind)
        };
        Self {
            kind,
            id: entity.id,
            transform: entity.transform,
            profile,
            payload: entity.payload().to_vec(),
        }
    }

    pub fn write(&self, packet: &mut Packet) {
        packet.add(PacketTag::Spawn).add(self.kind.tag()).add(self.id);

        match &self.profile {
            Profile::Team(team) => {
                packet
                    .add(HighResVec4(team.color))
                    .add(team.dock)
                    .add(list_len(&team.allies));
                for ally in capped(&team.allies) {
                    packet.add(*ally);
                }
                packet.add(&team.username);
            }
            Profile::Glass { width, height } => {
                packet
                    .add(StandardVec3(self.transform.position))
                    .add(StandardQuat(self.transform.orientation))
                    .add(Standard(*width))
                    .add(Standard(*height));
            }
            profile => {
                if let Profile::Prop {
                    directory,
                    data_file,
                } = profile
                {
                    packet.add(directory).add(data_file);
                }
                packet
                    .add(HighResVec3(self.transform.position))
                    .add(StandardVec3(self.transform.velocity))
                    .add(StandardQuat(self.transform.orientation));

                match profile {
                    Profile::Thrown { team_id, thrower } => {
                        if self.kind == ReplicatedKind::Molotov {
                            packet.add(*thrower);
                        }
                        packet.add(*team_id);
                    }
                    Profile::Pod { landing } => {
                        packet.add(HighResVec3(*landing));
                    }
                    Profile::Actor(actor) => {
                        packet
                            .add(actor.team_id)
                            .add(list_len(&actor.weapons));
                        for weapon in capped(&actor.weapons) {
                            packet.add(*weapon);
                        }
                        packet.add(actor.special).add(actor.active_weapon);
                        if self.kind == ReplicatedKind::Player {
                            packet.add(&actor.username);
                        }
                    }
                    _ => {}
                }
            }
        }

        packet.add(&self.payload);
    }

    /// Reads a descriptor whose SPAWN tag has already been consumed.
    pub fn read(reader: &mut PacketReader<'_>) -> Result<Self, DescriptorError> {
        let raw_kind: u8 = reader.read()?;
        let kind = ReplicatedKind::try_from(raw_kind).map_err(DescriptorError::UnknownKind)?;
        let id: u8 = reader.read()?;

        let mut transform = Transform::default();
        let profile = match kind {
            ReplicatedKind::TeamEntity => {
                let color = reader.read::<HighResVec4>()?.0;
                let dock = reader.read()?;
                let count: u8 = reader.read()?;
                let allies = (0..count)
                    .map(|_| reader.read::<u8>())
                    .collect::<Result<Vec<_>, _>>()?;
                let username = reader.read()?;
                Profile::Team(TeamState {
                    color,
                    dock,
                    allies,
                    username,
                })
            }
            ReplicatedKind::Glass => {
                transform.position = reader.read::<StandardVec3>()?.0;
                transform.orientation = reader.read::<StandardQuat>()?.0;
                let width = reader.read::<Standard>()?.0;
                let height = reader.read::<Standard>()?.0;
                Profile::Glass { width, height }
            }
            _ => {
                let prop = if kind == ReplicatedKind::PhysicsProp {
                    Some((reader.read::<String>()?, reader.read::<String>()?))
                } else {
                    None
                };
                transform.position = reader.read::<HighResVec3>()?.0;
                transform.velocity = reader.read::<StandardVec3>()?.0;
                transform.orientation = reader.read::<StandardQuat>()?.0;

                match kind {
                    ReplicatedKind::Grenade => Profile::Thrown {
                        team_id: reader.read()?,
                        thrower: None,
                    },
                    ReplicatedKind::Molotov => {
                        let thrower = reader.read()?;
                        Profile::Thrown {
                            team_id: reader.read()?,
                            thrower,
                        }
                    }
                    ReplicatedKind::DropPod => Profile::Pod {
                        landing: reader.read::<HighResVec3>()?.0,
                    },
                    ReplicatedKind::Bot | ReplicatedKind::Player => {
                        let team_id = reader.read()?;
                        let count: u8 = reader.read()?;
                        let weapons = (0..count)
                            .map(|_| reader.read::<Option<u8>>())
                            .collect::<Result<Vec<_>, _>>()?;
                        let special = reader.read()?;
                        let active_weapon = reader.read()?;
                        let username = if kind == ReplicatedKind::Player {
                            reader.read()?
                        } else {
                            String::new()
                        };
                        Profile::Actor(ActorState {
                            team_id,
                            weapons,
                            special,
                            active_weapon,
                            username,
                            ..ActorState::default()
                        })
                    }
                    _ => {
                        let (directory, data_file) = prop.unwrap_or_default();
                        Profile::Prop {
                            directory,
                            data_file,
                        }
                    }
                }
            }
        };

        let payload = reader.read()?;
        Ok(Self {
            kind,
            id,
            transform,
            profile,
            payload,
        })
    }

    pub fn into_entity(self) -> Entity {
        let mut entity = Entity::new(self.kind.capabilities(), self.profile, self.transform);
        entity.id = self.id;
        entity.restore_payload(self.payload);
        entity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteDescriptor {
    pub id: u8,
    pub killed: bool,
}

impl DeleteDescriptor {
    pub fn write(&self, packet: &mut Packet) {
        packet.add(PacketTag::Delete).add(self.id).add(self.killed);
    }

    pub fn read(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            id: reader.read()?,
            killed: reader.read()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorDelta {
    /// `(component index, state)` for every component updated since the last build.
    pub components: Vec<(u8, Vec<u8>)>,
    pub health: i16,
    pub weapon_switch: Option<u8>,
    pub aim_target: Vec3,
    /// Pilot input; only players carry it.
    pub motion: Option<(Vec3, bool)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeltaFields {
    Object,
    Actor(ActorDelta),
    Team { username: Option<String> },
}

/// One entity's per-tick record following the CONTROLLER tag.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaUpdate {
    pub id: u8,
    pub kind: ReplicatedKind,
    /// The new transform sample when the entity moved materially. Only
    /// meaningful for object kinds.
    pub snapshot: Option<EntitySnapshot>,
    pub fields: DeltaFields,
    pub payload: Option<Vec<u8>>,
}

impl DeltaUpdate {
    pub fn write(&self, packet: &mut Packet) {
        packet.add(PacketTag::Controller).add(self.id);

        if self.kind.is_object() {
            packet.add(self.snapshot.is_some());
            if let Some(snapshot) = &self.snapshot {
                snapshot.write(packet);
            }
        }

        match &self.fields {
            DeltaFields::Object => {}
            DeltaFields::Actor(actor) => {
                for (index, state) in actor.components.iter().filter(|(i, _)| *i != NO_ENTITY) {
                    packet.add(*index).add(state);
                }
                packet
                    .add(NO_ENTITY)
                    .add(actor.health)
                    .add(actor.weapon_switch.is_some());
                if let Some(weapon) = actor.weapon_switch {
                    packet.add(weapon);
                }
                packet.add(LowResVec3(actor.aim_target));
                if self.kind == ReplicatedKind::Player {
                    let (direction, sprinting) = actor.motion.unwrap_or((Vec3::ZERO, false));
                    packet.add(SmallVec3(direction)).add(sprinting);
                }
            }
            DeltaFields::Team { username } => {
                packet.add(username.is_some());
                if let Some(username) = username {
                    packet.add(username);
                }
            }
        }

        packet.add(self.payload.is_some());
        if let Some(payload) = &self.payload {
            packet.add(payload);
        }
    }

    /// Reads the fields following the CONTROLLER tag and id. The layout
    /// depends on `kind`, which the receiver knows from the spawn.
    pub fn read(
        reader: &mut PacketReader<'_>,
        id: u8,
        kind: ReplicatedKind,
        now: f64,
    ) -> Result<Self, WireError> {
        let snapshot = if kind.is_object() && reader.read::<bool>()? {
            Some(EntitySnapshot::read(reader, now)?)
        } else {
            None
        };

        let fields = if kind.is_actor() {
            let mut components = Vec::new();
            loop {
                let index: u8 = reader.read()?;
                if index == NO_ENTITY {
                    break;
                }
                components.push((index, reader.read::<Vec<u8>>()?));
            }
            let health = reader.read()?;
            let weapon_switch = if reader.read::<bool>()? {
                Some(reader.read()?)
            } else {
                None
            };
            let aim_target = reader.read::<LowResVec3>()?.0;
            let motion = if kind == ReplicatedKind::Player {
                let direction = reader.read::<SmallVec3>()?.0;
                Some((direction, reader.read()?))
            } else {
                None
            };
            DeltaFields::Actor(ActorDelta {
                components,
                health,
                weapon_switch,
                aim_target,
                motion,
            })
        } else if kind == ReplicatedKind::TeamEntity {
            let username = if reader.read::<bool>()? {
                Some(reader.read()?)
            } else {
                None
            };
            DeltaFields::Team { username }
        } else {
            DeltaFields::Object
        };

        let payload = if reader.read::<bool>()? {
            Some(reader.read()?)
        } else {
            None
        };

        Ok(Self {
            id,
            kind,
            snapshot,
            fields,
            payload,
        })
    }
}

/// Writes `state` into component slot `index`, growing the list as needed.
pub(crate) fn apply_component(components: &mut Vec<ComponentState>, index: u8, state: &[u8]) {
    let index = index as usize;
    if components.len() <= index {
        components.resize_with(index + 1, ComponentState::default);
    }
    components[index] = ComponentState {
        data: state.to_vec(),
        dirty: false,
    };
}
