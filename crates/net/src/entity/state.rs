use glam::{Quat, Vec3, Vec4};

use super::kind::{Capabilities, ReplicatedKind};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
        }
    }
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// One attachment of an actor (weapon, claw, special). Its state is opaque
/// to replication and only travels when marked dirty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentState {
    pub data: Vec<u8>,
    pub dirty: bool,
}

impl ComponentState {
    pub fn update(&mut self, data: Vec<u8>) {
        self.data = data;
        self.dirty = true;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorState {
    pub team_id: Option<u8>,
    pub weapons: Vec<Option<u8>>,
    pub special: Option<u8>,
    pub active_weapon: u8,
    pub health: i16,
    pub aim_target: Vec3,
    pub components: Vec<ComponentState>,
    pub username: String,
    pub move_direction: Vec3,
    pub sprinting: bool,
}

impl Default for ActorState {
    fn default() -> Self {
        Self {
            team_id: None,
            weapons: Vec::new(),
            special: None,
            active_weapon: 0,
            health: 100,
            aim_target: Vec3::ZERO,
            components: Vec::new(),
            username: String::new(),
            move_direction: Vec3::ZERO,
            sprinting: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamState {
    pub color: Vec4,
    pub dock: u8,
    pub allies: Vec<u8>,
    pub username: String,
}

impl Default for TeamState {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            dock: 0,
            allies: Vec::new(),
            username: String::from("Unnamed"),
        }
    }
}

/// Kind-specific spawn data.
#[derive(Debug, Clone, PartialEq)]
pub enum Profile {
    Actor(ActorState),
    Team(TeamState),
    Prop { directory: String, data_file: String },
    Thrown { team_id: Option<u8>, thrower: Option<u8> },
    Glass { width: f32, height: f32 },
    Pod { landing: Vec3 },
}

impl Profile {
    pub fn default_for(kind: ReplicatedKind) -> Self {
        match kind {
            ReplicatedKind::Bot | ReplicatedKind::Player => Self::Actor(ActorState::default()),
            ReplicatedKind::TeamEntity => Self::Team(TeamState::default()),
            ReplicatedKind::PhysicsProp => Self::Prop {
                directory: String::new(),
                data_file: String::new(),
            },
            ReplicatedKind::Grenade | ReplicatedKind::Molotov => Self::Thrown {
                team_id: None,
                thrower: None,
            },
            ReplicatedKind::Glass => Self::Glass {
                width: 1.0,
                height: 1.0,
            },
            ReplicatedKind::DropPod => Self::Pod {
                landing: Vec3::ZERO,
            },
        }
    }

    pub fn matches(&self, kind: ReplicatedKind) -> bool {
        matches!(
            (self, kind),
            (Self::Actor(_), ReplicatedKind::Bot | ReplicatedKind::Player)
                | (Self::Team(_), ReplicatedKind::TeamEntity)
                | (Self::Prop { .. }, ReplicatedKind::PhysicsProp)
                | (
                    Self::Thrown { .. },
                    ReplicatedKind::Grenade | ReplicatedKind::Molotov
                )
                | (Self::Glass { .. }, ReplicatedKind::Glass)
                | (Self::Pod { .. }, ReplicatedKind::DropPod)
        )
    }
}

/// The replicated view of one game entity. Gameplay systems own and mutate
/// it; replication snapshots and restores the transform and carries the
/// payload without interpreting it.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: u8,
    pub capabilities: Capabilities,
    pub transform: Transform,
    pub profile: Profile,
    payload: Vec<u8>,
    payload_dirty: bool,
    pub is_local: bool,
    pub active: bool,
    pub spawn_time: f64,
}

impl Entity {
    pub fn new(capabilities: Capabilities, profile: Profile, transform: Transform) -> Self {
        Self {
            id: 0,
            capabilities,
            transform,
            profile,
            payload: Vec::new(),
            payload_dirty: false,
            is_local: false,
            active: true,
            spawn_time: 0.0,
        }
    }

    pub fn of_kind(kind: ReplicatedKind, transform: Transform) -> Self {
        Self::new(kind.capabilities(), Profile::default_for(kind), transform)
    }

    pub fn bot(position: Vec3, team_id: u8, weapon: u8) -> Self {
        let actor = ActorState {
            team_id: Some(team_id),
            weapons: vec![Some(weapon)],
            components: vec![ComponentState::default()],
            ..ActorState::default()
        };
        Self::new(
            ReplicatedKind::Bot.capabilities(),
            Profile::Actor(actor),
            Transform::at(position),
        )
    }

    pub fn player(position: Vec3, team_id: u8, username: impl Into<String>) -> Self {
        let actor = ActorState {
            team_id: Some(team_id),
            weapons: vec![Some(0), None],
            components: vec![ComponentState::default(), ComponentState::default()],
            username: username.into(),
            ..ActorState::default()
        };
        Self::new(
            ReplicatedKind::Player.capabilities(),
            Profile::Actor(actor),
            Transform::at(position),
        )
    }

    pub fn team(color: Vec4, dock: u8, username: impl Into<String>) -> Self {
        let team = TeamState {
            color,
            dock,
            allies: Vec::new(),
            username: username.into(),
        };
        Self::new(Capabilities::TEAM, Profile::Team(team), Transform::default())
    }

    pub fn prop(position: Vec3, directory: &str, data_file: &str) -> Self {
        Self::new(
            Capabilities::PHYSICAL,
            Profile::Prop {
                directory: directory.to_string(),
                data_file: data_file.to_string(),
            },
            Transform::at(position),
        )
    }

    pub fn grenade(position: Vec3, velocity: Vec3, team_id: u8) -> Self {
        let transform = Transform {
            velocity,
            ..Transform::at(position)
        };
        Self::new(
            ReplicatedKind::Grenade.capabilities(),
            Profile::Thrown {
                team_id: Some(team_id),
                thrower: None,
            },
            transform,
        )
    }

    pub fn molotov(position: Vec3, velocity: Vec3, thrower: u8, team_id: u8) -> Self {
        let transform = Transform {
            velocity,
            ..Transform::at(position)
        };
        Self::new(
            ReplicatedKind::Molotov.capabilities(),
            Profile::Thrown {
                team_id: Some(team_id),
                thrower: Some(thrower),
            },
            transform,
        )
    }

    pub fn glass(position: Vec3, width: f32, height: f32) -> Self {
        Self::new(
            Capabilities::SHATTERABLE,
            Profile::Glass { width, height },
            Transform::at(position),
        )
    }

    pub fn drop_pod(start: Vec3, landing: Vec3) -> Self {
        Self::new(
            ReplicatedKind::DropPod.capabilities(),
            Profile::Pod { landing },
            Transform::at(start),
        )
    }

    pub fn kind(&self) -> Option<ReplicatedKind> {
        ReplicatedKind::resolve(self.capabilities)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Replaces the opaque gameplay blob; the change is delivered reliably.
    pub fn set_payload(&mut self, payload: Vec<u8>) {
        if payload != self.payload {
            self.payload = payload;
            self.payload_dirty = true;
        }
    }

    pub(crate) fn restore_payload(&mut self, payload: Vec<u8>) {
        self.payload = payload;
        self.payload_dirty = false;
    }

    pub(crate) fn take_payload_change(&mut self) -> Option<Vec<u8>> {
        if self.payload_dirty {
            self.payload_dirty = false;
            Some(self.payload.clone())
        } else {
            None
        }
    }

    pub fn actor(&self) -> Option<&ActorState> {
        match &self.profile {
            Profile::Actor(actor) => Some(actor),
            _ => None,
        }
    }

    pub fn actor_mut(&mut self) -> Option<&mut ActorState> {
        match &mut self.profile {
            Profile::Actor(actor) => Some(actor),
            _ => None,
        }
    }

    pub fn team_state(&self) -> Option<&TeamState> {
        match &self.profile {
            Profile::Team(team) => Some(team),
            _ => None,
        }
    }

    pub fn team_state_mut(&mut self) -> Option<&mut TeamState> {
        match &mut self.profile {
            Profile::Team(team) => Some(team),
            _ => None,
        }
    }
}
