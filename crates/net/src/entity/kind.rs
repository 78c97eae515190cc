use bitflags::bitflags;

bitflags! {
    /// What an entity is capable of. Replicated kinds are resolved from these.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u16 {
        const PHYSICAL = 1 << 0;
        const ACTOR = 1 << 1;
        const AI_DRIVEN = 1 << 2;
        const PILOTED = 1 << 3;
        const TEAM = 1 << 4;
        const THROWN = 1 << 5;
        const INCENDIARY = 1 << 6;
        const DESCENDING = 1 << 7;
        const SHATTERABLE = 1 << 8;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReplicatedKind {
    Bot = 0,
    Player = 1,
    TeamEntity = 2,
    PhysicsProp = 3,
    Grenade = 4,
    Glass = 5,
    Molotov = 6,
    DropPod = 7,
}

/// Tag resolution order. Rows are checked top to bottom and the first row
/// whose capabilities are all present wins, so a kind must appear before
/// every kind whose capability set is a subset of its own.
pub const SPAWN_PRIORITY: [(Capabilities, ReplicatedKind); 8] = [
    (
        Capabilities::PHYSICAL
            .union(Capabilities::ACTOR)
            .union(Capabilities::AI_DRIVEN),
        ReplicatedKind::Bot,
    ),
    (
        Capabilities::PHYSICAL
            .union(Capabilities::ACTOR)
            .union(Capabilities::PILOTED),
        ReplicatedKind::Player,
    ),
    (Capabilities::TEAM, ReplicatedKind::TeamEntity),
    (
        Capabilities::PHYSICAL.union(Capabilities::DESCENDING),
        ReplicatedKind::DropPod,
    ),
    (
        Capabilities::PHYSICAL
            .union(Capabilities::THROWN)
            .union(Capabilities::INCENDIARY),
        ReplicatedKind::Molotov,
    ),
    (
        Capabilities::PHYSICAL.union(Capabilities::THROWN),
        ReplicatedKind::Grenade,
    ),
    (Capabilities::SHATTERABLE, ReplicatedKind::Glass),
    (Capabilities::PHYSICAL, ReplicatedKind::PhysicsProp),
];

impl TryFrom<u8> for ReplicatedKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Bot),
            1 => Ok(Self::Player),
            2 => Ok(Self::TeamEntity),
            3 => Ok(Self::PhysicsProp),
            4 => Ok(Self::Grenade),
            5 => Ok(Self::Glass),
            6 => Ok(Self::Molotov),
            7 => Ok(Self::DropPod),
            other => Err(other),
        }
    }
}

impl ReplicatedKind {
    pub fn resolve(capabilities: Capabilities) -> Option<Self> {
        SPAWN_PRIORITY
            .iter()
            .find(|(required, _)| capabilities.contains(*required))
            .map(|&(_, kind)| kind)
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn capabilities(self) -> Capabilities {
        SPAWN_PRIORITY
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|&(required, _)| required)
            .unwrap_or(Capabilities::empty())
    }

    /// Kinds whose transform is replicated through snapshots.
    pub fn is_object(self) -> bool {
        !matches!(self, Self::TeamEntity | Self::Glass)
    }

    pub fn is_actor(self) -> bool {
        matches!(self, Self::Bot | Self::Player)
    }

    /// Glass panes never move; they only ever spawn and shatter.
    pub fn sends_deltas(self) -> bool {
        self != Self::Glass
    }

    /// `(lower, upper)` vertical bounds outside of which the entity is killed.
    pub fn height_limits(self) -> Option<(f32, f32)> {
        match self {
            Self::TeamEntity | Self::Glass => None,
            Self::DropPod => Some((-30.0, 1000.0)),
            _ => Some((-30.0, 70.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specific_kinds_win_over_general_ones() {
        let molotov =
            Capabilities::PHYSICAL | Capabilities::THROWN | Capabilities::INCENDIARY;
        assert_eq!(ReplicatedKind::resolve(molotov), Some(ReplicatedKind::Molotov));

        let grenade = Capabilities::PHYSICAL | Capabilities::THROWN;
        assert_eq!(ReplicatedKind::resolve(grenade), Some(ReplicatedKind::Grenade));

        let bot = Capabilities::PHYSICAL | Capabilities::ACTOR | Capabilities::AI_DRIVEN;
        assert_eq!(ReplicatedKind::resolve(bot), Some(ReplicatedKind::Bot));

        assert_eq!(
            ReplicatedKind::resolve(Capabilities::PHYSICAL),
            Some(ReplicatedKind::PhysicsProp)
        );
    }

    #[test]
    fn priority_table_orders_supersets_first() {
        for (i, (later_caps, _)) in SPAWN_PRIORITY.iter().enumerate() {
            for (earlier_caps, earlier_kind) in &SPAWN_PRIORITY[..i] {
                assert!(
                    !later_caps.contains(*earlier_caps) || later_caps == earlier_caps,
                    "{earlier_kind:?} shadows a more specific kind"
                );
            }
        }
    }

    #[test]
    fn every_kind_resolves_from_its_own_capabilities() {
        for (_, kind) in SPAWN_PRIORITY {
            assert_eq!(ReplicatedKind::resolve(kind.capabilities()), Some(kind));
            assert_eq!(ReplicatedKind::try_from(kind.tag()), Ok(kind));
        }
    }

    #[test]
    fn bare_actor_is_not_replicable() {
        assert_eq!(ReplicatedKind::resolve(Capabilities::ACTOR), None);
        assert_eq!(ReplicatedKind::try_from(200), Err(200));
    }
}
