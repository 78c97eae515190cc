mod kind;
mod state;
mod table;

pub use kind::{Capabilities, ReplicatedKind, SPAWN_PRIORITY};
pub use state::{ActorState, ComponentState, Entity, Profile, TeamState, Transform};
pub use table::{
    CLIENT_BLOCK_SIZE, CLIENT_ID_START, EntityTable, IdAllocator, IdBlock, NO_ENTITY, Replica,
};
