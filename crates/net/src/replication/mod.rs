mod controller;
mod critical;
mod descriptor;

pub use controller::{AIM_EPSILON, DuplicateSpawn, Lifecycle, RESTING_SPEED, ReplicationController};
pub use critical::CriticalQueue;
pub use descriptor::{
    ActorDelta, DeleteDescriptor, DeltaFields, DeltaUpdate, DescriptorError, SpawnDescriptor,
};
