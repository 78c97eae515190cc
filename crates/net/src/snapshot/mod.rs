mod buffer;
mod entity;

pub use buffer::{DEFAULT_HISTORY, SnapshotBuffer};
pub use entity::{EntitySnapshot, ORIENTATION_EPSILON, POSITION_EPSILON};
