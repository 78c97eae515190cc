use glam::{Quat, Vec3};

use crate::entity::Transform;
use crate::wire::{HighResVec3, Packet, PacketReader, StandardQuat, WireError};

/// Per-component position tolerance for [`EntitySnapshot::almost_equals`].
pub const POSITION_EPSILON: f32 = 0.2;
/// Orientation tolerance in radians (two degrees).
pub const ORIENTATION_EPSILON: f32 = 2.0 * std::f32::consts::PI / 180.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntitySnapshot {
    pub position: Vec3,
    pub orientation: Quat,
    pub timestamp: f64,
    pub valid: bool,
}

impl Default for EntitySnapshot {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            timestamp: 0.0,
            valid: false,
        }
    }
}

impl EntitySnapshot {
    pub fn new(position: Vec3, orientation: Quat, timestamp: f64) -> Self {
        Self {
            position,
            orientation,
            timestamp,
            valid: true,
        }
    }

    pub fn take(transform: &Transform, now: f64) -> Self {
        Self::new(transform.position, transform.orientation, now)
    }

    /// Copy of this sample re-stamped at `now`.
    pub fn restamped(&self, now: f64) -> Self {
        Self {
            timestamp: now,
            ..*self
        }
    }

    /// Blend from `self` (scale 0) towards `newer` (scale 1).
    pub fn lerp(&self, newer: &EntitySnapshot, scale: f32) -> Self {
        let t = scale as f64;
        Self {
            position: self.position.lerp(newer.position, scale),
            orientation: self.orientation.lerp(newer.orientation, scale),
            timestamp: self.timestamp + (newer.timestamp - self.timestamp) * t,
            valid: true,
        }
    }

    pub fn almost_equals(&self, other: &EntitySnapshot) -> bool {
        self.position.abs_diff_eq(other.position, POSITION_EPSILON)
            && angle_between(self.orientation, other.orientation) < ORIENTATION_EPSILON
    }

    pub fn commit_to(&self, transform: &mut Transform) {
        transform.orientation = self.orientation;
        transform.position = self.position;
    }

    pub fn write(&self, packet: &mut Packet) {
        packet
            .add(HighResVec3(self.position))
            .add(StandardQuat(self.orientation));
    }

    /// The wire form carries no time; received samples are stamped with the
    /// local arrival time.
    pub fn read(reader: &mut PacketReader<'_>, now: f64) -> Result<Self, WireError> {
        let position = reader.read::<HighResVec3>()?.0;
        let orientation = reader.read::<StandardQuat>()?.0;
        Ok(Self::new(position, orientation, now))
    }
}

fn angle_between(a: Quat, b: Quat) -> f32 {
    let dot = a.dot(b).abs().min(1.0);
    2.0 * dot.acos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn almost_equals_is_reflexive() {
        let s = EntitySnapshot::new(
            Vec3::new(3.0, -1.0, 12.5),
            Quat::from_rotation_z(1.2),
            4.0,
        );
        assert!(s.almost_equals(&s));
        assert!(EntitySnapshot::default().almost_equals(&EntitySnapshot::default()));
    }

    #[test]
    fn almost_equals_rejects_large_differences() {
        let a = EntitySnapshot::new(Vec3::ZERO, Quat::IDENTITY, 0.0);

        let moved = EntitySnapshot::new(Vec3::new(0.0, 0.3, 0.0), Quat::IDENTITY, 0.0);
        assert!(!a.almost_equals(&moved));

        let turned = EntitySnapshot::new(Vec3::ZERO, Quat::from_rotation_y(0.1), 0.0);
        assert!(!a.almost_equals(&turned));

        let nudged = EntitySnapshot::new(Vec3::new(0.1, 0.0, -0.1), Quat::from_rotation_y(0.01), 0.0);
        assert!(a.almost_equals(&nudged));
    }

    #[test]
    fn negated_quaternion_is_same_orientation() {
        let q = Quat::from_rotation_x(0.7);
        let a = EntitySnapshot::new(Vec3::ZERO, q, 0.0);
        let b = EntitySnapshot::new(Vec3::ZERO, -q, 0.0);
        assert!(a.almost_equals(&b));
    }

    #[test]
    fn lerp_midpoint() {
        let a = EntitySnapshot::new(Vec3::ZERO, Quat::IDENTITY, 0.0);
        let b = EntitySnapshot::new(Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY, 1.0);

        let mid = a.lerp(&b, 0.5);
        assert!((mid.position - Vec3::new(5.0, 0.0, 0.0)).length() < 1e-5);
        assert!((mid.timestamp - 0.5).abs() < 1e-9);
    }

    #[test]
    fn wire_roundtrip_restamps() {
        let s = EntitySnapshot::new(Vec3::new(1.5, 2.5, 3.5), Quat::from_rotation_y(0.4), 1.0);
        let mut packet = Packet::new();
        s.write(&mut packet);

        let decoded = EntitySnapshot::read(&mut packet.reader(), 9.0).unwrap();
        assert_eq!(decoded.position, s.position);
        assert_eq!(decoded.orientation, s.orientation);
        assert_eq!(decoded.timestamp, 9.0);
        assert!(decoded.valid);
    }
}
