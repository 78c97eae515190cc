use glam::Vec3;

use crate::entity::{Entity, EntityTable, Profile, Replica, ReplicatedKind};
use crate::snapshot::{EntitySnapshot, SnapshotBuffer};
use crate::wire::Packet;

use super::critical::CriticalQueue;
use super::descriptor::{
    ActorDelta, DeleteDescriptor, DeltaFields, DeltaUpdate, SpawnDescriptor, apply_component,
};

/// Below this speed an entity whose pose matches the last sent one is resting.
pub const RESTING_SPEED: f32 = 0.5;
/// Aim targets closer than this to the last sent one are not worth a delta.
pub const AIM_EPSILON: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Spawning,
    Active,
    Deleting,
    Gone,
}

#[derive(Debug, thiserror::Error)]
#[error("entity {0} is already active")]
pub struct DuplicateSpawn(pub u8);

/// What the last broadcast told peers, used to suppress redundant deltas.
#[derive(Debug, Clone, Default)]
struct SentState {
    snapshot: EntitySnapshot,
    health: Option<i16>,
    aim_target: Vec3,
    active_weapon: Option<u8>,
    username: Option<String>,
}

/// Values sampled by the latest build, committed to [`SentState`] once the
/// delta is known to go out.
#[derive(Debug, Clone, Default)]
struct BuiltState {
    snapshot: Option<EntitySnapshot>,
    health: Option<i16>,
    aim_target: Option<Vec3>,
    component_update: bool,
}

#[derive(Debug)]
pub struct ReplicationController {
    id: u8,
    kind: ReplicatedKind,
    lifecycle: Lifecycle,
    snapshots: SnapshotBuffer,
    critical: CriticalQueue,
    critical_update: bool,
    sequence: u64,
    sent: SentState,
    built: BuiltState,
    pending_removal: Option<bool>,
    last_packet_update: f64,
}

impl ReplicationController {
    pub fn new(id: u8, kind: ReplicatedKind, history: usize) -> Self {
        Self {
            id,
            kind,
            lifecycle: Lifecycle::Spawning,
            snapshots: SnapshotBuffer::new(history),
            critical: CriticalQueue::new(),
            critical_update: false,
            sequence: 0,
            sent: SentState::default(),
            built: BuiltState::default(),
            pending_removal: None,
            last_packet_update: 0.0,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn kind(&self) -> ReplicatedKind {
        self.kind
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn snapshots(&self) -> &SnapshotBuffer {
        &self.snapshots
    }

    pub fn critical_len(&self) -> usize {
        self.critical.len()
    }

    pub fn last_packet_update(&self) -> f64 {
        self.last_packet_update
    }

    /// Seeds history and last-sent markers from the entity as spawned, then
    /// moves to `Active`.
    pub fn activate(&mut self, entity: &Entity, now: f64) {
        let snapshot = EntitySnapshot::take(&entity.transform, now);
        self.snapshots.reset_to(snapshot);
        self.sent = SentState {
            snapshot,
            ..SentState::default()
        };
        match &entity.profile {
            Profile::Actor(actor) => {
                self.sent.health = Some(actor.health);
                self.sent.aim_target = actor.aim_target;
                self.sent.active_weapon = Some(actor.active_weapon);
            }
            Profile::Team(team) => self.sent.username = Some(team.username.clone()),
            _ => {}
        }
        self.last_packet_update = now;
        self.lifecycle = Lifecycle::Active;
    }

    pub fn build_spawn_descriptor(&self, entity: &Entity) -> Packet {
        let mut packet = Packet::new();
        SpawnDescriptor::capture(entity, self.kind).write(&mut packet);
        packet
    }

    /// Constructs the described entity and inserts it into `table`. The
    /// entity is owned locally when this process is the authority. A spawn
    /// for an id that is already active is torn down and rejected.
    pub fn apply_spawn_descriptor(
        descriptor: SpawnDescriptor,
        table: &mut EntityTable,
        authority: bool,
        now: f64,
        history: usize,
    ) -> Result<u8, DuplicateSpawn> {
        let id = descriptor.id;
        let kind = descriptor.kind;

        let mut entity = descriptor.into_entity();
        entity.is_local = authority;
        entity.spawn_time = now;

        let mut controller = Self::new(id, kind, history);
        controller.activate(&entity, now);

        table
            .insert(Replica { entity, controller })
            .map_err(|mut duplicate| {
                duplicate.controller.teardown();
                DuplicateSpawn(id)
            })?;
        Ok(id)
    }

    pub fn build_delete_descriptor(&self, killed: bool) -> Packet {
        let mut packet = Packet::new();
        DeleteDescriptor {
            id: self.id,
            killed,
        }
        .write(&mut packet);
        packet
    }

    /// Produces this step's delta for a locally owned entity. Queued
    /// critical bodies are flushed in front of it on a tick boundary; a
    /// critical body built off-boundary is queued for the next one.
    pub fn build_delta_update(
        &mut self,
        entity: &mut Entity,
        tick_boundary: bool,
        now: f64,
    ) -> Option<Packet> {
        if !entity.active || self.lifecycle != Lifecycle::Active || !self.kind.sends_deltas() {
            return None;
        }

        let mut out = Packet::new();
        self.critical_update = tick_boundary && self.critical.flush_into(&mut out);
        self.built = BuiltState::default();
        let mut critical = false;

        let snapshot = if self.kind.is_object() {
            let current = EntitySnapshot::take(&entity.transform, now);
            let resting = self.sent.snapshot.almost_equals(&current)
                && entity.transform.velocity.length() < RESTING_SPEED;
            (tick_boundary && !resting).then_some(current)
        } else {
            None
        };
        self.built.snapshot = snapshot;

        let fields = match &mut entity.profile {
            Profile::Actor(actor) => {
                let components: Vec<(u8, Vec<u8>)> = actor
                    .components
                    .iter_mut()
                    .enumerate()
                    .filter(|(_, component)| component.dirty)
                    .map(|(index, component)| {
                        component.dirty = false;
                        (index as u8, component.data.clone())
                    })
                    .collect();
                self.built.component_update = !components.is_empty();

                let weapon_switch = (self.sent.active_weapon != Some(actor.active_weapon))
                    .then_some(actor.active_weapon);
                if weapon_switch.is_some() {
                    self.sent.active_weapon = Some(actor.active_weapon);
                }
                critical |= weapon_switch.is_some() || self.built.component_update;

                self.built.health = Some(actor.health);
                self.built.aim_target = Some(actor.aim_target);
                let motion = (self.kind == ReplicatedKind::Player)
                    .then_some((actor.move_direction, actor.sprinting));

                DeltaFields::Actor(ActorDelta {
                    components,
                    health: actor.health,
                    weapon_switch,
                    aim_target: actor.aim_target,
                    motion,
                })
            }
            Profile::Team(team) => {
                let username = (self.sent.username.as_deref() != Some(team.username.as_str()))
                    .then(|| team.username.clone());
                if username.is_some() {
                    self.sent.username = username.clone();
                    critical = true;
                }
                DeltaFields::Team { username }
            }
            _ => DeltaFields::Object,
        };

        let payload = entity.take_payload_change();
        critical |= payload.is_some();

        if let Some((lower, upper)) = self.kind.height_limits() {
            let height = entity.transform.position.y;
            if (height < lower || height > upper) && self.pending_removal.is_none() {
                log::info!("entity {} left the height limits at {height:.1}", self.id);
                self.pending_removal = Some(true);
            }
        }

        let mut body = Packet::new();
        DeltaUpdate {
            id: self.id,
            kind: self.kind,
            snapshot,
            fields,
            payload,
        }
        .write(&mut body);

        if critical {
            self.add_critical(&body, tick_boundary);
        }
        out.add(&body);
        Some(out)
    }

    fn add_critical(&mut self, body: &Packet, tick_boundary: bool) {
        // On a boundary the body goes out with this tick; queueing it too
        // would send it twice.
        if tick_boundary {
            self.critical_update = true;
        } else {
            self.critical.push(self.sequence, body.clone());
        }
        self.sequence += 1;
    }

    /// Whether the last built delta carries anything worth sending. When it
    /// does, its values become the new last-sent baseline.
    pub fn needs_to_send_update(&mut self) -> bool {
        let health_changed = self
            .built
            .health
            .is_some_and(|health| self.sent.health != Some(health));
        let aim_moved = self
            .built
            .aim_target
            .is_some_and(|aim| aim.distance(self.sent.aim_target) > AIM_EPSILON);

        let send = self.critical_update
            || self.built.snapshot.is_some()
            || self.built.component_update
            || health_changed
            || aim_moved;

        if send {
            if let Some(snapshot) = self.built.snapshot {
                self.sent.snapshot = snapshot;
            }
            if let Some(health) = self.built.health {
                self.sent.health = Some(health);
            }
            if let Some(aim) = self.built.aim_target {
                self.sent.aim_target = aim;
            }
        }
        send
    }

    /// Applies a received delta, or advances remote interpolation when
    /// `delta` is `None`. Locally owned entities keep their simulated state.
    pub fn apply_delta_update(
        &mut self,
        entity: &mut Entity,
        delta: Option<&DeltaUpdate>,
        now: f64,
        render_delay: f64,
    ) {
        if self.lifecycle != Lifecycle::Active {
            return;
        }
        if delta.is_some() {
            self.last_packet_update = now;
        }
        if entity.is_local {
            return;
        }

        let target = now - render_delay;
        if self.kind.is_object() {
            if self.snapshots.is_empty() {
                self.snapshots
                    .push(EntitySnapshot::take(&entity.transform, now));
            }
            match delta {
                Some(delta) => {
                    let sample = match delta.snapshot {
                        Some(snapshot) => Some(snapshot),
                        None => self.snapshots.latest().map(|s| s.restamped(now)),
                    };
                    if let Some(sample) = sample {
                        self.snapshots.push(sample);
                    }
                }
                None => {
                    self.snapshots.ensure_fresh(target, now);
                }
            }
        }

        if let Some(delta) = delta {
            apply_fields(entity, delta);
        }

        if self.kind.is_object() {
            if let Some(sample) = self.snapshots.sample(target) {
                sample.commit_to(&mut entity.transform);
            }
        }
    }

    /// Set when the entity must be deleted as a result of its own update;
    /// the flag says whether it was killed.
    pub fn take_pending_removal(&mut self) -> Option<bool> {
        self.pending_removal.take()
    }

    pub fn teardown(&mut self) {
        self.lifecycle = Lifecycle::Deleting;
        self.snapshots.clear();
        self.critical.clear();
        self.critical_update = false;
        self.pending_removal = None;
        self.lifecycle = Lifecycle::Gone;
    }
}

fn apply_fields(entity: &mut Entity, delta: &DeltaUpdate) {
    match (&mut entity.profile, &delta.fields) {
        (Profile::Actor(actor), DeltaFields::Actor(update)) => {
            for (index, state) in &update.components {
                apply_component(&mut actor.components, *index, state);
            }
            actor.health = update.health;
            if let Some(weapon) = update.weapon_switch {
                actor.active_weapon = weapon;
            }
            actor.aim_target = update.aim_target;
            if let Some((direction, sprinting)) = update.motion {
                actor.move_direction = direction;
                actor.sprinting = sprinting;
            }
        }
        (Profile::Team(team), DeltaFields::Team { username }) => {
            if let Some(username) = username {
                team.username = username.clone();
            }
        }
        _ => {}
    }
    if let Some(payload) = &delta.payload {
        entity.restore_payload(payload.clone());
    }
}

#[cfg(test)]
mod tests {
    use glam::Quat;

    use super::*;
    use crate::net::PacketTag;

    fn local(mut entity: Entity, id: u8, kind: ReplicatedKind) -> (Entity, ReplicationController) {
        entity.id = id;
        entity.is_local = true;
        let mut controller = ReplicationController::new(id, kind, 6);
        controller.activate(&entity, 0.0);
        (entity, controller)
    }

    fn decode(packet: &Packet, kind: ReplicatedKind, now: f64) -> Vec<DeltaUpdate> {
        let mut reader = packet.reader();
        let mut deltas = Vec::new();
        while !reader.is_empty() {
            assert_eq!(reader.read::<u8>().unwrap(), PacketTag::Controller as u8);
            let id = reader.read::<u8>().unwrap();
            deltas.push(DeltaUpdate::read(&mut reader, id, kind, now).unwrap());
        }
        deltas
    }

    #[test]
    fn resting_entity_has_nothing_to_send() {
        let (mut entity, mut controller) = local(
            Entity::prop(Vec3::new(0.0, 1.0, 0.0), "props", "crate"),
            5,
            ReplicatedKind::PhysicsProp,
        );

        let packet = controller.build_delta_update(&mut entity, true, 0.05).unwrap();
        assert!(!controller.needs_to_send_update());
        let deltas = decode(&packet, ReplicatedKind::PhysicsProp, 0.05);
        assert_eq!(deltas[0].snapshot, None);

        entity.transform.position.x = 3.0;
        controller.build_delta_update(&mut entity, true, 0.1).unwrap();
        assert!(controller.needs_to_send_update());

        controller.build_delta_update(&mut entity, true, 0.15).unwrap();
        assert!(!controller.needs_to_send_update());
    }

    #[test]
    fn off_boundary_builds_never_carry_position() {
        let (mut entity, mut controller) = local(
            Entity::prop(Vec3::ZERO, "props", "crate"),
            5,
            ReplicatedKind::PhysicsProp,
        );
        entity.transform.position.x = 9.0;
        controller.build_delta_update(&mut entity, false, 0.01).unwrap();
        assert!(!controller.needs_to_send_update());
    }

    #[test]
    fn critical_body_is_flushed_once() {
        let (mut entity, mut controller) = local(
            Entity::bot(Vec3::ZERO, 1, 3),
            2,
            ReplicatedKind::Bot,
        );

        entity.set_payload(vec![9]);
        controller.build_delta_update(&mut entity, false, 0.01).unwrap();
        assert_eq!(controller.critical_len(), 1);

        let flushed = controller.build_delta_update(&mut entity, true, 0.05).unwrap();
        assert!(controller.needs_to_send_update());
        assert_eq!(controller.critical_len(), 0);
        let deltas = decode(&flushed, ReplicatedKind::Bot, 0.05);
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].payload, Some(vec![9]));
        assert_eq!(deltas[1].payload, None);

        let next = controller.build_delta_update(&mut entity, true, 0.1).unwrap();
        assert_eq!(decode(&next, ReplicatedKind::Bot, 0.1).len(), 1);
    }

    #[test]
    fn critical_change_on_boundary_is_not_queued() {
        let (mut entity, mut controller) = local(
            Entity::bot(Vec3::ZERO, 1, 3),
            2,
            ReplicatedKind::Bot,
        );
        if let Some(actor) = entity.actor_mut() {
            actor.active_weapon = 1;
        }
        controller.build_delta_update(&mut entity, true, 0.05).unwrap();
        assert!(controller.needs_to_send_update());
        assert_eq!(controller.critical_len(), 0);

        let packet = controller.build_delta_update(&mut entity, true, 0.1).unwrap();
        let deltas = decode(&packet, ReplicatedKind::Bot, 0.1);
        let DeltaFields::Actor(actor) = &deltas[0].fields else {
            panic!("expected actor fields");
        };
        assert_eq!(actor.weapon_switch, None);
    }

    #[test]
    fn health_and_aim_drive_updates() {
        let (mut entity, mut controller) = local(
            Entity::bot(Vec3::ZERO, 1, 3),
            2,
            ReplicatedKind::Bot,
        );
        controller.build_delta_update(&mut entity, true, 0.05);
        assert!(!controller.needs_to_send_update());

        if let Some(actor) = entity.actor_mut() {
            actor.health = 60;
        }
        controller.build_delta_update(&mut entity, true, 0.1);
        assert!(controller.needs_to_send_update());

        if let Some(actor) = entity.actor_mut() {
            actor.aim_target = Vec3::new(0.1, 0.0, 0.0);
        }
        controller.build_delta_update(&mut entity, true, 0.15);
        assert!(!controller.needs_to_send_update());

        if let Some(actor) = entity.actor_mut() {
            actor.aim_target = Vec3::new(5.0, 0.0, 0.0);
        }
        controller.build_delta_update(&mut entity, true, 0.2);
        assert!(controller.needs_to_send_update());
    }

    #[test]
    fn leaving_height_limits_requests_kill() {
        let (mut entity, mut controller) = local(
            Entity::grenade(Vec3::ZERO, Vec3::ZERO, 1),
            8,
            ReplicatedKind::Grenade,
        );
        controller.build_delta_update(&mut entity, false, 0.01);
        assert_eq!(controller.take_pending_removal(), None);

        entity.transform.position.y = -31.0;
        controller.build_delta_update(&mut entity, false, 0.02);
        assert_eq!(controller.take_pending_removal(), Some(true));
        assert_eq!(controller.take_pending_removal(), None);

        let (mut pod, mut pod_controller) = local(
            Entity::drop_pod(Vec3::new(0.0, 500.0, 0.0), Vec3::ZERO),
            9,
            ReplicatedKind::DropPod,
        );
        pod_controller.build_delta_update(&mut pod, false, 0.01);
        assert_eq!(pod_controller.take_pending_removal(), None);
    }

    #[test]
    fn remote_entity_interpolates_behind_render_delay() {
        let mut entity = Entity::prop(Vec3::ZERO, "props", "crate");
        entity.id = 4;
        let mut controller = ReplicationController::new(4, ReplicatedKind::PhysicsProp, 6);
        controller.activate(&entity, 0.0);

        let delta = |x: f32, t: f64| DeltaUpdate {
            id: 4,
            kind: ReplicatedKind::PhysicsProp,
            snapshot: Some(EntitySnapshot::new(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY, t)),
            fields: DeltaFields::Object,
            payload: None,
        };

        controller.apply_delta_update(&mut entity, Some(&delta(10.0, 1.0)), 1.0, 0.1);
        controller.apply_delta_update(&mut entity, Some(&delta(20.0, 2.0)), 2.0, 0.1);
        // target 1.9 sits between the samples at 1.0 and 2.0
        assert!((entity.transform.position.x - 19.0).abs() < 1e-3);
    }

    #[test]
    fn local_entity_ignores_incoming_state() {
        let (mut entity, mut controller) = local(
            Entity::bot(Vec3::new(1.0, 1.0, 1.0), 1, 3),
            2,
            ReplicatedKind::Bot,
        );
        let delta = DeltaUpdate {
            id: 2,
            kind: ReplicatedKind::Bot,
            snapshot: Some(EntitySnapshot::new(Vec3::splat(50.0), Quat::IDENTITY, 1.0)),
            fields: DeltaFields::Actor(ActorDelta {
                components: Vec::new(),
                health: 1,
                weapon_switch: None,
                aim_target: Vec3::ZERO,
                motion: None,
            }),
            payload: Some(vec![1]),
        };
        controller.apply_delta_update(&mut entity, Some(&delta), 1.0, 0.1);

        assert_eq!(entity.transform.position, Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(entity.actor().map(|a| a.health), Some(100));
        assert!(entity.payload().is_empty());
        assert_eq!(controller.last_packet_update(), 1.0);
    }

    #[test]
    fn duplicate_spawn_keeps_first() {
        let mut table = EntityTable::new();
        let mut first = Entity::prop(Vec3::ZERO, "props", "crate");
        first.id = 11;
        let descriptor = SpawnDescriptor::capture(&first, ReplicatedKind::PhysicsProp);

        let mut second = descriptor.clone();
        second.transform.position = Vec3::splat(4.0);

        assert_eq!(
            ReplicationController::apply_spawn_descriptor(descriptor, &mut table, false, 0.0, 6)
                .unwrap(),
            11
        );
        assert!(
            ReplicationController::apply_spawn_descriptor(second, &mut table, false, 0.1, 6)
                .is_err()
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.entity(11).unwrap().transform.position, Vec3::ZERO);
    }

    #[test]
    fn teardown_discards_history() {
        let (mut entity, mut controller) = local(
            Entity::bot(Vec3::ZERO, 1, 3),
            2,
            ReplicatedKind::Bot,
        );
        entity.set_payload(vec![1]);
        controller.build_delta_update(&mut entity, false, 0.01);
        assert_eq!(controller.critical_len(), 1);

        controller.teardown();
        assert_eq!(controller.lifecycle(), Lifecycle::Gone);
        assert_eq!(controller.critical_len(), 0);
        assert!(controller.snapshots().is_empty());
        assert!(controller.build_delta_update(&mut entity, true, 0.05).is_none());
    }
}
