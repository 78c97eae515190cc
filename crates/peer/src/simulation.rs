use glam::{Quat, Vec3, Vec4};

use droidnet::net::rand_percent;
use droidnet::{Entity, NetContext, NetError, NetManager};

const BOT_RADIUS: f32 = 12.0;
const BOT_SPEED: f32 = 0.4;
const GRAVITY: f32 = 9.8;
const GRENADE_INTERVAL: f64 = 3.0;

/// A tiny stand-in for the game: bots circle the origin, the host lobs a
/// grenade now and then, and a client walks its player around.
#[derive(Debug, Default)]
pub struct Simulation {
    team: Option<u8>,
    bots: Vec<u8>,
    grenades: Vec<u8>,
    player: Option<u8>,
    elapsed: f64,
    next_grenade: f64,
}

impl Simulation {
    pub fn new() -> Self {
        Self {
            next_grenade: GRENADE_INTERVAL,
            ..Self::default()
        }
    }

    pub fn team(&self) -> Option<u8> {
        self.team
    }

    pub fn populate(
        &mut self,
        manager: &mut NetManager,
        ctx: &mut NetContext,
        bots: usize,
        now: f64,
    ) -> Result<(), NetError> {
        let team = manager.spawn_entity(
            ctx,
            Entity::team(Vec4::new(0.9, 0.2, 0.2, 1.0), 0, "host"),
            now,
        )?;
        self.team = Some(team);

        for index in 0..bots {
            let position = circle_point(index, bots, 0.0);
            let id = manager.spawn_entity(ctx, Entity::bot(position, team, 1), now)?;
            self.bots.push(id);
        }
        log::info!("spawned team {team} with {bots} bots");
        Ok(())
    }

    pub fn spawn_player(
        &mut self,
        manager: &mut NetManager,
        ctx: &mut NetContext,
        team_id: u8,
        now: f64,
    ) -> Result<(), NetError> {
        let username = ctx.username.clone();
        let id = manager.spawn_entity(
            ctx,
            Entity::player(Vec3::new(0.0, 1.0, 0.0), team_id, username),
            now,
        )?;
        self.player = Some(id);
        Ok(())
    }

    pub fn step(&mut self, manager: &mut NetManager, ctx: &mut NetContext, dt: f64, now: f64) {
        self.elapsed += dt;
        let count = self.bots.len();
        let phase = (self.elapsed as f32) * BOT_SPEED;

        for (index, id) in self.bots.iter().enumerate() {
            let Some(entity) = manager.entity_mut(*id) else {
                continue;
            };
            let target = circle_point(index, count, phase);
            let velocity = (target - entity.transform.position) / dt as f32;
            entity.transform.velocity = velocity;
            entity.transform.position = target;
            if velocity.length_squared() > 0.0 {
                entity.transform.orientation = facing(velocity);
            }
        }

        if let Some(id) = self.player {
            if let Some(entity) = manager.entity_mut(id) {
                let t = self.elapsed as f32;
                let direction = Vec3::new(t.cos(), 0.0, (2.0 * t).cos()).normalize_or_zero();
                entity.transform.velocity = direction * 4.0;
                entity.transform.position += entity.transform.velocity * dt as f32;
                if let Some(actor) = entity.actor_mut() {
                    actor.move_direction = direction;
                    actor.sprinting = t.sin() > 0.5;
                }
            }
        }

        // Grenades fall until the height limit removes them.
        self.grenades.retain(|id| manager.entity(*id).is_some());
        for id in &self.grenades {
            if let Some(entity) = manager.entity_mut(*id) {
                entity.transform.velocity.y -= GRAVITY * dt as f32;
                entity.transform.position += entity.transform.velocity * dt as f32;
            }
        }

        if ctx.is_authority() && self.elapsed >= self.next_grenade {
            self.next_grenade += GRENADE_INTERVAL;
            self.throw_grenade(manager, ctx, now);
        }
    }

    fn throw_grenade(&mut self, manager: &mut NetManager, ctx: &mut NetContext, now: f64) {
        let (Some(team), Some(thrower)) = (self.team, self.bots.first().copied()) else {
            return;
        };
        let Some(origin) = manager.entity(thrower).map(|e| e.transform.position) else {
            return;
        };
        let angle = rand_percent() * std::f32::consts::TAU;
        let velocity = Vec3::new(angle.cos() * 6.0, 8.0, angle.sin() * 6.0);
        match manager.spawn_entity(ctx, Entity::grenade(origin, velocity, team), now) {
            Ok(id) => self.grenades.push(id),
            Err(e) => log::warn!("could not throw grenade: {e}"),
        }
    }
}

fn circle_point(index: usize, count: usize, phase: f32) -> Vec3 {
    let angle = index as f32 / count.max(1) as f32 * std::f32::consts::TAU + phase;
    Vec3::new(angle.cos() * BOT_RADIUS, 1.0, angle.sin() * BOT_RADIUS)
}

fn facing(direction: Vec3) -> Quat {
    Quat::from_rotation_y(direction.x.atan2(direction.z))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use droidnet::{MemoryNetwork, NetConfig};

    use super::*;

    #[test]
    fn bots_circle_and_grenades_fall_out() {
        let network = MemoryNetwork::new();
        let config = NetConfig::default();
        let addr = SocketAddr::from(([127, 0, 0, 1], 9));
        let mut ctx = NetContext::authority(Box::new(network.endpoint(addr)), &config);
        let mut manager = NetManager::new(config);
        let mut sim = Simulation::new();

        sim.populate(&mut manager, &mut ctx, 3, 0.0).unwrap();
        assert_eq!(manager.entities().len(), 4);
        let bot = sim.bots[0];
        let start = manager.entity(bot).unwrap().transform.position;

        let dt = 1.0 / 20.0;
        let mut now = 0.0;
        let mut saw_grenade = false;
        for _ in 0..200 {
            now += dt;
            sim.step(&mut manager, &mut ctx, dt, now);
            manager.update(&mut ctx, now);
            saw_grenade |= !sim.grenades.is_empty();
        }

        assert!(saw_grenade);
        let moved = manager.entity(bot).unwrap().transform.position;
        assert!((moved - start).length() > 1.0);
        assert!((moved.with_y(0.0).length() - BOT_RADIUS).abs() < 0.01);
    }
}
