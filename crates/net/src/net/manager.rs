use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::NetConfig;
use crate::entity::{Entity, EntityTable, IdBlock, Replica, ReplicatedKind};
use crate::error::NetError;
use crate::event::{EventQueue, NetEvent};
use crate::replication::ReplicationController;
use crate::wire::Packet;

use super::context::{NetContext, NetMode};
use super::peers::PeerState;
use super::protocol::{
    ChatMessage, MatchResult, PacketTag, SetupInfo, bare, confirm_register, entity_checksum,
    entity_list, new_client, request_spawn,
};
use super::reconcile::Reconciler;
use super::section::{Section, decode_sections};
use super::stats::StatsReporter;

fn describe(sender: Option<SocketAddr>) -> String {
    sender.map_or_else(|| String::from("loopback"), |addr| addr.to_string())
}

/// Drives replication for one session: builds and sends this process's
/// deltas, applies everything received, and keeps the entity set in step
/// with the authority.
pub struct NetManager {
    config: NetConfig,
    entities: EntityTable,
    reconciler: Reconciler,
    events: EventQueue,
    last_tick: f64,
    pending_spawns: Vec<Packet>,
    pending_deletes: Vec<Packet>,
    side_packets: Vec<Packet>,
    spawn_requests: Vec<(u8, SocketAddr)>,
    updated: HashSet<u8>,
    reporter: StatsReporter,
}

impl NetManager {
    pub fn new(config: NetConfig) -> Self {
        Self {
            reconciler: Reconciler::new(&config),
            events: EventQueue::new(config.max_pending_events),
            reporter: StatsReporter::new(config.stats_interval),
            entities: EntityTable::new(),
            last_tick: 0.0,
            pending_spawns: Vec::new(),
            pending_deletes: Vec::new(),
            side_packets: Vec::new(),
            spawn_requests: Vec::new(),
            updated: HashSet::new(),
            config,
        }
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntityTable {
        &mut self.entities
    }

    pub fn entity(&self, id: u8) -> Option<&Entity> {
        self.entities.entity(id)
    }

    pub fn entity_mut(&mut self, id: u8) -> Option<&mut Entity> {
        self.entities.entity_mut(id)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = NetEvent> + '_ {
        self.events.drain()
    }

    /// Runs one step. Recoverable protocol conditions are logged and
    /// handled here; nothing is surfaced as an error.
    pub fn update(&mut self, ctx: &mut NetContext, now: f64) {
        let tick_boundary = self.advance_tick(now);
        self.updated.clear();

        let controller_sections = self.build_controller_sections(tick_boundary, now);
        if !controller_sections.is_empty() {
            let mut loopback = Packet::new();
            for section in &controller_sections {
                loopback.add(section);
            }
            self.process_datagram(ctx, loopback.as_bytes(), None, now);
        }

        let removals: Vec<(u8, bool)> = self
            .entities
            .iter_mut()
            .filter_map(|replica| {
                let id = replica.id();
                replica
                    .controller
                    .take_pending_removal()
                    .map(|killed| (id, killed))
            })
            .collect();
        for (id, killed) in removals {
            if let Err(e) = self.delete_entity(ctx, id, killed, now) {
                log::warn!("could not remove entity {id}: {e}");
            }
        }

        if tick_boundary {
            self.flush_outbound(ctx, controller_sections, now);
        }

        self.receive(ctx, now);

        let render_delay = self.config.render_delay;
        for replica in self.entities.iter_mut() {
            if !replica.entity.active || self.updated.contains(&replica.id()) {
                continue;
            }
            let Replica { entity, controller } = replica;
            controller.apply_delta_update(entity, None, now, render_delay);
        }

        for addr in ctx.peers.idle_ready(self.config.keepalive_interval, now) {
            ctx.send_to(addr, &[bare(PacketTag::Empty)], now);
        }

        for peer in ctx.peers.cleanup_timed_out(now) {
            match ctx.mode {
                NetMode::Authority => {
                    log::info!("{} ({}) timed out", peer.username, peer.addr);
                    self.events.push(NetEvent::PeerDisconnected {
                        addr: peer.addr,
                        username: peer.username,
                        timed_out: true,
                    });
                }
                NetMode::Client { .. } => {
                    log::info!("lost connection to host {}", peer.addr);
                    self.end_session(ctx);
                }
            }
        }

        self.reporter.maybe_report(&ctx.stats, self.entities.len(), now);
    }

    fn advance_tick(&mut self, now: f64) -> bool {
        let elapsed = ((now - self.last_tick) * 100.0).round() / 100.0;
        if elapsed >= self.config.server_tick {
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    /// Builds every local entity's delta. Deltas are built each step so
    /// critical changes queue up, but only a boundary decides what is sent.
    fn build_controller_sections(&mut self, tick_boundary: bool, now: f64) -> Vec<Packet> {
        let mut sections = Vec::new();
        for replica in self.entities.iter_mut() {
            if !replica.entity.is_local || !replica.entity.active {
                continue;
            }
            let Replica { entity, controller } = replica;
            let Some(packet) = controller.build_delta_update(entity, tick_boundary, now) else {
                continue;
            };
            if tick_boundary && controller.needs_to_send_update() {
                sections.push(packet);
                self.updated.insert(controller.id());
            }
        }
        sections
    }

    fn flush_outbound(&mut self, ctx: &mut NetContext, controller: Vec<Packet>, now: f64) {
        let mut outbound = std::mem::take(&mut self.pending_spawns);
        outbound.extend(controller);
        outbound.append(&mut self.pending_deletes);
        outbound.append(&mut self.side_packets);

        for (id, requester) in std::mem::take(&mut self.spawn_requests) {
            let Some(replica) = self.entities.get(id) else {
                log::warn!("{requester} requested a spawn for unknown entity {id}");
                continue;
            };
            let spawn = replica.controller.build_spawn_descriptor(&replica.entity);
            log::info!("sending missed spawn of entity {id} to {requester}");
            if ctx.is_authority() {
                ctx.send_to(requester, &[spawn], now);
            } else {
                outbound.push(spawn);
            }
        }

        if ctx.is_authority() && self.reconciler.checksum_due(now) {
            outbound.push(entity_checksum(Reconciler::checksum(&self.entities)));
        }

        if !outbound.is_empty() {
            ctx.broadcast(&outbound, None, now);
        }
    }

    fn receive(&mut self, ctx: &mut NetContext, now: f64) {
        let datagrams = match ctx.transport.receive() {
            Ok(datagrams) => datagrams,
            Err(e) => {
                log::warn!("receive failed: {e}");
                return;
            }
        };

        for (bytes, sender) in datagrams {
            ctx.stats.record_received(bytes.len());
            if !Self::accepts_from(ctx, &bytes, sender) {
                log::debug!("ignoring datagram from unknown sender {sender}");
                continue;
            }
            ctx.peers.touch(&sender, now);

            let relay = self.process_datagram(ctx, &bytes, Some(sender), now);
            if relay && ctx.is_authority() {
                let targets: Vec<SocketAddr> = ctx
                    .peers
                    .addrs()
                    .into_iter()
                    .filter(|addr| *addr != sender)
                    .collect();
                for addr in &targets {
                    ctx.send_datagram(*addr, &bytes, now);
                }
                if !targets.is_empty() {
                    ctx.stats.packets_relayed += 1;
                }
            }
        }
    }

    /// The authority only hears registered peers and registration attempts;
    /// a client only hears its host.
    fn accepts_from(ctx: &NetContext, bytes: &[u8], sender: SocketAddr) -> bool {
        match ctx.mode {
            NetMode::Authority => {
                ctx.peers.contains(&sender) || bytes.first() == Some(&(PacketTag::NewClient as u8))
            }
            NetMode::Client { host } => sender == host,
        }
    }

    /// Decodes and applies one datagram. Returns whether the authority
    /// should relay it.
    fn process_datagram(
        &mut self,
        ctx: &mut NetContext,
        bytes: &[u8],
        sender: Option<SocketAddr>,
        now: f64,
    ) -> bool {
        let entities = &self.entities;
        let decoded = match decode_sections(bytes, |id| entities.kind_of(id), now) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("discarding datagram from {}: {e}", describe(sender));
                ctx.stats.packets_discarded += 1;
                return false;
            }
        };

        let mut relay = decoded.relay;
        for section in decoded.sections {
            if !self.apply_section(ctx, section, sender, now) {
                relay = false;
                break;
            }
        }
        relay
    }

    /// Returns false when the rest of the datagram must be ignored.
    fn apply_section(
        &mut self,
        ctx: &mut NetContext,
        section: Section,
        sender: Option<SocketAddr>,
        now: f64,
    ) -> bool {
        match section {
            Section::Controller(delta) => {
                if let Some(replica) = self.entities.get_mut(delta.id) {
                    let Replica { entity, controller } = replica;
                    controller.apply_delta_update(
                        entity,
                        Some(&delta),
                        now,
                        self.config.render_delay,
                    );
                }
            }
            Section::UnknownController(id) => {
                log::warn!("delta from {} for unknown entity {id}", describe(sender));
                if let Some(sender) = sender {
                    if self.reconciler.may_request(id, now) {
                        log::info!("requesting missing spawn of entity {id} from {sender}");
                        ctx.send_to(sender, &[request_spawn(id)], now);
                        ctx.stats.spawn_requests += 1;
                    }
                }
            }
            Section::Spawn(descriptor) => {
                let (id, kind) = (descriptor.id, descriptor.kind);
                self.reconciler.spawn_arrived(id);
                match ReplicationController::apply_spawn_descriptor(
                    descriptor,
                    &mut self.entities,
                    ctx.is_authority(),
                    now,
                    self.config.snapshot_history,
                ) {
                    Ok(_) => self.events.push(NetEvent::EntitySpawned { id, kind }),
                    Err(e) => {
                        log::warn!("{e}, cancelling spawn");
                        ctx.stats.duplicate_spawns += 1;
                    }
                }
            }
            Section::Delete(descriptor) => {
                if let Some(mut replica) = self.entities.remove(descriptor.id) {
                    replica.controller.teardown();
                    ctx.ids.release(descriptor.id, now);
                    self.events.push(if descriptor.killed {
                        NetEvent::EntityKilled { id: descriptor.id }
                    } else {
                        NetEvent::EntityDeleted { id: descriptor.id }
                    });
                }
            }
            Section::RequestSpawn(id) => {
                if let Some(sender) = sender {
                    self.spawn_requests.push((id, sender));
                }
            }
            Section::Setup(info) => {
                if ctx.is_authority() {
                    return false;
                }
                self.events.push(NetEvent::SetupReceived(info));
            }
            Section::Chat(message) => self.events.push(NetEvent::ChatReceived(message)),
            Section::EndMatch(result) => {
                log::info!("match ended, winner {:?}", result.winner);
                self.events.push(NetEvent::MatchEnded(result));
            }
            Section::NewClient { username } => {
                if let (NetMode::Authority, Some(sender)) = (ctx.mode, sender) {
                    self.register_client(ctx, sender, username, now);
                }
            }
            Section::Disconnect => {
                let Some(sender) = sender else {
                    return true;
                };
                match ctx.mode {
                    NetMode::Authority => {
                        if let Some(peer) = ctx.peers.remove(&sender) {
                            log::info!("{} ({sender}) disconnected", peer.username);
                            self.events.push(NetEvent::PeerDisconnected {
                                addr: sender,
                                username: peer.username,
                                timed_out: false,
                            });
                        }
                    }
                    NetMode::Client { .. } => {
                        log::info!("host {sender} ended the session");
                        self.end_session(ctx);
                        return false;
                    }
                }
            }
            Section::ServerFull => {
                if !ctx.is_authority() {
                    log::info!("server is full");
                    self.events.push(NetEvent::ServerFull);
                }
            }
            Section::ConfirmRegister {
                block_start,
                block_len,
            } => {
                if let (NetMode::Client { host }, Some(sender)) = (ctx.mode, sender) {
                    if sender == host {
                        let Some(block) = IdBlock::try_new(block_start, block_len) else {
                            log::warn!(
                                "ignoring malformed id block {block_start}+{block_len} from {host}"
                            );
                            return false;
                        };
                        ctx.ids.assign(block);
                        if let Some(peer) = ctx.peers.get_mut(&host) {
                            peer.id_block = Some(block);
                            peer.state = PeerState::Ready;
                        }
                        log::info!(
                            "registered with {host}, entity ids {}..{}",
                            block.start,
                            block.start as u16 + block.len as u16
                        );
                        self.events.push(NetEvent::Registered { block });
                    }
                }
            }
            Section::Empty => {}
            Section::ClientReady => {
                if let (NetMode::Authority, Some(sender)) = (ctx.mode, sender) {
                    self.client_became_ready(ctx, sender, now);
                }
            }
            Section::EntityChecksum(count) => {
                if let (NetMode::Client { .. }, Some(sender)) = (ctx.mode, sender) {
                    if count != Reconciler::checksum(&self.entities) {
                        log::info!("entity checksum failed, requesting full entity list");
                        ctx.send_to(sender, &[bare(PacketTag::RequestEntityList)], now);
                        ctx.stats.list_requests += 1;
                    }
                }
            }
            Section::RequestEntityList => {
                if let Some(sender) = sender {
                    log::info!("sending entity list to {sender}");
                    ctx.send_to(sender, &[entity_list(&self.entities.active_ids())], now);
                }
            }
            Section::EntityList(ids) => {
                // The authority's entity set is canonical; only a client
                // reconciles, and only against its host.
                if let (NetMode::Client { host }, Some(sender)) = (ctx.mode, sender) {
                    if sender == host {
                        self.reconcile_with(ctx, sender, &ids, now);
                    }
                }
            }
        }
        true
    }

    fn register_client(
        &mut self,
        ctx: &mut NetContext,
        addr: SocketAddr,
        username: String,
        now: f64,
    ) {
        if let Some(block) = ctx.peers.get(&addr).and_then(|peer| peer.id_block) {
            ctx.send_to(addr, &[confirm_register(block.start, block.len)], now);
            return;
        }

        let registered = ctx.peers.free_block().and_then(|block| {
            let peer = ctx.peers.register(addr, &username, now)?;
            peer.id_block = Some(block);
            Some(block)
        });
        let Some(block) = registered else {
            log::info!("rejecting {username} ({addr}): server full");
            ctx.send_datagram(addr, bare(PacketTag::ServerFull).as_bytes(), now);
            return;
        };

        log::info!(
            "{username} registered from {addr}, entity ids {}..{}",
            block.start,
            block.start as u16 + block.len as u16
        );
        ctx.send_to(addr, &[confirm_register(block.start, block.len)], now);
        self.events.push(NetEvent::PeerConnected { addr, username });
    }

    fn client_became_ready(&mut self, ctx: &mut NetContext, addr: SocketAddr, now: f64) {
        let Some(peer) = ctx.peers.get_mut(&addr) else {
            return;
        };
        peer.state = PeerState::Ready;

        // Teams first; actors reference them by id.
        let mut replicas: Vec<&Replica> =
            self.entities.iter().filter(|r| r.entity.active).collect();
        replicas.sort_by_key(|r| r.kind() != ReplicatedKind::TeamEntity);
        let spawns: Vec<Packet> = replicas
            .iter()
            .map(|r| r.controller.build_spawn_descriptor(&r.entity))
            .collect();

        log::info!("{addr} is ready, sending {} entities", spawns.len());
        ctx.send_to(addr, &spawns, now);
        self.events.push(NetEvent::PeerReady { addr });
    }

    fn reconcile_with(&mut self, ctx: &mut NetContext, sender: SocketAddr, ids: &[u8], now: f64) {
        let diff = self.reconciler.diff(&self.entities, ids, now);

        for id in diff.stale {
            if let Some(mut replica) = self.entities.remove(id) {
                log::info!("deleting stale entity {id}");
                replica.controller.teardown();
                ctx.ids.release(id, now);
                self.events.push(NetEvent::EntityDeleted { id });
            }
        }

        if !diff.request.is_empty() {
            for id in &diff.request {
                log::info!("requesting missing spawn of entity {id} from {sender}");
            }
            let requests: Vec<Packet> = diff.request.iter().map(|id| request_spawn(*id)).collect();
            ctx.send_to(sender, &requests, now);
            ctx.stats.spawn_requests += diff.request.len() as u64;
        }
    }

    fn end_session(&mut self, ctx: &mut NetContext) {
        ctx.peers.clear();
        self.clear_entities();
        self.reporter.reset();
        self.events.push(NetEvent::Disconnected);
    }

    fn clear_entities(&mut self) {
        for id in self.entities.ids() {
            if let Some(mut replica) = self.entities.remove(id) {
                replica.controller.teardown();
            }
        }
        self.pending_spawns.clear();
        self.pending_deletes.clear();
        self.spawn_requests.clear();
        self.reconciler.clear();
    }

    /// Assigns an id from this peer's block, takes ownership of the entity
    /// and queues its spawn descriptor for the next boundary.
    pub fn spawn_entity(
        &mut self,
        ctx: &mut NetContext,
        mut entity: Entity,
        now: f64,
    ) -> Result<u8, NetError> {
        let kind = entity.kind().ok_or(NetError::Unreplicable)?;
        if !entity.profile.matches(kind) {
            return Err(NetError::Unreplicable);
        }
        if ctx.ids.block().is_none() {
            return Err(NetError::NotConnected);
        }
        let entities = &self.entities;
        let id = ctx
            .ids
            .allocate(|id| entities.contains(id), now)
            .ok_or(NetError::IdSpaceExhausted)?;

        entity.id = id;
        entity.is_local = true;
        entity.spawn_time = now;
        let mut controller = ReplicationController::new(id, kind, self.config.snapshot_history);
        controller.activate(&entity, now);
        let spawn = controller.build_spawn_descriptor(&entity);
        // The descriptor already carries the payload.
        let _ = entity.take_payload_change();

        self.entities
            .insert(Replica { entity, controller })
            .map_err(|_| NetError::IdSpaceExhausted)?;
        self.pending_spawns.push(spawn);
        Ok(id)
    }

    /// Queues the delete descriptor, tears the entity down here and holds
    /// its id back for the reuse grace period.
    pub fn delete_entity(
        &mut self,
        ctx: &mut NetContext,
        id: u8,
        killed: bool,
        now: f64,
    ) -> Result<(), NetError> {
        let mut replica = self.entities.remove(id).ok_or(NetError::UnknownEntity(id))?;
        self.pending_deletes
            .push(replica.controller.build_delete_descriptor(killed));
        replica.controller.teardown();
        ctx.ids.release(id, now);
        self.events.push(if killed {
            NetEvent::EntityKilled { id }
        } else {
            NetEvent::EntityDeleted { id }
        });
        Ok(())
    }

    pub fn send_chat(&mut self, username: &str, message: &str) {
        let mut packet = Packet::new();
        ChatMessage {
            username: username.to_string(),
            message: message.to_string(),
        }
        .write(&mut packet);
        self.side_packets.push(packet);
    }

    pub fn send_end_match(&mut self, result: &MatchResult) {
        let mut packet = Packet::new();
        result.write(&mut packet);
        self.side_packets.push(packet);
    }

    pub fn send_setup(
        &mut self,
        ctx: &mut NetContext,
        addr: SocketAddr,
        info: &SetupInfo,
        now: f64,
    ) -> Result<(), NetError> {
        if !ctx.is_authority() {
            return Err(NetError::NotAuthority);
        }
        let mut packet = Packet::new();
        info.write(&mut packet);
        ctx.send_to(addr, &[packet], now);
        Ok(())
    }

    /// Asks the host for registration. Resending is harmless; the host
    /// confirms the same block again.
    pub fn join(&mut self, ctx: &mut NetContext, username: &str, now: f64) -> Result<(), NetError> {
        let host = ctx.host().ok_or(NetError::NotClient)?;
        ctx.username = username.to_string();
        ctx.peers.register(host, "host", now);
        ctx.send_to(host, &[new_client(username)], now);
        Ok(())
    }

    pub fn client_ready(&mut self, ctx: &mut NetContext, now: f64) -> Result<(), NetError> {
        let host = ctx.host().ok_or(NetError::NotClient)?;
        if ctx.ids.block().is_none() {
            return Err(NetError::NotConnected);
        }
        ctx.send_to(host, &[bare(PacketTag::ClientReady)], now);
        Ok(())
    }

    /// Tells every peer we are leaving and drops all session state.
    pub fn disconnect(&mut self, ctx: &mut NetContext, now: f64) {
        ctx.broadcast(&[bare(PacketTag::Disconnect)], None, now);
        ctx.peers.clear();
        self.clear_entities();
        self.side_packets.clear();
        self.reporter.reset();
    }
}
