use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use droidnet::{NetContext, NetEvent, NetManager, SetupInfo, UdpTransport};

use crate::config::PeerConfig;
use crate::events::log_event;
use crate::simulation::Simulation;
use crate::timestep::FixedTimestep;

const JOIN_RETRY: f64 = 1.0;
const MAP_NAME: &str = "testing_ground";
const SCORE_LIMIT: u16 = 50;

/// One running endpoint of a match, host or client, driven on the wall clock.
pub struct Peer {
    manager: NetManager,
    ctx: NetContext,
    config: PeerConfig,
    timestep: FixedTimestep,
    simulation: Simulation,
    start: Instant,
    last_frame: Instant,
    registered: bool,
    last_join_attempt: Option<f64>,
    running: bool,
}

impl Peer {
    pub fn host(config: PeerConfig, bind: &str) -> Result<Self> {
        let transport = bind_transport(&config, bind)?;
        let ctx = NetContext::authority(Box::new(transport), &config.net);
        let mut peer = Self::with_context(config, ctx);

        let bots = peer.config.bots;
        peer.simulation
            .populate(&mut peer.manager, &mut peer.ctx, bots, 0.0)
            .context("populating the match")?;
        log::info!("hosting on {}", peer.ctx.local_addr());
        Ok(peer)
    }

    pub fn join(config: PeerConfig, bind: &str, host: SocketAddr) -> Result<Self> {
        let transport = bind_transport(&config, bind)?;
        let ctx = NetContext::client(Box::new(transport), host, &config.net);
        let peer = Self::with_context(config, ctx);
        log::info!("joining {host} from {}", peer.ctx.local_addr());
        Ok(peer)
    }

    fn with_context(config: PeerConfig, ctx: NetContext) -> Self {
        let now = Instant::now();
        Self {
            manager: NetManager::new(config.net.clone()),
            ctx,
            timestep: FixedTimestep::new(config.tick_rate),
            simulation: Simulation::new(),
            start: now,
            last_frame: now,
            registered: false,
            last_join_attempt: None,
            running: true,
            config,
        }
    }

    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn run(&mut self) -> Result<()> {
        while self.running {
            let frame = Instant::now();
            self.timestep
                .accumulate(frame.duration_since(self.last_frame).as_secs_f64());
            self.last_frame = frame;

            while self.timestep.consume_tick() {
                self.tick()?;
            }

            if let Some(duration) = self.config.duration {
                if self.now() >= duration {
                    log::info!("ran for {duration:.1}s, leaving");
                    self.running = false;
                }
            }
            thread::sleep(Duration::from_millis(1));
        }

        let now = self.now();
        self.manager.disconnect(&mut self.ctx, now);
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        let now = self.now();
        if !self.ctx.is_authority() && !self.registered {
            self.retry_join(now)?;
        }

        let dt = self.timestep.dt();
        self.simulation
            .step(&mut self.manager, &mut self.ctx, dt, now);
        self.manager.update(&mut self.ctx, now);

        let events: Vec<NetEvent> = self.manager.drain_events().collect();
        for event in events {
            log_event(&event);
            self.handle_event(event, now)?;
        }
        Ok(())
    }

    fn retry_join(&mut self, now: f64) -> Result<()> {
        if self
            .last_join_attempt
            .is_some_and(|last| now - last < JOIN_RETRY)
        {
            return Ok(());
        }
        self.last_join_attempt = Some(now);
        let username = self.config.username.clone();
        self.manager.join(&mut self.ctx, &username, now)?;
        Ok(())
    }

    fn handle_event(&mut self, event: NetEvent, now: f64) -> Result<()> {
        match event {
            NetEvent::PeerConnected { addr, .. } => {
                let setup = SetupInfo {
                    team_id: self.simulation.team().unwrap_or_default(),
                    map_name: MAP_NAME.to_string(),
                    score_limit: SCORE_LIMIT,
                    respawn: true,
                    game_type: 0,
                };
                self.manager.send_setup(&mut self.ctx, addr, &setup, now)?;
            }
            NetEvent::Registered { .. } => self.registered = true,
            NetEvent::SetupReceived(setup) => {
                self.manager.client_ready(&mut self.ctx, now)?;
                self.simulation
                    .spawn_player(&mut self.manager, &mut self.ctx, setup.team_id, now)?;
            }
            NetEvent::ServerFull | NetEvent::Disconnected => self.running = false,
            _ => {}
        }
        Ok(())
    }
}

fn bind_transport(config: &PeerConfig, bind: &str) -> Result<UdpTransport> {
    let mut transport =
        UdpTransport::bind(bind).with_context(|| format!("binding {bind}"))?;
    if let Some(loss) = &config.packet_loss {
        transport.set_loss_simulation(loss.clone());
    }
    Ok(transport)
}
