use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use glam::Vec3;

use droidnet::{Entity, NetConfig, NetContext, NetEvent, NetManager, UdpTransport};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(41000);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(10, Ordering::SeqCst)
}

struct Peer {
    manager: NetManager,
    ctx: NetContext,
    events: Vec<NetEvent>,
}

impl Peer {
    fn update(&mut self, now: f64) {
        self.manager.update(&mut self.ctx, now);
        self.events.extend(self.manager.drain_events());
    }
}

/// Steps both peers on the wall clock until `done` holds or `timeout_ms` passes.
fn run_until(
    host: &mut Peer,
    client: &mut Peer,
    start: Instant,
    timeout_ms: u64,
    done: impl Fn(&Peer, &Peer) -> bool,
) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        let now = start.elapsed().as_secs_f64();
        host.update(now);
        client.update(now);
        if done(host, client) {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn test_udp_join_and_replicate() {
    let port = next_port();
    let host_addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
    let client_addr: SocketAddr = format!("127.0.0.1:{}", port + 1).parse().unwrap();
    let config = NetConfig::default();
    let start = Instant::now();

    let mut host = Peer {
        manager: NetManager::new(config.clone()),
        ctx: NetContext::authority(Box::new(UdpTransport::bind(host_addr).unwrap()), &config),
        events: Vec::new(),
    };
    let mut client = Peer {
        manager: NetManager::new(config.clone()),
        ctx: NetContext::client(
            Box::new(UdpTransport::bind(client_addr).unwrap()),
            host_addr,
            &config,
        ),
        events: Vec::new(),
    };

    let bot = host
        .manager
        .spawn_entity(&mut host.ctx, Entity::bot(Vec3::new(1.0, 2.0, 3.0), 0, 1), 0.0)
        .unwrap();

    client
        .manager
        .join(&mut client.ctx, "udp", start.elapsed().as_secs_f64())
        .unwrap();
    let registered = run_until(&mut host, &mut client, start, 1000, |_, c| {
        c.events
            .iter()
            .any(|e| matches!(e, NetEvent::Registered { .. }))
    });
    assert!(registered, "client never registered");

    client
        .manager
        .client_ready(&mut client.ctx, start.elapsed().as_secs_f64())
        .unwrap();
    let synced = run_until(&mut host, &mut client, start, 1000, |_, c| {
        c.manager.entity(bot).is_some()
    });
    assert!(synced, "bot never arrived");

    host.manager.entity_mut(bot).unwrap().transform.position.x = 25.0;
    let moved = run_until(&mut host, &mut client, start, 2000, |_, c| {
        c.manager
            .entity(bot)
            .is_some_and(|e| (e.transform.position.x - 25.0).abs() < 1e-3)
    });
    assert!(moved, "motion never replicated");

    assert!(client.ctx.stats().packets_received > 0);
    assert_eq!(client.ctx.stats().packets_discarded, 0);
}

#[test]
fn test_udp_client_ignores_strangers() {
    let port = next_port();
    let host_addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
    let client_addr: SocketAddr = format!("127.0.0.1:{}", port + 1).parse().unwrap();
    let stranger_addr: SocketAddr = format!("127.0.0.1:{}", port + 2).parse().unwrap();
    let config = NetConfig::default();

    let mut client = Peer {
        manager: NetManager::new(config.clone()),
        ctx: NetContext::client(
            Box::new(UdpTransport::bind(client_addr).unwrap()),
            host_addr,
            &config,
        ),
        events: Vec::new(),
    };

    let stranger = std::net::UdpSocket::bind(stranger_addr).unwrap();
    // CONFIRMREGISTER for block 128..144
    stranger.send_to(&[10, 128, 16], client_addr).unwrap();
    thread::sleep(Duration::from_millis(20));

    client.update(0.1);
    assert!(client.events.is_empty());
    assert_eq!(client.ctx.ids.block(), None);
}
