mod config;
mod events;
mod peer;
mod simulation;
mod timestep;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use config::{PeerConfig, load_net_config};
use droidnet::PacketLossSimulation;
use peer::Peer;

#[derive(Parser)]
#[command(name = "droidnet-peer")]
#[command(about = "Headless droidnet host or client")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Listening port when hosting; clients bind an ephemeral port unless set.
    #[arg(short, long)]
    port: Option<u16>,

    /// Join the host at this address instead of hosting.
    #[arg(short, long)]
    connect: Option<SocketAddr>,

    #[arg(short, long, default_value = "droid")]
    name: String,

    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,

    #[arg(long, default_value_t = 4, help = "Bots spawned when hosting")]
    bots: usize,

    #[arg(long, help = "Leave after this many seconds")]
    duration: Option<f64>,

    #[arg(long, default_value_t = 0.0, help = "Outgoing packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, help = "JSON file with protocol settings")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let net = match &args.config {
        Some(path) => load_net_config(path)?,
        None => Default::default(),
    };
    let config = PeerConfig {
        tick_rate: args.tick_rate,
        username: args.name,
        bots: args.bots,
        duration: args.duration,
        packet_loss: (args.loss_percent > 0.0)
            .then(|| PacketLossSimulation::with_loss(args.loss_percent)),
        net,
    };

    let mut peer = match args.connect {
        Some(host) => {
            let bind = format!("{}:{}", args.bind, args.port.unwrap_or(0));
            Peer::join(config, &bind, host)?
        }
        None => {
            let bind = format!("{}:{}", args.bind, args.port.unwrap_or(droidnet::DEFAULT_PORT));
            Peer::host(config, &bind)?
        }
    };

    peer.run()?;
    log::info!("shut down");
    Ok(())
}
