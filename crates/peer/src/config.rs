use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use droidnet::{NetConfig, PacketLossSimulation};

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub tick_rate: u32,
    pub username: String,
    pub bots: usize,
    /// Stop after this many seconds; run until the session ends otherwise.
    pub duration: Option<f64>,
    pub packet_loss: Option<PacketLossSimulation>,
    pub net: NetConfig,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            username: String::from("droid"),
            bots: 4,
            duration: None,
            packet_loss: None,
            net: NetConfig::default(),
        }
    }
}

/// Reads protocol settings from a JSON file. Missing keys keep their defaults.
pub fn load_net_config(path: &Path) -> Result<NetConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_net_config(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn parse_net_config(text: &str) -> Result<NetConfig> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = parse_net_config(r#"{ "server_tick": 0.1, "max_clients": 2 }"#).unwrap();
        assert_eq!(config.server_tick, 0.1);
        assert_eq!(config.max_clients, 2);
        assert_eq!(config.render_delay, NetConfig::default().render_delay);
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(parse_net_config("{ server_tick: }").is_err());
    }
}
