use serde::Deserialize;

use crate::net::SERVER_TICK;
use crate::snapshot::DEFAULT_HISTORY;

/// Protocol timing and sizing. All durations are seconds on the game clock.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub server_tick: f64,
    pub render_delay: f64,
    pub snapshot_history: usize,
    pub checksum_interval: f64,
    pub spawn_request_retry: f64,
    pub stale_entity_grace: f64,
    pub keepalive_interval: f64,
    pub peer_timeout: f64,
    pub id_reuse_grace: f64,
    pub max_clients: usize,
    pub stats_interval: f64,
    pub max_pending_events: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            server_tick: SERVER_TICK,
            render_delay: 0.1,
            snapshot_history: DEFAULT_HISTORY,
            checksum_interval: 5.0,
            spawn_request_retry: 2.0,
            stale_entity_grace: 5.0,
            keepalive_interval: 0.5,
            peer_timeout: 10.0,
            id_reuse_grace: 5.0,
            max_clients: 8,
            stats_interval: 10.0,
            max_pending_events: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = NetConfig::default();
        assert_eq!(config.server_tick, 0.05);
        assert_eq!(config.snapshot_history, 6);
        assert_eq!(config.max_clients, 8);
    }
}
