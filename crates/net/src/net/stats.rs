#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Datagrams thrown away because they failed to decode.
    pub packets_discarded: u64,
    pub packets_relayed: u64,
    pub send_errors: u64,
    pub spawn_requests: u64,
    pub list_requests: u64,
    pub duplicate_spawns: u64,
}

impl NetworkStats {
    pub fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.packets_received += 1;
        self.bytes_received += bytes as u64;
    }
}

/// Emits a traffic summary at a fixed interval on the game clock.
#[derive(Debug, Clone)]
pub struct StatsReporter {
    interval: f64,
    last_report: Option<f64>,
    last: NetworkStats,
}

impl StatsReporter {
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            last_report: None,
            last: NetworkStats::default(),
        }
    }

    /// Forgets the previous sample, for when the counters start over with a
    /// new session.
    pub fn reset(&mut self) {
        self.last_report = None;
        self.last = NetworkStats::default();
    }

    pub fn maybe_report(&mut self, stats: &NetworkStats, entities: usize, now: f64) -> bool {
        let Some(last_report) = self.last_report else {
            self.last_report = Some(now);
            return false;
        };
        let elapsed = now - last_report;
        if elapsed < self.interval || elapsed <= 0.0 {
            return false;
        }

        let sent = stats.bytes_sent.saturating_sub(self.last.bytes_sent);
        let received = stats.bytes_received.saturating_sub(self.last.bytes_received);
        log::debug!(
            "{} entities | up {:.1} KiB/s ({} pkts) | down {:.1} KiB/s ({} pkts) | {} discarded, {} relayed",
            entities,
            sent as f64 / 1024.0 / elapsed,
            stats.packets_sent.saturating_sub(self.last.packets_sent),
            received as f64 / 1024.0 / elapsed,
            stats.packets_received.saturating_sub(self.last.packets_received),
            stats.packets_discarded,
            stats.packets_relayed,
        );

        self.last = stats.clone();
        self.last_report = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_once_per_interval() {
        let mut reporter = StatsReporter::new(10.0);
        let mut stats = NetworkStats::default();

        assert!(!reporter.maybe_report(&stats, 0, 0.0));
        stats.record_sent(100);
        assert!(!reporter.maybe_report(&stats, 1, 5.0));
        assert!(reporter.maybe_report(&stats, 1, 10.0));
        assert!(!reporter.maybe_report(&stats, 1, 12.0));
        assert_eq!(stats.bytes_sent, 100);
        assert_eq!(stats.packets_sent, 1);
    }

    #[test]
    fn counters_starting_over_do_not_underflow() {
        let mut reporter = StatsReporter::new(1.0);
        let mut stats = NetworkStats::default();
        for _ in 0..5 {
            stats.record_sent(200);
            stats.record_received(50);
        }
        reporter.maybe_report(&stats, 0, 0.0);
        assert!(reporter.maybe_report(&stats, 0, 1.0));

        let fresh = NetworkStats::default();
        assert!(reporter.maybe_report(&fresh, 0, 2.0));

        reporter.reset();
        assert!(!reporter.maybe_report(&fresh, 0, 3.0));
        assert!(reporter.maybe_report(&fresh, 0, 4.0));
    }
}
