/// Fixed-rate stepping against a wall clock. Frame time is accumulated and
/// consumed in whole steps; long stalls are clamped so a paused process
/// does not spiral trying to catch up.
pub struct FixedTimestep {
    tick_rate: u32,
    dt: f64,
    accumulator: f64,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f64,
            accumulator: 0.0,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn accumulate(&mut self, delta: f64) {
        self.accumulator += delta.min(0.25);
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}
