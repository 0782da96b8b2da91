//! Per-chunk build time bookkeeping

use std::time::Duration;

/// Min/max/average wall time of chunk builds
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BuildTimings {
    min: Option<Duration>,
    max: Duration,
    total: Duration,
    count: u32,
}

impl BuildTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, elapsed: Duration) {
        self.min = Some(self.min.map_or(elapsed, |m| m.min(elapsed)));
        self.max = self.max.max(elapsed);
        self.total += elapsed;
        self.count += 1;
    }

    pub fn min(&self) -> Duration {
        self.min.unwrap_or_default()
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn average(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.total / self.count
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn log(&self) {
        log::info!(
            "Chunk build time: min {:.2}ms, max {:.2}ms, avg {:.2}ms over {} chunks ({:.1}ms total)",
            self.min().as_secs_f64() * 1000.0,
            self.max.as_secs_f64() * 1000.0,
            self.average().as_secs_f64() * 1000.0,
            self.count,
            self.total.as_secs_f64() * 1000.0
        );
    }
}
