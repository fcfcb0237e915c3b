//! Animator tick telemetry.
//!
//! Tracks how long each transition tick takes against the tick interval,
//! without allocating in the tick loop.

use std::time::Duration;

/// Ring buffer size for tick duration samples.
const TICK_BUFFER_SIZE: usize = 256;

/// Summary of one reporting window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub avg_us: u32,
    pub max_us: u32,
    pub p95_us: u32,
    /// Ticks over budget since the collector was created.
    pub overruns: u64,
    pub samples: usize,
}

pub struct TickTelemetry {
    tick_durations_us: [u32; TICK_BUFFER_SIZE],
    tick_idx: usize,
    sample_count: usize,
    max_tick_us: u32,
    overrun_count: u64,
    budget_us: u32,
}

impl TickTelemetry {
    /// Create a collector that counts ticks longer than `budget` as overruns.
    pub fn new(budget: Duration) -> Self {
        Self {
            tick_durations_us: [0; TICK_BUFFER_SIZE],
            tick_idx: 0,
            sample_count: 0,
            max_tick_us: 0,
            overrun_count: 0,
            budget_us: duration_us(budget),
        }
    }

    #[inline]
    pub fn record(&mut self, duration: Duration) {
        let us = duration_us(duration);

        self.tick_durations_us[self.tick_idx] = us;
        self.tick_idx = (self.tick_idx + 1) % TICK_BUFFER_SIZE;
        if self.sample_count < TICK_BUFFER_SIZE {
            self.sample_count += 1;
        }
        self.max_tick_us = self.max_tick_us.max(us);
        if us > self.budget_us {
            self.overrun_count += 1;
        }
    }

    /// Summarise the buffered samples and start a new max window.
    pub fn take_summary(&mut self) -> TickSummary {
        if self.sample_count == 0 {
            return TickSummary {
                overruns: self.overrun_count,
                ..TickSummary::default()
            };
        }

        let window = &self.tick_durations_us[..self.sample_count];
        let sum: u64 = window.iter().map(|&x| x as u64).sum();
        let avg_us = (sum / self.sample_count as u64) as u32;

        let mut sorted = self.tick_durations_us;
        sorted[..self.sample_count].sort_unstable();
        let p95_idx = (self.sample_count * 95 / 100).max(1) - 1;
        let p95_us = sorted[p95_idx.min(self.sample_count - 1)];

        let summary = TickSummary {
            avg_us,
            max_us: self.max_tick_us,
            p95_us,
            overruns: self.overrun_count,
            samples: self.sample_count,
        };
        self.max_tick_us = 0;
        summary
    }
}

fn duration_us(d: Duration) -> u32 {
    d.as_micros().min(u32::MAX as u128) as u32
}
