//! Tempo map: converts ticks to playback time and back.

use std::time::Duration;

use crate::events::Tick;

pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TempoChange {
    tick: Tick,
    micros_per_quarter: u32,
    /// Playback time at which this tempo takes effect.
    time: Duration,
}

/// Piecewise-constant tempo over ticks. Always holds a tempo at tick 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempoMap {
    ticks_per_quarter: u16,
    changes: Vec<TempoChange>,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::new(480)
    }
}

impl TempoMap {
    /// 120 BPM until told otherwise.
    pub fn new(ticks_per_quarter: u16) -> Self {
        Self {
            ticks_per_quarter: ticks_per_quarter.max(1),
            changes: vec![TempoChange {
                tick: 0,
                micros_per_quarter: DEFAULT_MICROS_PER_QUARTER,
                time: Duration::ZERO,
            }],
        }
    }

    pub fn with_tempo(mut self, tick: Tick, micros_per_quarter: u32) -> Self {
        self.set_tempo(tick, micros_per_quarter);
        self
    }

    pub fn with_bpm(self, tick: Tick, bpm: f64) -> Self {
        let bpm = if bpm.is_finite() && bpm > 0.0 { bpm } else { 120.0 };
        self.with_tempo(tick, (60_000_000.0 / bpm).round() as u32)
    }

    /// Adds a tempo change. A later change at the same tick replaces the earlier one.
    pub fn set_tempo(&mut self, tick: Tick, micros_per_quarter: u32) {
        let change = TempoChange {
            tick,
            micros_per_quarter: micros_per_quarter.max(1),
            time: Duration::ZERO,
        };
        match self.changes.binary_search_by_key(&tick, |c| c.tick) {
            Ok(i) => self.changes[i] = change,
            Err(i) => self.changes.insert(i, change),
        }
        self.recompute_times();
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.ticks_per_quarter
    }

    pub fn tick_to_time(&self, tick: Tick) -> Duration {
        let change = self.change_at_tick(tick);
        change.time + self.span(tick - change.tick, change.micros_per_quarter)
    }

    /// Greatest tick whose time is not after `time`.
    pub fn time_to_tick(&self, time: Duration) -> Tick {
        let i = self.changes.partition_point(|c| c.time <= time).saturating_sub(1);
        let change = &self.changes[i];
        let elapsed = (time - change.time).as_nanos();
        let ticks = elapsed * self.ticks_per_quarter as u128
            / (change.micros_per_quarter as u128 * 1_000);
        let tick = change.tick + ticks as Tick;
        // Spans are truncated to whole nanoseconds, so the floor can land one short.
        if self.tick_to_time(tick + 1) <= time {
            tick + 1
        } else {
            tick
        }
    }

    /// Microseconds per quarter note in effect at `time`.
    pub fn tempo_at(&self, time: Duration) -> u32 {
        let i = self.changes.partition_point(|c| c.time <= time).saturating_sub(1);
        self.changes[i].micros_per_quarter
    }

    pub fn bpm_at(&self, time: Duration) -> f64 {
        60_000_000.0 / self.tempo_at(time) as f64
    }

    fn change_at_tick(&self, tick: Tick) -> &TempoChange {
        let i = self.changes.partition_point(|c| c.tick <= tick).saturating_sub(1);
        &self.changes[i]
    }

    fn span(&self, ticks: Tick, micros_per_quarter: u32) -> Duration {
        let nanos = ticks as u128 * micros_per_quarter as u128 * 1_000
            / self.ticks_per_quarter as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    fn recompute_times(&mut self) {
        if self.changes[0].tick != 0 {
            self.changes.insert(
                0,
                TempoChange {
                    tick: 0,
                    micros_per_quarter: DEFAULT_MICROS_PER_QUARTER,
                    time: Duration::ZERO,
                },
            );
        }
        for i in 1..self.changes.len() {
            let prev = self.changes[i - 1];
            let ticks = self.changes[i].tick - prev.tick;
            let time = prev.time + self.span(ticks, prev.micros_per_quarter);
            self.changes[i].time = time;
        }
    }
}
