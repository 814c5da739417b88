//! Rolling frame statistics.
//!
//! Nothing here can fail: every derived number that would come out NaN or
//! infinite keeps its previous value instead.

use std::time::Duration;

use serde::Serialize;

use crate::api::config::Mode;
use crate::core::time::as_ms;

/// Deltas kept in the ring.
pub const HISTORY_CAPACITY: usize = 240;
/// Average and jitter stay at their previous value until this many samples exist.
pub const MIN_SAMPLES: usize = 60;
/// FPS is recomputed once per window, not every frame.
pub const FPS_WINDOW: Duration = Duration::from_millis(500);

/// Fixed-capacity ring of frame deltas in milliseconds.
#[derive(Debug, Clone)]
pub struct StatsRing {
    samples: Box<[f64; HISTORY_CAPACITY]>,
    head: usize,
    len: usize,
}

impl StatsRing {
    pub fn new() -> Self {
        Self {
            samples: Box::new([0.0; HISTORY_CAPACITY]),
            head: 0,
            len: 0,
        }
    }

    /// Write a sample, overwriting the oldest one when full.
    pub fn push(&mut self, value: f64) {
        self.samples[self.head] = value;
        self.head = (self.head + 1) % HISTORY_CAPACITY;
        if self.len < HISTORY_CAPACITY {
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let start = (self.head + HISTORY_CAPACITY - self.len) % HISTORY_CAPACITY;
        (0..self.len).map(move |i| self.samples[(start + i) % HISTORY_CAPACITY])
    }

    pub fn mean(&self) -> Option<f64> {
        if self.len == 0 {
            return None;
        }
        Some(self.iter().sum::<f64>() / self.len as f64)
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> Option<f64> {
        let mean = self.mean()?;
        let variance = self.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.len as f64;
        Some(variance.sqrt())
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

impl Default for StatsRing {
    fn default() -> Self {
        Self::new()
    }
}

fn finite_or(value: f64, previous: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        previous
    }
}

/// Live statistics owned by the scheduler.
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    ring: StatsRing,
    fps: f64,
    average_delta: f64,
    jitter: f64,
    min_delta: Option<f64>,
    max_delta: Option<f64>,
    window_frames: u32,
    window_start: Option<Duration>,
    total_frames: u64,
    pub updates_per_frame: u32,
    pub frame_time: f64,
    pub render_time: f64,
    pub physics_time: f64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one corrected frame delta observed at `now`.
    pub fn record_delta(&mut self, delta_ms: f64, now: Duration) {
        self.total_frames += 1;

        if delta_ms.is_finite() {
            self.ring.push(delta_ms);
            self.min_delta = Some(self.min_delta.map_or(delta_ms, |m| m.min(delta_ms)));
            self.max_delta = Some(self.max_delta.map_or(delta_ms, |m| m.max(delta_ms)));
        }

        if self.ring.len() >= MIN_SAMPLES {
            if let (Some(mean), Some(sd)) = (self.ring.mean(), self.ring.std_dev()) {
                self.average_delta = finite_or(mean, self.average_delta);
                self.jitter = finite_or(sd, self.jitter);
            }
        }

        self.window_frames += 1;
        let start = *self.window_start.get_or_insert(now);
        let elapsed = now.saturating_sub(start);
        if elapsed >= FPS_WINDOW {
            let fps = f64::from(self.window_frames) / elapsed.as_secs_f64();
            self.fps = finite_or(fps, self.fps);
            self.window_frames = 0;
            self.window_start = Some(now);
        }
    }

    /// Record per-frame phase timings.
    pub fn record_timings(&mut self, physics: Duration, render: Duration, frame: Duration) {
        self.physics_time = finite_or(as_ms(physics), self.physics_time);
        self.render_time = finite_or(as_ms(render), self.render_time);
        self.frame_time = finite_or(as_ms(frame), self.frame_time);
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn average_delta(&self) -> f64 {
        self.average_delta
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    pub fn min_delta(&self) -> f64 {
        self.min_delta.unwrap_or(0.0)
    }

    pub fn max_delta(&self) -> f64 {
        self.max_delta.unwrap_or(0.0)
    }

    pub fn sample_count(&self) -> usize {
        self.ring.len()
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Owned copy of the statistics, safe to hand to another thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub fps: f64,
    pub target_fps: f64,
    pub frame_count: u64,
    pub sample_count: usize,
    pub average_delta: f64,
    pub jitter: f64,
    pub min_delta: f64,
    pub max_delta: f64,
    pub updates_per_frame: u32,
    pub frame_time: f64,
    pub render_time: f64,
    pub physics_time: f64,
    pub accumulator: f64,
    pub alpha: f64,
    pub running: bool,
    pub timestep: f64,
    pub mode: Mode,
}

/// Snapshot plus load figures relative to the frame budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedStats {
    #[serde(flatten)]
    pub stats: StatsSnapshot,
    /// Target frame time in milliseconds.
    pub frame_budget_ms: f64,
    /// Update drain time as a percentage of the frame budget.
    pub physics_load: f64,
    /// Render time as a percentage of the frame budget.
    pub render_load: f64,
    /// Whole-frame time as a percentage of the frame budget.
    pub efficiency: f64,
    pub time_scale: f64,
}

impl DetailedStats {
    pub fn new(stats: StatsSnapshot, frame_budget_ms: f64, time_scale: f64) -> Self {
        let percent = |v: f64| finite_or(v / frame_budget_ms * 100.0, 0.0);
        Self {
            physics_load: percent(stats.physics_time),
            render_load: percent(stats.render_time),
            efficiency: percent(stats.frame_time),
            stats,
            frame_budget_ms,
            time_scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn ring_overwrites_oldest() {
        let mut ring = StatsRing::new();
        for i in 0..(HISTORY_CAPACITY + 10) {
            ring.push(i as f64);
        }
        assert_eq!(ring.len(), HISTORY_CAPACITY);
        assert_eq!(ring.iter().next(), Some(10.0));
        assert_eq!(ring.iter().last(), Some((HISTORY_CAPACITY + 9) as f64));
    }

    #[test]
    fn std_dev_is_population() {
        let mut ring = StatsRing::new();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            ring.push(v);
        }
        assert_eq!(ring.mean(), Some(5.0));
        assert_eq!(ring.std_dev(), Some(2.0));
    }

    #[test]
    fn average_waits_for_min_samples() {
        let mut stats = FrameStats::new();
        for i in 0..(MIN_SAMPLES - 1) {
            stats.record_delta(16.0, ms(16 * i as u64));
        }
        assert_eq!(stats.average_delta(), 0.0);
        stats.record_delta(16.0, ms(16 * MIN_SAMPLES as u64));
        assert_eq!(stats.average_delta(), 16.0);
        assert_eq!(stats.jitter(), 0.0);
    }

    #[test]
    fn fps_updates_once_per_window() {
        let mut stats = FrameStats::new();
        // 10ms frames starting at t=0
        for i in 0..=50 {
            stats.record_delta(10.0, ms(10 * i));
        }
        // first window closes at t=500ms after 51 frames
        assert!((stats.fps() - 102.0).abs() < 1e-9, "fps {}", stats.fps());
        let before = stats.fps();
        stats.record_delta(10.0, ms(510));
        assert_eq!(stats.fps(), before);
    }

    #[test]
    fn non_finite_samples_keep_previous_values() {
        let mut stats = FrameStats::new();
        for i in 0..MIN_SAMPLES {
            stats.record_delta(20.0, ms(i as u64));
        }
        stats.record_delta(f64::NAN, ms(100));
        stats.record_delta(f64::INFINITY, ms(101));
        assert_eq!(stats.average_delta(), 20.0);
        assert_eq!(stats.max_delta(), 20.0);
        assert_eq!(stats.sample_count(), MIN_SAMPLES);
    }

    #[test]
    fn min_max_track_every_sample() {
        let mut stats = FrameStats::new();
        assert_eq!(stats.min_delta(), 0.0);
        stats.record_delta(12.0, ms(0));
        stats.record_delta(30.0, ms(12));
        stats.record_delta(8.0, ms(42));
        assert_eq!(stats.min_delta(), 8.0);
        assert_eq!(stats.max_delta(), 30.0);
    }

    #[test]
    fn detailed_loads_are_percentages_of_budget() {
        let snapshot = StatsSnapshot {
            fps: 60.0,
            target_fps: 60.0,
            frame_count: 1,
            sample_count: 1,
            average_delta: 0.0,
            jitter: 0.0,
            min_delta: 0.0,
            max_delta: 0.0,
            updates_per_frame: 1,
            frame_time: 10.0,
            render_time: 5.0,
            physics_time: 2.5,
            accumulator: 0.0,
            alpha: 0.0,
            running: true,
            timestep: 10.0,
            mode: Mode::Fixed,
        };
        let detailed = DetailedStats::new(snapshot, 20.0, 1.0);
        assert_eq!(detailed.physics_load, 12.5);
        assert_eq!(detailed.render_load, 25.0);
        assert_eq!(detailed.efficiency, 50.0);
    }

    #[test]
    fn zero_budget_does_not_produce_nan() {
        let snapshot = StatsSnapshot {
            fps: 0.0,
            target_fps: 0.0,
            frame_count: 0,
            sample_count: 0,
            average_delta: 0.0,
            jitter: 0.0,
            min_delta: 0.0,
            max_delta: 0.0,
            updates_per_frame: 0,
            frame_time: 3.0,
            render_time: 0.0,
            physics_time: 0.0,
            accumulator: 0.0,
            alpha: 0.0,
            running: false,
            timestep: 0.0,
            mode: Mode::Adaptive,
        };
        let detailed = DetailedStats::new(snapshot, 0.0, 1.0);
        assert_eq!(detailed.efficiency, 0.0);
        assert_eq!(detailed.render_load, 0.0);
    }
}
