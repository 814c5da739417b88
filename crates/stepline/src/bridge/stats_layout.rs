use bytemuck::{Pod, Zeroable};

use crate::systems::stats::StatsSnapshot;

/// Per-frame statistics laid out for JavaScript to read straight out of
/// linear memory as a `Float32Array` of 16 floats (64 bytes).
///
/// Must match the reader's field order. Never reorder; append and bump
/// `PROTOCOL_VERSION` instead.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct StatsFrame {
    pub fps: f32,
    pub target_fps: f32,
    pub average_delta: f32,
    pub jitter: f32,
    pub min_delta: f32,
    pub max_delta: f32,
    pub updates_per_frame: f32,
    pub frame_time: f32,
    pub render_time: f32,
    pub physics_time: f32,
    /// Accumulator in milliseconds.
    pub accumulator: f32,
    pub alpha: f32,
    pub timestep: f32,
    /// 0 = fixed, 1 = adaptive, 2 = unlimited.
    pub mode: f32,
    /// 1.0 while running.
    pub running: f32,
    pub time_scale: f32,
}

impl StatsFrame {
    pub const FLOATS: usize = 16;
    pub const STRIDE_BYTES: usize = Self::FLOATS * 4;

    pub fn from_snapshot(stats: &StatsSnapshot, time_scale: f64) -> Self {
        Self {
            fps: stats.fps as f32,
            target_fps: stats.target_fps as f32,
            average_delta: stats.average_delta as f32,
            jitter: stats.jitter as f32,
            min_delta: stats.min_delta as f32,
            max_delta: stats.max_delta as f32,
            updates_per_frame: stats.updates_per_frame as f32,
            frame_time: stats.frame_time as f32,
            render_time: stats.render_time as f32,
            physics_time: stats.physics_time as f32,
            accumulator: stats.accumulator as f32,
            alpha: stats.alpha as f32,
            timestep: stats.timestep as f32,
            mode: stats.mode.index() as f32,
            running: if stats.running { 1.0 } else { 0.0 },
            time_scale: time_scale as f32,
        }
    }

    pub fn as_floats(&self) -> &[f32; Self::FLOATS] {
        bytemuck::cast_ref(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::config::Mode;

    #[test]
    fn frame_is_sixteen_floats() {
        assert_eq!(std::mem::size_of::<StatsFrame>(), StatsFrame::STRIDE_BYTES);
        assert_eq!(StatsFrame::STRIDE_BYTES, 64);
    }

    #[test]
    fn floats_follow_field_order() {
        let snapshot = StatsSnapshot {
            fps: 59.5,
            target_fps: 60.0,
            frame_count: 10,
            sample_count: 10,
            average_delta: 16.5,
            jitter: 0.25,
            min_delta: 16.0,
            max_delta: 17.0,
            updates_per_frame: 1,
            frame_time: 2.0,
            render_time: 1.0,
            physics_time: 9.0,
            accumulator: 4.0,
            alpha: 0.25,
            running: true,
            timestep: 16.0,
            mode: Mode::Unlimited,
        };
        let frame = StatsFrame::from_snapshot(&snapshot, 0.5);
        let floats = frame.as_floats();
        assert_eq!(floats[0], 59.5);
        assert_eq!(floats[11], 0.25);
        assert_eq!(floats[13], 2.0);
        assert_eq!(floats[14], 1.0);
        assert_eq!(floats[15], 0.5);
    }
}
