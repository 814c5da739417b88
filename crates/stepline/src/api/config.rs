use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::api::error::UnknownMode;

pub const DEFAULT_TIMESTEP_MS: f64 = 1000.0 / 60.0;
pub const DEFAULT_MAX_UPDATES: u32 = 10;
pub const DEFAULT_TARGET_FPS: f64 = 60.0;
pub const MIN_TIMESTEP_MS: f64 = 0.1;
pub const MAX_TIMESTEP_MS: f64 = 1000.0;
pub const MIN_TARGET_FPS: f64 = 1.0;
pub const MAX_TARGET_FPS: f64 = 1000.0;
pub const MIN_TIME_SCALE: f64 = 0.1;
pub const MAX_TIME_SCALE: f64 = 5.0;

/// Frame pacing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Clamp frame deltas to the target frame time and pace re-arming to it.
    Fixed,
    /// Smooth sustained slow frames with a moving average.
    #[default]
    Adaptive,
    /// Pass deltas through and run as fast as the host delivers frames.
    Unlimited,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Fixed => "fixed",
            Mode::Adaptive => "adaptive",
            Mode::Unlimited => "unlimited",
        }
    }

    /// Stable numeric id used in the shared stats layout.
    pub fn index(self) -> u32 {
        match self {
            Mode::Fixed => 0,
            Mode::Adaptive => 1,
            Mode::Unlimited => 2,
        }
    }

    /// Whether render callbacks get an interpolation factor.
    pub fn interpolates(self) -> bool {
        !matches!(self, Mode::Fixed)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Mode::Fixed),
            "adaptive" => Ok(Mode::Adaptive),
            "unlimited" => Ok(Mode::Unlimited),
            _ => Err(UnknownMode(s.to_string())),
        }
    }
}

/// Scheduler configuration. Every field has a default, so a partial JSON
/// document is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Simulated time advanced by one update, in milliseconds (default: 1000/60).
    pub timestep_ms: f64,
    /// Maximum updates run in one frame while catching up (default: 10).
    pub max_updates: u32,
    /// Upper bound for the interpolation factor (default: 1.0).
    pub alpha_clamp: f64,
    /// Pacing policy (default: adaptive).
    pub mode: Mode,
    /// Target frame rate; the minimum frame time is `1000 / target_fps` (default: 60).
    pub target_fps: f64,
    /// Run the update drain on a background worker when one is installed.
    pub use_worker_offload: bool,
    /// Maintain the rolling frame statistics (default: true).
    pub collect_stats: bool,
    /// Drive frames from the host's display callback. Hosts without one, or
    /// with this off, pace frames with timers (default: true).
    pub use_raf: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timestep_ms: DEFAULT_TIMESTEP_MS,
            max_updates: DEFAULT_MAX_UPDATES,
            alpha_clamp: 1.0,
            mode: Mode::default(),
            target_fps: DEFAULT_TARGET_FPS,
            use_worker_offload: false,
            collect_stats: true,
            use_raf: true,
        }
    }
}

impl SchedulerConfig {
    /// Parse a (possibly partial) config from JSON. The result is not yet
    /// sanitized; the scheduler does that on construction.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timestep_ms(mut self, ms: f64) -> Self {
        self.timestep_ms = ms;
        self
    }

    pub fn with_target_fps(mut self, fps: f64) -> Self {
        self.target_fps = fps;
        self
    }

    pub fn with_max_updates(mut self, max_updates: u32) -> Self {
        self.max_updates = max_updates;
        self
    }

    pub fn with_collect_stats(mut self, enabled: bool) -> Self {
        self.collect_stats = enabled;
        self
    }

    pub fn with_worker_offload(mut self, enabled: bool) -> Self {
        self.use_worker_offload = enabled;
        self
    }

    /// Clamp every field into its valid range, logging a warning for each
    /// field that had to change. Returns the names of the clamped fields.
    pub fn sanitize(&mut self) -> Vec<&'static str> {
        let mut clamped = Vec::new();

        let timestep = sanitize_timestep(self.timestep_ms);
        if timestep != self.timestep_ms {
            clamped.push("timestep_ms");
            self.timestep_ms = timestep;
        }

        let fps = sanitize_target_fps(self.target_fps);
        if fps != self.target_fps {
            clamped.push("target_fps");
            self.target_fps = fps;
        }

        if self.max_updates == 0 {
            warn!("max_updates must be at least 1, using 1");
            clamped.push("max_updates");
            self.max_updates = 1;
        }

        let alpha_clamp = if self.alpha_clamp.is_nan() {
            1.0
        } else {
            self.alpha_clamp.clamp(0.0, 1.0)
        };
        if alpha_clamp != self.alpha_clamp {
            warn!("alpha_clamp {} out of [0, 1], using {}", self.alpha_clamp, alpha_clamp);
            clamped.push("alpha_clamp");
            self.alpha_clamp = alpha_clamp;
        }

        clamped
    }
}

/// Clamp a timestep into `[MIN_TIMESTEP_MS, MAX_TIMESTEP_MS]`.
pub fn sanitize_timestep(ms: f64) -> f64 {
    if !ms.is_finite() {
        warn!("timestep {ms}ms is not finite, using {DEFAULT_TIMESTEP_MS:.3}ms");
        DEFAULT_TIMESTEP_MS
    } else if ms < MIN_TIMESTEP_MS {
        warn!("timestep {ms}ms too small, using {MIN_TIMESTEP_MS}ms");
        MIN_TIMESTEP_MS
    } else if ms > MAX_TIMESTEP_MS {
        warn!("timestep {ms}ms too large, using {MAX_TIMESTEP_MS}ms");
        MAX_TIMESTEP_MS
    } else {
        ms
    }
}

/// Clamp a target frame rate into `[MIN_TARGET_FPS, MAX_TARGET_FPS]`, so the
/// minimum frame time is never zero.
pub fn sanitize_target_fps(fps: f64) -> f64 {
    if !fps.is_finite() {
        warn!("target fps {fps} is not finite, using {DEFAULT_TARGET_FPS}");
        DEFAULT_TARGET_FPS
    } else if fps < MIN_TARGET_FPS {
        warn!("target fps {fps} too low, using {MIN_TARGET_FPS}");
        MIN_TARGET_FPS
    } else if fps > MAX_TARGET_FPS {
        warn!("target fps {fps} too high, using {MAX_TARGET_FPS}");
        MAX_TARGET_FPS
    } else {
        fps
    }
}

/// Clamp a time scale into `[MIN_TIME_SCALE, MAX_TIME_SCALE]`.
pub fn sanitize_time_scale(scale: f64) -> f64 {
    if scale.is_nan() {
        warn!("time scale is NaN, using 1.0");
        return 1.0;
    }
    let clamped = scale.clamp(MIN_TIME_SCALE, MAX_TIME_SCALE);
    if clamped != scale {
        warn!("time scale {scale} out of [{MIN_TIME_SCALE}, {MAX_TIME_SCALE}], using {clamped}");
    }
    clamped
}
