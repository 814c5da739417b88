use std::time::Duration;

use crate::api::config::Mode;
use crate::core::time::{ratio, scale};

/// Blend factor and delta handed to the render callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolation {
    /// How far into the next, not yet simulated step the frame is.
    pub alpha: f64,
    pub render_delta: Duration,
}

/// Fixed mode never interpolates and renders with the literal timestep.
/// The other modes report `pending / timestep` clamped to `[0, alpha_clamp]`.
pub fn interpolate(mode: Mode, pending: Duration, timestep: Duration, alpha_clamp: f64) -> Interpolation {
    if !mode.interpolates() {
        return Interpolation {
            alpha: 0.0,
            render_delta: timestep,
        };
    }

    let raw = ratio(pending, timestep);
    let alpha = if raw.is_finite() {
        raw.clamp(0.0, alpha_clamp.max(0.0))
    } else {
        0.0
    };

    Interpolation {
        alpha,
        render_delta: scale(timestep, alpha),
    }
}
