//! Per-mode correction of raw frame deltas.

use std::collections::VecDeque;
use std::time::Duration;

use log::{info, warn};

use crate::api::config::Mode;
use crate::core::time::as_ms;

/// Samples in the adaptive moving-average window.
pub const ADAPTIVE_WINDOW: usize = 120;

/// Emitted when the adaptive strategy changes state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PacingSignal {
    /// The window mean crossed 1.5x the target frame time.
    Degraded { mean: Duration },
    /// The window mean dropped back under the threshold.
    Recovered,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corrected {
    pub delta: Duration,
    pub signal: Option<PacingSignal>,
}

impl Corrected {
    fn plain(delta: Duration) -> Self {
        Self { delta, signal: None }
    }
}

/// Frame-control state machine. The variant only changes through
/// [`FrameControl::new`] when the scheduler's mode is switched.
#[derive(Debug, Clone)]
pub enum FrameControl {
    Fixed {
        min_frame_time: Duration,
    },
    Adaptive {
        min_frame_time: Duration,
        window: VecDeque<Duration>,
        sum: Duration,
        degraded: bool,
    },
    Unlimited,
}

impl FrameControl {
    pub fn new(mode: Mode, min_frame_time: Duration) -> Self {
        match mode {
            Mode::Fixed => FrameControl::Fixed { min_frame_time },
            Mode::Adaptive => FrameControl::Adaptive {
                min_frame_time,
                window: VecDeque::with_capacity(ADAPTIVE_WINDOW),
                sum: Duration::ZERO,
                degraded: false,
            },
            Mode::Unlimited => FrameControl::Unlimited,
        }
    }

    /// Map a raw frame delta to the delta fed to the accumulator.
    pub fn correct(&mut self, raw: Duration) -> Corrected {
        match self {
            FrameControl::Fixed { min_frame_time } => {
                let min = *min_frame_time;
                if raw < min {
                    Corrected::plain(min)
                } else if raw > min * 2 {
                    Corrected::plain(min * 3 / 2)
                } else {
                    Corrected::plain(raw)
                }
            }
            FrameControl::Adaptive {
                min_frame_time,
                window,
                sum,
                degraded,
            } => {
                if window.len() == ADAPTIVE_WINDOW {
                    if let Some(oldest) = window.pop_front() {
                        *sum -= oldest;
                    }
                }
                window.push_back(raw);
                *sum += raw;

                // len is at least 1 after the push and at most ADAPTIVE_WINDOW
                let mean = *sum / window.len() as u32;
                let threshold = *min_frame_time * 3 / 2;

                if mean > threshold {
                    let signal = if *degraded {
                        None
                    } else {
                        *degraded = true;
                        warn!(
                            "sustained slow frames: {:.1} fps average, compressing frame time",
                            1000.0 / as_ms(mean)
                        );
                        Some(PacingSignal::Degraded { mean })
                    };
                    Corrected {
                        delta: raw.min(mean * 9 / 10),
                        signal,
                    }
                } else if *degraded {
                    *degraded = false;
                    info!("frame rate recovered: {:.1} fps average", 1000.0 / as_ms(mean));
                    Corrected {
                        delta: raw,
                        signal: Some(PacingSignal::Recovered),
                    }
                } else {
                    Corrected::plain(raw)
                }
            }
            FrameControl::Unlimited => Corrected::plain(raw),
        }
    }

    /// Moving-average of the adaptive window, if this is adaptive mode and
    /// any samples have been seen.
    pub fn window_mean(&self) -> Option<Duration> {
        match self {
            FrameControl::Adaptive { window, sum, .. } if !window.is_empty() => {
                Some(*sum / window.len() as u32)
            }
            _ => None,
        }
    }

    /// Forget history (adaptive window and degradation flag).
    pub fn reset(&mut self) {
        if let FrameControl::Adaptive {
            window,
            sum,
            degraded,
            ..
        } = self
        {
            window.clear();
            *sum = Duration::ZERO;
            *degraded = false;
        }
    }
}
