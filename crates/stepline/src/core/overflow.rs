//! Accumulator overflow policy, applied once per frame after the drain.

use std::time::Duration;

use crate::api::config::Mode;

/// No mode may leave more than this many timesteps in the accumulator.
pub const CEILING_STEPS: u32 = 10;
const FIXED_RESET_STEPS: u32 = 5;
const ADAPTIVE_DECAY_STEPS: u32 = 3;
const UNLIMITED_CLAMP_STEPS: u32 = 10;
const UNLIMITED_KEEP_STEPS: u32 = 2;

/// One intervention by the governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowAction {
    /// Fixed mode dropped the whole backlog.
    Reset { from: Duration },
    /// Adaptive mode decayed the backlog to 80%.
    Decayed { from: Duration, to: Duration },
    /// Unlimited mode clamped the backlog to two steps.
    Clamped { from: Duration, to: Duration },
    /// The mode-independent ceiling kicked in.
    Ceiling { from: Duration, to: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Governed {
    pub pending: Duration,
    pub actions: Vec<OverflowAction>,
}

fn steps(timestep: Duration, n: u32) -> Duration {
    timestep.checked_mul(n).unwrap_or(Duration::MAX)
}

/// Apply the mode's policy, then the global ceiling.
pub fn govern(mode: Mode, pending: Duration, timestep: Duration) -> Governed {
    let mut actions = Vec::new();
    let mut pending = pending;

    match mode {
        Mode::Fixed => {
            if pending > steps(timestep, FIXED_RESET_STEPS) {
                actions.push(OverflowAction::Reset { from: pending });
                pending = Duration::ZERO;
            }
        }
        Mode::Adaptive => {
            if pending > steps(timestep, ADAPTIVE_DECAY_STEPS) {
                let to = pending.checked_mul(4).map_or(pending / 5 * 4, |p| p / 5);
                actions.push(OverflowAction::Decayed { from: pending, to });
                pending = to;
            }
        }
        Mode::Unlimited => {
            if pending > steps(timestep, UNLIMITED_CLAMP_STEPS) {
                let to = steps(timestep, UNLIMITED_KEEP_STEPS);
                actions.push(OverflowAction::Clamped { from: pending, to });
                pending = to;
            }
        }
    }

    let ceiling = steps(timestep, CEILING_STEPS);
    if pending > ceiling {
        actions.push(OverflowAction::Ceiling { from: pending, to: ceiling });
        pending = ceiling;
    }

    Governed { pending, actions }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: Duration = Duration::from_millis(10);

    #[test]
    fn fixed_resets_past_five_steps() {
        let out = govern(Mode::Fixed, STEP * 5, STEP);
        assert!(out.actions.is_empty());
        assert_eq!(out.pending, STEP * 5);

        let backlog = STEP * 5 + Duration::from_nanos(1);
        let out = govern(Mode::Fixed, backlog, STEP);
        assert_eq!(out.pending, Duration::ZERO);
        assert_eq!(out.actions, vec![OverflowAction::Reset { from: backlog }]);
    }

    #[test]
    fn adaptive_decays_past_three_steps() {
        let out = govern(Mode::Adaptive, Duration::from_millis(40), STEP);
        assert_eq!(out.pending, Duration::from_millis(32));
        assert_eq!(out.actions.len(), 1);
    }

    #[test]
    fn adaptive_decay_can_still_hit_ceiling() {
        let out = govern(Mode::Adaptive, Duration::from_millis(150), STEP);
        assert_eq!(out.pending, STEP * CEILING_STEPS);
        assert_eq!(
            out.actions,
            vec![
                OverflowAction::Decayed {
                    from: Duration::from_millis(150),
                    to: Duration::from_millis(120)
                },
                OverflowAction::Ceiling {
                    from: Duration::from_millis(120),
                    to: Duration::from_millis(100)
                },
            ]
        );
    }

    #[test]
    fn unlimited_clamps_to_two_steps() {
        let out = govern(Mode::Unlimited, Duration::from_millis(90), STEP);
        assert!(out.actions.is_empty());
        let out = govern(Mode::Unlimited, Duration::from_millis(101), STEP);
        assert_eq!(out.pending, STEP * 2);
    }

    #[test]
    fn huge_timestep_never_overflows() {
        let step = Duration::MAX / 3;
        for mode in [Mode::Fixed, Mode::Adaptive, Mode::Unlimited] {
            let out = govern(mode, Duration::from_millis(16), step);
            assert!(out.actions.is_empty());
            assert_eq!(out.pending, Duration::from_millis(16));
        }
        let out = govern(Mode::Adaptive, Duration::MAX, Duration::from_secs(1));
        assert_eq!(out.pending, Duration::from_secs(10));
    }
}
