use std::time::Duration;

use crate::api::callbacks::CallbackKind;
use crate::core::overflow::OverflowAction;

/// Opaque token for a pending frame callback. Handing a stale or cancelled
/// handle back to the scheduler is harmless; it is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Something the scheduler did on its own that a caller may want to observe.
/// Every governor intervention, budget abort and callback failure shows up
/// here in addition to the log.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    Started,
    Stopped,
    /// The update drain hit the per-frame wall-clock budget.
    BudgetExceeded { updates: u32, deferred: Duration },
    /// Adaptive mode started compressing frame deltas.
    Degraded { average_fps: f64 },
    /// Adaptive mode stopped compressing frame deltas.
    Recovered,
    /// The overflow governor changed the accumulator.
    Overflow(OverflowAction),
    /// A callback returned an error or panicked.
    CallbackFailed { callback: CallbackKind, message: String },
    /// Worker offload was turned off for the rest of the session.
    OffloadDisabled { reason: String },
    /// A setter received an out-of-range value and clamped it.
    ConfigClamped { field: &'static str },
}
