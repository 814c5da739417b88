pub mod api;
pub mod core;
pub mod systems;
pub mod bridge;
pub mod extensions;

// Re-export key types at crate root for convenience
pub use api::callbacks::{CallbackError, CallbackKind, CallbackResult, CallbackSet};
pub use api::config::{Mode, SchedulerConfig};
pub use api::error::{OffloadError, SchedulerError, UnknownMode};
pub use api::types::{FrameHandle, SchedulerEvent};
pub use crate::core::clock::{ClockSource, ManualClock, PollClock, SystemClock};
pub use crate::core::overflow::OverflowAction;
pub use crate::core::scheduler::{Scheduler, StopHandle};
pub use systems::stats::{DetailedStats, StatsSnapshot};
pub use bridge::offload::{OffloadBackend, OffloadTask, ThreadOffload};
pub use bridge::protocol::{WorkerRequest, WorkerResponse, PROTOCOL_VERSION};
pub use bridge::stats_layout::StatsFrame;

// Render-side helpers, opt-in
pub use extensions::{lerp, Interpolated, Lerp};
#[cfg(feature = "interp")]
pub use extensions::lerp_vec2;
