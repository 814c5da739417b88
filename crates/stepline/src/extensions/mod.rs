// extensions/mod.rs
//
// Optional helpers for callers of the scheduler.
// Nothing in core depends on these.

pub mod interp;

#[cfg(feature = "interp")]
pub use interp::lerp_vec2;
pub use interp::{lerp, Interpolated, Lerp};
