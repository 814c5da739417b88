use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crate::bridge::protocol::WorkerResponse;

/// Error type callbacks may return. Anything implementing `std::error::Error`
/// (and plain `String`s) converts into it with `?` or `.into()`.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

pub type CallbackResult = Result<(), CallbackError>;

/// `on_update(timestep, sim_time)`
pub type UpdateFn = Box<dyn FnMut(Duration, Duration) -> CallbackResult>;
/// `on_render(alpha, render_delta)`
pub type RenderFn = Box<dyn FnMut(f64, Duration) -> CallbackResult>;
/// `on_post_render()`
pub type PostRenderFn = Box<dyn FnMut() -> CallbackResult>;
/// `on_offload_sync(response)`
pub type OffloadSyncFn = Box<dyn FnMut(&WorkerResponse) -> CallbackResult>;

/// Which callback a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Update,
    Render,
    PostRender,
    OffloadSync,
}

impl CallbackKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CallbackKind::Update => "onUpdate",
            CallbackKind::Render => "onRender",
            CallbackKind::PostRender => "onPostRender",
            CallbackKind::OffloadSync => "onOffloadSync",
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The collaborator callbacks. Every slot is optional; a missing callback is
/// a silent no-op.
///
/// ```
/// use stepline::CallbackSet;
///
/// let callbacks = CallbackSet::new()
///     .on_update(|_timestep, _sim_time| Ok(()))
///     .on_render(|alpha, _delta| {
///         assert!(alpha >= 0.0);
///         Ok(())
///     });
/// assert!(callbacks.has_update());
/// ```
#[derive(Default)]
pub struct CallbackSet {
    pub update: Option<UpdateFn>,
    pub render: Option<RenderFn>,
    pub post_render: Option<PostRenderFn>,
    pub offload_sync: Option<OffloadSyncFn>,
}

impl CallbackSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_update(mut self, f: impl FnMut(Duration, Duration) -> CallbackResult + 'static) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    pub fn on_render(mut self, f: impl FnMut(f64, Duration) -> CallbackResult + 'static) -> Self {
        self.render = Some(Box::new(f));
        self
    }

    pub fn on_post_render(mut self, f: impl FnMut() -> CallbackResult + 'static) -> Self {
        self.post_render = Some(Box::new(f));
        self
    }

    pub fn on_offload_sync(
        mut self,
        f: impl FnMut(&WorkerResponse) -> CallbackResult + 'static,
    ) -> Self {
        self.offload_sync = Some(Box::new(f));
        self
    }

    pub fn has_update(&self) -> bool {
        self.update.is_some()
    }

    /// Overwrite the slots that `other` fills, keep the rest.
    pub fn merge(&mut self, other: CallbackSet) {
        if other.update.is_some() {
            self.update = other.update;
        }
        if other.render.is_some() {
            self.render = other.render;
        }
        if other.post_render.is_some() {
            self.post_render = other.post_render;
        }
        if other.offload_sync.is_some() {
            self.offload_sync = other.offload_sync;
        }
    }
}

impl fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSet")
            .field("update", &self.update.is_some())
            .field("render", &self.render.is_some())
            .field("post_render", &self.post_render.is_some())
            .field("offload_sync", &self.offload_sync.is_some())
            .finish()
    }
}

/// Run one callback invocation, turning both `Err` returns and panics into a
/// message. Nothing escapes into the frame loop.
pub(crate) fn guarded(f: impl FnOnce() -> CallbackResult) -> Result<(), String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarded_passes_success_through() {
        assert_eq!(guarded(|| Ok(())), Ok(()));
    }

    #[test]
    fn guarded_reports_errors() {
        let out = guarded(|| Err("bad input".into()));
        assert_eq!(out, Err("bad input".to_string()));
    }

    #[test]
    fn guarded_catches_panics() {
        let out = guarded(|| panic!("boom"));
        assert_eq!(out, Err("panicked: boom".to_string()));
    }

    #[test]
    fn merge_keeps_unset_slots() {
        let mut set = CallbackSet::new().on_update(|_, _| Ok(())).on_post_render(|| Ok(()));
        set.merge(CallbackSet::new().on_render(|_, _| Ok(())));
        assert!(set.update.is_some());
        assert!(set.render.is_some());
        assert!(set.post_render.is_some());
        assert!(set.offload_sync.is_none());
    }
}
