//! Clock sources: where timestamps and frame callbacks come from.
//!
//! The scheduler never touches a platform timer directly. It asks its
//! `ClockSource` for the current time and for "call me back after `delay`";
//! the host then hands the returned [`FrameHandle`] back through
//! [`Scheduler::fire`](crate::Scheduler::fire). Browsers push ticks from
//! `requestAnimationFrame`; native hosts poll them through [`PollClock`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::api::types::FrameHandle;

/// Minimal timing capability the scheduler needs from its host.
pub trait ClockSource {
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;

    /// Ask the host to fire a frame after `delay`. A zero delay means
    /// "on the next host frame".
    fn request_tick(&mut self, delay: Duration) -> FrameHandle;

    /// Cancel a previously requested tick. Unknown handles are ignored.
    fn cancel_tick(&mut self, handle: FrameHandle);
}

/// A clock whose ticks are collected by polling rather than pushed by a host.
pub trait PollClock: ClockSource {
    /// Remove and return the earliest tick that is due now.
    fn poll_due(&mut self) -> Option<FrameHandle>;

    /// Time until the earliest pending tick is due, `None` if nothing is pending.
    fn until_due(&self) -> Option<Duration>;
}

#[derive(Debug, Clone, Copy)]
struct PendingTick {
    handle: FrameHandle,
    due: Duration,
}

fn take_earliest_due(pending: &mut Vec<PendingTick>, now: Duration) -> Option<FrameHandle> {
    let idx = pending
        .iter()
        .enumerate()
        .filter(|(_, t)| t.due <= now)
        .min_by_key(|(_, t)| t.due)
        .map(|(i, _)| i)?;
    Some(pending.remove(idx).handle)
}

/// Monotonic clock backed by `std::time::Instant`.
///
/// With a refresh rate set, zero-delay requests land on the next refresh
/// boundary the way a vsynced host frame callback would.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
    refresh: Option<Duration>,
    pending: Vec<PendingTick>,
    next_id: u64,
}

impl SystemClock {
    /// Clock with no simulated refresh: zero-delay ticks are due immediately.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            refresh: None,
            pending: Vec::with_capacity(2),
            next_id: 1,
        }
    }

    /// Clock that emulates a display refreshing at `hz`.
    pub fn with_refresh_rate(hz: f64) -> Self {
        let mut clock = Self::new();
        if hz.is_finite() && hz > 0.0 {
            clock.refresh = Some(Duration::from_secs_f64(1.0 / hz));
        }
        clock
    }

    fn next_boundary(&self, now: Duration) -> Duration {
        match self.refresh {
            Some(period) if !period.is_zero() => {
                let periods = now.as_nanos() / period.as_nanos() + 1;
                let nanos = periods * period.as_nanos();
                Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
            }
            _ => now,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn request_tick(&mut self, delay: Duration) -> FrameHandle {
        let handle = FrameHandle(self.next_id);
        self.next_id += 1;
        let now = self.now();
        let due = if delay.is_zero() {
            self.next_boundary(now)
        } else {
            now + delay
        };
        self.pending.push(PendingTick { handle, due });
        handle
    }

    fn cancel_tick(&mut self, handle: FrameHandle) {
        self.pending.retain(|t| t.handle != handle);
    }
}

impl PollClock for SystemClock {
    fn poll_due(&mut self) -> Option<FrameHandle> {
        let now = self.now();
        take_earliest_due(&mut self.pending, now)
    }

    fn until_due(&self) -> Option<Duration> {
        let now = self.now();
        self.pending
            .iter()
            .map(|t| t.due.saturating_sub(now))
            .min()
    }
}

#[derive(Debug, Default)]
struct ManualState {
    now: Cell<Duration>,
    pending: RefCell<Vec<PendingTick>>,
    next_id: Cell<u64>,
    last_delay: Cell<Option<Duration>>,
    requests: Cell<u64>,
}

/// Simulated clock that only moves when told to.
///
/// Clones share the same timeline, so a test can keep one handle while the
/// scheduler owns another (and callbacks may capture a third to simulate
/// slow work).
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Rc<ManualState>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        self.state.now.set(self.state.now.get() + by);
    }

    /// Move time forward by fractional milliseconds.
    pub fn advance_ms(&self, ms: f64) {
        self.advance(crate::core::time::from_ms(ms));
    }

    /// Delay passed to the most recent `request_tick`.
    pub fn last_requested_delay(&self) -> Option<Duration> {
        self.state.last_delay.get()
    }

    /// Number of ticks requested so far.
    pub fn request_count(&self) -> u64 {
        self.state.requests.get()
    }

    /// Number of ticks currently pending.
    pub fn pending_count(&self) -> usize {
        self.state.pending.borrow().len()
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> Duration {
        self.state.now.get()
    }

    fn request_tick(&mut self, delay: Duration) -> FrameHandle {
        let id = self.state.next_id.get() + 1;
        self.state.next_id.set(id);
        self.state.requests.set(self.state.requests.get() + 1);
        self.state.last_delay.set(Some(delay));

        let handle = FrameHandle(id);
        let due = self.state.now.get() + delay;
        self.state.pending.borrow_mut().push(PendingTick { handle, due });
        handle
    }

    fn cancel_tick(&mut self, handle: FrameHandle) {
        self.state.pending.borrow_mut().retain(|t| t.handle != handle);
    }
}

impl PollClock for ManualClock {
    fn poll_due(&mut self) -> Option<FrameHandle> {
        let now = self.state.now.get();
        take_earliest_due(&mut self.state.pending.borrow_mut(), now)
    }

    fn until_due(&self) -> Option<Duration> {
        let now = self.state.now.get();
        self.state
            .pending
            .borrow()
            .iter()
            .map(|t| t.due.saturating_sub(now))
            .min()
    }
}
