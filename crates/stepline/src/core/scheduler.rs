//! The frame loop.
//!
//! Per frame, in order: raw delta from the clock, frame control, stats ring,
//! time scale and per-frame clamp, update drain (inline or offloaded),
//! interpolation, render, post-render, overflow governor, timing stats,
//! re-arm. The running flag is checked before every phase and between
//! update steps, so `stop()` from inside any callback ends the frame there.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::api::callbacks::{guarded, CallbackKind, CallbackSet};
use crate::api::config::{sanitize_target_fps, sanitize_time_scale, sanitize_timestep, Mode, SchedulerConfig};
use crate::api::error::SchedulerError;
use crate::api::events::EventQueue;
use crate::api::types::{FrameHandle, SchedulerEvent};
use crate::bridge::offload::OffloadBackend;
use crate::bridge::protocol::WorkerRequest;
use crate::core::clock::{ClockSource, PollClock};
use crate::core::frame_control::{FrameControl, PacingSignal};
use crate::core::integrator::{Accumulator, DrainHalt, StepControl};
use crate::core::interpolation::interpolate;
use crate::core::overflow::{govern, OverflowAction};
use crate::core::time::{as_ms, from_ms, scale, PHYSICS_BUDGET};
use crate::systems::stats::{DetailedStats, FrameStats, StatsSnapshot};

/// Clonable handle that stops the scheduler from inside a callback or from
/// another thread. The loop notices before its next phase.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

fn min_frame_time(target_fps: f64) -> Duration {
    from_ms(1000.0 / target_fps)
}

fn report_failure(events: &mut EventQueue, callback: CallbackKind, message: String) {
    error!("{callback} failed: {message}");
    events.push(SchedulerEvent::CallbackFailed { callback, message });
}

fn describe(action: &OverflowAction) -> String {
    match action {
        OverflowAction::Reset { from } => {
            format!("accumulator backlog {:.2}ms reset to zero", as_ms(*from))
        }
        OverflowAction::Decayed { from, to } => {
            format!("accumulator backlog {:.2}ms decayed to {:.2}ms", as_ms(*from), as_ms(*to))
        }
        OverflowAction::Clamped { from, to } => {
            format!("accumulator backlog {:.2}ms clamped to {:.2}ms", as_ms(*from), as_ms(*to))
        }
        OverflowAction::Ceiling { from, to } => {
            format!("accumulator {:.2}ms hit the ceiling, cut to {:.2}ms", as_ms(*from), as_ms(*to))
        }
    }
}

/// Fixed-timestep scheduler driven by a [`ClockSource`].
///
/// ```
/// use std::time::Duration;
/// use stepline::{CallbackSet, ManualClock, Mode, Scheduler, SchedulerConfig};
///
/// let clock = ManualClock::new();
/// let config = SchedulerConfig::default()
///     .with_mode(Mode::Unlimited)
///     .with_timestep_ms(10.0);
/// let mut scheduler = Scheduler::new(config, clock.clone());
/// scheduler.set_callbacks(CallbackSet::new().on_update(|_, _| Ok(())));
/// scheduler.start().unwrap();
///
/// clock.advance(Duration::from_millis(25));
/// assert!(scheduler.pump());
/// assert_eq!(scheduler.stats().updates_per_frame, 2);
/// ```
pub struct Scheduler<C: ClockSource> {
    config: SchedulerConfig,
    clock: C,
    running: Arc<AtomicBool>,
    destroyed: bool,
    accumulator: Accumulator,
    frame_control: FrameControl,
    min_frame_time: Duration,
    stats: FrameStats,
    events: EventQueue,
    callbacks: CallbackSet,
    offload: Option<Box<dyn OffloadBackend>>,
    time_scale: f64,
    alpha: f64,
    last_frame: Duration,
    last_scheduled: Duration,
    active: Option<FrameHandle>,
    frames: u64,
}

impl<C: ClockSource> Scheduler<C> {
    /// Build a stopped scheduler. Out-of-range config values are clamped and
    /// reported as [`SchedulerEvent::ConfigClamped`].
    pub fn new(mut config: SchedulerConfig, clock: C) -> Self {
        let clamped = config.sanitize();
        let mut events = EventQueue::new();
        for field in clamped {
            events.push(SchedulerEvent::ConfigClamped { field });
        }

        let min_frame_time = min_frame_time(config.target_fps);
        let now = clock.now();

        Self {
            accumulator: Accumulator::new(from_ms(config.timestep_ms)),
            frame_control: FrameControl::new(config.mode, min_frame_time),
            min_frame_time,
            config,
            clock,
            running: Arc::new(AtomicBool::new(false)),
            destroyed: false,
            stats: FrameStats::new(),
            events,
            callbacks: CallbackSet::new(),
            offload: None,
            time_scale: 1.0,
            alpha: 0.0,
            last_frame: now,
            last_scheduled: now,
            active: None,
            frames: 0,
        }
    }

    /// Build from a partial JSON config.
    pub fn from_json(json: &str, clock: C) -> Result<Self, SchedulerError> {
        let config = SchedulerConfig::from_json(json)?;
        Ok(Self::new(config, clock))
    }

    // -- lifecycle --

    /// Start requesting frames. Starting a running scheduler does nothing.
    /// Accumulated time from before a `stop()` is kept.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.destroyed {
            return Err(SchedulerError::Destroyed);
        }
        if self.is_running() {
            return Ok(());
        }

        if self.config.use_worker_offload {
            let available = self.offload.as_ref().is_some_and(|b| b.is_available());
            if !available {
                self.disable_offload("no offload worker available".to_string());
            }
        }

        if let Some(stale) = self.active.take() {
            // stopped through a StopHandle and never fired since
            self.clock.cancel_tick(stale);
            self.note_stopped();
        }

        let now = self.clock.now();
        self.last_frame = now;
        self.last_scheduled = now;
        self.running.store(true, Ordering::SeqCst);
        self.active = Some(self.clock.request_tick(Duration::ZERO));
        self.events.push(SchedulerEvent::Started);
        info!(
            "scheduler started: {} mode, {:.3}ms timestep, {} fps target",
            self.config.mode, self.config.timestep_ms, self.config.target_fps
        );
        Ok(())
    }

    /// Stop and cancel the pending frame. Stopping twice does nothing.
    pub fn stop(&mut self) {
        if self.destroyed {
            debug!("stop() on a destroyed scheduler ignored");
            return;
        }
        let was_running = self.running.swap(false, Ordering::SeqCst);
        let pending = self.active.take();
        if let Some(handle) = pending {
            self.clock.cancel_tick(handle);
        }
        // a pending frame means a StopHandle stop that was never announced
        if was_running || pending.is_some() {
            self.note_stopped();
        }
    }

    /// Stop for good: drops callbacks and the offload backend, clears stats.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.stop();
        self.destroyed = true;
        self.callbacks = CallbackSet::new();
        self.offload = None;
        self.stats.reset();
        self.frame_control.reset();
        info!("scheduler destroyed");
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    fn note_stopped(&mut self) {
        self.events.push(SchedulerEvent::Stopped);
        info!("scheduler stopped after {} frames", self.frames);
    }

    fn still_running(&mut self) -> bool {
        if self.running.load(Ordering::SeqCst) {
            return true;
        }
        debug!("stop requested mid-frame, skipping remaining phases");
        self.note_stopped();
        false
    }

    // -- frame loop --

    /// Host entry point: run the frame for `handle`. Handles that are not the
    /// currently pending one (stale, cancelled, or from before a restart) are
    /// ignored.
    pub fn fire(&mut self, handle: FrameHandle) {
        if self.destroyed {
            debug!("frame {:?} fired after destroy, ignored", handle);
            return;
        }
        if self.active != Some(handle) {
            debug!("stale frame handle {:?} ignored", handle);
            return;
        }
        self.active = None;

        if !self.running.load(Ordering::SeqCst) {
            self.note_stopped();
            return;
        }
        self.run_frame();
    }

    fn run_frame(&mut self) {
        let frame_start = self.clock.now();
        let raw = frame_start.saturating_sub(self.last_frame);
        self.last_frame = frame_start;
        self.frames += 1;

        let corrected = self.frame_control.correct(raw);
        match corrected.signal {
            Some(PacingSignal::Degraded { mean }) => {
                self.events.push(SchedulerEvent::Degraded {
                    average_fps: 1000.0 / as_ms(mean),
                });
            }
            Some(PacingSignal::Recovered) => self.events.push(SchedulerEvent::Recovered),
            None => {}
        }
        if self.config.collect_stats {
            self.stats.record_delta(as_ms(corrected.delta), frame_start);
        }

        if !self.still_running() {
            return;
        }

        // update drain
        self.accumulator.add(scale(corrected.delta, self.time_scale));
        let physics_start = self.clock.now();
        let offloaded = if self.config.use_worker_offload {
            self.run_offloaded()
        } else {
            None
        };
        let updates = match offloaded {
            Some(ticks) => ticks,
            None => self.drain_inline(),
        };
        let physics_time = self.clock.now().saturating_sub(physics_start);
        self.stats.updates_per_frame = updates;

        if !self.still_running() {
            return;
        }

        // render
        let interp = interpolate(
            self.config.mode,
            self.accumulator.pending(),
            self.accumulator.timestep(),
            self.config.alpha_clamp,
        );
        self.alpha = interp.alpha;
        let render_start = self.clock.now();
        if let Some(render) = self.callbacks.render.as_mut() {
            if let Err(message) = guarded(|| render(interp.alpha, interp.render_delta)) {
                report_failure(&mut self.events, CallbackKind::Render, message);
            }
        }
        let render_time = self.clock.now().saturating_sub(render_start);

        if !self.still_running() {
            return;
        }

        if let Some(post_render) = self.callbacks.post_render.as_mut() {
            if let Err(message) = guarded(|| post_render()) {
                report_failure(&mut self.events, CallbackKind::PostRender, message);
            }
        }

        if !self.still_running() {
            return;
        }

        // overflow governor
        let governed = govern(self.config.mode, self.accumulator.pending(), self.accumulator.timestep());
        for action in governed.actions {
            warn!("{}", describe(&action));
            self.events.push(SchedulerEvent::Overflow(action));
        }
        self.accumulator.set_pending(governed.pending);

        let frame_time = self.clock.now().saturating_sub(frame_start);
        self.stats.record_timings(physics_time, render_time, frame_time);

        self.schedule_next();
    }

    fn drain_inline(&mut self) -> u32 {
        let Self {
            accumulator,
            callbacks,
            clock,
            running,
            events,
            config,
            ..
        } = self;

        let outcome = accumulator.drain(
            config.max_updates,
            PHYSICS_BUDGET,
            || clock.now(),
            |timestep, sim_time| {
                if let Some(update) = callbacks.update.as_mut() {
                    if let Err(message) = guarded(|| update(timestep, sim_time)) {
                        report_failure(events, CallbackKind::Update, message);
                        return StepControl::Halt;
                    }
                }
                if running.load(Ordering::SeqCst) {
                    StepControl::Continue
                } else {
                    StepControl::Halt
                }
            },
        );

        if outcome.halt == Some(DrainHalt::Budget) {
            self.events.push(SchedulerEvent::BudgetExceeded {
                updates: outcome.updates,
                deferred: self.accumulator.pending(),
            });
        }
        outcome.updates
    }

    /// Drain through the offload backend. `None` means offload failed and has
    /// been disabled; the caller drains inline instead.
    fn run_offloaded(&mut self) -> Option<u32> {
        let request = WorkerRequest::new(
            self.frames,
            self.accumulator.timestep(),
            self.config.max_updates,
            PHYSICS_BUDGET,
            self.accumulator.pending(),
            self.accumulator.sim_time(),
        );

        let backend = self.offload.as_mut()?;
        let result = backend.submit(&request).and_then(|()| {
            let response = backend.wait()?;
            response.check(&request)?;
            Ok(response)
        });

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                error!("offloaded update drain failed: {err}");
                self.disable_offload(err.to_string());
                return None;
            }
        };

        self.accumulator.set_pending(response.accumulator());
        self.accumulator.set_sim_time(response.sim_time());

        if let Some(message) = response.error.clone() {
            report_failure(&mut self.events, CallbackKind::Update, message);
        }
        if response.budget_exceeded {
            warn!(
                "offloaded update budget exceeded after {} updates, deferring {:.2}ms",
                response.ticks,
                as_ms(response.accumulator())
            );
            self.events.push(SchedulerEvent::BudgetExceeded {
                updates: response.ticks,
                deferred: response.accumulator(),
            });
        }
        if let Some(sync) = self.callbacks.offload_sync.as_mut() {
            if let Err(message) = guarded(|| sync(&response)) {
                report_failure(&mut self.events, CallbackKind::OffloadSync, message);
            }
        }

        Some(response.ticks)
    }

    fn disable_offload(&mut self, reason: String) {
        warn!("worker offload disabled for this session: {reason}");
        self.config.use_worker_offload = false;
        self.offload = None;
        self.events.push(SchedulerEvent::OffloadDisabled { reason });
    }

    fn schedule_next(&mut self) {
        let now = self.clock.now();
        let delay = match self.config.mode {
            Mode::Fixed => {
                let elapsed = now.saturating_sub(self.last_scheduled);
                let wait = self.min_frame_time.saturating_sub(elapsed);
                self.last_scheduled = now + wait;
                wait
            }
            Mode::Adaptive | Mode::Unlimited => {
                self.last_scheduled = now;
                Duration::ZERO
            }
        };
        self.active = Some(self.clock.request_tick(delay));
    }

    // -- runtime control --

    /// Switch pacing mode. Resets statistics and the adaptive window; the
    /// accumulator is kept.
    pub fn set_mode(&mut self, mode: Mode, target_fps: f64) {
        if self.destroyed {
            warn!("set_mode() on a destroyed scheduler ignored");
            return;
        }
        let fps = sanitize_target_fps(target_fps);
        if fps != target_fps {
            self.events.push(SchedulerEvent::ConfigClamped { field: "target_fps" });
        }

        self.config.mode = mode;
        self.config.target_fps = fps;
        self.min_frame_time = min_frame_time(fps);
        self.frame_control = FrameControl::new(mode, self.min_frame_time);
        self.stats.reset();
        info!("mode set to {mode} at {fps} fps");
    }

    /// Scale applied to frame time before it is accumulated, clamped to
    /// `[0.1, 5.0]`.
    pub fn set_time_scale(&mut self, time_scale: f64) {
        if self.destroyed {
            warn!("set_time_scale() on a destroyed scheduler ignored");
            return;
        }
        let clamped = sanitize_time_scale(time_scale);
        if clamped != time_scale {
            self.events.push(SchedulerEvent::ConfigClamped { field: "time_scale" });
        }
        self.time_scale = clamped;
    }

    /// Change the fixed step. Outstanding accumulated time is rescaled so
    /// the same fraction of a step stays pending.
    pub fn set_timestep(&mut self, timestep_ms: f64) {
        if self.destroyed {
            warn!("set_timestep() on a destroyed scheduler ignored");
            return;
        }
        let ms = sanitize_timestep(timestep_ms);
        if ms != timestep_ms {
            self.events.push(SchedulerEvent::ConfigClamped { field: "timestep_ms" });
        }
        self.config.timestep_ms = ms;
        self.accumulator.set_timestep(from_ms(ms));
    }

    /// Install callbacks. Slots left empty in `callbacks` keep their
    /// current callback.
    pub fn set_callbacks(&mut self, callbacks: CallbackSet) {
        if self.destroyed {
            warn!("set_callbacks() on a destroyed scheduler ignored");
            return;
        }
        self.callbacks.merge(callbacks);
    }

    /// Install the backend used when `use_worker_offload` is set.
    pub fn set_offload(&mut self, backend: Box<dyn OffloadBackend>) {
        if self.destroyed {
            warn!("set_offload() on a destroyed scheduler ignored");
            return;
        }
        self.offload = Some(backend);
    }

    // -- introspection --

    pub fn is_running(&self) -> bool {
        !self.destroyed && self.running.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    pub fn timestep(&self) -> Duration {
        self.accumulator.timestep()
    }

    /// Unconsumed simulation time.
    pub fn accumulator(&self) -> Duration {
        self.accumulator.pending()
    }

    /// Simulated time advanced so far.
    pub fn sim_time(&self) -> Duration {
        self.accumulator.sim_time()
    }

    /// Interpolation factor handed to the last render.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            fps: self.stats.fps(),
            target_fps: self.config.target_fps,
            frame_count: self.stats.total_frames(),
            sample_count: self.stats.sample_count(),
            average_delta: self.stats.average_delta(),
            jitter: self.stats.jitter(),
            min_delta: self.stats.min_delta(),
            max_delta: self.stats.max_delta(),
            updates_per_frame: self.stats.updates_per_frame,
            frame_time: self.stats.frame_time,
            render_time: self.stats.render_time,
            physics_time: self.stats.physics_time,
            accumulator: as_ms(self.accumulator.pending()),
            alpha: self.alpha,
            running: self.is_running(),
            timestep: self.config.timestep_ms,
            mode: self.config.mode,
        }
    }

    pub fn detailed_stats(&self) -> DetailedStats {
        DetailedStats::new(self.stats(), as_ms(self.min_frame_time), self.time_scale)
    }

    /// Take every event recorded since the last call.
    pub fn drain_events(&mut self) -> Vec<SchedulerEvent> {
        self.events.drain()
    }

    /// Events evicted because `drain_events` was not called often enough.
    pub fn dropped_events(&self) -> u64 {
        self.events.dropped()
    }
}

impl<C: PollClock> Scheduler<C> {
    /// Fire the pending frame if it is due. Returns whether a frame ran.
    pub fn pump(&mut self) -> bool {
        let Some(handle) = self.clock.poll_due() else {
            return false;
        };
        let before = self.frames;
        self.fire(handle);
        self.frames != before
    }

    /// Sleep until each frame is due and run it, until the scheduler stops.
    /// Meant for clocks that follow real time, such as [`SystemClock`](crate::SystemClock).
    pub fn run_blocking(&mut self) {
        while self.is_running() {
            match self.clock.until_due() {
                Some(wait) if !wait.is_zero() => std::thread::sleep(wait),
                Some(_) => {
                    self.pump();
                }
                None => break,
            }
        }
    }
}

impl<C: ClockSource> Drop for Scheduler<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.active.take() {
            self.clock.cancel_tick(handle);
        }
    }
}
