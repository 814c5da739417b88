use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use stepline::core::time::from_ms;
use stepline::{ClockSource, FrameHandle};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};

/// Stand-in for the display refresh when frames are timer driven.
const TIMER_FRAME_MS: i32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostTimer {
    AnimationFrame(i32),
    Timeout(i32),
}

type Sink = Rc<dyn Fn(FrameHandle)>;
type Pending = Rc<RefCell<HashMap<u64, HostTimer>>>;

/// Where fired frames are delivered. Filled in once the scheduler that owns
/// the clock exists.
#[derive(Clone, Default)]
pub struct TickSink {
    slot: Rc<RefCell<Option<Sink>>>,
}

impl TickSink {
    pub fn install(&self, f: impl Fn(FrameHandle) + 'static) {
        *self.slot.borrow_mut() = Some(Rc::new(f));
    }

    fn deliver(&self, handle: FrameHandle) {
        // clone out so the slot is not borrowed while the frame runs
        let sink = self.slot.borrow().clone();
        if let Some(sink) = sink {
            sink(handle);
        }
    }
}

/// The JS global the clock schedules against.
#[derive(Clone)]
enum Host {
    Window(web_sys::Window),
    Worker(web_sys::WorkerGlobalScope),
}

impl Host {
    fn detect() -> Option<Host> {
        let global = js_sys::global();
        if let Some(window) = global.dyn_ref::<web_sys::Window>() {
            return Some(Host::Window(window.clone()));
        }
        global
            .dyn_into::<web_sys::WorkerGlobalScope>()
            .ok()
            .map(Host::Worker)
    }

    fn performance(&self) -> Option<web_sys::Performance> {
        match self {
            Host::Window(window) => window.performance(),
            Host::Worker(scope) => scope.performance(),
        }
    }

    fn window(&self) -> Option<&web_sys::Window> {
        match self {
            Host::Window(window) => Some(window),
            Host::Worker(_) => None,
        }
    }

    fn set_timeout(&self, callback: &js_sys::Function, ms: i32) -> Result<i32, JsValue> {
        match self {
            Host::Window(window) => window.set_timeout_with_callback_and_timeout_and_arguments_0(callback, ms),
            Host::Worker(scope) => scope.set_timeout_with_callback_and_timeout_and_arguments_0(callback, ms),
        }
    }

    fn clear_timeout(&self, id: i32) {
        match self {
            Host::Window(window) => window.clear_timeout_with_handle(id),
            Host::Worker(scope) => scope.clear_timeout_with_handle(id),
        }
    }
}

fn delivery(pending: &Pending, sink: &TickSink, id: u64) -> JsValue {
    let pending = Rc::clone(pending);
    let sink = sink.clone();
    Closure::once_into_js(move || {
        if pending.borrow_mut().remove(&id).is_some() {
            sink.deliver(FrameHandle(id));
        }
    })
}

fn request_frame(window: &web_sys::Window, pending: &Pending, sink: &TickSink, id: u64) -> Result<i32, JsValue> {
    let callback = delivery(pending, sink, id);
    window.request_animation_frame(callback.unchecked_ref())
}

fn clamp_ms(delay: Duration) -> i32 {
    delay.as_millis().min(i32::MAX as u128) as i32
}

/// How a tick reaches the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickPlan {
    /// Next animation frame.
    Frame,
    /// `setTimeout` for the delay, then the next animation frame.
    TimeoutThenFrame(i32),
    /// `setTimeout` alone.
    Timeout(i32),
}

fn plan(delay: Duration, raf: bool) -> TickPlan {
    match (raf, delay.is_zero()) {
        (true, true) => TickPlan::Frame,
        (true, false) => TickPlan::TimeoutThenFrame(clamp_ms(delay)),
        (false, true) => TickPlan::Timeout(TIMER_FRAME_MS),
        (false, false) => TickPlan::Timeout(clamp_ms(delay)),
    }
}

/// Browser clock: `performance.now()` for time and `requestAnimationFrame`
/// for frames. A paced tick waits on `setTimeout` and then still runs from
/// the next animation frame.
///
/// Without a window (worker scopes) or with `use_raf` off, frames come from
/// `setTimeout` alone and zero-delay ticks wait `TIMER_FRAME_MS`.
pub struct WebClock {
    host: Option<Host>,
    performance: Option<web_sys::Performance>,
    use_raf: bool,
    pending: Pending,
    next_id: Cell<u64>,
    sink: TickSink,
}

impl WebClock {
    pub fn new(use_raf: bool) -> Self {
        let host = Host::detect();
        let performance = host.as_ref().and_then(Host::performance);
        let raf_available = host.as_ref().and_then(Host::window).is_some();

        match &host {
            None => log::error!("no window or worker scope: frames cannot be scheduled"),
            Some(_) if use_raf && !raf_available => {
                log::info!("requestAnimationFrame unavailable, frames are timer driven")
            }
            Some(_) if !use_raf => log::info!("use_raf is off, frames are timer driven"),
            Some(_) => {}
        }

        Self {
            host,
            performance,
            use_raf: use_raf && raf_available,
            pending: Rc::new(RefCell::new(HashMap::new())),
            next_id: Cell::new(1),
            sink: TickSink::default(),
        }
    }

    pub fn sink(&self) -> TickSink {
        self.sink.clone()
    }

    /// Whether frames run from `requestAnimationFrame`.
    pub fn uses_raf(&self) -> bool {
        self.use_raf
    }

    fn schedule(&self, host: &Host, id: u64, delay: Duration) -> Result<HostTimer, JsValue> {
        let window = host.window().filter(|_| self.use_raf);
        match (plan(delay, window.is_some()), window) {
            (TickPlan::Frame, Some(window)) => {
                request_frame(window, &self.pending, &self.sink, id).map(HostTimer::AnimationFrame)
            }
            (TickPlan::TimeoutThenFrame(ms), Some(window)) => {
                let pending = Rc::clone(&self.pending);
                let sink = self.sink.clone();
                let frame_window = window.clone();
                let callback = Closure::once_into_js(move || {
                    if !pending.borrow().contains_key(&id) {
                        return;
                    }
                    match request_frame(&frame_window, &pending, &sink, id) {
                        Ok(raf) => {
                            pending.borrow_mut().insert(id, HostTimer::AnimationFrame(raf));
                        }
                        Err(err) => {
                            log::error!("failed to request animation frame: {err:?}");
                            pending.borrow_mut().remove(&id);
                        }
                    }
                });
                window
                    .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), ms)
                    .map(HostTimer::Timeout)
            }
            (timer, _) => {
                let ms = match timer {
                    TickPlan::Timeout(ms) | TickPlan::TimeoutThenFrame(ms) => ms,
                    TickPlan::Frame => TIMER_FRAME_MS,
                };
                let callback = delivery(&self.pending, &self.sink, id);
                host.set_timeout(callback.unchecked_ref(), ms).map(HostTimer::Timeout)
            }
        }
    }
}

impl Default for WebClock {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ClockSource for WebClock {
    fn now(&self) -> Duration {
        let ms = match &self.performance {
            Some(performance) => performance.now(),
            None => js_sys::Date::now(),
        };
        from_ms(ms)
    }

    fn request_tick(&mut self, delay: Duration) -> FrameHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let Some(host) = self.host.as_ref() else {
            return FrameHandle(id);
        };
        match self.schedule(host, id, delay) {
            Ok(timer) => {
                self.pending.borrow_mut().insert(id, timer);
            }
            Err(err) => log::error!("failed to schedule frame: {err:?}"),
        }
        FrameHandle(id)
    }

    fn cancel_tick(&mut self, handle: FrameHandle) {
        let Some(timer) = self.pending.borrow_mut().remove(&handle.0) else {
            return;
        };
        let Some(host) = self.host.as_ref() else {
            return;
        };
        match timer {
            HostTimer::AnimationFrame(raf) => {
                if let Some(window) = host.window() {
                    if let Err(err) = window.cancel_animation_frame(raf) {
                        log::warn!("cancelAnimationFrame failed: {err:?}");
                    }
                }
            }
            HostTimer::Timeout(timeout) => host.clear_timeout(timeout),
        }
    }
}
