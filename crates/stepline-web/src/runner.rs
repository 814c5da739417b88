use std::cell::RefCell;
use std::rc::Rc;

use stepline::core::time::as_ms;
use stepline::{CallbackError, CallbackSet, Mode, Scheduler, SchedulerConfig, StatsFrame, StopHandle};
use wasm_bindgen::prelude::*;

use crate::clock::WebClock;

fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn js_error(err: JsValue) -> CallbackError {
    err.as_string()
        .unwrap_or_else(|| format!("{err:?}"))
        .into()
}

/// Scheduler bound to the browser's frame callback.
///
/// The scheduler lives behind `Rc<RefCell<..>>` so the clock's frame
/// callbacks can reach it. Calls made from inside a scheduler callback
/// (a JS `onUpdate` calling `stop()`, say) find it borrowed; `stop` still
/// works through the stop handle, everything else is logged and skipped.
#[wasm_bindgen]
pub struct WebScheduler {
    inner: Rc<RefCell<Scheduler<WebClock>>>,
    stop: StopHandle,
    stats_frame: StatsFrame,
}

impl WebScheduler {
    fn with_inner<R>(&self, what: &str, f: impl FnOnce(&mut Scheduler<WebClock>) -> R) -> Option<R> {
        match self.inner.try_borrow_mut() {
            Ok(mut scheduler) => Some(f(&mut scheduler)),
            Err(_) => {
                log::warn!("{what}() called from inside a scheduler callback, ignored");
                None
            }
        }
    }
}

#[wasm_bindgen]
impl WebScheduler {
    /// Build from an optional JSON config; unset fields take defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<WebScheduler, JsValue> {
        crate::init_logging();

        let config = match config_json {
            Some(json) => SchedulerConfig::from_json(&json).map_err(to_js)?,
            None => SchedulerConfig::default(),
        };
        if config.use_worker_offload {
            log::info!("worker offload is not supported in the browser bridge, updates run on the main thread");
        }

        let clock = WebClock::new(config.use_raf);
        let sink = clock.sink();
        let scheduler = Scheduler::new(config, clock);
        let stop = scheduler.stop_handle();
        let inner = Rc::new(RefCell::new(scheduler));

        let weak = Rc::downgrade(&inner);
        sink.install(move |handle| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match inner.try_borrow_mut() {
                Ok(mut scheduler) => scheduler.fire(handle),
                Err(_) => log::warn!("frame {handle:?} fired while the scheduler was busy"),
            };
        });

        Ok(WebScheduler {
            inner,
            stop,
            stats_frame: StatsFrame::default(),
        })
    }

    pub fn start(&self) -> Result<(), JsValue> {
        match self.with_inner("start", |s| s.start()) {
            Some(result) => result.map_err(to_js),
            None => Err(JsValue::from_str("start() cannot be called from inside a scheduler callback")),
        }
    }

    pub fn stop(&self) {
        self.stop.stop();
        if let Ok(mut scheduler) = self.inner.try_borrow_mut() {
            scheduler.stop();
        }
    }

    pub fn destroy(&self) {
        self.stop();
        self.with_inner("destroy", |s| s.destroy());
    }

    #[wasm_bindgen(js_name = setMode)]
    pub fn set_mode(&self, mode: &str, target_fps: Option<f64>) -> Result<(), JsValue> {
        let mode: Mode = mode.parse().map_err(to_js)?;
        let fps = target_fps.unwrap_or(stepline::api::config::DEFAULT_TARGET_FPS);
        self.with_inner("setMode", |s| s.set_mode(mode, fps));
        Ok(())
    }

    #[wasm_bindgen(js_name = setTimeScale)]
    pub fn set_time_scale(&self, scale: f64) {
        self.with_inner("setTimeScale", |s| s.set_time_scale(scale));
    }

    #[wasm_bindgen(js_name = setTimestep)]
    pub fn set_timestep(&self, ms: f64) {
        self.with_inner("setTimestep", |s| s.set_timestep(ms));
    }

    /// `f(timestep_ms, sim_time_ms)`
    #[wasm_bindgen(js_name = setOnUpdate)]
    pub fn set_on_update(&self, f: js_sys::Function) {
        let callbacks = CallbackSet::new().on_update(move |timestep, sim_time| {
            f.call2(
                &JsValue::NULL,
                &JsValue::from_f64(as_ms(timestep)),
                &JsValue::from_f64(as_ms(sim_time)),
            )
            .map(drop)
            .map_err(js_error)
        });
        self.with_inner("setOnUpdate", |s| s.set_callbacks(callbacks));
    }

    /// `f(alpha, render_delta_ms)`
    #[wasm_bindgen(js_name = setOnRender)]
    pub fn set_on_render(&self, f: js_sys::Function) {
        let callbacks = CallbackSet::new().on_render(move |alpha, delta| {
            f.call2(&JsValue::NULL, &JsValue::from_f64(alpha), &JsValue::from_f64(as_ms(delta)))
                .map(drop)
                .map_err(js_error)
        });
        self.with_inner("setOnRender", |s| s.set_callbacks(callbacks));
    }

    #[wasm_bindgen(js_name = setOnPostRender)]
    pub fn set_on_post_render(&self, f: js_sys::Function) {
        let callbacks = CallbackSet::new().on_post_render(move || f.call0(&JsValue::NULL).map(drop).map_err(js_error));
        self.with_inner("setOnPostRender", |s| s.set_callbacks(callbacks));
    }

    // ---- Introspection ----

    #[wasm_bindgen(js_name = statsJson)]
    pub fn stats_json(&self) -> Result<String, JsValue> {
        let stats = self.inner.try_borrow().map_err(to_js)?.stats();
        serde_json::to_string(&stats).map_err(to_js)
    }

    #[wasm_bindgen(js_name = detailedStatsJson)]
    pub fn detailed_stats_json(&self) -> Result<String, JsValue> {
        let stats = self.inner.try_borrow().map_err(to_js)?.detailed_stats();
        serde_json::to_string(&stats).map_err(to_js)
    }

    /// Refresh the shared stats frame and return a pointer to its floats.
    /// JS reads `StatsFrame::FLOATS` f32 values from linear memory.
    #[wasm_bindgen(js_name = statsPtr)]
    pub fn stats_ptr(&mut self) -> *const f32 {
        if let Ok(scheduler) = self.inner.try_borrow() {
            self.stats_frame = StatsFrame::from_snapshot(&scheduler.stats(), scheduler.time_scale());
        }
        self.stats_frame.as_floats().as_ptr()
    }

    #[wasm_bindgen(js_name = isRunning)]
    pub fn is_running(&self) -> bool {
        match self.inner.try_borrow() {
            Ok(scheduler) => scheduler.is_running(),
            Err(_) => !self.stop.is_stopped(),
        }
    }

    pub fn mode(&self) -> Option<String> {
        self.inner.try_borrow().ok().map(|s| s.mode().to_string())
    }

    #[wasm_bindgen(js_name = timeScale)]
    pub fn time_scale(&self) -> Option<f64> {
        self.inner.try_borrow().ok().map(|s| s.time_scale())
    }
}
