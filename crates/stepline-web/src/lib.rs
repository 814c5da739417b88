pub mod clock;
pub mod runner;

pub use clock::{TickSink, WebClock};
pub use runner::WebScheduler;

/// Route `log` output to the browser console and panics to `console.error`.
/// Safe to call more than once.
pub(crate) fn init_logging() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}
