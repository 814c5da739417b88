//! Running the update drain off the scheduling thread.
//!
//! The scheduler hands a [`WorkerRequest`] to an [`OffloadBackend`] and
//! blocks on [`OffloadBackend::wait`] until the matching response arrives.
//! [`ThreadOffload`] is the native backend: one named thread that owns the
//! simulation ([`OffloadTask`]) and talks JSON over channels.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error};

use crate::api::callbacks::{guarded, CallbackResult};
use crate::api::error::OffloadError;
use crate::bridge::protocol::{WorkerRequest, WorkerResponse, PROTOCOL_VERSION};
use crate::core::integrator::{Accumulator, DrainHalt, StepControl};
use crate::core::time::to_nanos;

/// Simulation owned by the offload worker.
pub trait OffloadTask: Send + 'static {
    /// Advance one fixed step.
    fn step(&mut self, timestep: Duration, sim_time: Duration) -> CallbackResult;

    /// State handed to the scheduler's `on_offload_sync` after each drain.
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Transport to wherever the offloaded drain runs.
pub trait OffloadBackend {
    fn is_available(&self) -> bool {
        true
    }

    fn submit(&mut self, request: &WorkerRequest) -> Result<(), OffloadError>;

    /// Block until the worker answers the last submitted request.
    fn wait(&mut self) -> Result<WorkerResponse, OffloadError>;
}

/// Offload backend backed by a dedicated OS thread.
pub struct ThreadOffload {
    requests: Option<Sender<String>>,
    responses: Receiver<String>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadOffload {
    pub fn spawn<T: OffloadTask>(task: T) -> Result<Self, OffloadError> {
        let (request_tx, request_rx) = mpsc::channel::<String>();
        let (response_tx, response_rx) = mpsc::channel::<String>();

        let worker = thread::Builder::new()
            .name("stepline-offload".into())
            .spawn(move || worker_loop(task, request_rx, response_tx))?;

        debug!("offload worker started");
        Ok(Self {
            requests: Some(request_tx),
            responses: response_rx,
            worker: Some(worker),
        })
    }
}

impl OffloadBackend for ThreadOffload {
    fn is_available(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn submit(&mut self, request: &WorkerRequest) -> Result<(), OffloadError> {
        let text = request.encode()?;
        self.requests
            .as_ref()
            .ok_or(OffloadError::Disconnected)?
            .send(text)
            .map_err(|_| OffloadError::Disconnected)
    }

    fn wait(&mut self) -> Result<WorkerResponse, OffloadError> {
        let text = self.responses.recv().map_err(|_| OffloadError::Disconnected)?;
        WorkerResponse::decode(&text)
    }
}

impl Drop for ThreadOffload {
    fn drop(&mut self) {
        // closing the request channel ends the worker loop
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("offload worker panicked");
            }
        }
    }
}

fn worker_loop<T: OffloadTask>(mut task: T, requests: Receiver<String>, responses: Sender<String>) {
    for text in requests {
        let response = match WorkerRequest::decode(&text) {
            Ok(request) => run_request(&mut task, &request),
            Err(err) => WorkerResponse::failed(0, err.to_string()),
        };

        let encoded = match response.encode() {
            Ok(encoded) => encoded,
            Err(err) => {
                error!("offload worker could not encode response: {err}");
                return;
            }
        };
        if responses.send(encoded).is_err() {
            return;
        }
    }
    debug!("offload worker exiting");
}

fn run_request<T: OffloadTask>(task: &mut T, request: &WorkerRequest) -> WorkerResponse {
    let mut acc = Accumulator::restore(request.timestep(), request.accumulator(), request.sim_time());
    let origin = Instant::now();
    let mut failure = None;

    let outcome = acc.drain(
        request.max_updates,
        request.budget(),
        || origin.elapsed(),
        |timestep, sim_time| match guarded(|| task.step(timestep, sim_time)) {
            Ok(()) => StepControl::Continue,
            Err(message) => {
                failure = Some(message);
                StepControl::Halt
            }
        },
    );

    WorkerResponse {
        version: PROTOCOL_VERSION,
        frame: request.frame,
        ticks: outcome.updates,
        accumulator_ns: to_nanos(acc.pending()),
        sim_time_ns: to_nanos(acc.sim_time()),
        budget_exceeded: outcome.halt == Some(DrainHalt::Budget),
        error: failure,
        state: task.snapshot(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Counter {
        steps: Arc<AtomicU32>,
        fail_on: Option<u32>,
    }

    impl OffloadTask for Counter {
        fn step(&mut self, _timestep: Duration, _sim_time: Duration) -> CallbackResult {
            let n = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(n) {
                return Err(format!("step {n} failed").into());
            }
            Ok(())
        }

        fn snapshot(&self) -> serde_json::Value {
            serde_json::json!({ "steps": self.steps.load(Ordering::SeqCst) })
        }
    }

    fn request(frame: u64, accumulator: Duration) -> WorkerRequest {
        WorkerRequest::new(
            frame,
            Duration::from_millis(10),
            10,
            Duration::from_secs(1),
            accumulator,
            Duration::ZERO,
        )
    }

    #[test]
    fn worker_drains_and_reports_state() {
        let steps = Arc::new(AtomicU32::new(0));
        let mut offload = ThreadOffload::spawn(Counter {
            steps: steps.clone(),
            fail_on: None,
        })
        .unwrap();
        assert!(offload.is_available());

        let req = request(1, Duration::from_millis(35));
        offload.submit(&req).unwrap();
        let resp = offload.wait().unwrap();
        resp.check(&req).unwrap();

        assert_eq!(resp.ticks, 3);
        assert_eq!(resp.accumulator(), Duration::from_millis(5));
        assert_eq!(resp.sim_time(), Duration::from_millis(30));
        assert_eq!(resp.state["steps"], 3);
        assert_eq!(steps.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failing_step_is_reported_not_fatal() {
        let steps = Arc::new(AtomicU32::new(0));
        let mut offload = ThreadOffload::spawn(Counter {
            steps,
            fail_on: Some(2),
        })
        .unwrap();

        let req = request(4, Duration::from_millis(50));
        offload.submit(&req).unwrap();
        let resp = offload.wait().unwrap();
        assert_eq!(resp.ticks, 2);
        assert_eq!(resp.error.as_deref(), Some("step 2 failed"));
        assert_eq!(resp.accumulator(), Duration::from_millis(30));

        // the worker keeps serving after a failure
        let req = request(5, Duration::from_millis(10));
        offload.submit(&req).unwrap();
        assert_eq!(offload.wait().unwrap().ticks, 1);
    }

    #[test]
    fn panicking_step_is_caught() {
        struct Panics;
        impl OffloadTask for Panics {
            fn step(&mut self, _: Duration, _: Duration) -> CallbackResult {
                panic!("worker step blew up");
            }
        }

        let mut offload = ThreadOffload::spawn(Panics).unwrap();
        let req = request(1, Duration::from_millis(10));
        offload.submit(&req).unwrap();
        let resp = offload.wait().unwrap();
        assert_eq!(resp.error.as_deref(), Some("panicked: worker step blew up"));
        assert!(offload.is_available());
    }
}
