/// Offload wire protocol.
///
/// One request per frame goes to the worker, one response comes back.
/// Both are JSON objects; durations travel as integer nanoseconds so the
/// accumulator survives the round trip bit-for-bit.
///
/// ```text
/// request:  { version, frame, timestep_ns, max_updates, budget_ns,
///             accumulator_ns, sim_time_ns }
/// response: { version, frame, ticks, accumulator_ns, sim_time_ns,
///             budget_exceeded, error?, state? }
/// ```
///
/// Every message carries `version`. A peer speaking another version is
/// rejected before the rest of the message is interpreted.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::error::OffloadError;
use crate::core::time::to_nanos;

/// Protocol version written into every message.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

fn check_version(text: &str) -> Result<(), OffloadError> {
    let header: VersionHeader = serde_json::from_str(text)?;
    if header.version != PROTOCOL_VERSION {
        return Err(OffloadError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            found: header.version,
        });
    }
    Ok(())
}

/// Scheduler to worker: drain this accumulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub version: u32,
    /// Monotonic frame counter, echoed back in the response.
    pub frame: u64,
    pub timestep_ns: u64,
    pub max_updates: u32,
    pub budget_ns: u64,
    pub accumulator_ns: u64,
    pub sim_time_ns: u64,
}

impl WorkerRequest {
    pub fn new(
        frame: u64,
        timestep: Duration,
        max_updates: u32,
        budget: Duration,
        accumulator: Duration,
        sim_time: Duration,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            frame,
            timestep_ns: to_nanos(timestep),
            max_updates,
            budget_ns: to_nanos(budget),
            accumulator_ns: to_nanos(accumulator),
            sim_time_ns: to_nanos(sim_time),
        }
    }

    pub fn encode(&self) -> Result<String, OffloadError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, OffloadError> {
        check_version(text)?;
        Ok(serde_json::from_str(text)?)
    }

    pub fn timestep(&self) -> Duration {
        Duration::from_nanos(self.timestep_ns)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_nanos(self.budget_ns)
    }

    pub fn accumulator(&self) -> Duration {
        Duration::from_nanos(self.accumulator_ns)
    }

    pub fn sim_time(&self) -> Duration {
        Duration::from_nanos(self.sim_time_ns)
    }
}

/// Worker to scheduler: what the drain did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub version: u32,
    pub frame: u64,
    /// Steps executed by the worker.
    pub ticks: u32,
    pub accumulator_ns: u64,
    pub sim_time_ns: u64,
    pub budget_exceeded: bool,
    /// Set when a step failed or the request could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Opaque task state for the sync callback.
    #[serde(default)]
    pub state: serde_json::Value,
}

impl WorkerResponse {
    /// A response that ran nothing and reports `error`.
    pub fn failed(frame: u64, error: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            frame,
            ticks: 0,
            accumulator_ns: 0,
            sim_time_ns: 0,
            budget_exceeded: false,
            error: Some(error.into()),
            state: serde_json::Value::Null,
        }
    }

    pub fn encode(&self) -> Result<String, OffloadError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, OffloadError> {
        check_version(text)?;
        Ok(serde_json::from_str(text)?)
    }

    /// Reject responses that do not answer `request`.
    pub fn check(&self, request: &WorkerRequest) -> Result<(), OffloadError> {
        if self.version != PROTOCOL_VERSION {
            return Err(OffloadError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                found: self.version,
            });
        }
        if self.frame != request.frame {
            return Err(OffloadError::FrameMismatch {
                expected: request.frame,
                found: self.frame,
            });
        }
        if self.ticks > request.max_updates {
            return Err(OffloadError::TooManyTicks {
                ticks: self.ticks,
                limit: request.max_updates,
            });
        }
        Ok(())
    }

    pub fn accumulator(&self) -> Duration {
        Duration::from_nanos(self.accumulator_ns)
    }

    pub fn sim_time(&self) -> Duration {
        Duration::from_nanos(self.sim_time_ns)
    }
}
