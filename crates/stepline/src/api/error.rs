use thiserror::Error;

/// Errors surfaced by the scheduler's fallible entry points.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler has been destroyed")]
    Destroyed,
    #[error("invalid scheduler config: {0}")]
    Config(#[from] serde_json::Error),
}

/// Failures of the worker offload path. None of these are fatal: the
/// scheduler falls back to running updates inline.
#[derive(Debug, Error)]
pub enum OffloadError {
    #[error("offload worker is unavailable")]
    Unavailable,
    #[error("offload worker disconnected")]
    Disconnected,
    #[error("failed to spawn offload worker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("malformed offload message: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("offload protocol version mismatch: expected {expected}, got {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("offload response for frame {found} while waiting on frame {expected}")]
    FrameMismatch { expected: u64, found: u64 },
    #[error("offload response reported {ticks} updates, limit is {limit}")]
    TooManyTicks { ticks: u32, limit: u32 },
}

/// A mode name that is not `fixed`, `adaptive` or `unlimited`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown scheduler mode `{0}`")]
pub struct UnknownMode(pub String);
