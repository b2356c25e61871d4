//! Pod runtime error types.

use thiserror::Error;

/// Errors surfaced by a pod runtime implementation.
///
/// The reconciler treats every one of these as a transient collaborator
/// failure: probes count as failed, kills are ignored, spawns are retried
/// on a later pass.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("agent request failed: {0}")]
    Http(String),

    #[error("agent returned {status} for {op}")]
    Status { op: &'static str, status: u16 },

    #[error("malformed agent response: {0}")]
    Decode(String),

    #[error("spawn rejected: {0}")]
    SpawnRejected(String),

    #[error("no free ports left")]
    PortsExhausted,
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

impl From<reqwest::Error> for RuntimeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RuntimeError::Decode(e.to_string())
        } else {
            RuntimeError::Http(e.to_string())
        }
    }
}
