//! Controller error types.

use thiserror::Error;

use convoy_state::StateError;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("state store: {0}")]
    State(#[from] StateError),

    #[error("invalid config {path}: {reason}")]
    Config { path: String, reason: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type ControllerResult<T> = Result<T, ControllerError>;
