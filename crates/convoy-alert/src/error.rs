use thiserror::Error;

/// Why an alert could not be delivered.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery timed out after {0}ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("receiver answered {0}")]
    Rejected(u16),

    #[error("failed to build notifier: {0}")]
    Build(String),
}

pub type NotifyResult<T> = Result<T, NotifyError>;
