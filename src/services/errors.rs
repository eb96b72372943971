use thiserror::Error;

use crate::repositories::StoreError;
use crate::tasks::queue::QueueError;

/// Failure of an external collaborator (speech, evaluation, blob storage).
#[derive(Debug, Error)]
pub(crate) enum ServiceError {
    #[error("request timed out")]
    Timeout,
    #[error("service responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{0} is not configured")]
    Disabled(&'static str),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Returns the response untouched on 2xx, otherwise the status with a truncated body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status { status: status.as_u16(), body: body.chars().take(500).collect() })
}

/// Domain errors of the exam and attempt lifecycle operations.
#[derive(Debug, Error)]
pub(crate) enum LifecycleError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("attempt already finished")]
    AlreadyStarted,
    #[error("exam is not open for attempts")]
    WindowClosed,
    #[error("attempt deadline has passed")]
    DeadlinePassed,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Storage(#[from] ServiceError),
}
