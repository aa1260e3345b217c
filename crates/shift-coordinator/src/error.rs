//! Typed error enums, one per component boundary, `thiserror`-derived. `anyhow` is
//! reserved for the binary/orchestration edge, not these component boundaries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("not found")]
    NotFound,
    #[error("ambiguous match: {0}")]
    Ambiguous(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound,
            other => RepositoryError::BackendUnavailable(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("job not found")]
    NotFound,
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        QueueError::BackendUnavailable(err.to_string())
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("unparsable input")]
    Unparsable,
}

#[derive(Debug, Error)]
pub enum FsmError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("arbiter rejected: {0}")]
    ArbiterRejected(String),
    #[error("session expired or missing")]
    SessionMissing,
}

#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("race lost: occurrence status no longer matched the expected value")]
    RaceLost,
    #[error("invalid intent: {0}")]
    InvalidIntent(String),
}

#[derive(Debug, Error)]
pub enum PhoneError {
    #[error("invalid phone number: {0}")]
    InvalidNumber(String),
}
