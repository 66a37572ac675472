use thiserror::Error;

use crate::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum BookingError {
    /// Malformed, missing or out-of-range input. Nothing was touched.
    #[error("{0}")]
    InvalidArgument(&'static str),
    /// The request is well formed but the booking's state forbids it.
    #[error("{0}")]
    FailedPrecondition(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("repository failure: {0}")]
    Repository(#[from] RepositoryError),
}

impl BookingError {
    /// Stable machine-readable code, used on the wire and as a metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::InvalidArgument(_) => "invalid_argument",
            BookingError::FailedPrecondition(_) => "failed_precondition",
            BookingError::LimitExceeded(_) => "limit_exceeded",
            BookingError::Repository(_) => "repository",
        }
    }
}
