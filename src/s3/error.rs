use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single S3 call
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service answered with a non 2xx status
    #[error(
        "{code}: {message} (HTTP status: {status}, request id: {})",
        .request_id.as_deref().unwrap_or("-")
    )]
    Service {
        status: StatusCode,
        code: String,
        message: String,
        request_id: Option<String>,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    #[must_use]
    pub fn service(status: StatusCode, code: &str, message: &str) -> Self {
        Self::Service {
            status,
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Service { status, .. } => Some(*status),
            Self::Http(e) => e.status(),
            Self::Other(_) => None,
        }
    }

    /// `If-Match` did not hold, the object changed since it was planned
    #[must_use]
    pub fn is_precondition_failed(&self) -> bool {
        match self {
            Self::Service { status, code, .. } => {
                *status == StatusCode::PRECONDITION_FAILED || code == "PreconditionFailed"
            }
            _ => self.status() == Some(StatusCode::PRECONDITION_FAILED),
        }
    }
}
