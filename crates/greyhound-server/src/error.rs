//! Handler error taxonomy and its mapping to HTTP statuses.
//!
//! Handlers carry one of these variants; conversion to an HTTP response
//! happens at the router boundary and nowhere else. `Disconnected` is not an
//! HTTP status: it marks a client that went away mid-stream, and the owning
//! handler simply releases its resources.

use hyper::StatusCode;
use thiserror::Error;

use greyhound_core::{OpenError, ParamError, QueryError};

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),

    #[error("client disconnected")]
    Disconnected,
}

impl HttpError {
    /// The HTTP status for this error; `None` for disconnects, which have
    /// no response to carry one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::BadRequest(_) => Some(StatusCode::BAD_REQUEST),
            HttpError::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            HttpError::NotFound(_) => Some(StatusCode::NOT_FOUND),
            HttpError::Internal(_) => Some(StatusCode::INTERNAL_SERVER_ERROR),
            HttpError::Disconnected => None,
        }
    }

    /// A resource that resolved under no configured path.
    pub fn no_resource(name: &str) -> HttpError {
        HttpError::NotFound(format!("{name} could not be created"))
    }
}

impl From<ParamError> for HttpError {
    fn from(e: ParamError) -> Self {
        HttpError::BadRequest(e.to_string())
    }
}

impl From<QueryError> for HttpError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::InvalidQuery(_) => HttpError::BadRequest(e.to_string()),
            QueryError::Failed(_) => HttpError::Internal(e.to_string()),
        }
    }
}

impl From<OpenError> for HttpError {
    fn from(e: OpenError) -> Self {
        HttpError::NotFound(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HttpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            HttpError::BadRequest("x".into()).status(),
            Some(StatusCode::BAD_REQUEST)
        );
        assert_eq!(HttpError::Unauthorized.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(
            HttpError::no_resource("ghost").status(),
            Some(StatusCode::NOT_FOUND)
        );
        assert_eq!(
            HttpError::Internal("x".into()).status(),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );
        assert_eq!(HttpError::Disconnected.status(), None);
    }

    #[test]
    fn test_not_found_message() {
        let e = HttpError::no_resource("ghost");
        assert_eq!(e.to_string(), "ghost could not be created");
    }

    #[test]
    fn test_query_error_split() {
        let bad: HttpError = QueryError::InvalidQuery("nope".into()).into();
        assert!(matches!(bad, HttpError::BadRequest(_)));
        let failed: HttpError = QueryError::Failed("boom".into()).into();
        assert!(matches!(failed, HttpError::Internal(_)));
    }
}
