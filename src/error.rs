use std::convert::Infallible;

use serde::Serialize;
use thiserror::Error as ThisError;
use warp::http::StatusCode;
use warp::{reject, reply, Rejection, Reply};

/// Failure taxonomy shared by the domain, the store, and the web layer. All
/// variants are recovered at the request boundary; none crash the process.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Conflict(String),
    #[error("invalid or missing credentials")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    /// A compare-and-swap write lost a race; callers retry and this only
    /// escapes once retries are exhausted.
    #[error("record was modified concurrently")]
    StaleWrite,
    #[error("storage failure: {0}")]
    Store(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Error {
        Error::NotFound(what.into())
    }
    pub fn invalid_input(message: impl Into<String>) -> Error {
        Error::InvalidInput(message.into())
    }
    pub fn invalid_state(message: impl Into<String>) -> Error {
        Error::InvalidState(message.into())
    }
    pub fn conflict(message: impl Into<String>) -> Error {
        Error::Conflict(message.into())
    }
    pub fn forbidden(message: impl Into<String>) -> Error {
        Error::Forbidden(message.into())
    }
    pub fn store(message: impl std::fmt::Display) -> Error {
        Error::Store(message.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) | Error::InvalidState(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::StaleWrite | Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Reject gives us From<Error> for Rejection through warp's blanket impl.
impl reject::Reject for Error {}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps rejections to the JSON `{ "error": ... }` envelope. Server-side
/// failures are logged and redacted.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if let Some(error) = err.find::<Error>() {
        let code = error.status_code();
        if code == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %error, "request failed");
            (code, "internal server error".to_string())
        } else {
            (code, error.to_string())
        }
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "resource not found".to_string())
    } else if let Some(body_err) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, body_err.to_string())
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "invalid query string".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "method not allowed".to_string(),
        )
    } else {
        tracing::error!(?err, "unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        )
    };

    Ok(reply::with_status(
        reply::json(&ErrorBody { error: message }),
        code,
    ))
}
