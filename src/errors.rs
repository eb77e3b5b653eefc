//! Custom Error that Actix web automatically converts to a HTTP response.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use actix_web::{HttpResponse, error::ResponseError, http::StatusCode};


#[macro_export]
macro_rules! safe_eject {
    ($e:expr, $err_status:expr) => {
        $e.map_err(|x| $crate::errors::CustomError::new(x.to_string(), $err_status))
    };
    ($e:expr, $err_status:expr, $context:expr) => {
        $e.map_err(|x| $crate::errors::CustomError::new(format!("{}: {}", $context, x), $err_status))
    };
}


/// The status of the custom error.
///
/// # Fields
/// * `NotFound` - The requested record was not found.
/// * `Unauthorized` - The caller could not be authenticated.
/// * `BadRequest` - The request was bad.
/// * `Conflict` - The request conflicted with an existing record.
/// * `Config` - A config variable is missing or can't be parsed.
/// * `Database` - The database could not be reached or rejected the operation.
/// * `Unknown` - An unknown internal error occurred.
#[derive(Error, Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
pub enum CustomErrorStatus {
    #[error("Requested record was not found")]
    NotFound,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Bad Request")]
    BadRequest,
    #[error("Conflict")]
    Conflict,
    #[error("Configuration Error")]
    Config,
    #[error("Database Error")]
    Database,
    #[error("Unknown Internal Error")]
    Unknown
}


/// The custom error that Actix web automatically converts to a HTTP response.
///
/// # Fields
/// * `message` - The message of the error.
/// * `status` - The status of the error.
#[derive(Serialize, Deserialize, Debug, Error, PartialEq)]
#[error("{message}")]
pub struct CustomError {
    pub message: String,
    pub status: CustomErrorStatus
}

impl CustomError {

    /// Constructs a new error.
    ///
    /// # Arguments
    /// * `message` - The message of the error.
    /// * `status` - The status of the error.
    ///
    /// # Returns
    /// * `CustomError` - The new error.
    pub fn new(message: String, status: CustomErrorStatus) -> CustomError {
        CustomError {
            message,
            status
        }
    }
}

impl ResponseError for CustomError {

    /// Yields the status code for the error.
    ///
    /// # Returns
    /// * `StatusCode` - The status code for the error.
    fn status_code(&self) -> StatusCode {
        match self.status {
            CustomErrorStatus::NotFound => StatusCode::NOT_FOUND,
            CustomErrorStatus::Unauthorized => StatusCode::UNAUTHORIZED,
            CustomErrorStatus::BadRequest => StatusCode::BAD_REQUEST,
            CustomErrorStatus::Conflict => StatusCode::CONFLICT,
            CustomErrorStatus::Config
            | CustomErrorStatus::Database
            | CustomErrorStatus::Unknown => StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Constructs a HTTP response for the error.
    ///
    /// # Returns
    /// * `HttpResponse` - The HTTP response for the error.
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        HttpResponse::build(status_code).json(self.message.clone())
    }
}


/// The reasons a bearer token can be rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("no authorization token was found")]
    Missing,
    #[error("token can't be decoded")]
    Malformed,
    #[error("token algorithm is not allowed")]
    InvalidAlgorithm,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("token issuer mismatch")]
    InvalidIssuer,
    #[error("token audience mismatch")]
    InvalidAudience,
    #[error("signing key not found: {0}")]
    KeyNotFound(String),
    #[error("signing key set unavailable: {0}")]
    KeySetUnavailable(String),
    #[error("too many key set requests")]
    RateLimited
}

impl From<AuthError> for CustomError {

    fn from(error: AuthError) -> Self {
        CustomError::new(error.to_string(), CustomErrorStatus::Unauthorized)
    }
}
