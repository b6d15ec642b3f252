use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hitit_collab::{AuthError, CollabError, DatabaseError};
use log::error;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

/// The body of every error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// The category of the error, for example "not_found"
    error: &'static str,
    message: String,
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) | Self::InvalidCredentials => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn category(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::Validation(_) => "validation",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unauthorized(_) => "unauthorized",
            Self::Unknown(_) => "internal",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Unknown(detail) => {
                error!("Request failed: {}", detail);
                "An internal error occurred".to_string()
            }
            e => e.to_string(),
        };

        let body = ErrorBody {
            error: self.category(),
            message,
        };

        (self.as_status_code(), Json(body)).into_response()
    }
}

impl From<CollabError> for ServerError {
    fn from(value: CollabError) -> Self {
        match value {
            CollabError::NotFound(message) => Self::NotFound(message),
            CollabError::Forbidden(message) => Self::Forbidden(message),
            CollabError::Conflict(message) => Self::Conflict(message),
            CollabError::Validation(message) => Self::Validation(message),
            CollabError::Db(e) => Self::Unknown(e.to_string()),
        }
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        CollabError::from(value).into()
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::Db(e) => e.into(),
            e => Self::Unknown(e.to_string()),
        }
    }
}
