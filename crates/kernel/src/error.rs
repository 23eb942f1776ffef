//! Application error types.
//!
//! Every handler returns [`AppResult`]; layer errors convert into
//! [`AppError`], which picks the status code and renders a JSON body of the
//! form `{"error": "...", "fields": [...]}`.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::content::{FieldError, ResourceError};
use crate::file::AttachmentError;
use crate::query::QueryError;
use crate::store::StoreError;

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    #[error("service temporarily unavailable")]
    Unavailable(String),

    #[error("query timed out")]
    Timeout,

    #[error("store error")]
    Store(StoreError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [FieldError]>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Internal(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Unavailable(_) | Self::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let error = match &self {
            Self::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                self.to_string()
            }
            Self::Store(e) => {
                tracing::error!(error = %e, "store error");
                "internal server error".to_string()
            }
            Self::Unavailable(reason) => {
                tracing::warn!(reason = %reason, "store unavailable");
                self.to_string()
            }
            _ => self.to_string(),
        };
        let fields = match &self {
            Self::Validation(fields) => Some(fields.as_slice()),
            _ => None,
        };

        let mut response = (status, Json(ErrorBody { error, fields })).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => Self::Unavailable(reason),
            StoreError::Timeout => Self::Timeout,
            StoreError::Conflict { constraint } => Self::Conflict(match constraint {
                Some(c) => format!("record conflicts with existing data ({c})"),
                None => "record conflicts with existing data".to_string(),
            }),
            StoreError::InvalidReference { constraint } => Self::BadRequest(match constraint {
                Some(c) => format!("referenced record does not exist ({c})"),
                None => "referenced record does not exist".to_string(),
            }),
            other => Self::Store(other),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Store(e) => e.into(),
            QueryError::UnknownFilter { field, allowed } => {
                let message = if allowed.is_empty() {
                    "is not a filterable field; this resource accepts no filters".to_string()
                } else {
                    format!("is not a filterable field; allowed: {}", allowed.join(", "))
                };
                Self::Validation(vec![FieldError::new(field, message)])
            }
            QueryError::InvalidFilterValue {
                field,
                value,
                expected,
            } => Self::Validation(vec![FieldError::new(
                field,
                format!("invalid value '{value}': expected {expected}"),
            )]),
        }
    }
}

impl From<AttachmentError> for AppError {
    fn from(err: AttachmentError) -> Self {
        match err {
            AttachmentError::TooLarge { .. } => Self::PayloadTooLarge(err.to_string()),
            AttachmentError::UnsupportedType(_) => Self::UnsupportedMediaType(err.to_string()),
            AttachmentError::Empty { .. } => Self::BadRequest(err.to_string()),
            AttachmentError::Storage(e) => Self::Internal(e.context("file storage failed")),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::WeakSecret => Self::Internal(anyhow::anyhow!(err)),
            other => Self::Unauthorized(other.to_string()),
        }
    }
}

impl From<FieldError> for AppError {
    fn from(err: FieldError) -> Self {
        Self::Validation(vec![err])
    }
}

impl From<ResourceError> for AppError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::NotFound { .. } => Self::NotFound(err.to_string()),
            ResourceError::Validation(fields) => Self::Validation(fields),
            ResourceError::Conflict { .. } => Self::Conflict(err.to_string()),
            ResourceError::Unauthenticated => Self::Unauthorized(err.to_string()),
            ResourceError::AttachmentCleanup { .. } => Self::BadRequest(err.to_string()),
            ResourceError::Query(e) => e.into(),
            ResourceError::Store(e) => e.into(),
            ResourceError::Attachment(e) => e.into(),
        }
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;
