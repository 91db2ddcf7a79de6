//! Outer error boundary for the HTTP surface.
//!
//! Every request-level failure is an [`ApiError`]. Its response carries the uniform
//! `{ "error": { "message": ... } }` envelope and a copy of the error in the response extensions,
//! which [`error_boundary`] hands to the process-wide [`ErrorObserver`] once the response is built.

use std::fmt;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::applicants::service::ApplicantServiceError;
use crate::applicants::repository::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authentication,
    State,
    NoSession,
    Conflict,
    NotFound,
    Internal,
}

/// Tagged request failure. `status` is only set when a handler declares one; the response falls
/// back to 500 otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<StatusCode>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn no_session() -> Self {
        Self::new(ErrorKind::NoSession, "No jwt token found").with_status(StatusCode::UNAUTHORIZED)
    }

    pub fn invalid_authorization_header() -> Self {
        Self::new(ErrorKind::Authentication, "Invalid Authorization Token")
    }

    pub fn status_code(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": { "message": &self.message } }));
        let mut response = (status, body).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl From<ApplicantServiceError> for ApiError {
    fn from(value: ApplicantServiceError) -> Self {
        let message = value.to_string();
        match value {
            ApplicantServiceError::InvalidField { .. } => Self::new(ErrorKind::Validation, message),
            ApplicantServiceError::SaleClosed => {
                Self::new(ErrorKind::State, message).with_status(StatusCode::FORBIDDEN)
            }
            ApplicantServiceError::AlreadyApplied => {
                Self::new(ErrorKind::Conflict, message).with_status(StatusCode::CONFLICT)
            }
            ApplicantServiceError::UnknownApplicant => {
                Self::new(ErrorKind::NotFound, message).with_status(StatusCode::NOT_FOUND)
            }
            ApplicantServiceError::AlreadyRegistered
            | ApplicantServiceError::RegistrationIncomplete => Self::new(ErrorKind::State, message),
            ApplicantServiceError::Token(_) => Self::new(ErrorKind::Authentication, message),
            ApplicantServiceError::Repository(RepositoryError::Conflict) => {
                Self::new(ErrorKind::Conflict, message).with_status(StatusCode::CONFLICT)
            }
            ApplicantServiceError::Repository(_) => Self::new(ErrorKind::Internal, message),
        }
    }
}

/// Receives every error response produced under the boundary. Must not block.
pub trait ErrorObserver: Send + Sync {
    fn observe(&self, error: &ApiError, method: &Method, path: &str);
}

/// Default observer: server errors at `error`, everything else at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ErrorObserver for TracingObserver {
    fn observe(&self, err: &ApiError, method: &Method, path: &str) {
        let status = err.status_code().as_u16();
        if err.status_code().is_server_error() {
            error!(%method, path, status, kind = ?err.kind, message = %err.message, "request failed");
        } else {
            warn!(%method, path, status, kind = ?err.kind, message = %err.message, "request rejected");
        }
    }
}

/// Middleware reporting error responses to the observer after they have been built.
pub async fn error_boundary(
    State(observer): State<Arc<dyn ErrorObserver>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    if let Some(err) = response.extensions().get::<ApiError>() {
        observer.observe(err, &method, &path);
    }
    response
}
