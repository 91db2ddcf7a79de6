use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use super::domain::Applicant;
use super::repository::ApplicantRepository;
use super::router::ApplicantState;
use crate::boundary::ApiError;
use crate::mail::Mailer;

/// Applicant resolved from the request's session token.
#[derive(Debug, Clone)]
pub struct SessionApplicant(pub Applicant);

/// Resolve `Authorization: <scheme> <session token>` to an applicant, if any.
///
/// A missing header, or a valid token whose magic token no longer matches a record, leaves the
/// request anonymous. A header that is not exactly two space-separated parts is rejected.
pub async fn fetch_session<R, M>(
    State(state): State<ApplicantState<R, M>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    R: ApplicantRepository + 'static,
    M: Mailer + 'static,
{
    let Some(credential) = bearer_credential(request.headers())? else {
        return Ok(next.run(request).await);
    };

    match state.service.resolve_session(&credential)? {
        Some(applicant) => {
            request
                .extensions_mut()
                .insert(SessionApplicant(applicant));
        }
        None => debug!("session token matched no applicant"),
    }

    Ok(next.run(request).await)
}

fn bearer_credential(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::invalid_authorization_header())?;

    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        [_scheme, credential] => Ok(Some((*credential).to_string())),
        _ => Err(ApiError::invalid_authorization_header()),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionApplicant
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionApplicant>()
            .cloned()
            .ok_or_else(ApiError::no_session)
    }
}
