use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{OriginalUri, State};
use axum::http::{Method, StatusCode};
use axum::middleware;
use axum::routing::post;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::domain::{
    ApplicantProfile, ApplicationReceipt, ApplyRequest, ParticipationRequest,
    RegistrationRequest, SessionGrant, SessionRequest,
};
use super::repository::ApplicantRepository;
use super::service::ApplicantService;
use super::session::{fetch_session, SessionApplicant};
use crate::boundary::{error_boundary, ApiError, ErrorKind, ErrorObserver};
use crate::mail::Mailer;
use crate::sale::SaleConfig;

/// Path prefix for the applicant endpoints.
pub const APPLICANTS_PREFIX: &str = "/1/applicants";

/// Shared handler state: the lifecycle service plus the read-only sale configuration.
pub struct ApplicantState<R, M> {
    pub service: Arc<ApplicantService<R, M>>,
    pub sale: Arc<SaleConfig>,
}

impl<R, M> Clone for ApplicantState<R, M> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            sale: Arc::clone(&self.sale),
        }
    }
}

impl<R, M> ApplicantState<R, M> {
    pub fn new(service: Arc<ApplicantService<R, M>>, sale: SaleConfig) -> Self {
        Self {
            service,
            sale: Arc::new(sale),
        }
    }
}

/// Success envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

type ApiResult<T> = Result<Json<DataEnvelope<T>>, ApiError>;

fn data<T>(value: T) -> Json<DataEnvelope<T>> {
    Json(DataEnvelope { data: value })
}

/// Applicant routes with session resolution, relative to [`APPLICANTS_PREFIX`].
pub fn applicant_router<R, M>(state: ApplicantState<R, M>) -> Router
where
    R: ApplicantRepository + 'static,
    M: Mailer + 'static,
{
    Router::new()
        .route(
            "/apply",
            post(apply_handler::<R, M>).fallback(route_not_found),
        )
        .route(
            "/sessions",
            post(issue_session_handler::<R, M>)
                .get(fetch_session_handler)
                .fallback(route_not_found),
        )
        .route(
            "/register",
            post(register_handler::<R, M>).fallback(route_not_found),
        )
        .route(
            "/participate",
            post(participate_handler::<R, M>).fallback(route_not_found),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            fetch_session::<R, M>,
        ))
        .with_state(state)
}

/// Full API: applicant routes nested under the versioned prefix, wrapped by the error boundary.
pub fn api_router<R, M>(state: ApplicantState<R, M>, observer: Arc<dyn ErrorObserver>) -> Router
where
    R: ApplicantRepository + 'static,
    M: Mailer + 'static,
{
    Router::new()
        .nest(APPLICANTS_PREFIX, applicant_router(state))
        .fallback(route_not_found)
        .layer(middleware::from_fn_with_state(observer, error_boundary))
}

/// Unknown paths and unsupported methods still answer with the error envelope.
async fn route_not_found(method: Method, OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::new(ErrorKind::NotFound, format!("Cannot {method} {}", uri.path()))
        .with_status(StatusCode::NOT_FOUND)
}

/// An empty body reads as `{}` so handlers report the missing field rather than the body.
/// Buffering failures (oversized or interrupted bodies) keep the status axum assigns them.
fn parse_body<T>(body: Result<Bytes, BytesRejection>) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
{
    let body = body.map_err(|rejection| {
        ApiError::new(ErrorKind::Validation, rejection.body_text()).with_status(rejection.status())
    })?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&body)
        .map_err(|err| ApiError::new(ErrorKind::Validation, format!("Invalid JSON body: {err}")))
}

pub(crate) async fn apply_handler<R, M>(
    State(state): State<ApplicantState<R, M>>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<ApplicationReceipt>
where
    R: ApplicantRepository + 'static,
    M: Mailer + 'static,
{
    let request: ApplyRequest = parse_body(body)?;
    let applicant = state.service.apply(&state.sale, request)?;
    Ok(data(applicant.application_receipt()))
}

pub(crate) async fn issue_session_handler<R, M>(
    State(state): State<ApplicantState<R, M>>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<SessionGrant>
where
    R: ApplicantRepository + 'static,
    M: Mailer + 'static,
{
    let request: SessionRequest = parse_body(body)?;
    let grant = state.service.issue_session(request)?;
    Ok(data(grant))
}

pub(crate) async fn fetch_session_handler(
    SessionApplicant(applicant): SessionApplicant,
) -> ApiResult<ApplicantProfile> {
    Ok(data(applicant.profile()))
}

pub(crate) async fn register_handler<R, M>(
    State(state): State<ApplicantState<R, M>>,
    SessionApplicant(applicant): SessionApplicant,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<ApplicantProfile>
where
    R: ApplicantRepository + 'static,
    M: Mailer + 'static,
{
    let request: RegistrationRequest = parse_body(body)?;
    let updated = state.service.register(&state.sale, &applicant, request)?;
    Ok(data(updated.profile()))
}

pub(crate) async fn participate_handler<R, M>(
    State(state): State<ApplicantState<R, M>>,
    SessionApplicant(applicant): SessionApplicant,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<ApplicantProfile>
where
    R: ApplicantRepository + 'static,
    M: Mailer + 'static,
{
    let request: ParticipationRequest = parse_body(body)?;
    let updated = state.service.participate(&applicant, request)?;
    Ok(data(updated.profile()))
}
