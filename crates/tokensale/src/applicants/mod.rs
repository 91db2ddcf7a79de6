//! Applicant lifecycle: apply, authenticate, register, participate.
//!
//! Sessions are server-held capabilities rather than stateless JWTs. The session token only
//! wraps the applicant's stored magic token, so reissuing (or clearing) that value revokes every
//! session handed out before it.

pub mod domain;
pub mod mnemonic;
pub mod repository;
pub mod router;
pub mod service;
pub mod session;

#[cfg(test)]
mod tests;

pub use domain::{
    Applicant, ApplicantId, ApplicantPhase, ApplicantProfile, ApplicationReceipt, ApplyRequest,
    MagicToken, ParticipationRequest, RegistrationRequest, SessionGrant, SessionRequest,
};
pub use repository::{ApplicantRepository, RepositoryError};
pub use router::{api_router, applicant_router, ApplicantState, APPLICANTS_PREFIX};
pub use service::{ApplicantService, ApplicantServiceError};
pub use session::SessionApplicant;
