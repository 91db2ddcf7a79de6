use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{
    Applicant, ApplicantId, ApplyRequest, MagicToken, ParticipationRequest, RegistrationRequest,
    SessionGrant, SessionRequest,
};
use super::mnemonic;
use super::repository::{ApplicantRepository, RepositoryError};
use crate::mail::{EmailMessage, EmailTemplate, Mailer};
use crate::sale::SaleConfig;
use crate::tokens::{TokenCodec, TokenError};

/// Lifecycle rules for apply → session → register → participate.
///
/// The sale configuration is passed into each call rather than held here, so one service can be
/// driven against different windows (tests, demos) without shared mutable state.
pub struct ApplicantService<R, M> {
    repository: Arc<R>,
    mailer: Arc<M>,
    codec: Arc<TokenCodec>,
    public_url: String,
}

impl<R, M> ApplicantService<R, M>
where
    R: ApplicantRepository + 'static,
    M: Mailer + 'static,
{
    pub fn new(
        repository: Arc<R>,
        mailer: Arc<M>,
        codec: Arc<TokenCodec>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            mailer,
            codec,
            public_url: public_url.into(),
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Create an applicant for `email` and mail them a login link.
    pub fn apply(
        &self,
        sale: &SaleConfig,
        request: ApplyRequest,
    ) -> Result<Applicant, ApplicantServiceError> {
        let email = normalize_email(request.email.as_deref())?;

        let now = Utc::now();
        if !sale.is_accepting_applicants(now) {
            return Err(ApplicantServiceError::SaleClosed);
        }
        if self.repository.find_by_email(&email)?.is_some() {
            return Err(ApplicantServiceError::AlreadyApplied);
        }

        let applicant = Applicant::new(
            ApplicantId::generate(),
            email,
            mnemonic::generate_phrase(),
            now,
        );
        let stored = self.repository.insert(applicant).map_err(|err| match err {
            RepositoryError::Conflict => ApplicantServiceError::AlreadyApplied,
            other => ApplicantServiceError::Repository(other),
        })?;

        info!(applicant_id = %stored.id.0, "applicant applied");
        self.send_magic_link(&stored);
        Ok(stored)
    }

    pub fn temporary_token(&self, applicant: &Applicant) -> Result<String, ApplicantServiceError> {
        Ok(self.codec.create_temporary_token(applicant)?)
    }

    /// Exchange a temporary token for a session. Each exchange rotates the stored magic token,
    /// which revokes any session issued before it.
    pub fn issue_session(
        &self,
        request: SessionRequest,
    ) -> Result<SessionGrant, ApplicantServiceError> {
        let token = request
            .token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ApplicantServiceError::InvalidField { field: "token" })?;

        let applicant_id = self.codec.decode_temporary(token)?;
        let magic_token = MagicToken::generate();
        let session = self.codec.create_session_token(&magic_token)?;
        self.modify(&applicant_id, |record| {
            record.magic_token = Some(magic_token);
            Ok(())
        })?;

        info!(applicant_id = %applicant_id.0, "session issued");
        Ok(SessionGrant { token: session })
    }

    /// Resolve a session token to the applicant currently holding its magic token.
    pub fn resolve_session(
        &self,
        session_token: &str,
    ) -> Result<Option<Applicant>, ApplicantServiceError> {
        let magic_token = self.codec.decode_session(session_token)?;
        Ok(self.repository.find_by_magic_token(&magic_token)?)
    }

    /// Finalize registration. Nothing is written unless every check passes.
    pub fn register(
        &self,
        sale: &SaleConfig,
        applicant: &Applicant,
        request: RegistrationRequest,
    ) -> Result<Applicant, ApplicantServiceError> {
        let first_name = required_text(request.first_name.as_deref(), "firstName")?;
        let last_name = required_text(request.last_name.as_deref(), "lastName")?;
        let eth_amount = request
            .eth_amount
            .filter(|amount| amount.is_finite() && *amount > 0.0)
            .ok_or(ApplicantServiceError::InvalidField { field: "ethAmount" })?;

        let current = self.modify(&applicant.id, |record| {
            if record.completed_registration {
                return Err(ApplicantServiceError::AlreadyRegistered);
            }
            let now = Utc::now();
            if !sale.is_accepting_applicants(now) {
                return Err(ApplicantServiceError::SaleClosed);
            }
            record.first_name = Some(first_name);
            record.last_name = Some(last_name);
            record.eth_amount = Some(eth_amount);
            record.mnemonic_phrase = None;
            record.completed_registration = true;
            record.registered_at = Some(now);
            Ok(())
        })?;

        info!(applicant_id = %current.id.0, "registration completed");
        self.notify(EmailMessage::new(
            EmailTemplate::RegistrationComplete,
            current.email.as_str(),
        ));
        Ok(current)
    }

    /// Record the participation address for a registered applicant.
    pub fn participate(
        &self,
        applicant: &Applicant,
        request: ParticipationRequest,
    ) -> Result<Applicant, ApplicantServiceError> {
        let eth_address = required_text(request.eth_address.as_deref(), "ethAddress")?;

        let current = self.modify(&applicant.id, |record| {
            if !record.completed_registration {
                return Err(ApplicantServiceError::RegistrationIncomplete);
            }
            record.eth_address = Some(eth_address);
            record.participated_at = Some(Utc::now());
            Ok(())
        })?;

        info!(applicant_id = %current.id.0, "participation recorded");
        Ok(current)
    }

    /// Checks inside `change` run against the stored record under the repository's lock, not
    /// against the request-time snapshot.
    fn modify<F>(&self, id: &ApplicantId, change: F) -> Result<Applicant, ApplicantServiceError>
    where
        F: FnOnce(&mut Applicant) -> Result<(), ApplicantServiceError>,
    {
        self.repository
            .modify(id, change)
            .map_err(|err| match err {
                ApplicantServiceError::Repository(RepositoryError::NotFound) => {
                    ApplicantServiceError::UnknownApplicant
                }
                other => other,
            })
    }

    fn send_magic_link(&self, applicant: &Applicant) {
        let token = match self.codec.create_temporary_token(applicant) {
            Ok(token) => token,
            Err(err) => {
                warn!(applicant_id = %applicant.id.0, error = %err, "unable to sign login token");
                return;
            }
        };
        let link = format!(
            "{}/login?token={}",
            self.public_url.trim_end_matches('/'),
            token
        );
        self.notify(
            EmailMessage::new(EmailTemplate::MagicLink, applicant.email.as_str())
                .with_detail("link", link),
        );
    }

    fn notify(&self, message: EmailMessage) {
        let template = message.template;
        if let Err(err) = self.mailer.send(message) {
            warn!(?template, error = %err, "email dispatch failed");
        }
    }
}

fn normalize_email(raw: Option<&str>) -> Result<String, ApplicantServiceError> {
    let email = raw.map(str::trim).unwrap_or_default().to_ascii_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
        && !email.contains(char::is_whitespace);
    if valid {
        Ok(email)
    } else {
        Err(ApplicantServiceError::InvalidField { field: "email" })
    }
}

fn required_text(
    raw: Option<&str>,
    field: &'static str,
) -> Result<String, ApplicantServiceError> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(ApplicantServiceError::InvalidField { field })
}

/// Error raised by the applicant lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ApplicantServiceError {
    #[error("Need a valid {field}")]
    InvalidField { field: &'static str },
    #[error("Token sale is not accepting applicants")]
    SaleClosed,
    #[error("Applicant already exists")]
    AlreadyApplied,
    #[error("Applicant not found")]
    UnknownApplicant,
    #[error("Registration already completed")]
    AlreadyRegistered,
    #[error("Registration must be completed before participating")]
    RegistrationIncomplete,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
