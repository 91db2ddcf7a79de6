use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::http::Method;
use axum::response::Response;
use chrono::{Duration, Utc};
use serde_json::Value;

use crate::applicants::domain::{Applicant, ApplicantId, ApplyRequest, MagicToken};
use crate::applicants::repository::{ApplicantRepository, RepositoryError};
use crate::applicants::{api_router, ApplicantService, ApplicantState};
use crate::boundary::{ApiError, ErrorObserver};
use crate::mail::{EmailMessage, MailError, Mailer};
use crate::sale::SaleConfig;
use crate::tokens::TokenCodec;

pub(super) const EMAIL: &str = "john@galt.com";

pub(super) fn codec() -> Arc<TokenCodec> {
    Arc::new(TokenCodec::new(
        "unit-test-secret",
        Duration::hours(1),
        Duration::days(30),
    ))
}

pub(super) fn open_sale() -> SaleConfig {
    let now = Utc::now();
    SaleConfig::window(now - Duration::hours(24), now + Duration::hours(24))
}

pub(super) fn closed_sale() -> SaleConfig {
    let now = Utc::now();
    SaleConfig::window(now - Duration::hours(48), now - Duration::hours(24))
}

pub(super) fn apply_request(email: &str) -> ApplyRequest {
    ApplyRequest {
        email: Some(email.to_string()),
    }
}

pub(super) type TestService = ApplicantService<MemoryRepository, MemoryMailer>;

pub(super) fn build_service() -> (TestService, Arc<MemoryRepository>, Arc<MemoryMailer>) {
    let repository = Arc::new(MemoryRepository::default());
    let mailer = Arc::new(MemoryMailer::default());
    let service = ApplicantService::new(
        repository.clone(),
        mailer.clone(),
        codec(),
        "https://sale.example",
    );
    (service, repository, mailer)
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<ApplicantId, Applicant>>>,
}

impl MemoryRepository {
    pub(super) fn stored(&self, id: &ApplicantId) -> Applicant {
        self.fetch(id)
            .expect("fetch succeeds")
            .expect("record present")
    }
}

impl ApplicantRepository for MemoryRepository {
    fn insert(&self, applicant: Applicant) -> Result<Applicant, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.values().any(|existing| existing.email == applicant.email) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(applicant.id.clone(), applicant.clone());
        Ok(applicant)
    }

    fn modify<E, F>(&self, id: &ApplicantId, change: F) -> Result<Applicant, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(&mut Applicant) -> Result<(), E>,
    {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let slot = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        let mut draft = slot.clone();
        change(&mut draft)?;
        if draft.id != slot.id || draft.email != slot.email {
            return Err(RepositoryError::Conflict.into());
        }
        *slot = draft.clone();
        Ok(draft)
    }

    fn fetch(&self, id: &ApplicantId) -> Result<Option<Applicant>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Applicant>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.values().find(|record| record.email == email).cloned())
    }

    fn find_by_magic_token(
        &self,
        token: &MagicToken,
    ) -> Result<Option<Applicant>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|record| record.magic_token.as_ref() == Some(token))
            .cloned())
    }
}

/// Accepts the email lookup but loses the insert race.
pub(super) struct RacingRepository;

impl ApplicantRepository for RacingRepository {
    fn insert(&self, _applicant: Applicant) -> Result<Applicant, RepositoryError> {
        Err(RepositoryError::Conflict)
    }

    fn modify<E, F>(&self, _id: &ApplicantId, _change: F) -> Result<Applicant, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(&mut Applicant) -> Result<(), E>,
    {
        Err(RepositoryError::Unavailable("read only".to_string()).into())
    }

    fn fetch(&self, _id: &ApplicantId) -> Result<Option<Applicant>, RepositoryError> {
        Ok(None)
    }

    fn find_by_email(&self, _email: &str) -> Result<Option<Applicant>, RepositoryError> {
        Ok(None)
    }

    fn find_by_magic_token(
        &self,
        _token: &MagicToken,
    ) -> Result<Option<Applicant>, RepositoryError> {
        Ok(None)
    }
}

type CompetingWrite = Box<dyn FnOnce(&MemoryRepository) + Send>;

/// Lets another writer land between a request's start and its write: the queued write runs
/// against the backing store right before the next `modify` takes the lock.
#[derive(Default)]
pub(super) struct InterleavingRepository {
    pub(super) inner: MemoryRepository,
    competing: Mutex<Option<CompetingWrite>>,
}

impl InterleavingRepository {
    pub(super) fn before_next_modify(&self, write: impl FnOnce(&MemoryRepository) + Send + 'static) {
        *self.competing.lock().expect("hook mutex poisoned") = Some(Box::new(write));
    }
}

impl ApplicantRepository for InterleavingRepository {
    fn insert(&self, applicant: Applicant) -> Result<Applicant, RepositoryError> {
        self.inner.insert(applicant)
    }

    fn modify<E, F>(&self, id: &ApplicantId, change: F) -> Result<Applicant, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(&mut Applicant) -> Result<(), E>,
    {
        let competing = self.competing.lock().expect("hook mutex poisoned").take();
        if let Some(write) = competing {
            write(&self.inner);
        }
        self.inner.modify(id, change)
    }

    fn fetch(&self, id: &ApplicantId) -> Result<Option<Applicant>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Applicant>, RepositoryError> {
        self.inner.find_by_email(email)
    }

    fn find_by_magic_token(
        &self,
        token: &MagicToken,
    ) -> Result<Option<Applicant>, RepositoryError> {
        self.inner.find_by_magic_token(token)
    }
}

/// Marks the record registered the way a concurrent `register` call would.
pub(super) fn complete_registration(repository: &MemoryRepository, id: &ApplicantId) {
    repository
        .modify::<RepositoryError, _>(id, |record| {
            record.first_name = Some("Dagny".to_string());
            record.last_name = Some("Taggart".to_string());
            record.eth_amount = Some(7.0);
            record.mnemonic_phrase = None;
            record.completed_registration = true;
            record.registered_at = Some(Utc::now());
            Ok(())
        })
        .expect("competing registration lands");
}

#[derive(Default, Clone)]
pub(super) struct MemoryMailer {
    outbox: Arc<Mutex<Vec<EmailMessage>>>,
}

impl MemoryMailer {
    pub(super) fn sent(&self) -> Vec<EmailMessage> {
        self.outbox.lock().expect("mailer mutex poisoned").clone()
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        self.outbox
            .lock()
            .expect("mailer mutex poisoned")
            .push(message);
        Ok(())
    }
}

pub(super) struct OfflineMailer;

impl Mailer for OfflineMailer {
    fn send(&self, _message: EmailMessage) -> Result<(), MailError> {
        Err(MailError::Transport("smtp offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct RecordingObserver {
    seen: Mutex<Vec<(String, String)>>,
}

impl RecordingObserver {
    pub(super) fn seen(&self) -> Vec<(String, String)> {
        self.seen.lock().expect("observer mutex poisoned").clone()
    }
}

impl ErrorObserver for RecordingObserver {
    fn observe(&self, error: &ApiError, _method: &Method, path: &str) {
        self.seen
            .lock()
            .expect("observer mutex poisoned")
            .push((path.to_string(), error.message.clone()));
    }
}

pub(super) fn router_with_service(
    service: TestService,
    sale: SaleConfig,
    observer: Arc<RecordingObserver>,
) -> axum::Router {
    api_router(ApplicantState::new(Arc::new(service), sale), observer)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
