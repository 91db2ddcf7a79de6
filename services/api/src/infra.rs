use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokensale::applicants::{
    Applicant, ApplicantId, ApplicantRepository, ApplicantService, MagicToken, RepositoryError,
};
use tokensale::config::{MailConfig, TokenConfig};
use tokensale::mail::{EmailMessage, MailError, Mailer};
use tokensale::tokens::TokenCodec;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct ApplicantTable {
    records: HashMap<ApplicantId, Applicant>,
    by_email: HashMap<String, ApplicantId>,
    by_magic_token: HashMap<MagicToken, ApplicantId>,
}

impl ApplicantTable {
    fn reindex_magic_token(&mut self, previous: Option<&MagicToken>, current: &Applicant) {
        if previous == current.magic_token.as_ref() {
            return;
        }
        if let Some(old) = previous {
            self.by_magic_token.remove(old);
        }
        if let Some(new) = &current.magic_token {
            self.by_magic_token.insert(new.clone(), current.id.clone());
        }
    }
}

/// Process-local applicant store. Both indexes are updated under the same lock as the records,
/// which is what keeps `insert` unique and `modify` atomic under concurrent requests.
#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicantRepository {
    table: Arc<Mutex<ApplicantTable>>,
}

impl ApplicantRepository for InMemoryApplicantRepository {
    fn insert(&self, applicant: Applicant) -> Result<Applicant, RepositoryError> {
        let mut guard = self.table.lock().expect("repository mutex poisoned");
        if guard.by_email.contains_key(&applicant.email) || guard.records.contains_key(&applicant.id)
        {
            return Err(RepositoryError::Conflict);
        }
        guard
            .by_email
            .insert(applicant.email.clone(), applicant.id.clone());
        guard.reindex_magic_token(None, &applicant);
        guard.records.insert(applicant.id.clone(), applicant.clone());
        Ok(applicant)
    }

    fn modify<E, F>(&self, id: &ApplicantId, change: F) -> Result<Applicant, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(&mut Applicant) -> Result<(), E>,
    {
        let mut guard = self.table.lock().expect("repository mutex poisoned");
        let table = &mut *guard;
        let slot = table.records.get_mut(id).ok_or(RepositoryError::NotFound)?;
        let mut draft = slot.clone();
        change(&mut draft)?;
        if draft.id != slot.id || draft.email != slot.email {
            return Err(RepositoryError::Conflict.into());
        }
        let previous = std::mem::replace(slot, draft.clone());
        table.reindex_magic_token(previous.magic_token.as_ref(), &draft);
        Ok(draft)
    }

    fn fetch(&self, id: &ApplicantId) -> Result<Option<Applicant>, RepositoryError> {
        let guard = self.table.lock().expect("repository mutex poisoned");
        Ok(guard.records.get(id).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Applicant>, RepositoryError> {
        let guard = self.table.lock().expect("repository mutex poisoned");
        Ok(guard
            .by_email
            .get(email)
            .and_then(|id| guard.records.get(id))
            .cloned())
    }

    fn find_by_magic_token(
        &self,
        token: &MagicToken,
    ) -> Result<Option<Applicant>, RepositoryError> {
        let guard = self.table.lock().expect("repository mutex poisoned");
        Ok(guard
            .by_magic_token
            .get(token)
            .and_then(|id| guard.records.get(id))
            .cloned())
    }
}

/// Mailer for environments without a transport: logs each message instead of sending it.
#[derive(Default, Clone, Copy)]
pub(crate) struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        info!(
            template = ?message.template,
            subject = message.template.subject(),
            to = %message.to,
            details = ?message.details,
            "email queued"
        );
        Ok(())
    }
}

/// Keeps messages in memory so the demo can show what would have been sent.
#[derive(Default, Clone)]
pub(crate) struct InMemoryOutbox {
    messages: Arc<Mutex<Vec<EmailMessage>>>,
}

impl Mailer for InMemoryOutbox {
    fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        let mut guard = self.messages.lock().expect("outbox mutex poisoned");
        guard.push(message);
        Ok(())
    }
}

impl InMemoryOutbox {
    pub(crate) fn messages(&self) -> Vec<EmailMessage> {
        self.messages.lock().expect("outbox mutex poisoned").clone()
    }
}

pub(crate) fn applicant_service<M: Mailer + 'static>(
    tokens: &TokenConfig,
    mail: &MailConfig,
    mailer: Arc<M>,
) -> ApplicantService<InMemoryApplicantRepository, M> {
    ApplicantService::new(
        Arc::new(InMemoryApplicantRepository::default()),
        mailer,
        Arc::new(TokenCodec::from_config(tokens)),
        mail.public_url.clone(),
    )
}
