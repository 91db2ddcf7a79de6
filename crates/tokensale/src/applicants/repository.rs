use super::domain::{Applicant, ApplicantId, MagicToken};

/// Storage abstraction so the lifecycle service can be exercised in isolation.
///
/// Implementations own the consistency guarantees: `insert` must refuse a second record for an
/// email already on file, and `modify` must run the change and the write in one critical section,
/// atomically with respect to every other call.
pub trait ApplicantRepository: Send + Sync {
    fn insert(&self, applicant: Applicant) -> Result<Applicant, RepositoryError>;

    /// Apply `change` to the stored record and persist the result. When `change` fails the stored
    /// record is left untouched. A missing record surfaces as [`RepositoryError::NotFound`]; a
    /// change to `id` or `email` is refused with [`RepositoryError::Conflict`].
    fn modify<E, F>(&self, id: &ApplicantId, change: F) -> Result<Applicant, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(&mut Applicant) -> Result<(), E>;

    fn fetch(&self, id: &ApplicantId) -> Result<Option<Applicant>, RepositoryError>;
    fn find_by_email(&self, email: &str) -> Result<Option<Applicant>, RepositoryError>;
    fn find_by_magic_token(&self, token: &MagicToken)
        -> Result<Option<Applicant>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
