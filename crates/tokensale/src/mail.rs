//! Outbound email boundary.
//!
//! Delivery is fire-and-forget from the lifecycle's point of view: callers log failures and move
//! on, retries belong to the transport.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Templates the lifecycle sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    MagicLink,
    RegistrationComplete,
}

impl EmailTemplate {
    pub const fn subject(self) -> &'static str {
        match self {
            EmailTemplate::MagicLink => "Your token sale login link",
            EmailTemplate::RegistrationComplete => "Your token sale registration is complete",
        }
    }
}

/// Rendered-agnostic message; transports pick the template and fill in `details`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub template: EmailTemplate,
    pub to: String,
    pub details: BTreeMap<String, String>,
}

impl EmailMessage {
    pub fn new(template: EmailTemplate, to: impl Into<String>) -> Self {
        Self {
            template,
            to: to.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Trait describing outbound email adapters.
pub trait Mailer: Send + Sync {
    fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport unavailable: {0}")]
    Transport(String),
    #[error("mailer rejected recipient {0}")]
    Rejected(String),
}
