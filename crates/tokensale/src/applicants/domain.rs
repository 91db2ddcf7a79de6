use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for applicant records; the temporary token's subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicantId(pub String);

impl ApplicantId {
    const BYTES: usize = 12;

    /// Random id, independent of process lifetime and of any storage backend's sequence.
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::BYTES];
        rand::rng().fill(&mut bytes[..]);
        Self(format!("applicant-{}", URL_SAFE_NO_PAD.encode(bytes)))
    }
}

/// Server-held session capability. Overwriting it on the record revokes older sessions.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MagicToken(pub String);

impl MagicToken {
    const BYTES: usize = 32;

    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::BYTES];
        rand::rng().fill(&mut bytes[..]);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }
}

impl std::fmt::Debug for MagicToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MagicToken(<redacted>)")
    }
}

/// Where an applicant currently sits in the sale flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicantPhase {
    Applied,
    Authenticated,
    Registered,
    Participated,
}

impl ApplicantPhase {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicantPhase::Applied => "applied",
            ApplicantPhase::Authenticated => "authenticated",
            ApplicantPhase::Registered => "registered",
            ApplicantPhase::Participated => "participated",
        }
    }
}

/// Persisted applicant record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Applicant {
    pub id: ApplicantId,
    pub email: String,
    pub mnemonic_phrase: Option<String>,
    pub magic_token: Option<MagicToken>,
    pub completed_registration: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub eth_amount: Option<f64>,
    pub eth_address: Option<String>,
    pub applied_at: DateTime<Utc>,
    pub registered_at: Option<DateTime<Utc>>,
    pub participated_at: Option<DateTime<Utc>>,
}

impl Applicant {
    pub fn new(
        id: ApplicantId,
        email: String,
        mnemonic_phrase: String,
        applied_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email,
            mnemonic_phrase: Some(mnemonic_phrase),
            magic_token: None,
            completed_registration: false,
            first_name: None,
            last_name: None,
            eth_amount: None,
            eth_address: None,
            applied_at,
            registered_at: None,
            participated_at: None,
        }
    }

    pub fn phase(&self) -> ApplicantPhase {
        if self.eth_address.is_some() {
            ApplicantPhase::Participated
        } else if self.completed_registration {
            ApplicantPhase::Registered
        } else if self.magic_token.is_some() {
            ApplicantPhase::Authenticated
        } else {
            ApplicantPhase::Applied
        }
    }

    pub fn profile(&self) -> ApplicantProfile {
        ApplicantProfile {
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            eth_amount: self.eth_amount,
            eth_address: self.eth_address.clone(),
            completed_registration: self.completed_registration,
            mnemonic_phrase: self.mnemonic_phrase.clone(),
        }
    }

    pub fn application_receipt(&self) -> ApplicationReceipt {
        ApplicationReceipt {
            email: self.email.clone(),
            mnemonic_phrase: self.mnemonic_phrase.clone().unwrap_or_default(),
        }
    }
}

/// Public view of an applicant. Never carries the magic token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantProfile {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_address: Option<String>,
    pub completed_registration: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mnemonic_phrase: Option<String>,
}

/// Payload returned from `apply`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationReceipt {
    pub email: String,
    pub mnemonic_phrase: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionGrant {
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub eth_amount: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationRequest {
    #[serde(default)]
    pub eth_address: Option<String>,
}
