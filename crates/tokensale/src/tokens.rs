//! HS256 token codec for temporary login tokens and session tokens.
//!
//! Tokens are compact JWS strings (`header.claims.signature`, base64url without padding). The
//! audience claim carries the token's purpose so a temporary token can never stand in for a
//! session token, or the other way around. Error messages match what JWT clients usually see
//! (`jwt malformed`, `invalid signature`, ...) because they are returned to callers verbatim.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::applicants::domain::{Applicant, ApplicantId, MagicToken};
use crate::config::TokenConfig;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

/// What a token may be used for; encoded as the `aud` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Temporary,
    Session,
}

impl TokenPurpose {
    pub const fn audience(self) -> &'static str {
        match self {
            TokenPurpose::Temporary => "temporary",
            TokenPurpose::Session => "session",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

/// Registered claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("jwt malformed")]
    Malformed,
    #[error("invalid token")]
    Invalid,
    #[error("invalid algorithm")]
    UnsupportedAlgorithm,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("jwt expired")]
    Expired,
    #[error("jwt audience invalid. expected: {expected}")]
    AudienceMismatch { expected: &'static str },
    #[error("unable to sign token: {0}")]
    Signing(String),
}

/// Issues and verifies signed tokens with a shared HMAC secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
    temporary_ttl: Duration,
    session_ttl: Duration,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"<redacted>")
            .field("temporary_ttl", &self.temporary_ttl)
            .field("session_ttl", &self.session_ttl)
            .finish()
    }
}

impl TokenCodec {
    pub fn new(secret: impl Into<Vec<u8>>, temporary_ttl: Duration, session_ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            temporary_ttl,
            session_ttl,
        }
    }

    /// Lifetimes beyond what `chrono` can represent saturate; `sign` then reports the overflow.
    pub fn from_config(config: &TokenConfig) -> Self {
        Self::new(
            config.secret.as_bytes(),
            Duration::try_seconds(config.temporary_ttl_secs).unwrap_or(Duration::MAX),
            Duration::try_seconds(config.session_ttl_secs).unwrap_or(Duration::MAX),
        )
    }

    /// Short-lived token proving control of the applicant's email.
    pub fn create_temporary_token(&self, applicant: &Applicant) -> Result<String, TokenError> {
        self.sign(
            TokenPurpose::Temporary,
            &applicant.id.0,
            Utc::now(),
            self.temporary_ttl,
        )
    }

    /// Long-lived token wrapping the server-held magic token.
    pub fn create_session_token(&self, magic_token: &MagicToken) -> Result<String, TokenError> {
        self.sign(
            TokenPurpose::Session,
            &magic_token.0,
            Utc::now(),
            self.session_ttl,
        )
    }

    pub fn decode_temporary(&self, token: &str) -> Result<ApplicantId, TokenError> {
        let claims = self.verify(token, TokenPurpose::Temporary, Utc::now())?;
        Ok(ApplicantId(claims.sub))
    }

    pub fn decode_session(&self, token: &str) -> Result<MagicToken, TokenError> {
        let claims = self.verify(token, TokenPurpose::Session, Utc::now())?;
        Ok(MagicToken(claims.sub))
    }

    pub fn sign(
        &self,
        purpose: TokenPurpose,
        subject: &str,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let header = TokenHeader {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };
        let expires_at = issued_at.checked_add_signed(ttl).ok_or_else(|| {
            TokenError::Signing(format!("lifetime of {}s overflows the expiry", ttl.num_seconds()))
        })?;
        let claims = TokenClaims {
            sub: subject.to_string(),
            aud: purpose.audience().to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let header_json =
            serde_json::to_vec(&header).map_err(|err| TokenError::Signing(err.to_string()))?;
        let claims_json =
            serde_json::to_vec(&claims).map_err(|err| TokenError::Signing(err.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(claims_json)
        );
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }

    /// Check structure, signature, expiry, and audience in that order.
    pub fn verify(
        &self,
        token: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };
        if header_b64.is_empty() || claims_b64.is_empty() || signature_b64.is_empty() {
            return Err(TokenError::Malformed);
        }

        let header: TokenHeader = decode_segment(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::InvalidSignature)?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: TokenClaims = decode_segment(claims_b64)?;
        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        if claims.aud != purpose.audience() {
            return Err(TokenError::AudienceMismatch {
                expected: purpose.audience(),
            });
        }

        Ok(claims)
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|err| TokenError::Signing(err.to_string()))
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let raw = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Invalid)?;
    serde_json::from_slice(&raw).map_err(|_| TokenError::Invalid)
}
