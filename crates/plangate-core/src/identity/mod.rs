//! Signed identity tokens.
//!
//! Tokens are HMAC-SHA256 based, scoped to a (uid, expiry) pair.
//! Format: `plangate_id.<uid>.<expires_unix>.<hmac_hex>`

pub mod verifier;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Token prefix used to identify plangate identity tokens.
const TOKEN_PREFIX: &str = "plangate_id.";

/// Environment variable holding the hex-encoded HMAC secret.
pub const TOKEN_SECRET_ENV: &str = "PLANGATE_TOKEN_SECRET";

/// Errors that can occur during token operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token format: {0}")]
    InvalidFormat(String),

    #[error("invalid uid {0:?}: must be non-empty ASCII alphanumerics, '-' or '_'")]
    InvalidUid(String),

    #[error("invalid expiry in token: {0}")]
    InvalidExpiry(String),

    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("token HMAC verification failed")]
    HmacMismatch,

    #[error("missing token secret")]
    MissingSecret,
}

/// Configuration for token generation and validation.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// The HMAC secret key bytes.
    pub secret: Vec<u8>,
}

impl TokenConfig {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Create a TokenConfig from the `PLANGATE_TOKEN_SECRET` environment
    /// variable. The value must be hex-encoded, as written by `plangate init`.
    pub fn from_env() -> Result<Self, TokenError> {
        let secret_hex = std::env::var(TOKEN_SECRET_ENV).map_err(|_| TokenError::MissingSecret)?;
        Self::from_hex(&secret_hex)
    }

    /// Decode a hex-encoded secret.
    pub fn from_hex(secret_hex: &str) -> Result<Self, TokenError> {
        let secret = hex::decode(secret_hex.trim()).map_err(|e| {
            TokenError::InvalidFormat(format!("token secret is not valid hex: {e}"))
        })?;
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(Self::new(secret))
    }
}

/// A verified caller. The uid is the caller's identity namespace key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

/// Claims extracted from a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub uid: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenClaims {
    pub fn identity(&self) -> Identity {
        Identity::new(self.uid.clone())
    }
}

/// Check that a uid can be embedded in a token and used as a namespace key.
pub fn validate_uid(uid: &str) -> Result<(), TokenError> {
    let valid = !uid.is_empty()
        && uid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(TokenError::InvalidUid(uid.to_owned()));
    }
    Ok(())
}

/// Generate an identity token for `uid` that expires at `expires_at`.
///
/// The HMAC-SHA256 is computed over `<uid>:<expires_unix>`.
pub fn generate_token(
    config: &TokenConfig,
    uid: &str,
    expires_at: DateTime<Utc>,
) -> Result<String, TokenError> {
    validate_uid(uid)?;
    let expires = expires_at.timestamp();
    let mac = compute_hmac(&config.secret, signed_message(uid, expires).as_bytes())?;
    Ok(format!("{TOKEN_PREFIX}{uid}.{expires}.{}", hex::encode(mac)))
}

/// Validate an identity token against `now` and extract its claims.
///
/// Parses the token, recomputes the HMAC, compares in constant time, then
/// checks expiry.
pub fn validate_token(
    config: &TokenConfig,
    token: &str,
    now: DateTime<Utc>,
) -> Result<TokenClaims, TokenError> {
    let rest = token.strip_prefix(TOKEN_PREFIX).ok_or_else(|| {
        TokenError::InvalidFormat(format!("token must start with {TOKEN_PREFIX:?}"))
    })?;

    let mut parts = rest.split('.');
    let (Some(uid), Some(expires_str), Some(hmac_hex), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::InvalidFormat(
            "expected <uid>.<expires>.<hmac> after prefix".to_string(),
        ));
    };

    validate_uid(uid)?;

    let expires: i64 = expires_str
        .parse()
        .map_err(|e: std::num::ParseIntError| TokenError::InvalidExpiry(e.to_string()))?;
    let expires_at = DateTime::<Utc>::from_timestamp(expires, 0)
        .ok_or_else(|| TokenError::InvalidExpiry(format!("{expires} is out of range")))?;

    let provided_mac = hex::decode(hmac_hex)
        .map_err(|e| TokenError::InvalidFormat(format!("invalid hex in hmac: {e}")))?;

    verify_hmac_constant_time(
        &config.secret,
        signed_message(uid, expires).as_bytes(),
        &provided_mac,
    )?;

    if expires_at <= now {
        return Err(TokenError::Expired(expires_at));
    }

    Ok(TokenClaims {
        uid: uid.to_owned(),
        expires_at,
    })
}

fn signed_message(uid: &str, expires: i64) -> String {
    format!("{uid}:{expires}")
}

fn new_mac(key: &[u8]) -> Result<HmacSha256, TokenError> {
    HmacSha256::new_from_slice(key).map_err(|_| TokenError::MissingSecret)
}

/// Compute HMAC-SHA256 over the given message with the given key.
fn compute_hmac(key: &[u8], message: &[u8]) -> Result<Vec<u8>, TokenError> {
    let mut mac = new_mac(key)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verify an HMAC with `hmac`'s constant-time `verify_slice`.
fn verify_hmac_constant_time(
    key: &[u8],
    message: &[u8],
    expected_mac: &[u8],
) -> Result<(), TokenError> {
    let mut mac = new_mac(key)?;
    mac.update(message);
    mac.verify_slice(expected_mac)
        .map_err(|_| TokenError::HmacMismatch)
}
