//! Caller identity verification for the RPC transport.
//!
//! The transport hands the raw `Authorization` header to an
//! [`IdentityVerifier`]; a missing or unverifiable token simply yields no
//! identity, and the gateway turns that into `Unauthenticated`.

use chrono::Utc;
use tracing::warn;

use super::{Identity, TokenConfig, TokenError, validate_token};

/// Resolves a bearer token into a verified [`Identity`].
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, TokenError>;
}

// Compile-time assertion: IdentityVerifier must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn IdentityVerifier) {}
};

/// Verifies HMAC-signed `plangate_id.` tokens against the wall clock.
#[derive(Debug, Clone)]
pub struct HmacVerifier {
    config: TokenConfig,
}

impl HmacVerifier {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }
}

impl IdentityVerifier for HmacVerifier {
    fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        let claims = validate_token(&self.config, token, Utc::now())?;
        Ok(claims.identity())
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve an optional `Authorization` header into an optional identity.
///
/// Rejected tokens are logged and treated as absent.
pub fn identify(verifier: &dyn IdentityVerifier, authorization: Option<&str>) -> Option<Identity> {
    let token = bearer_token(authorization?)?;
    match verifier.verify(token) {
        Ok(identity) => Some(identity),
        Err(e) => {
            warn!(error = %e, "rejected identity token");
            None
        }
    }
}
