//! `plangate token`: mint and inspect identity tokens.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};

use plangate_core::identity::{TokenClaims, TokenConfig, generate_token, validate_token};

/// Mint a token for `uid` valid for `ttl_secs` from `now`.
pub fn issue_token(
    config: &TokenConfig,
    uid: &str,
    ttl_secs: u64,
    now: DateTime<Utc>,
) -> Result<String> {
    let ttl = i64::try_from(ttl_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .with_context(|| format!("ttl of {ttl_secs}s is out of range"))?;
    let expires_at = now
        .checked_add_signed(ttl)
        .with_context(|| format!("ttl of {ttl_secs}s is out of range"))?;
    generate_token(config, uid, expires_at)
        .with_context(|| format!("cannot issue token for {uid:?}"))
}

/// Check a token against `now` and return its claims.
pub fn verify_token(config: &TokenConfig, token: &str, now: DateTime<Utc>) -> Result<TokenClaims> {
    validate_token(config, token.trim(), now).context("token rejected")
}

pub fn run_issue(config: &TokenConfig, uid: &str, ttl_secs: u64) -> Result<()> {
    let token = issue_token(config, uid, ttl_secs, Utc::now())?;
    println!("{token}");
    Ok(())
}

pub fn run_verify(config: &TokenConfig, token: &str) -> Result<()> {
    let claims = verify_token(config, token, Utc::now())?;
    println!("uid:        {}", claims.uid);
    println!("expires at: {}", claims.expires_at.to_rfc3339());
    Ok(())
}
