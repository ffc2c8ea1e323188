//! Credential verification.
//!
//! Decides "who you are", never "what you get": verdicts carry no tokens.
//! Session issuance is a separate decision so that MFA and verified-email
//! policy cannot be bypassed by a correct password alone.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::Engine;
use secrecy::ExposeSecret;

use super::state::AuthConfig;
use super::storage::UserRecord;

/// Why a credential check did not verify.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Rejection {
    InvalidCredential,
    DisabledUser,
    UnverifiedUser,
}

/// Ternary verdict of a credential check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Verdict {
    Verified,
    Rejected(Rejection),
    /// The presented payload could not be parsed at all (e.g. an unreadable
    /// WebAuthn challenge); distinct from a well-formed but wrong credential.
    Malformed,
}

/// Hash a password with Argon2id and a fresh salt.
pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

/// Verify a presented password against a stored Argon2id hash.
fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Operator override: accepted for any user when configured and non-empty.
/// Evaluated before the per-user password check, which it short-circuits.
fn is_master_password(config: &AuthConfig, presented: &str) -> bool {
    config.master_password().is_some_and(|master| {
        let master = master.expose_secret();
        !master.is_empty() && master == presented
    })
}

/// Check a presented password (or the master override) against a user.
pub(crate) fn verify_password_credential(
    config: &AuthConfig,
    user: &UserRecord,
    presented: &str,
) -> Verdict {
    if user.disabled {
        return Verdict::Rejected(Rejection::DisabledUser);
    }

    let matches = is_master_password(config, presented)
        || user
            .password_hash
            .as_deref()
            .is_some_and(|hash| verify_password(presented, hash));

    if !matches {
        return Verdict::Rejected(Rejection::InvalidCredential);
    }

    if config.require_verified_email() && !user.email_verified {
        return Verdict::Rejected(Rejection::UnverifiedUser);
    }

    Verdict::Verified
}

/// Extract the ceremony challenge embedded in a WebAuthn credential's signed
/// client data. An unparseable payload is a malformed input, not a wrong
/// credential.
pub(crate) fn extract_webauthn_challenge(credential: &serde_json::Value) -> Result<String, Verdict> {
    parse_client_data_challenge(credential).ok_or(Verdict::Malformed)
}

fn parse_client_data_challenge(credential: &serde_json::Value) -> Option<String> {
    let client_data = credential
        .get("response")?
        .get("clientDataJSON")?
        .as_str()?;

    // Browsers emit base64url without padding, but be lenient about the exact
    // alphabet since the value round-trips through client-side JSON.
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(client_data)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(client_data))
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(client_data))
        .ok()?;

    let parsed: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    parsed
        .get("challenge")?
        .as_str()
        .map(ToString::to_string)
}
