//! # Sesamo (Authentication Core)
//!
//! `sesamo` is the authentication core of a multi-tenant identity platform.
//! It sits in front of a relational user store and arbitrates credential
//! checks, single-use verification tickets, and session issuance.
//!
//! ## Tickets
//!
//! Email verification, password reset, and MFA challenges are driven by
//! single-use, typed, expiring tickets (`"<type>:<uuid>"` on the wire).
//! Only a hash of the ticket value is stored; issuing a new ticket revokes
//! any still-active ticket for the same user, and consumption is committed
//! in the same transaction as the state change it authorizes.
//!
//! ## Credentials
//!
//! Password checks use Argon2id hashes. An operator-configured master
//! password can bypass per-user verification for any account; it is off
//! unless explicitly configured and must never be set in production.
//! WebAuthn ceremonies are delegated to `webauthn-rs` and correlated to a
//! user through the challenge embedded in the client's signed data.
//!
//! ## Sessions
//!
//! A successful credential check does not imply a session: users with MFA
//! enabled receive a short-lived challenge ticket instead of tokens, and
//! instances that require verified email withhold the session until the
//! verification ticket is consumed.

pub mod api;
pub mod cli;
pub mod token;
pub mod totp;
pub mod webauthn;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
