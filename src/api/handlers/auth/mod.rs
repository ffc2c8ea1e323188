//! Auth handlers and supporting modules.
//!
//! This module is the decision core of the service: the ticket lifecycle,
//! the credential-verification state machine, the race-safe identity
//! mutations, and the session-issuance decision engine.
//!
//! ## Tickets
//!
//! A ticket is a single-use, typed, expiring token authorizing one state
//! transition. Issuing one revokes any still-active ticket for the same
//! user, and consumption commits atomically with the change it authorizes.
//! Absent, expired, revoked, and replayed values are indistinguishable to
//! callers.
//!
//! ## Races
//!
//! Concurrent signups and WebAuthn promotions for the same address are
//! arbitrated by the email unique constraint; a violation is an expected
//! outcome that resolves to the surviving row, never an error surface.
//!
//! > **Warning:** the master password (`--master-password`) bypasses
//! > per-user credential checks for *every* account. It exists for
//! > operational overrides in test environments and must stay unset in
//! > production.

pub(crate) mod credentials;
mod errors;
pub(crate) mod identity;
pub(crate) mod session;
pub(crate) mod signin;
pub(crate) mod signup;
mod state;
pub(crate) mod storage;
pub(crate) mod tickets;
pub(crate) mod types;
pub(crate) mod user;
pub(crate) mod utils;

pub use errors::AuthError;
pub use state::{AuthConfig, AuthState};

#[cfg(test)]
pub(crate) mod test_support;
