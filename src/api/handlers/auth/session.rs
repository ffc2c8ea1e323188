//! Session issuance decision engine.
//!
//! Given a verified user and an MFA policy, decides whether to mint a full
//! session or return a pending-second-factor result. Callers are responsible
//! for the `disabled`/`email_verified` gates before reaching this point; the
//! engine only arbitrates the MFA branch.

use sqlx::PgPool;
use uuid::Uuid;

use super::errors::AuthError;
use super::state::AuthState;
use super::storage;
use super::tickets::{self, TicketKind};
use super::types::{MfaChallenge, SignInResponse};
use crate::token;

pub(crate) async fn get_sign_in_response(
    pool: &PgPool,
    state: &AuthState,
    user_id: Uuid,
    check_mfa: bool,
) -> Result<SignInResponse, AuthError> {
    let user = storage::get_user_by_id(pool, user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    if check_mfa && user.mfa_enabled && user.totp_secret.is_some() {
        // Withhold tokens; the short-lived ticket authorizes the follow-up
        // challenge step and revokes any earlier pending challenge.
        let ticket = tickets::issue_ticket(
            pool,
            user.id,
            TicketKind::MfaTotp,
            state.config().mfa_ticket_ttl_seconds(),
        )
        .await?;

        return Ok(SignInResponse {
            session: None,
            mfa: Some(MfaChallenge {
                ticket: ticket.value,
            }),
        });
    }

    let session = token::mint_session(pool, state.tokens(), &user).await?;

    Ok(SignInResponse {
        session: Some(session),
        mfa: None,
    })
}
