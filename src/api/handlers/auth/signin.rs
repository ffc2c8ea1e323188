//! Sign-in endpoints: email/password and the MFA challenge step.

use anyhow::Context;
use axum::{extract::Extension, Json};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;

use super::credentials::{verify_password_credential, Rejection, Verdict};
use super::errors::AuthError;
use super::session::get_sign_in_response;
use super::state::AuthState;
use super::storage::{get_user_by_email, get_user_by_id};
use super::tickets::{consume_ticket, TicketKind};
use super::types::{SignInEmailPasswordRequest, SignInMfaTotpRequest, SignInResponse};
use super::utils::{normalize_email, valid_email};
use crate::totp;

#[utoipa::path(
    post,
    path = "/signin/email-password",
    request_body = SignInEmailPasswordRequest,
    responses(
        (status = 200, description = "Session issued or MFA pending", body = SignInResponse),
        (status = 401, description = "Invalid credentials, disabled or unverified user"),
    ),
    tag = "auth"
)]
pub async fn signin_email_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SignInEmailPasswordRequest>>,
) -> Result<Json<SignInResponse>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidRequest("Missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    debug!("Sign in with email: {email}");

    // Nonexistent users and bad addresses are indistinguishable from a wrong
    // password.
    if !valid_email(&email) {
        return Err(AuthError::InvalidEmailPassword);
    }
    let user = get_user_by_email(&pool, &email)
        .await?
        .ok_or(AuthError::InvalidEmailPassword)?;

    match verify_password_credential(auth_state.config(), &user, &request.password) {
        Verdict::Verified => {}
        Verdict::Rejected(Rejection::DisabledUser) => return Err(AuthError::DisabledUser),
        Verdict::Rejected(Rejection::UnverifiedUser) => return Err(AuthError::UnverifiedUser),
        Verdict::Rejected(Rejection::InvalidCredential) | Verdict::Malformed => {
            return Err(AuthError::InvalidEmailPassword)
        }
    }

    let response = get_sign_in_response(&pool, &auth_state, user.id, true).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/signin/mfa/totp",
    request_body = SignInMfaTotpRequest,
    responses(
        (status = 200, description = "Session issued", body = SignInResponse),
        (status = 400, description = "Invalid ticket or code"),
    ),
    tag = "auth"
)]
pub async fn signin_mfa_totp(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SignInMfaTotpRequest>>,
) -> Result<Json<SignInResponse>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidRequest("Missing payload".to_string()));
    };

    let mut tx = pool.begin().await.context("begin mfa transaction")?;

    let Some(user_id) = consume_ticket(&mut tx, &request.ticket, TicketKind::MfaTotp).await? else {
        let _ = tx.rollback().await;
        return Err(AuthError::InvalidRequest(
            "Invalid or expired ticket".to_string(),
        ));
    };

    let user = get_user_by_id(&pool, user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    let Some(secret) = user.totp_secret.as_deref() else {
        let _ = tx.rollback().await;
        return Err(AuthError::InvalidRequest(
            "MFA is not enabled for this user".to_string(),
        ));
    };

    if !totp::verify_code(secret, &request.otp)? {
        // Roll back so a mistyped code does not burn the challenge ticket.
        let _ = tx.rollback().await;
        return Err(AuthError::InvalidRequest(
            "Invalid one-time code".to_string(),
        ));
    }

    tx.commit().await.context("commit mfa ticket consumption")?;

    let response = get_sign_in_response(&pool, &auth_state, user.id, false).await?;
    Ok(Json(response))
}
