//! Sign-up endpoints: email/password and the WebAuthn ceremony pair.

use axum::{extract::Extension, Json};
use sqlx::PgPool;
use std::sync::Arc;

use super::errors::AuthError;
use super::identity::{
    create_user_and_send_verification_email, webauthn_signup_begin, webauthn_signup_verify,
    SignupOutcome,
};
use super::session::get_sign_in_response;
use super::state::AuthState;
use super::types::{
    SignInResponse, SignUpEmailPasswordRequest, SignUpWebauthnRequest,
    SignUpWebauthnVerifyRequest,
};
use super::utils::{normalize_email, valid_email};
use crate::api::email::Mailer;

#[utoipa::path(
    post,
    path = "/signup/email-password",
    request_body = SignUpEmailPasswordRequest,
    responses(
        (status = 200, description = "Signup accepted; session present unless withheld by policy", body = SignInResponse),
        (status = 400, description = "Validation error"),
    ),
    tag = "auth"
)]
pub async fn signup_email_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    mailer: Extension<Arc<Mailer>>,
    payload: Option<Json<SignUpEmailPasswordRequest>>,
) -> Result<Json<SignInResponse>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidRequest("Missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(AuthError::InvalidRequest("Invalid email".to_string()));
    }

    let outcome = create_user_and_send_verification_email(
        &pool,
        &auth_state,
        &mailer,
        &email,
        Some(&request.password),
        &request.options,
    )
    .await?;

    // Existing users get no session from a signup: their verification
    // notification was re-triggered, but tokens require a credential check.
    if matches!(outcome, SignupOutcome::Existing(_)) {
        return Ok(Json(SignInResponse::withheld()));
    }

    let user = outcome.user();
    if user.disabled || (auth_state.config().require_verified_email() && !user.email_verified) {
        return Ok(Json(SignInResponse::withheld()));
    }

    let response = get_sign_in_response(&pool, &auth_state, user.id, false).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/signup/webauthn",
    request_body = SignUpWebauthnRequest,
    responses(
        (status = 200, description = "Registration ceremony started"),
        (status = 404, description = "WebAuthn is disabled"),
        (status = 409, description = "Email already in use"),
    ),
    tag = "auth"
)]
pub async fn signup_webauthn(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SignUpWebauthnRequest>>,
) -> Result<Json<webauthn_rs::prelude::CreationChallengeResponse>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidRequest("Missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(AuthError::InvalidRequest("Invalid email".to_string()));
    }

    let challenge = webauthn_signup_begin(&pool, &auth_state, &email, &request.options).await?;
    Ok(Json(challenge))
}

#[utoipa::path(
    post,
    path = "/signup/webauthn/verify",
    request_body = SignUpWebauthnVerifyRequest,
    responses(
        (status = 200, description = "Promotion complete; session present unless withheld", body = SignInResponse),
        (status = 400, description = "Malformed challenge payload"),
        (status = 409, description = "Email already in use"),
    ),
    tag = "auth"
)]
pub async fn signup_webauthn_verify(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    mailer: Extension<Arc<Mailer>>,
    payload: Option<Json<SignUpWebauthnVerifyRequest>>,
) -> Result<Json<SignInResponse>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidRequest("Missing payload".to_string()));
    };

    let response = webauthn_signup_verify(
        &pool,
        &auth_state,
        &mailer,
        &request.credential,
        request.options.nickname.as_deref(),
        request.options.redirect_to.as_deref(),
    )
    .await?;

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::{signup_email_password, signup_webauthn, signup_webauthn_verify};
    use crate::api::handlers::auth::test_support::{auth_state, mailer};
    use crate::api::handlers::auth::types::SignUpWebauthnRequest;
    use anyhow::Result;
    use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn signup_email_password_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response =
            signup_email_password(Extension(pool), Extension(auth_state()?), Extension(mailer()), None)
                .await
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn signup_webauthn_disabled_endpoint() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        // WebAuthn is off in the default test state, so the gate fires before
        // any database access.
        let response = signup_webauthn(
            Extension(pool),
            Extension(auth_state()?),
            Some(Json(SignUpWebauthnRequest {
                email: "alice@example.com".to_string(),
                options: Default::default(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn signup_webauthn_verify_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = signup_webauthn_verify(
            Extension(pool),
            Extension(auth_state()?),
            Extension(mailer()),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
