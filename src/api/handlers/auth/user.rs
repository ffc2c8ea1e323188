//! User-facing ticket endpoints: email verification and password reset.

use axum::{extract::Extension, Json};
use sqlx::PgPool;
use std::sync::Arc;

use super::errors::AuthError;
use super::identity::{
    password_change_with_ticket, password_reset_request, send_verification_email,
    verify_email_ticket,
};
use super::state::AuthState;
use super::types::{
    PasswordChangeRequest, PasswordResetRequest, SendVerificationEmailRequest, VerifyEmailRequest,
};
use super::utils::{normalize_email, valid_email};
use crate::api::email::Mailer;

#[utoipa::path(
    post,
    path = "/user/email/verify",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified"),
        (status = 400, description = "Invalid or expired ticket"),
    ),
    tag = "user"
)]
pub async fn verify_email(
    pool: Extension<PgPool>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> Result<Json<&'static str>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidRequest("Missing payload".to_string()));
    };

    verify_email_ticket(&pool, &request.ticket).await?;
    Ok(Json("OK"))
}

#[utoipa::path(
    post,
    path = "/user/email/send-verification-email",
    request_body = SendVerificationEmailRequest,
    responses(
        (status = 200, description = "Verification email sent"),
        (status = 400, description = "Unknown user or email already verified"),
    ),
    tag = "user"
)]
pub async fn resend_verification_email(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    mailer: Extension<Arc<Mailer>>,
    payload: Option<Json<SendVerificationEmailRequest>>,
) -> Result<Json<&'static str>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidRequest("Missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(AuthError::UserNotFound);
    }

    send_verification_email(
        &pool,
        &auth_state,
        &mailer,
        &email,
        request.options.redirect_to.as_deref(),
    )
    .await?;
    Ok(Json("OK"))
}

#[utoipa::path(
    post,
    path = "/user/password/reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Password reset email sent"),
        (status = 400, description = "Unknown or disabled user"),
    ),
    tag = "user"
)]
pub async fn password_reset(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    mailer: Extension<Arc<Mailer>>,
    payload: Option<Json<PasswordResetRequest>>,
) -> Result<Json<&'static str>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidRequest("Missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(AuthError::UserNotFound);
    }

    password_reset_request(
        &pool,
        &auth_state,
        &mailer,
        &email,
        request.options.redirect_to.as_deref(),
    )
    .await?;
    Ok(Json("OK"))
}

#[utoipa::path(
    post,
    path = "/user/password",
    request_body = PasswordChangeRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Invalid or expired ticket"),
    ),
    tag = "user"
)]
pub async fn password_change(
    pool: Extension<PgPool>,
    payload: Option<Json<PasswordChangeRequest>>,
) -> Result<Json<&'static str>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidRequest("Missing payload".to_string()));
    };

    if request.new_password.trim().is_empty() {
        return Err(AuthError::InvalidRequest("Missing password".to_string()));
    }

    password_change_with_ticket(&pool, &request.ticket, &request.new_password).await?;
    Ok(Json("OK"))
}

#[cfg(test)]
mod tests {
    use super::{password_change, password_reset, resend_verification_email, verify_email};
    use crate::api::handlers::auth::test_support::{auth_state, mailer};
    use crate::api::handlers::auth::types::PasswordChangeRequest;
    use anyhow::Result;
    use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn verify_email_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = verify_email(Extension(pool), None).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn resend_verification_email_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = resend_verification_email(
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

    #[tokio::test]
    async fn password_reset_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = password_reset(
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

    #[tokio::test]
    async fn password_change_rejects_empty_password() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = password_change(
            Extension(pool),
            Some(Json(PasswordChangeRequest {
                new_password: "  ".to_string(),
                ticket: "passwordReset:3fa2".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
