//! Race-safe identity mutations: user creation, staged email binding, and
//! the WebAuthn promotion of an anonymous registrant to a named user.
//!
//! No application-level locking: the email unique constraint is the final
//! arbiter for every race, and colliding writers resolve by re-reading the
//! row the constraint protected. Notification failures after a committed
//! mutation never roll the mutation back.

use anyhow::{anyhow, Context};
use sqlx::PgPool;
use tracing::debug;
use webauthn_rs::prelude::RegisterPublicKeyCredential;

use super::credentials;
use super::errors::AuthError;
use super::session::get_sign_in_response;
use super::state::AuthState;
use super::storage::{
    self, BindEmailOutcome, InsertOutcome, NewUser, UserRecord,
};
use super::tickets::{self, TicketKind};
use super::types::{SignInResponse, SignUpOptions};
use crate::api::email::{build_envelope, EmailKind, Mailer};

/// How a signup request resolved: a row this request created, or one that
/// already existed (including one created by a concurrent request that won
/// the unique-constraint race).
#[derive(Debug)]
pub(crate) enum SignupOutcome {
    Created(Box<UserRecord>),
    Existing(Box<UserRecord>),
}

impl SignupOutcome {
    pub(crate) fn user(&self) -> &UserRecord {
        match self {
            Self::Created(user) | Self::Existing(user) => user,
        }
    }
}

fn display_name_for(email: &str, options: &SignUpOptions) -> String {
    options
        .display_name
        .clone()
        .unwrap_or_else(|| email.to_string())
}

fn redirect_target<'a>(state: &'a AuthState, redirect_to: Option<&'a str>) -> &'a str {
    redirect_to.unwrap_or_else(|| state.config().client_url())
}

/// Whether policy calls for a verification notification for this user.
fn verification_email_required(state: &AuthState, user: &UserRecord) -> bool {
    !state.config().disable_new_users()
        && state.config().require_verified_email()
        && !user.email_verified
}

/// Issue a fresh email-verify ticket and trigger the verification
/// notification. The ticket issued here silently invalidates any earlier one
/// for the same user; the newest request's intent wins.
async fn send_verification_ticket(
    pool: &PgPool,
    state: &AuthState,
    mailer: &Mailer,
    user: &UserRecord,
    to: &str,
    redirect_to: &str,
) -> Result<(), AuthError> {
    let ticket = tickets::issue_ticket(
        pool,
        user.id,
        TicketKind::VerifyEmail,
        state.config().verify_email_ticket_ttl_seconds(),
    )
    .await?;

    let envelope = build_envelope(
        state.config(),
        EmailKind::EmailVerify,
        to,
        &user.display_name,
        user.new_email.as_deref(),
        user.locale.as_deref(),
        &ticket.value,
        redirect_to,
    );

    mailer.send(&envelope).await?;
    Ok(())
}

/// Create-or-reuse on signup.
///
/// Looks up the email first; an existing user is returned as-is with its
/// verification notification re-triggered when policy requires one, and its
/// credentials are never re-hashed or overwritten. A lost insert race
/// (unique-constraint violation) resolves the same way.
pub(crate) async fn create_user_and_send_verification_email(
    pool: &PgPool,
    state: &AuthState,
    mailer: &Mailer,
    email: &str,
    password: Option<&str>,
    options: &SignUpOptions,
) -> Result<SignupOutcome, AuthError> {
    let redirect_to = redirect_target(state, options.redirect_to.as_deref());

    if let Some(existing) = storage::get_user_by_email(pool, email).await? {
        if verification_email_required(state, &existing) {
            send_verification_ticket(pool, state, mailer, &existing, email, redirect_to).await?;
        }
        return Ok(SignupOutcome::Existing(Box::new(existing)));
    }

    let password_hash = password.map(credentials::hash_password).transpose()?;
    let default_role = options
        .default_role
        .clone()
        .unwrap_or_else(|| state.config().default_role().to_string());
    let roles = options
        .allowed_roles
        .clone()
        .unwrap_or_else(|| vec![default_role.clone()]);

    let new_user = NewUser {
        email: Some(email.to_string()),
        new_email: None,
        password_hash,
        display_name: display_name_for(email, options),
        disabled: state.config().disable_new_users(),
        is_anonymous: false,
        locale: options.locale.clone(),
        default_role,
        roles,
        webauthn_challenge: None,
    };

    let user = match storage::insert_user(pool, &new_user).await? {
        InsertOutcome::Inserted(user) => user,
        InsertOutcome::EmailTaken => {
            // Someone else just created this user; resolve to the
            // existing-user branch instead of surfacing an error.
            debug!("signup lost insert race for {email}, re-reading");
            let existing = storage::get_user_by_email(pool, email)
                .await?
                .ok_or_else(|| {
                    AuthError::from(anyhow!("user disappeared after unique violation"))
                })?;
            if verification_email_required(state, &existing) {
                send_verification_ticket(pool, state, mailer, &existing, email, redirect_to)
                    .await?;
            }
            return Ok(SignupOutcome::Existing(Box::new(existing)));
        }
    };

    if verification_email_required(state, &user) {
        send_verification_ticket(pool, state, mailer, &user, email, redirect_to).await?;
    }

    Ok(SignupOutcome::Created(user))
}

/// Begin a WebAuthn signup: insert an anonymous user staging the address in
/// `new_email`, start the ceremony, and bind its challenge to the row.
pub(crate) async fn webauthn_signup_begin(
    pool: &PgPool,
    state: &AuthState,
    email: &str,
    options: &SignUpOptions,
) -> Result<webauthn_rs::prelude::CreationChallengeResponse, AuthError> {
    let Some(ceremonies) = state.webauthn() else {
        return Err(AuthError::DisabledEndpoint);
    };

    if storage::get_user_by_email(pool, email).await?.is_some() {
        return Err(AuthError::EmailAlreadyInUse);
    }

    let default_role = options
        .default_role
        .clone()
        .unwrap_or_else(|| state.config().default_role().to_string());
    let roles = options
        .allowed_roles
        .clone()
        .unwrap_or_else(|| vec![default_role.clone()]);

    let new_user = NewUser {
        email: None,
        new_email: Some(email.to_string()),
        password_hash: None,
        display_name: display_name_for(email, options),
        disabled: state.config().disable_new_users(),
        is_anonymous: true,
        locale: options.locale.clone(),
        default_role,
        roles,
        webauthn_challenge: None,
    };

    let user = match storage::insert_user(pool, &new_user).await? {
        InsertOutcome::Inserted(user) => user,
        // A NULL email cannot collide; anything else is a store fault.
        InsertOutcome::EmailTaken => {
            return Err(AuthError::from(anyhow!(
                "unexpected unique violation inserting anonymous user"
            )))
        }
    };

    let (challenge_response, challenge) = ceremonies
        .register_begin(user.id, email, &user.display_name)
        .await?;
    storage::set_webauthn_challenge(pool, user.id, &challenge).await?;

    Ok(challenge_response)
}

/// Finish a WebAuthn signup: verify the ceremony, bind the credential, and
/// promote the anonymous registrant to the staged address.
///
/// The staged email is re-checked against the store because another user may
/// have claimed it between the two ceremony steps; the unique constraint
/// backs that check for claims landing in the same instant.
pub(crate) async fn webauthn_signup_verify(
    pool: &PgPool,
    state: &AuthState,
    mailer: &Mailer,
    credential: &serde_json::Value,
    nickname: Option<&str>,
    redirect_to: Option<&str>,
) -> Result<SignInResponse, AuthError> {
    let Some(ceremonies) = state.webauthn() else {
        return Err(AuthError::DisabledEndpoint);
    };

    let challenge = credentials::extract_webauthn_challenge(credential)
        .map_err(|_| AuthError::InvalidRequest("Could not parse challenge".to_string()))?;

    let user = storage::get_user_by_challenge(pool, &challenge)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    // Only an anonymous registrant with a staged address can be promoted.
    if !user.is_anonymous {
        return Err(AuthError::InvalidRequest(
            "User is not anonymous".to_string(),
        ));
    }
    let Some(new_email) = user.new_email.clone() else {
        return Err(AuthError::InvalidRequest("No new email found".to_string()));
    };

    // Another user may have registered this address while the requester was
    // between the two ceremony steps; the anonymous row stays untouched.
    if storage::get_user_by_email(pool, &new_email).await?.is_some() {
        return Err(AuthError::EmailAlreadyInUse);
    }

    let parsed: RegisterPublicKeyCredential = serde_json::from_value(credential.clone())
        .map_err(|_| AuthError::InvalidRequest("Invalid credential payload".to_string()))?;
    let passkey = ceremonies
        .register_finish(&challenge, &parsed)
        .await
        .context("webauthn registration verification failed")?;

    storage::insert_security_key(
        pool,
        user.id,
        passkey.cred_id().as_ref(),
        &serde_json::to_vec(&passkey).context("failed to serialize passkey")?,
        nickname,
    )
    .await?;

    match storage::promote_webauthn_user(pool, user.id, &new_email).await? {
        BindEmailOutcome::Bound => {}
        // The constraint closed the race at the last instant.
        BindEmailOutcome::EmailTaken => return Err(AuthError::EmailAlreadyInUse),
    }

    if user.disabled {
        return Err(AuthError::DisabledUser);
    }

    if state.config().require_verified_email() && !user.email_verified {
        let redirect_to = redirect_target(state, redirect_to);
        send_verification_ticket(pool, state, mailer, &user, &new_email, redirect_to).await?;
        return Ok(SignInResponse::withheld());
    }

    get_sign_in_response(pool, state, user.id, false).await
}

/// Consume an email-verify ticket: mark the email verified and bind any
/// staged address, atomically with the consumption.
pub(crate) async fn verify_email_ticket(pool: &PgPool, ticket: &str) -> Result<(), AuthError> {
    let mut tx = pool.begin().await.context("begin verify-email transaction")?;

    let Some(user_id) = tickets::consume_ticket(&mut tx, ticket, TicketKind::VerifyEmail).await?
    else {
        // Absent, expired, revoked, and replayed values all land here.
        let _ = tx.rollback().await;
        return Err(AuthError::InvalidRequest(
            "Invalid or expired ticket".to_string(),
        ));
    };

    storage::mark_email_verified(&mut tx, user_id).await?;
    tx.commit().await.context("commit verify-email transaction")?;

    Ok(())
}

/// Issue a password-reset ticket and trigger its notification.
pub(crate) async fn password_reset_request(
    pool: &PgPool,
    state: &AuthState,
    mailer: &Mailer,
    email: &str,
    redirect_to: Option<&str>,
) -> Result<(), AuthError> {
    let user = storage::get_user_by_email(pool, email).await?;
    // Unknown and disabled users are indistinguishable here.
    let user = match user {
        Some(user) if !user.disabled => user,
        _ => return Err(AuthError::UserNotFound),
    };

    let ticket = tickets::issue_ticket(
        pool,
        user.id,
        TicketKind::PasswordReset,
        state.config().password_reset_ticket_ttl_seconds(),
    )
    .await?;

    let redirect_to = redirect_target(state, redirect_to);
    let envelope = build_envelope(
        state.config(),
        EmailKind::PasswordReset,
        email,
        &user.display_name,
        user.new_email.as_deref(),
        user.locale.as_deref(),
        &ticket.value,
        redirect_to,
    );
    mailer.send(&envelope).await?;

    Ok(())
}

/// Consume a password-reset ticket and apply the new hash, atomically with
/// the consumption.
pub(crate) async fn password_change_with_ticket(
    pool: &PgPool,
    ticket: &str,
    new_password: &str,
) -> Result<(), AuthError> {
    // Hash outside the transaction; it is the slow part.
    let password_hash = credentials::hash_password(new_password)?;

    let mut tx = pool
        .begin()
        .await
        .context("begin password-change transaction")?;

    let Some(user_id) = tickets::consume_ticket(&mut tx, ticket, TicketKind::PasswordReset).await?
    else {
        let _ = tx.rollback().await;
        return Err(AuthError::InvalidRequest(
            "Invalid or expired ticket".to_string(),
        ));
    };

    storage::update_password_hash(&mut tx, user_id, &password_hash).await?;
    tx.commit()
        .await
        .context("commit password-change transaction")?;

    Ok(())
}

/// Re-issue a verification ticket for a known, still-unverified address.
pub(crate) async fn send_verification_email(
    pool: &PgPool,
    state: &AuthState,
    mailer: &Mailer,
    email: &str,
    redirect_to: Option<&str>,
) -> Result<(), AuthError> {
    let user = storage::get_user_by_email(pool, email)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    if user.email_verified {
        return Err(AuthError::EmailAlreadyVerified);
    }

    // Send to the stored address, not the caller-supplied spelling.
    let to = user
        .email
        .clone()
        .ok_or_else(|| AuthError::InvalidRequest("User has no email".to_string()))?;

    let redirect_to = redirect_target(state, redirect_to);
    send_verification_ticket(pool, state, mailer, &user, &to, redirect_to).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::SignupOutcome;
    use crate::api::handlers::auth::storage::UserRecord;
    use uuid::Uuid;

    fn user() -> UserRecord {
        UserRecord {
            id: Uuid::nil(),
            email: Some("alice@example.com".to_string()),
            new_email: None,
            password_hash: None,
            display_name: "Alice".to_string(),
            disabled: false,
            email_verified: false,
            is_anonymous: false,
            locale: None,
            default_role: "user".to_string(),
            roles: vec!["user".to_string()],
            mfa_enabled: false,
            totp_secret: None,
        }
    }

    #[test]
    fn signup_outcome_exposes_the_user_either_way() {
        let created = SignupOutcome::Created(Box::new(user()));
        let existing = SignupOutcome::Existing(Box::new(user()));
        assert_eq!(created.user().id, existing.user().id);
        assert!(format!("{created:?}").starts_with("Created"));
        assert!(format!("{existing:?}").starts_with("Existing"));
    }
}
