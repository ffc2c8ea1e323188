//! Database helpers for user records.
//!
//! All cross-request coordination happens here: mutations are atomic
//! single-row updates, and the unique constraint on `users.email` is the
//! final arbiter for identity races. Insert/update paths that can collide on
//! an email surface that case as a tagged outcome instead of an error.

use anyhow::{Context, Result};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::is_unique_violation;

const USER_COLUMNS: &str = "id, email, new_email, password_hash, display_name, disabled, \
     email_verified, is_anonymous, locale, default_role, roles, mfa_enabled, totp_secret";

/// A user row as the auth core sees it.
#[derive(Clone, Debug)]
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) email: Option<String>,
    pub(crate) new_email: Option<String>,
    pub(crate) password_hash: Option<String>,
    pub(crate) display_name: String,
    pub(crate) disabled: bool,
    pub(crate) email_verified: bool,
    pub(crate) is_anonymous: bool,
    pub(crate) locale: Option<String>,
    pub(crate) default_role: String,
    pub(crate) roles: Vec<String>,
    pub(crate) mfa_enabled: bool,
    pub(crate) totp_secret: Option<String>,
}

fn map_user_row(row: &PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        new_email: row.get("new_email"),
        password_hash: row.get("password_hash"),
        display_name: row.get("display_name"),
        disabled: row.get("disabled"),
        email_verified: row.get("email_verified"),
        is_anonymous: row.get("is_anonymous"),
        locale: row.get("locale"),
        default_role: row.get("default_role"),
        roles: row.get("roles"),
        mfa_enabled: row.get("mfa_enabled"),
        totp_secret: row.get("totp_secret"),
    }
}

/// Fields for a fresh user row; everything else defaults in the database.
#[derive(Clone, Debug)]
pub(crate) struct NewUser {
    pub(crate) email: Option<String>,
    pub(crate) new_email: Option<String>,
    pub(crate) password_hash: Option<String>,
    pub(crate) display_name: String,
    pub(crate) disabled: bool,
    pub(crate) is_anonymous: bool,
    pub(crate) locale: Option<String>,
    pub(crate) default_role: String,
    pub(crate) roles: Vec<String>,
    pub(crate) webauthn_challenge: Option<String>,
}

/// Outcome of inserting a user under the email unique constraint.
#[derive(Debug)]
pub(crate) enum InsertOutcome {
    Inserted(Box<UserRecord>),
    EmailTaken,
}

/// Outcome of binding an email to a user under the unique constraint.
#[derive(Debug)]
pub(crate) enum BindEmailOutcome {
    Bound,
    EmailTaken,
}

pub(crate) async fn get_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;

    Ok(row.as_ref().map(map_user_row))
}

pub(crate) async fn get_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;

    Ok(row.as_ref().map(map_user_row))
}

/// Correlate an in-flight WebAuthn ceremony back to its user.
pub(crate) async fn get_user_by_challenge(
    pool: &PgPool,
    challenge: &str,
) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE webauthn_challenge = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(challenge)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by challenge")?;

    Ok(row.as_ref().map(map_user_row))
}

/// Insert a new user. A colliding email is an expected outcome, not an error:
/// the caller re-reads and follows the existing-user branch.
pub(crate) async fn insert_user(pool: &PgPool, user: &NewUser) -> Result<InsertOutcome> {
    let query = format!(
        r"
        INSERT INTO users
            (email, new_email, password_hash, display_name, disabled, email_verified,
             is_anonymous, locale, default_role, roles, webauthn_challenge)
        VALUES ($1, $2, $3, $4, $5, false, $6, $7, $8, $9, $10)
        RETURNING {USER_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(&user.email)
        .bind(&user.new_email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.disabled)
        .bind(user.is_anonymous)
        .bind(&user.locale)
        .bind(&user.default_role)
        .bind(&user.roles)
        .bind(&user.webauthn_challenge)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(InsertOutcome::Inserted(Box::new(map_user_row(&row)))),
        Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::EmailTaken),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// Promote an anonymous WebAuthn registrant to a named user by binding the
/// staged email. Runs under the email unique constraint so a concurrent claim
/// of the same address surfaces as `EmailTaken`.
pub(crate) async fn promote_webauthn_user(
    pool: &PgPool,
    user_id: Uuid,
    email: &str,
) -> Result<BindEmailOutcome> {
    let query = r"
        UPDATE users
        SET is_anonymous = false,
            email = $2,
            new_email = NULL,
            webauthn_challenge = NULL,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(email)
        .execute(pool)
        .instrument(span)
        .await;

    match result {
        Ok(_) => Ok(BindEmailOutcome::Bound),
        Err(err) if is_unique_violation(&err) => Ok(BindEmailOutcome::EmailTaken),
        Err(err) => Err(err).context("failed to promote webauthn user"),
    }
}

pub(crate) async fn set_webauthn_challenge(
    pool: &PgPool,
    user_id: Uuid,
    challenge: &str,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET webauthn_challenge = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(challenge)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to set webauthn challenge")?;
    Ok(())
}

/// Mark the email verified inside a ticket-consumption transaction. A staged
/// `new_email` becomes the active address in the same statement.
pub(crate) async fn mark_email_verified(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET email_verified = true,
            email = COALESCE(new_email, email),
            new_email = NULL,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to mark email verified")?;
    Ok(())
}

/// Apply a new password hash inside a ticket-consumption transaction.
pub(crate) async fn update_password_hash(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET password_hash = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update password hash")?;
    Ok(())
}

/// Persist a verified WebAuthn credential with its nickname.
pub(crate) async fn insert_security_key(
    pool: &PgPool,
    user_id: Uuid,
    credential_id: &[u8],
    public_key: &[u8],
    nickname: Option<&str>,
) -> Result<()> {
    let query = r"
        INSERT INTO security_keys (user_id, credential_id, public_key, nickname, sign_count)
        VALUES ($1, $2, $3, $4, 0)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(credential_id)
        .bind(public_key)
        .bind(nickname)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert security key")?;
    Ok(())
}
