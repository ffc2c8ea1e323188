//! Single-use, typed, expiring tickets.
//!
//! A ticket authorizes exactly one state transition (verify email, reset
//! password, answer an MFA challenge). The wire value is `"<type>:<uuid>"`;
//! only its SHA-256 hash is stored. Issuing a ticket revokes every
//! still-active ticket of the same user, so at most one is active at a time,
//! and consumption happens inside the caller's transaction so the authorized
//! effect and the consumption commit or roll back together.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TicketKind {
    VerifyEmail,
    PasswordReset,
    MfaTotp,
}

impl TicketKind {
    pub(crate) fn wire_name(self) -> &'static str {
        match self {
            Self::VerifyEmail => "verifyEmail",
            Self::PasswordReset => "passwordReset",
            Self::MfaTotp => "mfaTotp",
        }
    }
}

/// A freshly issued ticket. The raw value is only ever sent to the user.
#[derive(Clone, Debug)]
pub(crate) struct Ticket {
    pub(crate) value: String,
}

fn new_ticket_value(kind: TicketKind) -> String {
    format!("{}:{}", kind.wire_name(), Uuid::new_v4())
}

/// Hash a ticket value so raw values never touch the database.
fn hash_ticket_value(value: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().to_vec()
}

/// Issue a ticket for a user, revoking any still-active ticket in the same
/// transaction. The newest request's intent wins.
pub(crate) async fn issue_ticket(
    pool: &PgPool,
    user_id: Uuid,
    kind: TicketKind,
    ttl_seconds: i64,
) -> Result<Ticket> {
    let value = new_ticket_value(kind);
    let token_hash = hash_ticket_value(&value);

    let mut tx = pool.begin().await.context("begin ticket transaction")?;

    let query = r"
        UPDATE tickets
        SET revoked_at = NOW()
        WHERE user_id = $1
          AND consumed_at IS NULL
          AND revoked_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to revoke prior tickets")?;

    let query = r"
        INSERT INTO tickets (user_id, ticket_type, token_hash, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(kind.wire_name())
        .bind(&token_hash)
        .bind(ttl_seconds)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert ticket")?;

    tx.commit().await.context("commit ticket transaction")?;

    Ok(Ticket { value })
}

/// Consume a ticket of the expected kind inside the caller's transaction.
///
/// Returns the user the ticket was bound to, or `None` when the value is
/// absent, expired, revoked, or already consumed; those cases are
/// indistinguishable to keep ticket values unenumerable. The caller applies
/// the authorized effect and commits; rolling back leaves the ticket valid
/// for retry.
pub(crate) async fn consume_ticket(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    value: &str,
    kind: TicketKind,
) -> Result<Option<Uuid>> {
    let token_hash = hash_ticket_value(value.trim());

    let query = r"
        UPDATE tickets
        SET consumed_at = NOW()
        WHERE token_hash = $1
          AND ticket_type = $2
          AND consumed_at IS NULL
          AND revoked_at IS NULL
          AND expires_at > NOW()
        RETURNING user_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(&token_hash)
        .bind(kind.wire_name())
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to consume ticket")?;

    Ok(row.map(|row| row.get("user_id")))
}

#[cfg(test)]
mod tests {
    use super::{hash_ticket_value, new_ticket_value, TicketKind};
    use uuid::Uuid;

    #[test]
    fn wire_names_are_stable() {
        assert_eq!(TicketKind::VerifyEmail.wire_name(), "verifyEmail");
        assert_eq!(TicketKind::PasswordReset.wire_name(), "passwordReset");
        assert_eq!(TicketKind::MfaTotp.wire_name(), "mfaTotp");
    }

    #[test]
    fn ticket_value_carries_type_prefix_and_uuid() {
        let value = new_ticket_value(TicketKind::VerifyEmail);
        let (prefix, id) = value.split_once(':').expect("prefixed value");
        assert_eq!(prefix, "verifyEmail");
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn ticket_values_are_unique() {
        let first = new_ticket_value(TicketKind::PasswordReset);
        let second = new_ticket_value(TicketKind::PasswordReset);
        assert_ne!(first, second);
    }

    #[test]
    fn hash_is_stable_and_discriminating() {
        let value = "verifyEmail:3fa25f07-9c11-4f3e-9a52-0b2f9c7ad001";
        assert_eq!(hash_ticket_value(value), hash_ticket_value(value));
        assert_ne!(
            hash_ticket_value(value),
            hash_ticket_value("verifyEmail:other")
        );
    }
}
