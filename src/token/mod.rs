//! Session minting.
//!
//! A session is an access/refresh token pair: the access token is a signed
//! JWT scoped to the user's role set, the refresh token is a random value of
//! which only a hash is stored. The rest of the service treats this module as
//! an opaque "mint session" capability; it makes no issuance decisions.

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use jsonwebtoken::{encode, EncodingKey, Header};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::Instrument;
use utoipa::ToSchema;

use crate::api::handlers::auth::storage::UserRecord;
use crate::api::handlers::auth::utils::is_unique_violation;

/// An issued session as returned to clients.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub access_token_expires_in: i64,
    pub refresh_token: String,
}

/// Claims carried by the access token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub roles: Vec<String>,
    pub default_role: String,
}

pub struct TokenMinter {
    secret: SecretString,
    issuer: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl TokenMinter {
    #[must_use]
    pub fn new(
        secret: SecretString,
        issuer: String,
        access_ttl_seconds: i64,
        refresh_ttl_seconds: i64,
    ) -> Self {
        Self {
            secret,
            issuer,
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    fn now_unix() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(0))
    }

    /// Sign an access token for a user's role set.
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails.
    pub fn mint_access_token(&self, user: &UserRecord) -> Result<(String, i64)> {
        let iat = Self::now_unix();
        let claims = AccessClaims {
            sub: user.id.to_string(),
            iss: self.issuer.clone(),
            iat,
            exp: iat + self.access_ttl_seconds,
            roles: user.roles.clone(),
            default_role: user.default_role.clone(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .context("failed to sign access token")?;

        Ok((token, self.access_ttl_seconds))
    }

    pub(crate) fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }
}

/// Create a new refresh token. The raw value is only returned to the client;
/// the database stores a hash.
fn generate_refresh_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate refresh token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

fn hash_refresh_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Mint a full session for a user: signed access token plus a stored refresh
/// token.
pub(crate) async fn mint_session(
    pool: &PgPool,
    minter: &TokenMinter,
    user: &UserRecord,
) -> Result<Session> {
    let (access_token, access_token_expires_in) = minter.mint_access_token(user)?;

    let query = r"
        INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let refresh_token = generate_refresh_token()?;
        let token_hash = hash_refresh_token(&refresh_token);
        let result = sqlx::query(query)
            .bind(user.id)
            .bind(token_hash)
            .bind(minter.refresh_ttl_seconds())
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => {
                return Ok(Session {
                    access_token,
                    access_token_expires_in,
                    refresh_token,
                })
            }
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert refresh token"),
        }
    }

    Err(anyhow!("failed to generate unique refresh token"))
}

#[cfg(test)]
mod tests {
    use super::{generate_refresh_token, hash_refresh_token, AccessClaims, TokenMinter};
    use crate::api::handlers::auth::storage::UserRecord;
    use anyhow::Result;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use jsonwebtoken::{decode, DecodingKey, Validation};
    use secrecy::SecretString;
    use uuid::Uuid;

    fn minter() -> TokenMinter {
        TokenMinter::new(
            SecretString::from("test-secret".to_string()),
            "https://auth.sesamo.dev".to_string(),
            900,
            3600,
        )
    }

    fn user() -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            email: Some("alice@example.com".to_string()),
            new_email: None,
            password_hash: None,
            display_name: "Alice".to_string(),
            disabled: false,
            email_verified: true,
            is_anonymous: false,
            locale: None,
            default_role: "user".to_string(),
            roles: vec!["user".to_string(), "editor".to_string()],
            mfa_enabled: false,
            totp_secret: None,
        }
    }

    #[test]
    fn access_token_carries_roles_and_expiry() -> Result<()> {
        let minter = minter();
        let user = user();
        let (token, expires_in) = minter.mint_access_token(&user)?;
        assert_eq!(expires_in, 900);

        let mut validation = Validation::default();
        validation.set_issuer(&["https://auth.sesamo.dev"]);
        let decoded = decode::<AccessClaims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &validation,
        )?;

        assert_eq!(decoded.claims.sub, user.id.to_string());
        assert_eq!(decoded.claims.roles, user.roles);
        assert_eq!(decoded.claims.default_role, "user");
        assert_eq!(decoded.claims.exp - decoded.claims.iat, 900);
        Ok(())
    }

    #[test]
    fn refresh_tokens_are_random_and_hashable() -> Result<()> {
        let first = generate_refresh_token()?;
        let second = generate_refresh_token()?;
        assert_ne!(first, second);
        assert_eq!(URL_SAFE_NO_PAD.decode(first.as_bytes())?.len(), 32);

        assert_eq!(hash_refresh_token(&first), hash_refresh_token(&first));
        assert_ne!(hash_refresh_token(&first), hash_refresh_token(&second));
        Ok(())
    }
}
