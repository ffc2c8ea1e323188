//! `WebAuthn` ceremony service.
//!
//! Coordinates the two-step registration protocol:
//! 1. Generate a challenge for the browser.
//! 2. Hold the ephemeral `PasskeyRegistration` state for the ceremony's
//!    validity window, keyed by the challenge string the client will echo
//!    back inside its signed data.
//! 3. Verify the browser's cryptographic proof against that state.
//!
//! Signature and counter verification are delegated entirely to
//! `webauthn-rs`; this service only correlates ceremonies.

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;
use uuid::Uuid;
use webauthn_rs::prelude::{
    CreationChallengeResponse, Passkey, PasskeyRegistration, RegisterPublicKeyCredential,
};
use webauthn_rs::{Webauthn, WebauthnBuilder};

struct PendingRegistration {
    state: PasskeyRegistration,
    created_at: Instant,
}

pub struct CeremonyService {
    webauthn: Webauthn,
    ceremony_ttl: Duration,
    // In-memory store for in-flight registration states
    reg_states: Mutex<HashMap<String, PendingRegistration>>,
}

impl CeremonyService {
    /// Create a new ceremony service.
    ///
    /// # Errors
    /// Returns an error if the relying-party origin does not parse or the
    /// `WebAuthn` builder rejects the configuration.
    pub fn new(rp_id: &str, rp_origin: &str, ceremony_ttl: Duration) -> Result<Self> {
        let rp_origin_url = Url::parse(rp_origin).context("invalid relying-party origin")?;
        let webauthn = WebauthnBuilder::new(rp_id, &rp_origin_url)?
            .rp_name("Sesamo")
            .build()?;

        Ok(Self {
            webauthn,
            ceremony_ttl,
            reg_states: Mutex::new(HashMap::new()),
        })
    }

    /// Start a registration ceremony and return the browser challenge along
    /// with the challenge string used to correlate the finish step.
    ///
    /// # Errors
    /// Returns an error if challenge generation fails.
    pub async fn register_begin(
        &self,
        user_id: Uuid,
        user_name: &str,
        display_name: &str,
    ) -> Result<(CreationChallengeResponse, String)> {
        let (challenge_response, registration) =
            self.webauthn
                .start_passkey_registration(user_id, user_name, display_name, None)?;

        // The browser echoes the challenge back base64url-encoded inside
        // clientDataJSON; key the pending state by that exact encoding.
        let challenge = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(challenge_response.public_key.challenge.as_ref());

        let mut states = self.reg_states.lock().await;
        states.retain(|_, entry| entry.created_at.elapsed() < self.ceremony_ttl);
        states.insert(
            challenge.clone(),
            PendingRegistration {
                state: registration,
                created_at: Instant::now(),
            },
        );

        Ok((challenge_response, challenge))
    }

    /// Finish a registration ceremony previously started with
    /// [`register_begin`](Self::register_begin).
    ///
    /// # Errors
    /// Returns an error if the ceremony is unknown or expired, or if
    /// `webauthn-rs` rejects the credential.
    pub async fn register_finish(
        &self,
        challenge: &str,
        credential: &RegisterPublicKeyCredential,
    ) -> Result<Passkey> {
        let registration = {
            let mut states = self.reg_states.lock().await;
            states
                .remove(challenge)
                .filter(|entry| entry.created_at.elapsed() < self.ceremony_ttl)
                .ok_or_else(|| anyhow!("Registration ceremony not found or expired"))?
        };

        let passkey = self
            .webauthn
            .finish_passkey_registration(credential, &registration.state)?;

        Ok(passkey)
    }
}

#[cfg(test)]
mod tests {
    use super::CeremonyService;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use std::time::Duration;
    use uuid::Uuid;

    fn service() -> CeremonyService {
        CeremonyService::new(
            "app.sesamo.dev",
            "https://app.sesamo.dev",
            Duration::from_secs(300),
        )
        .expect("service")
    }

    #[test]
    fn rejects_invalid_origin() {
        let result = CeremonyService::new("app.sesamo.dev", "not a url", Duration::from_secs(300));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn register_begin_returns_the_echoed_challenge_encoding() {
        let service = service();
        let (response, challenge) = service
            .register_begin(Uuid::new_v4(), "alice@example.com", "Alice")
            .await
            .expect("begin");

        let expected = URL_SAFE_NO_PAD.encode(response.public_key.challenge.as_ref());
        assert_eq!(challenge, expected);
    }

    #[tokio::test]
    async fn challenges_are_unique_per_ceremony() {
        let service = service();
        let (_, first) = service
            .register_begin(Uuid::new_v4(), "a@example.com", "A")
            .await
            .expect("begin");
        let (_, second) = service
            .register_begin(Uuid::new_v4(), "b@example.com", "B")
            .await
            .expect("begin");
        assert_ne!(first, second);
    }
}
