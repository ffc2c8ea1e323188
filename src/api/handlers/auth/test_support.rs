//! Shared fixtures for handler tests.

use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;

use super::state::{AuthConfig, AuthState};
use crate::api::email::{LogEmailSender, Mailer};

pub(crate) fn auth_config() -> AuthConfig {
    AuthConfig::new(
        "https://auth.sesamo.dev".to_string(),
        "https://app.sesamo.dev".to_string(),
    )
    .with_jwt_secret(SecretString::from("test-secret".to_string()))
}

pub(crate) fn auth_state() -> Result<Arc<AuthState>> {
    Ok(Arc::new(AuthState::new(auth_config())?))
}

pub(crate) fn mailer() -> Arc<Mailer> {
    Arc::new(Mailer::new(Arc::new(LogEmailSender)))
}
