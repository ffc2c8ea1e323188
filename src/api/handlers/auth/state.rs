//! Auth configuration and shared state.

use anyhow::Result;
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

use crate::token::TokenMinter;
use crate::webauthn::CeremonyService;

const DEFAULT_VERIFY_EMAIL_TICKET_TTL_SECONDS: i64 = 60 * 60 * 24 * 30;
const DEFAULT_PASSWORD_RESET_TICKET_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_MFA_TICKET_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 60 * 60 * 24 * 30;
const DEFAULT_CEREMONY_TTL_SECONDS: u64 = 5 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    server_url: String,
    client_url: String,
    app_redirect_url: Option<String>,
    jwt_secret: SecretString,
    master_password: Option<SecretString>,
    default_locale: String,
    default_role: String,
    require_verified_email: bool,
    disable_new_users: bool,
    webauthn_enabled: bool,
    webauthn_rp_id: String,
    webauthn_rp_origin: String,
    verify_email_ticket_ttl_seconds: i64,
    password_reset_ticket_ttl_seconds: i64,
    mfa_ticket_ttl_seconds: i64,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(server_url: String, client_url: String) -> Self {
        let rp_id = Url::parse(&client_url)
            .ok()
            .and_then(|u: Url| u.host_str().map(ToString::to_string))
            .unwrap_or_else(|| "localhost".to_string());

        // Ensure origin does not have a trailing slash
        let rp_origin = client_url.trim_end_matches('/').to_string();

        Self {
            server_url,
            client_url,
            app_redirect_url: None,
            jwt_secret: SecretString::default(),
            master_password: None,
            default_locale: "en".to_string(),
            default_role: "user".to_string(),
            require_verified_email: true,
            disable_new_users: false,
            webauthn_enabled: false,
            webauthn_rp_id: rp_id,
            webauthn_rp_origin: rp_origin,
            verify_email_ticket_ttl_seconds: DEFAULT_VERIFY_EMAIL_TICKET_TTL_SECONDS,
            password_reset_ticket_ttl_seconds: DEFAULT_PASSWORD_RESET_TICKET_TTL_SECONDS,
            mfa_ticket_ttl_seconds: DEFAULT_MFA_TICKET_TTL_SECONDS,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_jwt_secret(mut self, secret: SecretString) -> Self {
        self.jwt_secret = secret;
        self
    }

    #[must_use]
    pub fn with_master_password(mut self, master_password: SecretString) -> Self {
        self.master_password = Some(master_password);
        self
    }

    #[must_use]
    pub fn with_app_redirect_url(mut self, url: String) -> Self {
        self.app_redirect_url = Some(url);
        self
    }

    #[must_use]
    pub fn with_default_locale(mut self, locale: String) -> Self {
        self.default_locale = locale;
        self
    }

    #[must_use]
    pub fn with_default_role(mut self, role: String) -> Self {
        self.default_role = role;
        self
    }

    #[must_use]
    pub fn with_require_verified_email(mut self, required: bool) -> Self {
        self.require_verified_email = required;
        self
    }

    #[must_use]
    pub fn with_disable_new_users(mut self, disabled: bool) -> Self {
        self.disable_new_users = disabled;
        self
    }

    #[must_use]
    pub fn with_webauthn_enabled(mut self, enabled: bool) -> Self {
        self.webauthn_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_verify_email_ticket_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verify_email_ticket_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_password_reset_ticket_ttl_seconds(mut self, seconds: i64) -> Self {
        self.password_reset_ticket_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_mfa_ticket_ttl_seconds(mut self, seconds: i64) -> Self {
        self.mfa_ticket_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    #[must_use]
    pub fn client_url(&self) -> &str {
        &self.client_url
    }

    #[must_use]
    pub fn app_redirect_url(&self) -> Option<&str> {
        self.app_redirect_url.as_deref()
    }

    #[must_use]
    pub fn master_password(&self) -> Option<&SecretString> {
        self.master_password.as_ref()
    }

    #[must_use]
    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    #[must_use]
    pub fn default_role(&self) -> &str {
        &self.default_role
    }

    #[must_use]
    pub fn require_verified_email(&self) -> bool {
        self.require_verified_email
    }

    #[must_use]
    pub fn disable_new_users(&self) -> bool {
        self.disable_new_users
    }

    #[must_use]
    pub fn webauthn_enabled(&self) -> bool {
        self.webauthn_enabled
    }

    #[must_use]
    pub fn webauthn_rp_id(&self) -> &str {
        &self.webauthn_rp_id
    }

    #[must_use]
    pub fn webauthn_rp_origin(&self) -> &str {
        &self.webauthn_rp_origin
    }

    pub(crate) fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }

    pub(crate) fn verify_email_ticket_ttl_seconds(&self) -> i64 {
        self.verify_email_ticket_ttl_seconds
    }

    pub(crate) fn password_reset_ticket_ttl_seconds(&self) -> i64 {
        self.password_reset_ticket_ttl_seconds
    }

    pub(crate) fn mfa_ticket_ttl_seconds(&self) -> i64 {
        self.mfa_ticket_ttl_seconds
    }

    pub(crate) fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    pub(crate) fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }
}

pub struct AuthState {
    config: AuthConfig,
    tokens: TokenMinter,
    webauthn: Option<CeremonyService>,
}

impl AuthState {
    /// Build the shared auth state from a finished configuration.
    ///
    /// # Errors
    /// Returns an error if the WebAuthn relying-party configuration is invalid.
    pub fn new(config: AuthConfig) -> Result<Self> {
        let tokens = TokenMinter::new(
            config.jwt_secret().clone(),
            config.server_url().to_string(),
            config.access_token_ttl_seconds(),
            config.refresh_token_ttl_seconds(),
        );

        // The ceremony service is only constructed when the feature is on, so a
        // bad RP origin cannot break password-only deployments.
        let webauthn = if config.webauthn_enabled() {
            Some(CeremonyService::new(
                config.webauthn_rp_id(),
                config.webauthn_rp_origin(),
                Duration::from_secs(DEFAULT_CEREMONY_TTL_SECONDS),
            )?)
        } else {
            None
        };

        Ok(Self {
            config,
            tokens,
            webauthn,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenMinter {
        &self.tokens
    }

    pub(crate) fn webauthn(&self) -> Option<&CeremonyService> {
        self.webauthn.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthConfig, AuthState};
    use secrecy::{ExposeSecret, SecretString};

    fn config() -> AuthConfig {
        AuthConfig::new(
            "https://auth.sesamo.dev".to_string(),
            "https://app.sesamo.dev/".to_string(),
        )
    }

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = config();

        assert_eq!(config.server_url(), "https://auth.sesamo.dev");
        assert_eq!(config.webauthn_rp_id(), "app.sesamo.dev");
        assert_eq!(config.webauthn_rp_origin(), "https://app.sesamo.dev");
        assert!(config.require_verified_email());
        assert!(!config.disable_new_users());
        assert!(!config.webauthn_enabled());
        assert!(config.master_password().is_none());
        assert_eq!(
            config.verify_email_ticket_ttl_seconds(),
            super::DEFAULT_VERIFY_EMAIL_TICKET_TTL_SECONDS
        );
        assert_eq!(
            config.password_reset_ticket_ttl_seconds(),
            super::DEFAULT_PASSWORD_RESET_TICKET_TTL_SECONDS
        );
        assert_eq!(
            config.mfa_ticket_ttl_seconds(),
            super::DEFAULT_MFA_TICKET_TTL_SECONDS
        );

        let config = config
            .with_require_verified_email(false)
            .with_disable_new_users(true)
            .with_default_locale("fr".to_string())
            .with_master_password(SecretString::from("letmein".to_string()))
            .with_mfa_ticket_ttl_seconds(42);

        assert!(!config.require_verified_email());
        assert!(config.disable_new_users());
        assert_eq!(config.default_locale(), "fr");
        assert_eq!(config.mfa_ticket_ttl_seconds(), 42);
        assert_eq!(
            config.master_password().map(ExposeSecret::expose_secret),
            Some("letmein")
        );
    }

    #[test]
    fn rp_id_falls_back_to_localhost() {
        let config = AuthConfig::new(
            "https://auth.sesamo.dev".to_string(),
            "not a url".to_string(),
        );
        assert_eq!(config.webauthn_rp_id(), "localhost");
    }

    #[test]
    fn auth_state_skips_ceremonies_when_webauthn_off() {
        let state = AuthState::new(config()).expect("state");
        assert!(state.webauthn().is_none());
    }

    #[test]
    fn auth_state_builds_ceremonies_when_webauthn_on() {
        let state = AuthState::new(config().with_webauthn_enabled(true)).expect("state");
        assert!(state.webauthn().is_some());
    }
}
