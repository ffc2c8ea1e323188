use crate::api::handlers::auth::AuthConfig;
use crate::cli::actions::Action;
use anyhow::{Context, Result};
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let get_string = |name: &str| -> Result<String> {
        matches
            .get_one::<String>(name)
            .cloned()
            .with_context(|| format!("missing required argument: --{name}"))
    };

    let mut config = AuthConfig::new(get_string("server-url")?, get_string("client-url")?)
        .with_jwt_secret(SecretString::from(get_string("jwt-secret")?))
        .with_default_locale(get_string("default-locale")?)
        .with_default_role(get_string("default-role")?)
        .with_require_verified_email(
            matches
                .get_one::<bool>("require-verified-email")
                .copied()
                .unwrap_or(true),
        )
        .with_disable_new_users(
            matches
                .get_one::<bool>("disable-new-users")
                .copied()
                .unwrap_or(false),
        )
        .with_webauthn_enabled(
            matches
                .get_one::<bool>("webauthn-enabled")
                .copied()
                .unwrap_or(false),
        );

    if let Some(master) = matches.get_one::<String>("master-password") {
        config = config.with_master_password(SecretString::from(master.clone()));
    }

    if let Some(app_url) = matches.get_one::<String>("app-redirect-url") {
        config = config.with_app_redirect_url(app_url.clone());
    }

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: get_string("dsn")?,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::handler;
    use crate::cli::{actions::Action, commands};
    use anyhow::Result;

    #[test]
    fn test_handler_builds_server_action() -> Result<()> {
        let matches = commands::new().try_get_matches_from([
            "sesamo",
            "--dsn",
            "postgres://localhost/sesamo",
            "--server-url",
            "https://auth.sesamo.dev",
            "--client-url",
            "https://app.sesamo.dev",
            "--jwt-secret",
            "secret",
            "--master-password",
            "letmein",
        ])?;

        let Action::Server { port, dsn, config } = handler(&matches)?;
        assert_eq!(port, 8080);
        assert_eq!(dsn, "postgres://localhost/sesamo");
        assert_eq!(config.server_url(), "https://auth.sesamo.dev");
        assert_eq!(config.client_url(), "https://app.sesamo.dev");
        assert!(config.require_verified_email());
        assert!(!config.webauthn_enabled());
        assert!(config.master_password().is_some());
        Ok(())
    }
}
