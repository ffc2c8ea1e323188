use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("sesamo")
        .about("Authentication core for multi-tenant identity")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("SESAMO_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("SESAMO_DSN")
                .required(true),
        )
        .arg(
            Arg::new("server-url")
                .long("server-url")
                .help("Public URL of this server, used to build email redirection links")
                .env("SESAMO_SERVER_URL")
                .required(true),
        )
        .arg(
            Arg::new("client-url")
                .long("client-url")
                .help("Frontend URL; also the WebAuthn relying-party origin")
                .env("SESAMO_CLIENT_URL")
                .required(true),
        )
        .arg(
            Arg::new("app-redirect-url")
                .long("app-redirect-url")
                .help("Optional deep-link base used for the appLink email variant")
                .env("SESAMO_APP_REDIRECT_URL"),
        )
        .arg(
            Arg::new("jwt-secret")
                .long("jwt-secret")
                .help("HMAC secret for access tokens")
                .env("SESAMO_JWT_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("master-password")
                .long("master-password")
                .help(
                    "Operational override password accepted for any user. \
                     Leave unset outside of testing environments",
                )
                .env("SESAMO_MASTER_PASSWORD"),
        )
        .arg(
            Arg::new("default-locale")
                .long("default-locale")
                .help("Locale used for emails when the user has none")
                .default_value("en")
                .env("SESAMO_DEFAULT_LOCALE"),
        )
        .arg(
            Arg::new("default-role")
                .long("default-role")
                .help("Role granted to new users")
                .default_value("user")
                .env("SESAMO_DEFAULT_ROLE"),
        )
        .arg(
            Arg::new("require-verified-email")
                .long("require-verified-email")
                .help("Require a verified email address before sign-in")
                .default_value("true")
                .env("SESAMO_REQUIRE_VERIFIED_EMAIL")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new("disable-new-users")
                .long("disable-new-users")
                .help("Create new users in the disabled state")
                .default_value("false")
                .env("SESAMO_DISABLE_NEW_USERS")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new("webauthn-enabled")
                .long("webauthn-enabled")
                .help("Enable the WebAuthn signup endpoints")
                .default_value("false")
                .env("SESAMO_WEBAUTHN_ENABLED")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("SESAMO_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}
