use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::email::{LogEmailSender, Mailer};
use crate::api::handlers::auth::{AuthConfig, AuthState};

pub mod email;
pub mod handlers;
mod openapi;

pub use openapi::ApiDoc;

/// Build the API router with all routes registered. Extensions (pool, auth
/// state, mailer) are attached by [`new`].
#[must_use]
pub fn router() -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/signup/email-password",
            post(handlers::auth::signup::signup_email_password),
        )
        .route(
            "/signin/email-password",
            post(handlers::auth::signin::signin_email_password),
        )
        .route(
            "/signin/mfa/totp",
            post(handlers::auth::signin::signin_mfa_totp),
        )
        .route(
            "/signup/webauthn",
            post(handlers::auth::signup::signup_webauthn),
        )
        .route(
            "/signup/webauthn/verify",
            post(handlers::auth::signup::signup_webauthn_verify),
        )
        .route(
            "/user/email/verify",
            post(handlers::auth::user::verify_email),
        )
        .route(
            "/user/email/send-verification-email",
            post(handlers::auth::user::resend_verification_email),
        )
        .route(
            "/user/password/reset",
            post(handlers::auth::user::password_reset),
        )
        .route(
            "/user/password",
            post(handlers::auth::user::password_change),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, config: AuthConfig) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let client_origin =
        HeaderValue::from_str(config.webauthn_rp_origin()).context("invalid client origin")?;

    let auth_state = Arc::new(AuthState::new(config)?);
    let mailer = Arc::new(Mailer::new(Arc::new(LogEmailSender)));

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(client_origin))
        .allow_credentials(true);

    let app = router()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &Request<Body>| {
                        HeaderValue::from_str(Ulid::new().to_string().as_str()).ok()
                    },
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors),
        )
        .layer(Extension(pool))
        .layer(Extension(auth_state))
        .layer(Extension(mailer));

    let listener = TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on *:{port}");

    axum::serve(listener, app.into_make_service())
        .await
        .context("server error")?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
