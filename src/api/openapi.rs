//! OpenAPI document for the documented surface.

use utoipa::OpenApi;

use crate::api::handlers;
use crate::api::handlers::auth::types;
use crate::token::Session;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "sesamo",
        description = "Authentication core for multi-tenant identity",
    ),
    paths(
        handlers::health::health,
        handlers::auth::signin::signin_email_password,
        handlers::auth::signin::signin_mfa_totp,
        handlers::auth::signup::signup_email_password,
        handlers::auth::signup::signup_webauthn,
        handlers::auth::signup::signup_webauthn_verify,
        handlers::auth::user::verify_email,
        handlers::auth::user::resend_verification_email,
        handlers::auth::user::password_reset,
        handlers::auth::user::password_change,
    ),
    components(schemas(
        types::SignInEmailPasswordRequest,
        types::SignInMfaTotpRequest,
        types::SignUpEmailPasswordRequest,
        types::SignUpOptions,
        types::SignUpWebauthnRequest,
        types::SignUpWebauthnVerifyRequest,
        types::WebauthnVerifyOptions,
        types::VerifyEmailRequest,
        types::SendVerificationEmailRequest,
        types::PasswordResetRequest,
        types::PasswordChangeRequest,
        types::RedirectOptions,
        types::MfaChallenge,
        types::SignInResponse,
        Session,
    )),
    tags(
        (name = "auth", description = "Credential checks and session issuance"),
        (name = "user", description = "Ticket-driven user state transitions"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::ApiDoc;
    use utoipa::OpenApi;

    #[test]
    fn document_lists_all_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/health",
            "/signin/email-password",
            "/signin/mfa/totp",
            "/signup/email-password",
            "/signup/webauthn",
            "/signup/webauthn/verify",
            "/user/email/verify",
            "/user/email/send-verification-email",
            "/user/password/reset",
            "/user/password",
        ] {
            assert!(
                paths.iter().any(|path| path.as_str() == expected),
                "missing path {expected}"
            );
        }
    }
}
