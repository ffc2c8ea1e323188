//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::token::Session;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SignUpEmailPasswordRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub options: SignUpOptions,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SignUpOptions {
    pub display_name: Option<String>,
    pub locale: Option<String>,
    pub default_role: Option<String>,
    pub allowed_roles: Option<Vec<String>>,
    pub redirect_to: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SignInEmailPasswordRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SignInMfaTotpRequest {
    pub ticket: String,
    pub otp: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SignUpWebauthnRequest {
    pub email: String,
    #[serde(default)]
    pub options: SignUpOptions,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SignUpWebauthnVerifyRequest {
    /// The registration credential as produced by the browser; parsed lazily
    /// so the embedded challenge can be inspected before full deserialization.
    #[schema(value_type = Object)]
    pub credential: serde_json::Value,
    #[serde(default)]
    pub options: WebauthnVerifyOptions,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct WebauthnVerifyOptions {
    pub redirect_to: Option<String>,
    pub nickname: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailRequest {
    pub ticket: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RedirectOptions {
    pub redirect_to: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SendVerificationEmailRequest {
    pub email: String,
    #[serde(default)]
    pub options: RedirectOptions,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetRequest {
    pub email: String,
    #[serde(default)]
    pub options: RedirectOptions,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeRequest {
    pub new_password: String,
    pub ticket: String,
}

/// Pending second factor: no tokens, only the challenge ticket.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MfaChallenge {
    pub ticket: String,
}

/// The sign-in contract: either a full session, a pending MFA challenge, or
/// neither (state changed, session withheld by policy).
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub session: Option<Session>,
    pub mfa: Option<MfaChallenge>,
}

impl SignInResponse {
    /// The "no session yet" result used when policy withholds tokens.
    #[must_use]
    pub fn withheld() -> Self {
        Self {
            session: None,
            mfa: None,
        }
    }
}
