//! Boundary error taxonomy for the auth endpoints.
//!
//! Internal error text (store, transport) never crosses this type; handlers
//! convert every failure into one of these enumerable kinds before it reaches
//! the wire.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid-email-password")]
    InvalidEmailPassword,

    #[error("disabled-user")]
    DisabledUser,

    #[error("unverified-user")]
    UnverifiedUser,

    #[error("user-not-found")]
    UserNotFound,

    #[error("email-already-in-use")]
    EmailAlreadyInUse,

    #[error("email-already-verified")]
    EmailAlreadyVerified,

    #[error("invalid-request: {0}")]
    InvalidRequest(String),

    #[error("disabled-endpoint")]
    DisabledEndpoint,

    /// Anything that is not one of the semantic kinds above: store failures,
    /// ceremony verifier faults, and notification-dispatch failures after a
    /// committed mutation ("your state changed but we couldn't notify you").
    #[error("internal-error")]
    Unspecified(anyhow::Error),
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Unspecified(err)
    }
}

impl AuthError {
    /// Stable machine-readable kind, as exposed on the wire.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidEmailPassword => "invalid-email-password",
            Self::DisabledUser => "disabled-user",
            Self::UnverifiedUser => "unverified-user",
            Self::UserNotFound => "user-not-found",
            Self::EmailAlreadyInUse => "email-already-in-use",
            Self::EmailAlreadyVerified => "email-already-verified",
            Self::InvalidRequest(_) => "invalid-request",
            Self::DisabledEndpoint => "disabled-endpoint",
            Self::Unspecified(_) => "internal-error",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidEmailPassword | Self::DisabledUser | Self::UnverifiedUser => {
                StatusCode::UNAUTHORIZED
            }
            Self::UserNotFound | Self::EmailAlreadyVerified | Self::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::EmailAlreadyInUse => StatusCode::CONFLICT,
            Self::DisabledEndpoint => StatusCode::NOT_FOUND,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::InvalidRequest(message) => message.clone(),
            // The generic kinds double as their own message; internals stay internal.
            other => other.kind().to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Unspecified(ref source) = self {
            error!("Unspecified auth failure: {source:#}");
        }
        let body = json!({
            "error": self.kind(),
            "message": self.message(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::AuthError;
    use anyhow::anyhow;
    use axum::{http::StatusCode, response::IntoResponse};

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            AuthError::InvalidEmailPassword.kind(),
            "invalid-email-password"
        );
        assert_eq!(AuthError::DisabledUser.kind(), "disabled-user");
        assert_eq!(AuthError::UnverifiedUser.kind(), "unverified-user");
        assert_eq!(AuthError::UserNotFound.kind(), "user-not-found");
        assert_eq!(AuthError::EmailAlreadyInUse.kind(), "email-already-in-use");
        assert_eq!(
            AuthError::EmailAlreadyVerified.kind(),
            "email-already-verified"
        );
        assert_eq!(
            AuthError::InvalidRequest("nope".to_string()).kind(),
            "invalid-request"
        );
        assert_eq!(AuthError::DisabledEndpoint.kind(), "disabled-endpoint");
    }

    #[test]
    fn statuses_match_kinds() {
        assert_eq!(
            AuthError::InvalidEmailPassword.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::EmailAlreadyInUse.status(), StatusCode::CONFLICT);
        assert_eq!(AuthError::DisabledEndpoint.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuthError::Unspecified(anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unspecified_hides_internal_text() {
        let response =
            AuthError::Unspecified(anyhow!("connection refused (db=10.0.0.3)")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn invalid_request_carries_custom_message() {
        let err = AuthError::InvalidRequest("Could not parse challenge".to_string());
        assert_eq!(err.message(), "Could not parse challenge");
    }
}
