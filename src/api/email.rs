//! Notification trigger and delivery abstraction.
//!
//! This module builds the semantic payload (ticket, links, locale) that the
//! email collaborator consumes; it never renders templates or speaks SMTP.
//! The default sender for local dev is `LogEmailSender`, which logs and
//! returns `Ok(())`. Dispatch failures are logged with template and recipient
//! context and re-raised: a mutation committed before the failure stays
//! committed, and the caller decides whether to retry sending.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use url::form_urlencoded::byte_serialize;

use crate::api::handlers::auth::AuthConfig;

/// Email flavors this core can trigger, with their template ids and the
/// `type` value carried by redirect links.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EmailKind {
    EmailVerify,
    PasswordReset,
}

impl EmailKind {
    #[must_use]
    pub fn template(self) -> &'static str {
        match self {
            Self::EmailVerify => "email-verify",
            Self::PasswordReset => "password-reset",
        }
    }

    #[must_use]
    pub fn link_type(self) -> &'static str {
        match self {
            Self::EmailVerify => "emailVerify",
            Self::PasswordReset => "passwordReset",
        }
    }
}

/// Render context handed to the template collaborator.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailLocals {
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_link: Option<String>,
    pub display_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_email: Option<String>,
    pub ticket: String,
    pub redirect_to: String,
    pub locale: String,
    pub server_url: String,
    pub client_url: String,
}

/// A fully constructed notification, ready for the delivery collaborator.
/// Headers carry debugging/audit metadata as opaque key/value pairs.
#[derive(Clone, Debug)]
pub struct EmailEnvelope {
    pub template: &'static str,
    pub to: String,
    pub headers: Vec<(&'static str, String)>,
    pub locals: EmailLocals,
}

/// Email delivery abstraction.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to signal dispatch failure.
    async fn send(&self, envelope: &EmailEnvelope) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, envelope: &EmailEnvelope) -> Result<()> {
        info!(
            to = %envelope.to,
            template = %envelope.template,
            link = %envelope.locals.link,
            "email send stub"
        );
        Ok(())
    }
}

/// Thin wrapper that logs dispatch failures with context before re-raising.
pub struct Mailer {
    sender: Arc<dyn EmailSender>,
}

impl Mailer {
    #[must_use]
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender }
    }

    /// Send an envelope.
    ///
    /// # Errors
    /// Re-raises the sender's error after logging template and recipient.
    pub async fn send(&self, envelope: &EmailEnvelope) -> Result<()> {
        if let Err(err) = self.sender.send(envelope).await {
            warn!(
                template = %envelope.template,
                to = %envelope.to,
                "email dispatch failed: {err:#}"
            );
            return Err(err);
        }
        Ok(())
    }
}

fn encode_uri_component(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

/// Build the redirection link included in outbound emails:
/// `<server-url>/verify?ticket=<t>&type=<k>&redirectTo=<r>`.
#[must_use]
pub fn build_redirection_link(
    base_url: &str,
    kind: EmailKind,
    ticket: &str,
    redirect_to: &str,
) -> String {
    format!(
        "{}/verify?ticket={}&type={}&redirectTo={}",
        base_url.trim_end_matches('/'),
        ticket,
        kind.link_type(),
        encode_uri_component(redirect_to)
    )
}

/// Construct the full envelope for a ticket-bearing notification.
#[must_use]
pub(crate) fn build_envelope(
    config: &AuthConfig,
    kind: EmailKind,
    to: &str,
    display_name: &str,
    new_email: Option<&str>,
    locale: Option<&str>,
    ticket: &str,
    redirect_to: &str,
) -> EmailEnvelope {
    let link = build_redirection_link(config.server_url(), kind, ticket, redirect_to);
    let app_link = config
        .app_redirect_url()
        .map(|app_url| build_redirection_link(app_url, kind, ticket, redirect_to));

    let mut headers = vec![
        ("x-ticket", ticket.to_string()),
        ("x-redirect-to", redirect_to.to_string()),
        ("x-email-template", kind.template().to_string()),
        ("x-link", link.clone()),
    ];
    if let Some(app_link) = &app_link {
        headers.push(("x-app-link", app_link.clone()));
    }

    EmailEnvelope {
        template: kind.template(),
        to: to.to_string(),
        headers,
        locals: EmailLocals {
            link,
            app_link,
            display_name: display_name.to_string(),
            email: to.to_string(),
            new_email: new_email.map(ToString::to_string),
            ticket: ticket.to_string(),
            redirect_to: encode_uri_component(redirect_to),
            locale: locale.unwrap_or(config.default_locale()).to_string(),
            server_url: config.server_url().to_string(),
            client_url: config.client_url().to_string(),
        },
    }
}
