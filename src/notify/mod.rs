//! Outbound user notifications. Delivery is fire-and-forget: the caller's
//! state change is already committed when a notification is sent, and a
//! delivery failure is logged and never rolls it back.

pub mod mailtrap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

pub use mailtrap::{MailtrapConfig, MailtrapDispatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    VerifyEmail,
    PasswordReset,
    AccountApproved,
    AccountRejected,
    DocumentApproved,
    DocumentRejected,
    DocumentFeatured,
    DocumentUnfeatured,
}

impl Template {
    pub fn as_str(&self) -> &'static str {
        match self {
            Template::VerifyEmail => "verify_email",
            Template::PasswordReset => "password_reset",
            Template::AccountApproved => "account_approved",
            Template::AccountRejected => "account_rejected",
            Template::DocumentApproved => "document_approved",
            Template::DocumentRejected => "document_rejected",
            Template::DocumentFeatured => "document_featured",
            Template::DocumentUnfeatured => "document_unfeatured",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub recipient: String,
    pub template: Template,
    pub data: Value,
}

impl Notification {
    pub fn new(recipient: impl Into<String>, template: Template, data: Value) -> Self {
        Self {
            recipient: recipient.into(),
            template,
            data,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

pub trait NotificationDispatcher: Send + Sync {
    /// Hands the notification to the transport. Must not block on delivery.
    fn send(&self, notification: Notification) -> Result<(), DispatchError>;
}

/// Sends and swallows failures.
pub fn dispatch(dispatcher: &dyn NotificationDispatcher, notification: Notification) {
    let template = notification.template.as_str();
    let recipient = notification.recipient.clone();
    if let Err(err) = dispatcher.send(notification) {
        warn!(?err, template, %recipient, "notification dispatch failed");
    }
}

/// Writes notifications to the log instead of sending them. Used when no
/// mail transport is configured.
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn send(&self, notification: Notification) -> Result<(), DispatchError> {
        let rendered = render(&notification);
        info!(
            recipient = %notification.recipient,
            template = notification.template.as_str(),
            subject = %rendered.subject,
            data = %notification.data,
            "notification (log only)"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

fn field<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or("")
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn wrap(greeting_name: &str, body: &str) -> String {
    let name = escape_html(greeting_name);
    let greeting = if name.is_empty() {
        "Hello,".to_string()
    } else {
        format!("Hello {name},")
    };
    format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <p>{greeting}</p>{body}<p>NoteCraft Team</p></div>"
    )
}

fn comment_block(data: &Value) -> String {
    let comment = field(data, "comment");
    if comment.is_empty() {
        String::new()
    } else {
        format!("<p><strong>Reviewer note:</strong> {}</p>", escape_html(comment))
    }
}

pub fn render(notification: &Notification) -> RenderedEmail {
    let data = &notification.data;
    let name = field(data, "name");
    let title = escape_html(field(data, "title"));

    let (subject, body) = match notification.template {
        Template::VerifyEmail => {
            let link = escape_html(field(data, "link"));
            (
                "Welcome to NoteCraft! Please verify your email".to_string(),
                format!(
                    "<p>Thanks for signing up. Confirm your address to continue:</p>\
                     <p><a href=\"{link}\">Verify email</a></p>\
                     <p>This link expires in 24 hours.</p>"
                ),
            )
        }
        Template::PasswordReset => {
            let link = escape_html(field(data, "link"));
            (
                "Reset your NoteCraft password".to_string(),
                format!(
                    "<p>We received a request to reset your password.</p>\
                     <p><a href=\"{link}\">Reset password</a></p>\
                     <p>This link expires in 15 minutes.</p>"
                ),
            )
        }
        Template::AccountApproved => (
            "Your NoteCraft account has been approved".to_string(),
            "<p>Your account has been approved. You can now access all features.</p>".to_string(),
        ),
        Template::AccountRejected => (
            "Your NoteCraft account application".to_string(),
            format!(
                "<p>Unfortunately your account application was rejected. \
                 Please contact support if you believe this is a mistake.</p>{}",
                comment_block(data)
            ),
        ),
        Template::DocumentApproved => (
            format!("Document approved: {}", field(data, "title")),
            format!(
                "<p>Your document <em>{title}</em> has been approved and is now available to all students. \
                 Thank you for your contribution!</p>"
            ),
        ),
        Template::DocumentRejected => (
            format!("Document not approved: {}", field(data, "title")),
            format!(
                "<p>Your document <em>{title}</em> was not approved. \
                 Please contact support for more information.</p>{}",
                comment_block(data)
            ),
        ),
        Template::DocumentFeatured => (
            format!("Document featured: {}", field(data, "title")),
            format!(
                "<p>Your document <em>{title}</em> has been featured by the admin. \
                 Thank you for your valuable contribution to the community!</p>"
            ),
        ),
        Template::DocumentUnfeatured => (
            format!("Document no longer featured: {}", field(data, "title")),
            format!(
                "<p>Your document <em>{title}</em> is no longer featured. \
                 It remains available to all students.</p>"
            ),
        ),
    };

    RenderedEmail {
        subject,
        html: wrap(name, &body),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Captures every notification for later assertions.
    #[derive(Default)]
    pub struct RecordingDispatcher {
        sent: Mutex<Vec<Notification>>,
        fail: Mutex<bool>,
    }

    impl RecordingDispatcher {
        pub fn sent(&self) -> Vec<Notification> {
            self.sent.lock().expect("recorder poisoned").clone()
        }

        pub fn templates(&self) -> Vec<Template> {
            self.sent().into_iter().map(|n| n.template).collect()
        }

        pub fn set_failing(&self, fail: bool) {
            *self.fail.lock().expect("recorder poisoned") = fail;
        }
    }

    impl NotificationDispatcher for RecordingDispatcher {
        fn send(&self, notification: Notification) -> Result<(), DispatchError> {
            if *self.fail.lock().expect("recorder poisoned") {
                return Err(DispatchError::Delivery("transport down".to_string()));
            }
            self.sent
                .lock()
                .expect("recorder poisoned")
                .push(notification);
            Ok(())
        }
    }
}
