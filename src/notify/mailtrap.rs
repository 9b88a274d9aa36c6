use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde_json::json;
use tokio::runtime::Handle;
use tracing::{debug, error};

use super::{DispatchError, Notification, NotificationDispatcher, render};

const MAILTRAP_SEND_URL: &str = "https://send.api.mailtrap.io/api/send";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct MailtrapConfig {
    pub token: String,
    pub sender_email: String,
    pub sender_name: String,
}

/// Delivers notifications through the Mailtrap send API. Each send is
/// spawned onto the current runtime so request handlers never wait on SMTP.
#[derive(Clone)]
pub struct MailtrapDispatcher {
    http: Client,
    config: MailtrapConfig,
    endpoint: String,
}

impl MailtrapDispatcher {
    pub fn new(config: MailtrapConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build Mailtrap HTTP client")?;
        Ok(Self {
            http,
            config,
            endpoint: MAILTRAP_SEND_URL.to_string(),
        })
    }

    async fn deliver(&self, notification: Notification) -> Result<()> {
        let email = render(&notification);
        let payload = json!({
            "from": {
                "email": self.config.sender_email,
                "name": self.config.sender_name,
            },
            "to": [{ "email": notification.recipient }],
            "subject": email.subject,
            "html": email.html,
            "category": notification.template.as_str(),
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.config.token)
            .json(&payload)
            .send()
            .await
            .context("failed to reach Mailtrap")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("mailtrap send failed with status {status}: {body}");
        }
        debug!(template = notification.template.as_str(), "mailtrap accepted notification");
        Ok(())
    }
}

impl NotificationDispatcher for MailtrapDispatcher {
    fn send(&self, notification: Notification) -> Result<(), DispatchError> {
        let handle = Handle::try_current()
            .map_err(|err| DispatchError::Delivery(format!("no async runtime: {err}")))?;
        let dispatcher = self.clone();
        handle.spawn(async move {
            let template = notification.template.as_str();
            let recipient = notification.recipient.clone();
            if let Err(err) = dispatcher.deliver(notification).await {
                error!(?err, template, %recipient, "failed to deliver email");
            }
        });
        Ok(())
    }
}
