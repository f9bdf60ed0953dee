use std::time::Duration;

use agentmart_core::config::LeadWebhookConfig;
use agentmart_core::errors::RemoteCallError;
use agentmart_core::wizard::{LeadSink, LeadSubmission};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

pub const SECRET_HEADER: &str = "x-agentmart-webhook-secret";

const OPERATION: &str = "lead.webhook";

/// Delivers captured leads as one JSON `POST`. Any 2xx is success; nothing is
/// retried.
#[derive(Clone)]
pub struct WebhookLeadSink {
    client: reqwest::Client,
    url: String,
    secret: Option<SecretString>,
}

impl WebhookLeadSink {
    pub fn from_config(config: &LeadWebhookConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, url: config.url.trim().to_string(), secret: config.secret.clone() })
    }
}

#[async_trait::async_trait]
impl LeadSink for WebhookLeadSink {
    async fn deliver(&self, submission: &LeadSubmission) -> Result<(), RemoteCallError> {
        let mut request = self.client.post(&self.url).json(submission);
        if let Some(secret) = &self.secret {
            request = request.header(SECRET_HEADER, secret.expose_secret());
        }

        let response = request.send().await.map_err(|error| {
            warn!(event_name = "site.lead.delivery_failed", error = %error, "lead webhook unreachable");
            RemoteCallError::new(OPERATION, error.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                event_name = "site.lead.delivery_rejected",
                status = status.as_u16(),
                "lead webhook rejected the submission"
            );
            return Err(RemoteCallError::new(
                OPERATION,
                format!("webhook responded with status {status}"),
            ));
        }

        info!(
            event_name = "site.lead.delivered",
            status = status.as_u16(),
            submitted_at = %submission.metadata.submitted_at,
            "lead delivered"
        );
        Ok(())
    }
}
