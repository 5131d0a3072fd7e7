//! Transactional email
//!
//! Sends through the Resend HTTP API. With no API key configured the message
//! is written to the log instead, which is how local development runs.

use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::types::{CommunityError, Result};

/// Outgoing message in the Resend wire shape
#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

#[derive(Clone)]
pub struct EmailService {
    http_client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl EmailService {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, from: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("connected-community/0.1")
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            api_url: api_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            from: from.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Deliver one message
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let message = EmailMessage {
            from: self.from.clone(),
            to: vec![to.to_string()],
            subject: subject.to_string(),
            html: html.to_string(),
        };

        let Some(api_key) = &self.api_key else {
            info!(to = %to, subject = %subject, "Email not sent (no API key):\n{}", html);
            return Ok(());
        };

        let response = self
            .http_client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&message)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(to = %to, status = %status, "Email provider rejected message: {}", body);
            return Err(CommunityError::Upstream(format!(
                "Email provider returned {}",
                status
            )));
        }

        info!(to = %to, subject = %subject, "Email sent");
        Ok(())
    }

    /// Mail the link that confirms an account's email
    pub async fn send_verification(&self, to: &str, first_name: &str, link: &str) -> Result<()> {
        let html = format!(
            "<p>Hi {},</p>\
             <p>Please confirm your email address to start using Connected Community.</p>\
             <p><a href=\"{}\">Verify my email</a></p>\
             <p>This link expires in 24 hours.</p>",
            first_name, link
        );
        self.send(to, "Verify your email", &html).await
    }
}
