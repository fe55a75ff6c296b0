use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::MailConfig;

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("mail relay rejected the message: {0}")]
    Rejected(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialWelcomeMail {
    pub to: String,
    pub full_name: String,
    pub duration_days: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub max_rooms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentSuccessMail {
    pub to: String,
    pub full_name: String,
    /// "activation" for a fresh purchase, "renewal" otherwise.
    pub action: String,
    pub package_name: String,
    pub duration_days: i64,
    pub amount: u64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub transaction_no: String,
}

/// Confirmation-mail side effects. Callers fire these from a detached
/// task and only log failures; delivery never gates a ledger transition.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_trial_welcome(&self, mail: TrialWelcomeMail) -> Result<(), MailerError>;
    async fn send_payment_success(&self, mail: PaymentSuccessMail) -> Result<(), MailerError>;
}

/// Posts templated messages to the platform's mail relay.
pub struct HttpMailer {
    client: reqwest::Client,
    relay_url: String,
    sender: String,
}

impl HttpMailer {
    pub fn new(relay_url: String, config: &MailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            relay_url,
            sender: config.sender.clone(),
        }
    }

    async fn deliver<T: Serialize + Sync>(
        &self,
        template: &str,
        to: &str,
        data: &T,
    ) -> Result<(), MailerError> {
        let payload = serde_json::json!({
            "from": self.sender,
            "to": to,
            "template": template,
            "data": data,
        });

        let response = self
            .client
            .post(&self.relay_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MailerError::Rejected(format!("{}: {}", status, body)));
        }

        log::info!("sent {} mail to {}", template, to);
        Ok(())
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_trial_welcome(&self, mail: TrialWelcomeMail) -> Result<(), MailerError> {
        self.deliver("trial_welcome", &mail.to.clone(), &mail).await
    }

    async fn send_payment_success(&self, mail: PaymentSuccessMail) -> Result<(), MailerError> {
        self.deliver("payment_success", &mail.to.clone(), &mail).await
    }
}

/// Stand-in used when no relay is configured; logs instead of sending.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_trial_welcome(&self, mail: TrialWelcomeMail) -> Result<(), MailerError> {
        log::info!(
            "mail relay not configured, skipping trial welcome to {}",
            mail.to
        );
        Ok(())
    }

    async fn send_payment_success(&self, mail: PaymentSuccessMail) -> Result<(), MailerError> {
        log::info!(
            "mail relay not configured, skipping payment confirmation to {}",
            mail.to
        );
        Ok(())
    }
}
