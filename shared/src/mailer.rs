//! Email delivery through an HTTP mail relay.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http error: {0}")]
    Http(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends the message and returns the relay's message id.
    async fn send(&self, message: &EmailMessage) -> Result<String, NotifyError>;
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    charset: &'static str,
}

#[derive(Clone)]
pub struct HttpMailer {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HttpMailer {
    pub fn new(url: String, token: Option<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Network(e.to_string()))?;
        Ok(Self { client, url, token })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<String, NotifyError> {
        let body = RelayRequest {
            from: &message.sender,
            to: [&message.recipient],
            subject: &message.subject,
            html: &message.html_body,
            charset: "UTF-8",
        };
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(NotifyError::Http(resp.status().as_u16()));
        }
        let reply = match resp.json::<Value>().await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%e, recipient = %message.recipient, "relay reply is not JSON");
                Value::Null
            }
        };
        let message_id = ["message_id", "MessageId", "id"]
            .iter()
            .find_map(|k| reply.get(*k).and_then(Value::as_str))
            .map(str::to_string);
        match message_id {
            Some(id) => {
                info!(recipient = %message.recipient, message_id = %id, "email sent");
                Ok(id)
            }
            None => {
                warn!(recipient = %message.recipient, "relay accepted email without a message id");
                Ok(String::new())
            }
        }
    }
}
