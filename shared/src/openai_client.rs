use std::time::Duration;

use async_trait::async_trait;
use openai::chat::{ChatCompletionMessage, ChatCompletionMessageRole};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

#[derive(thiserror::Error, Debug)]
pub enum GenerationError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http error: {0}")]
    Http(u16),
    #[error("parse error: {0}")]
    Parse(serde_json::Error),
}

/// One model call. The reply is treated as untrusted free text.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model_id: String,
    pub region: String,
    pub system_prompt: String,
    pub user_content: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatCompletionMessage],
    max_tokens: u32,
    temperature: f64,
}

fn msg(role: ChatCompletionMessageRole, txt: &str) -> ChatCompletionMessage {
    ChatCompletionMessage {
        role,
        content: Some(txt.to_string()),
        ..Default::default()
    }
}

/// Calls an OpenAI compatible chat completions endpoint.
///
/// The base URL may contain a `{region}` placeholder which is filled from the
/// request, e.g. `https://llm.{region}.example.com`.
#[derive(Clone)]
pub struct HttpTextGenerator {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpTextGenerator {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint_for(&self, region: &str) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.replace("{region}", region)
        )
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let messages = vec![
            msg(ChatCompletionMessageRole::System, &request.system_prompt),
            msg(ChatCompletionMessageRole::User, &request.user_content),
        ];
        let body = ChatRequest {
            model: &request.model_id,
            messages: &messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let url = self.endpoint_for(&request.region);
        debug!("\u{2192} model request: model = {}, url = {}", body.model, url);

        let mut req = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let res = req.send().await.map_err(|e| {
            error!("network error to model endpoint: {e}");
            GenerationError::Network(e.to_string())
        })?;

        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        debug!(
            %status,
            "\u{2190} body = {}",
            String::from_utf8_lossy(&bytes[..bytes.len().min(1024)])
        );
        if !status.is_success() {
            return Err(GenerationError::Http(status.as_u16()));
        }

        let body: Value = serde_json::from_slice(&bytes).map_err(GenerationError::Parse)?;
        Ok(reply_text(&body))
    }
}

/// Pulls the generated text out of a completion body.
///
/// Understands chat completions (`choices[0].message.content`) and block
/// lists (`content: [{"type": "text", "text": ...}]`). Any other body is
/// returned as serialized JSON so the caller still has something to parse.
pub fn reply_text(body: &Value) -> String {
    if let Some(choices) = body.get("choices").and_then(Value::as_array) {
        return choices
            .first()
            .and_then(|c| c.pointer("/message/content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
    }
    if let Some(blocks) = body.get("content").and_then(Value::as_array) {
        return blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect();
    }
    warn!("unexpected completion body shape, passing it on verbatim");
    body.to_string()
}
