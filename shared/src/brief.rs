//! ROI brief generation.
//!
//! A brief is produced by a [`BriefWriter`]: either the model-backed writer,
//! which prompts a [`TextGenerator`] and parses its reply, or the simulated
//! writer used for end-to-end runs without a model call. Parsing never fails:
//! a reply that is not the requested JSON object is embedded verbatim into a
//! fallback document.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::dto::{BriefOutput, FeatureRecord, ModelConfig};
use crate::openai_client::{GenerationError, GenerationRequest, TextGenerator};

pub const SYSTEM_PROMPT: &str = "You are a Solutions Consultant at a B2B SaaS company like Highspot. \
Your task is to produce an ROI brief for a sales team. \
Your response MUST be a single, valid JSON object and nothing else. \
Do not include any text, preamble, or explanation before or after the JSON object. \
The JSON object must contain two top-level keys: 'json_data' and 'html_summary'.";

const UNKNOWN_ACCOUNT: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub fn build_prompt(features: &FeatureRecord) -> Prompt {
    let context = serde_json::to_string_pretty(features).unwrap_or_else(|_| "{}".into());
    let user = format!(
        "\nHere is the financial data for the target account:\n{context}\n\n\
Based on this data, generate the ROI brief.\n\
The 'json_data' object should contain fields like: account_name, fiscal_year, \
key_pain_points (a list of strings), value_hypothesis (a string), and next_best_action (a string).\n\
The 'html_summary' should be a clean, professional HTML email body for the sales team.\n"
    );
    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Escapes text for embedding into HTML element content or attributes.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Turns the model's raw reply into a brief.
///
/// The reply is accepted when it is a JSON object with a non-empty
/// `html_summary` string. Otherwise the result carries empty structured data
/// and a document showing the escaped raw text.
pub fn parse_model_output(raw: &str) -> BriefOutput {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(mut reply)) => {
            let html_summary = match reply.remove("html_summary") {
                Some(Value::String(html)) if !html.trim().is_empty() => html,
                _ => {
                    warn!("model reply has no html_summary, embedding raw output");
                    return fallback_brief(raw);
                }
            };
            let json_data = match reply.remove("json_data") {
                Some(Value::Object(data)) => data,
                other => {
                    debug!(?other, "json_data is not an object, dropping it");
                    Map::new()
                }
            };
            BriefOutput {
                json_data,
                html_summary,
            }
        }
        Ok(_) => {
            warn!("model reply is JSON but not an object, embedding raw output");
            fallback_brief(raw)
        }
        Err(e) => {
            warn!(%e, "model output was not valid JSON, embedding raw output");
            fallback_brief(raw)
        }
    }
}

fn fallback_brief(raw: &str) -> BriefOutput {
    BriefOutput {
        json_data: Map::new(),
        html_summary: format!(
            "<html><body><h1>LLM output (non-JSON)</h1><pre>{}</pre></body></html>",
            escape_html(raw)
        ),
    }
}

/// Deterministic brief built from the feature record alone.
pub fn simulate_brief(features: &FeatureRecord) -> BriefOutput {
    let account = features
        .company_name
        .as_deref()
        .unwrap_or(UNKNOWN_ACCOUNT);
    let mut json_data = Map::new();
    json_data.insert("account_name".into(), json!(account));
    json_data.insert("fiscal_year".into(), json!(features.fiscal_year));
    json_data.insert(
        "key_pain_points".into(),
        json!(["Unclear sales enablement content", "Long rep ramp time"]),
    );
    json_data.insert(
        "value_hypothesis".into(),
        json!("Reduce ramp time and improve win-rate by improving content findability and guided plays."),
    );
    json_data.insert(
        "next_best_action".into(),
        json!("Run a 30-day pilot with 3 sales teams."),
    );
    BriefOutput {
        json_data,
        html_summary: format!(
            "<html><body><h1>Simulated ROI Brief: {}</h1><p>Key hypothesis and actions.</p></body></html>",
            escape_html(account)
        ),
    }
}

/// Produces the brief for one account.
#[async_trait]
pub trait BriefWriter: Send + Sync {
    async fn write(&self, features: &FeatureRecord) -> Result<BriefOutput, GenerationError>;
}

/// Prompts a text generator and parses its reply.
pub struct ModelBriefWriter {
    generator: Arc<dyn TextGenerator>,
    model: ModelConfig,
    region: String,
}

impl ModelBriefWriter {
    pub fn new(generator: Arc<dyn TextGenerator>, model: ModelConfig, default_region: &str) -> Self {
        let region = model.resolved_region(default_region);
        Self {
            generator,
            model,
            region,
        }
    }
}

#[async_trait]
impl BriefWriter for ModelBriefWriter {
    async fn write(&self, features: &FeatureRecord) -> Result<BriefOutput, GenerationError> {
        let prompt = build_prompt(features);
        let request = GenerationRequest {
            model_id: self.model.model_id.clone(),
            region: self.region.clone(),
            system_prompt: prompt.system,
            user_content: prompt.user,
            max_tokens: self.model.max_tokens,
            temperature: self.model.temperature,
        };
        info!(model = %request.model_id, region = %request.region, "invoking model");
        let raw = self.generator.generate(&request).await?;
        debug!(
            "model output (preview): {}",
            raw.chars().take(400).collect::<String>()
        );
        Ok(parse_model_output(&raw))
    }
}

/// Canned output, no model call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedBriefWriter;

#[async_trait]
impl BriefWriter for SimulatedBriefWriter {
    async fn write(&self, features: &FeatureRecord) -> Result<BriefOutput, GenerationError> {
        info!("model simulation enabled, building canned brief");
        Ok(simulate_brief(features))
    }
}

/// Where the two artifacts of a brief are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKeys {
    pub prefix: String,
    pub html_key: String,
    pub json_key: String,
}

pub fn artifact_keys(company_name: Option<&str>, date: NaiveDate) -> ArtifactKeys {
    let slug = company_name
        .unwrap_or(UNKNOWN_ACCOUNT)
        .to_lowercase()
        .replace(' ', "-");
    let prefix = format!("{}/", date.format("%Y-%m-%d"));
    ArtifactKeys {
        html_key: format!("{prefix}{slug}-brief.html"),
        json_key: format!("{prefix}{slug}-data.json"),
        prefix,
    }
}
