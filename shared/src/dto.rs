//! Wire shapes exchanged between the pipeline stages.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Result, StageError};

/// Base URL used as provenance link for a feature record.
pub const EDGAR_BROWSE_URL: &str = "https://www.sec.gov/edgar/browse/";

const FALLBACK_REGION: &str = "us-west-2";

/// Reads a company identifier given either as a JSON number or as a digit string.
pub fn cik_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn deserialize_cik<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(cik_from_value))
}

/// KPIs and company metadata handed to the brief generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureRecord {
    pub company_name: Option<String>,
    #[serde(deserialize_with = "deserialize_cik")]
    pub cik: Option<u64>,
    pub fiscal_year: Option<i32>,
    pub industry: String,
    pub fiscal_year_end: String,
    pub latest_revenue_usd: Option<f64>,
    pub yoy_revenue_growth_pct: Option<f64>,
    pub sm_expense_as_pct_revenue: Option<f64>,
    pub data_source: String,
}

/// Structured data plus the HTML document sent to the account team.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BriefOutput {
    pub json_data: Map<String, Value>,
    pub html_summary: String,
}

/// Blob keys of the raw filing documents ("claim check").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRefs {
    pub facts_key: String,
    pub submissions_key: String,
}

/// Output of the fetch stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimCheck {
    pub status: String,
    pub cik: u64,
    #[serde(rename = "s3_references")]
    pub storage_refs: StorageRefs,
}

/// Output of the digest stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestReceipt {
    pub status: String,
    pub recipient: String,
    pub subject: String,
    pub model: String,
    pub message_id: String,
}

/// Output of the brief stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefReceipt {
    pub status: String,
    pub artifact_prefix: String,
    pub html_key: String,
    pub json_key: String,
    pub message_id: String,
}

fn default_model_id() -> String {
    "anthropic.claude-3-sonnet-20240229-v1:0".into()
}

fn default_max_tokens() -> u32 {
    1500
}

fn default_temperature() -> f64 {
    0.3
}

/// Per-invocation model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Skip the model call and produce a canned brief.
    #[serde(default)]
    pub simulate: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            region: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            simulate: false,
        }
    }
}

impl ModelConfig {
    /// Region to call, falling back to `default` when unset.
    ///
    /// Unresolved deployment templates such as `${AWS::Region}` are replaced
    /// by a fixed region.
    pub fn resolved_region(&self, default: &str) -> String {
        let region = self
            .region
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(default);
        if region.starts_with("${") {
            warn!(%region, "unresolved region template, using {FALLBACK_REGION}");
            return FALLBACK_REGION.to_string();
        }
        region.to_string()
    }
}

/// Email routing for the finished brief.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

impl NotificationConfig {
    /// Returns `(sender, recipient)` or a configuration error when either is blank.
    pub fn require(&self) -> Result<(&str, &str)> {
        let sender = self.sender.as_deref().map(str::trim).unwrap_or_default();
        let recipient = self.recipient.as_deref().map(str::trim).unwrap_or_default();
        if sender.is_empty() || recipient.is_empty() {
            return Err(StageError::config("notification sender or recipient missing"));
        }
        Ok((sender, recipient))
    }

    /// Configured subject line, or `default` when unset or blank.
    pub fn subject_or(&self, default: impl Into<String>) -> String {
        match self.subject.as_deref().map(str::trim) {
            Some(subject) if !subject.is_empty() => subject.to_string(),
            _ => default.into(),
        }
    }
}
