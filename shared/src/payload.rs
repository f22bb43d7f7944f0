//! Normalizes stage input events.
//!
//! The orchestrator wraps step results in `{"Payload": ...}` envelopes
//! depending on how a step was composed, and a stage's payload may arrive
//! under its own key or at the top level. Every stage entry goes through the
//! functions here so downstream code only ever sees the canonical shape.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::dto::{cik_from_value, FeatureRecord, ModelConfig, NotificationConfig, StorageRefs};
use crate::error::{Result, StageError};
use crate::intel::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::kpi::CompanyIdentity;

pub const ENVELOPE_KEY: &str = "Payload";
pub const ACCOUNT_KEY: &str = "account";
pub const EDGAR_DATA_KEY: &str = "edgar_data";
pub const FEATURES_KEY: &str = "features";
pub const STORAGE_REFS_KEY: &str = "s3_references";
pub const AGGREGATED_KEY: &str = "aggregated";

const MODEL_KEYS: [&str; 2] = ["model", "bedrock"];
const NOTIFICATION_KEYS: [&str; 2] = ["notification", "ses"];
const FEATURE_FIELDS: [&str; 4] = ["company_name", "cik", "fiscal_year", "latest_revenue_usd"];

static NULL: Value = Value::Null;

/// Strips nested invocation envelopes, however deep.
pub fn unwrap_envelope(value: &Value) -> &Value {
    let mut current = value;
    while let Some(inner) = current.as_object().and_then(|o| o.get(ENVELOPE_KEY)) {
        current = inner;
    }
    current
}

/// The payload under `key` when it is a non-empty object, else the event itself.
pub fn select_domain<'a>(event: &'a Value, key: &str) -> &'a Value {
    let event = unwrap_envelope(event);
    match event.get(key).map(unwrap_envelope) {
        Some(nested) if is_non_empty_object(nested) => nested,
        _ => event,
    }
}

fn is_non_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(|o| !o.is_empty())
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Input of the fetch stage.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub cik: u64,
}

pub fn fetch_request(event: &Value) -> Result<FetchRequest> {
    let account = select_domain(event, ACCOUNT_KEY);
    let cik = account
        .get("cik")
        .and_then(cik_from_value)
        .ok_or_else(|| StageError::config("Missing 'cik' in account object"))?;
    Ok(FetchRequest { cik })
}

/// Input of the feature stage.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRequest {
    pub identity: CompanyIdentity,
    pub refs: StorageRefs,
}

pub fn feature_request(event: &Value) -> Result<FeatureRequest> {
    let event = unwrap_envelope(event);
    let edgar = select_domain(event, EDGAR_DATA_KEY);

    let refs = [edgar, event]
        .into_iter()
        .filter_map(|v| v.get(STORAGE_REFS_KEY).map(unwrap_envelope))
        .find(|v| is_non_empty_object(v))
        .unwrap_or(&NULL);
    let (Some(facts_key), Some(submissions_key)) = (
        non_empty_str(refs, "facts_key"),
        non_empty_str(refs, "submissions_key"),
    ) else {
        return Err(StageError::config("Missing S3 references in the event payload"));
    };

    let cik = event
        .get("cik")
        .and_then(cik_from_value)
        .or_else(|| edgar.get("cik").and_then(cik_from_value));
    let name = non_empty_str(event, "name")
        .or_else(|| non_empty_str(edgar, "name"))
        .map(str::to_string);
    debug!(?cik, ?name, facts_key, submissions_key, "feature request normalized");

    Ok(FeatureRequest {
        identity: CompanyIdentity { name, cik },
        refs: StorageRefs {
            facts_key: facts_key.to_string(),
            submissions_key: submissions_key.to_string(),
        },
    })
}

/// Input of the brief stage.
#[derive(Debug, Clone, PartialEq)]
pub struct BriefRequest {
    pub features: FeatureRecord,
    pub model: ModelConfig,
    pub notification: NotificationConfig,
}

pub fn brief_request(event: &Value) -> Result<BriefRequest> {
    let event = unwrap_envelope(event);
    let features = match event.get(FEATURES_KEY).map(unwrap_envelope) {
        Some(nested) if is_non_empty_object(nested) => nested,
        _ if FEATURE_FIELDS.iter().any(|k| event.get(k).is_some()) => event,
        _ => return Err(StageError::config("Features data is missing")),
    };
    let features: FeatureRecord = serde_json::from_value(features.clone())
        .map_err(|e| StageError::config(format!("invalid features payload: {e}")))?;

    Ok(BriefRequest {
        features,
        model: section(event, &MODEL_KEYS)?,
        notification: section(event, &NOTIFICATION_KEYS)?,
    })
}

/// Input of the digest stage.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestRequest {
    pub prompt_context: String,
    pub source_count: u64,
    pub model: ModelConfig,
    pub notification: NotificationConfig,
}

pub fn digest_request(event: &Value) -> Result<DigestRequest> {
    let event = unwrap_envelope(event);
    let aggregated = select_domain(event, AGGREGATED_KEY);
    let prompt_context = non_empty_str(aggregated, "prompt_context")
        .ok_or_else(|| StageError::config("No aggregated content to analyze"))?
        .to_string();
    let source_count = aggregated
        .get("source_count")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let mut model_defaults = Map::new();
    model_defaults.insert("max_tokens".into(), json!(DEFAULT_MAX_TOKENS));
    model_defaults.insert("temperature".into(), json!(DEFAULT_TEMPERATURE));

    Ok(DigestRequest {
        prompt_context,
        source_count,
        model: section_with(event, &MODEL_KEYS, model_defaults)?,
        notification: section(event, &NOTIFICATION_KEYS)?,
    })
}

/// Deserializes the first non-null section among `keys`, or its default.
fn section<T: DeserializeOwned>(event: &Value, keys: &[&str]) -> Result<T> {
    section_with(event, keys, Map::new())
}

/// Like [`section`], with `defaults` filling the fields the section leaves out.
fn section_with<T: DeserializeOwned>(
    event: &Value,
    keys: &[&str],
    defaults: Map<String, Value>,
) -> Result<T> {
    let found = keys.iter().find_map(|k| {
        event
            .get(*k)
            .map(unwrap_envelope)
            .filter(|v| !v.is_null())
            .map(|v| (*k, v))
    });
    let (key, value) = match found {
        Some((key, Value::Object(fields))) => {
            let mut merged = defaults;
            merged.extend(fields.clone());
            (key, Value::Object(merged))
        }
        Some((key, other)) => (key, other.clone()),
        None => ("default", Value::Object(defaults)),
    };
    serde_json::from_value(value)
        .map_err(|e| StageError::config(format!("invalid '{key}' section: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn refs() -> Value {
        json!({
            "facts_key": "intermediate/320193-facts.json",
            "submissions_key": "intermediate/320193-submissions.json"
        })
    }

    #[test]
    fn unwraps_any_depth() {
        let inner = json!({ "cik": 1 });
        let wrapped = json!({ "Payload": { "Payload": { "Payload": inner.clone() } } });
        assert_eq!(unwrap_envelope(&wrapped), &inner);
        assert_eq!(unwrap_envelope(&inner), &inner);
        assert_eq!(unwrap_envelope(&json!("text")), &json!("text"));
    }

    #[test]
    fn prefers_non_empty_domain_key() {
        let event = json!({ "edgar_data": { "cik": 1 }, "cik": 2 });
        assert_eq!(select_domain(&event, "edgar_data"), &json!({ "cik": 1 }));

        let event = json!({ "edgar_data": {}, "cik": 2 });
        assert_eq!(select_domain(&event, "edgar_data"), &event);
    }

    #[test]
    fn fetch_request_reads_account_cik() {
        let event = json!({ "account": { "cik": "320193", "name": "Apple" } });
        assert_eq!(fetch_request(&event).unwrap(), FetchRequest { cik: 320193 });

        let err = fetch_request(&json!({ "account": { "name": "Apple" } })).unwrap_err();
        assert!(matches!(err, StageError::Config(_)));
    }

    #[test]
    fn feature_request_from_nested_and_top_level_refs() {
        let nested = json!({
            "name": "Apple Inc.",
            "edgar_data": { "status": "success", "cik": 320193, "s3_references": refs() }
        });
        let top_level = json!({ "name": "Apple Inc.", "cik": 320193, "s3_references": refs() });

        let a = feature_request(&nested).unwrap();
        let b = feature_request(&top_level).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.identity.cik, Some(320193));
        assert_eq!(a.refs.facts_key, "intermediate/320193-facts.json");
    }

    #[test]
    fn feature_request_unwraps_twice_wrapped_input() {
        let plain = json!({
            "name": "Apple Inc.",
            "edgar_data": { "cik": 320193, "s3_references": refs() }
        });
        let wrapped = json!({
            "Payload": {
                "name": "Apple Inc.",
                "edgar_data": { "Payload": { "cik": 320193, "s3_references": refs() } }
            }
        });
        assert_eq!(feature_request(&wrapped).unwrap(), feature_request(&plain).unwrap());
    }

    #[test]
    fn event_cik_wins_over_domain_cik() {
        let event = json!({ "cik": 7, "edgar_data": { "cik": 8, "s3_references": refs() } });
        assert_eq!(feature_request(&event).unwrap().identity.cik, Some(7));
    }

    #[test]
    fn missing_storage_refs_is_a_config_error() {
        for event in [
            json!({ "edgar_data": { "cik": 1 } }),
            json!({ "s3_references": { "facts_key": "a.json" } }),
            json!({ "s3_references": { "facts_key": "", "submissions_key": "b.json" } }),
            json!({}),
        ] {
            let err = feature_request(&event).unwrap_err();
            assert_eq!(
                err.to_string(),
                "configuration error: Missing S3 references in the event payload"
            );
        }
    }

    #[test]
    fn brief_request_accepts_wrapped_features_and_aliases() {
        let event = json!({
            "features": { "Payload": { "company_name": "Acme Corp", "cik": 42, "fiscal_year": 2023 } },
            "bedrock": { "model_id": "test-model", "simulate": true },
            "ses": { "sender": "a@example.com", "recipient": "b@example.com" }
        });
        let req = brief_request(&event).unwrap();
        assert_eq!(req.features.company_name.as_deref(), Some("Acme Corp"));
        assert_eq!(req.features.fiscal_year, Some(2023));
        assert_eq!(req.model.model_id, "test-model");
        assert!(req.model.simulate);
        assert_eq!(req.notification.sender.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn brief_request_accepts_top_level_features() {
        let event = json!({ "company_name": "Acme Corp", "cik": 42 });
        let req = brief_request(&event).unwrap();
        assert_eq!(req.features.cik, Some(42));
        assert_eq!(req.model, ModelConfig::default());
        assert_eq!(req.notification, NotificationConfig::default());
    }

    #[test]
    fn brief_request_without_features_fails() {
        for event in [json!({}), json!({ "features": {} }), json!({ "ses": { "sender": "a" } })] {
            let err = brief_request(&event).unwrap_err();
            assert_eq!(err.to_string(), "configuration error: Features data is missing");
        }
    }

    #[test]
    fn null_section_falls_through_to_alias() {
        let event = json!({
            "features": { "cik": 1 },
            "model": null,
            "bedrock": { "model_id": "alias-model" },
            "notification": null,
            "ses": { "sender": "a@example.com", "recipient": "b@example.com" }
        });
        let req = brief_request(&event).unwrap();
        assert_eq!(req.model.model_id, "alias-model");
        assert_eq!(req.notification.recipient.as_deref(), Some("b@example.com"));
    }

    #[test]
    fn digest_request_unwraps_aggregated_payload() {
        let event = json!({
            "aggregated": { "Payload": { "source_count": 3, "prompt_context": "##### SOURCE 1" } },
            "bedrock": { "region": "eu-west-1", "temperature": 0.7 },
            "ses": { "sender": "a@example.com", "recipient": "b@example.com", "subject": "Intel" }
        });
        let req = digest_request(&event).unwrap();
        assert_eq!(req.prompt_context, "##### SOURCE 1");
        assert_eq!(req.source_count, 3);
        assert_eq!(req.model.max_tokens, 2000);
        assert_eq!(req.model.temperature, 0.7);
        assert_eq!(req.model.region.as_deref(), Some("eu-west-1"));
        assert_eq!(req.notification.subject.as_deref(), Some("Intel"));
    }

    #[test]
    fn digest_model_defaults_differ_from_brief_defaults() {
        let req = digest_request(&json!({ "aggregated": { "prompt_context": "text" } })).unwrap();
        assert_eq!(req.source_count, 0);
        assert_eq!(req.model.max_tokens, 2000);
        assert_eq!(req.model.temperature, 0.2);
        assert_eq!(req.model.model_id, ModelConfig::default().model_id);

        let req = digest_request(&json!({ "aggregated": { "prompt_context": "text" }, "model": null }))
            .unwrap();
        assert_eq!(req.model.max_tokens, 2000);
    }

    #[test]
    fn digest_without_context_fails() {
        for event in [
            json!({}),
            json!({ "aggregated": { "source_count": 2 } }),
            json!({ "aggregated": { "prompt_context": "" } }),
        ] {
            let err = digest_request(&event).unwrap_err();
            assert_eq!(err.to_string(), "configuration error: No aggregated content to analyze");
        }
    }

    #[test]
    fn invalid_model_section_is_a_config_error() {
        let event = json!({ "features": { "cik": 1 }, "model": { "max_tokens": "many" } });
        assert!(matches!(brief_request(&event), Err(StageError::Config(_))));
    }
}
