//! The pipeline stages.
//!
//! Each stage takes the raw invocation event, normalizes it, does its work
//! against the injected collaborators and returns the value handed to the
//! next step.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

use crate::blob::BlobStore;
use crate::brief::{artifact_keys, BriefWriter, ModelBriefWriter, SimulatedBriefWriter};
use crate::dto::{BriefReceipt, ClaimCheck, DigestReceipt, FeatureRecord, StorageRefs};
use crate::edgar::FilingSource;
use crate::error::{Result, StageError};
use crate::facts::FactsDocument;
use crate::intel::{digest_document, ANALYST_PROMPT, DEFAULT_SUBJECT};
use crate::kpi::{build_feature_record, SubmissionsDocument};
use crate::mailer::{EmailMessage, Mailer};
use crate::openai_client::{GenerationRequest, TextGenerator};
use crate::payload::{brief_request, digest_request, feature_request, fetch_request};

const INTERMEDIATE_PREFIX: &str = "intermediate";
const JSON: &str = "application/json";
const HTML: &str = "text/html";

pub fn intermediate_keys(cik: u64) -> StorageRefs {
    StorageRefs {
        facts_key: format!("{INTERMEDIATE_PREFIX}/{cik}-facts.json"),
        submissions_key: format!("{INTERMEDIATE_PREFIX}/{cik}-submissions.json"),
    }
}

/// Downloads both filing documents and stores them for the next stage.
pub async fn fetch_facts(
    event: &Value,
    source: &dyn FilingSource,
    store: &dyn BlobStore,
) -> Result<ClaimCheck> {
    let request = fetch_request(event)?;
    let cik = request.cik;
    info!(cik, "fetching filing documents");

    let facts = source.company_facts(cik).await?;
    let submissions = source.submissions(cik).await?;

    let refs = intermediate_keys(cik);
    store.put(&refs.facts_key, facts, JSON).await?;
    store.put(&refs.submissions_key, submissions, JSON).await?;
    info!(cik, facts_key = %refs.facts_key, submissions_key = %refs.submissions_key, "filing documents stored");

    Ok(ClaimCheck {
        status: "success".into(),
        cik,
        storage_refs: refs,
    })
}

/// Loads the stored documents and derives the feature record.
pub async fn build_features(event: &Value, store: &dyn BlobStore) -> Result<FeatureRecord> {
    let request = feature_request(event)?;
    let refs = &request.refs;

    let facts_bytes = store.get(&refs.facts_key).await?;
    let facts = FactsDocument::from_slice(&facts_bytes).map_err(|source| StageError::Document {
        key: refs.facts_key.clone(),
        source,
    })?;
    let submissions_bytes = store.get(&refs.submissions_key).await?;
    let submissions =
        SubmissionsDocument::from_slice(&submissions_bytes).map_err(|source| StageError::Document {
            key: refs.submissions_key.clone(),
            source,
        })?;

    Ok(build_feature_record(&facts, &submissions, &request.identity))
}

/// Writes the brief, stores both artifacts and emails the summary.
///
/// Notification settings are validated before the model call and before any
/// artifact is written.
pub async fn generate_brief(
    event: &Value,
    generator: Arc<dyn TextGenerator>,
    store: &dyn BlobStore,
    mailer: &dyn Mailer,
    today: NaiveDate,
    default_region: &str,
) -> Result<BriefReceipt> {
    let request = brief_request(event)?;
    let (sender, recipient) = request.notification.require()?;
    let features = &request.features;

    let writer: Box<dyn BriefWriter> = if request.model.simulate {
        Box::new(SimulatedBriefWriter)
    } else {
        Box::new(ModelBriefWriter::new(
            generator,
            request.model.clone(),
            default_region,
        ))
    };
    let brief = writer.write(features).await?;

    let keys = artifact_keys(features.company_name.as_deref(), today);
    let json_bytes = serde_json::to_vec_pretty(&brief.json_data).map_err(|source| {
        StageError::Document {
            key: keys.json_key.clone(),
            source,
        }
    })?;
    store
        .put(&keys.html_key, brief.html_summary.clone().into_bytes(), HTML)
        .await?;
    store.put(&keys.json_key, json_bytes, JSON).await?;
    info!(html_key = %keys.html_key, json_key = %keys.json_key, "brief artifacts stored");

    let message = EmailMessage {
        sender: sender.to_string(),
        recipient: recipient.to_string(),
        subject: request.notification.subject_or(format!(
            "Account ROI Brief: {}",
            features.company_name.as_deref().unwrap_or("N/A")
        )),
        html_body: brief.html_summary,
    };
    let message_id = mailer.send(&message).await?;

    Ok(BriefReceipt {
        status: "success".into(),
        artifact_prefix: keys.prefix,
        html_key: keys.html_key,
        json_key: keys.json_key,
        message_id,
    })
}

/// Has the model write an analyst digest of aggregated sources and mails it.
///
/// Notification settings are validated before the model call.
pub async fn analyze_and_notify(
    event: &Value,
    generator: &dyn TextGenerator,
    mailer: &dyn Mailer,
    today: NaiveDate,
    default_region: &str,
) -> Result<DigestReceipt> {
    let request = digest_request(event)?;
    let (sender, recipient) = request.notification.require()?;
    if request.source_count == 0 {
        warn!("digest requested with a source count of 0");
    }

    let model = &request.model;
    let generation = GenerationRequest {
        model_id: model.model_id.clone(),
        region: model.resolved_region(default_region),
        system_prompt: ANALYST_PROMPT.to_string(),
        user_content: request.prompt_context.clone(),
        max_tokens: model.max_tokens,
        temperature: model.temperature,
    };
    info!(
        model = %generation.model_id,
        region = %generation.region,
        sources = request.source_count,
        context_len = generation.user_content.len(),
        "invoking model for digest"
    );
    let reply = generator.generate(&generation).await?;

    let subject = request.notification.subject_or(DEFAULT_SUBJECT);
    let message = EmailMessage {
        sender: sender.to_string(),
        recipient: recipient.to_string(),
        subject: subject.clone(),
        html_body: digest_document(&reply, today),
    };
    let message_id = mailer.send(&message).await?;

    Ok(DigestReceipt {
        status: "sent".into(),
        recipient: recipient.to_string(),
        subject,
        model: generation.model_id,
        message_id,
    })
}
