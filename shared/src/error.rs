use thiserror::Error;

use crate::blob::BlobError;
use crate::edgar::FetchError;
use crate::mailer::NotifyError;
use crate::openai_client::GenerationError;

/// Failure of a pipeline stage.
///
/// Only caller contract violations and collaborator faults end up here.
/// Sparse disclosures are represented as `None` values in the output instead.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid document {key}: {source}")]
    Document {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),
    #[error("filing source error: {0}")]
    Fetch(#[from] FetchError),
    #[error("text generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),
}

impl StageError {
    pub fn config(msg: impl Into<String>) -> Self {
        StageError::Config(msg.into())
    }

    /// HTTP status the services answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            StageError::Config(_) => 400,
            _ => 502,
        }
    }
}

pub type Result<T> = std::result::Result<T, StageError>;
