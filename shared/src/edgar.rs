//! Client for the regulatory filing source (company facts and submissions).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid client configuration: {0}")]
    Client(String),
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("http error {status} from {url}")]
    Http { url: String, status: u16 },
}

#[async_trait]
pub trait FilingSource: Send + Sync {
    async fn company_facts(&self, cik: u64) -> Result<Vec<u8>, FetchError>;

    async fn submissions(&self, cik: u64) -> Result<Vec<u8>, FetchError>;
}

/// The source addresses companies by a ten digit, zero padded CIK.
pub fn padded_cik(cik: u64) -> String {
    format!("{cik:010}")
}

#[derive(Clone)]
pub struct EdgarClient {
    client: Client,
    base_url: String,
}

impl EdgarClient {
    pub const TIMEOUT: Duration = Duration::from_secs(20);

    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        let agent =
            HeaderValue::from_str(user_agent).map_err(|e| FetchError::Client(e.to_string()))?;
        headers.insert(USER_AGENT, agent);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_bytes(&self, url: String) -> Result<Vec<u8>, FetchError> {
        let request_err = |e: reqwest::Error| FetchError::Request {
            url: url.clone(),
            message: e.to_string(),
        };
        let resp = self.client.get(&url).send().await.map_err(request_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url,
                status: status.as_u16(),
            });
        }
        let bytes = resp.bytes().await.map_err(request_err)?;
        info!(%url, len = bytes.len(), "filing document fetched");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl FilingSource for EdgarClient {
    async fn company_facts(&self, cik: u64) -> Result<Vec<u8>, FetchError> {
        let url = format!(
            "{}/api/xbrl/companyfacts/CIK{}.json",
            self.base_url,
            padded_cik(cik)
        );
        self.get_bytes(url).await
    }

    async fn submissions(&self, cik: u64) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}/submissions/CIK{}.json", self.base_url, padded_cik(cik));
        self.get_bytes(url).await
    }
}
