use serde::Deserialize;

fn default_blob_root() -> String {
    "./data".into()
}

fn default_http_bind() -> String {
    "0.0.0.0".into()
}

fn default_http_port() -> u16 {
    8080
}

fn default_openai_api_base() -> String {
    "https://api.openai.com".into()
}

fn default_model_region() -> String {
    "us-west-2".into()
}

fn default_edgar_base_url() -> String {
    "https://data.sec.gov".into()
}

fn default_edgar_user_agent() -> String {
    "AccountRoiCopilot/1.0 (ops@example.com)".into()
}

/// Process-wide settings, read from environment variables
/// (`BLOB_ROOT`, `OPENAI_API_KEY`, `MAIL_RELAY_URL`, ...).
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_blob_root")]
    pub blob_root: String,
    #[serde(default = "default_http_bind")]
    pub http_bind: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub openai_api_key: String,
    /// Base URL of the chat completions API. May contain a `{region}` placeholder.
    #[serde(default = "default_openai_api_base")]
    pub openai_api_base: String,
    #[serde(default = "default_model_region")]
    pub model_region: String,
    #[serde(default)]
    pub mail_relay_url: String,
    #[serde(default)]
    pub mail_relay_token: Option<String>,
    #[serde(default = "default_edgar_base_url")]
    pub edgar_base_url: String,
    /// The filing source rejects requests without an identifying agent.
    #[serde(default = "default_edgar_user_agent")]
    pub edgar_user_agent: String,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()
    }
}
