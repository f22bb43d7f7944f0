use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;
use serial_test::serial;
use shared::openai_client::{GenerationError, GenerationRequest, HttpTextGenerator, TextGenerator};
use tokio::runtime::Builder;

fn request(region: &str) -> GenerationRequest {
    GenerationRequest {
        model_id: "test-model".into(),
        region: region.into(),
        system_prompt: "System".into(),
        user_content: "Features".into(),
        max_tokens: 1500,
        temperature: 0.3,
    }
}

#[serial]
#[test]
fn chat_endpoint_returns_message_content() -> anyhow::Result<()> {
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::new)?;
    rt.block_on(async {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer test-key")
                    .json_body_partial(r#"{"model":"test-model","max_tokens":1500}"#);
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "choices": [{ "message": { "role": "assistant", "content": "{\"html_summary\":\"<p>x</p>\"}" } }]
                    }));
            })
            .await;

        let generator = HttpTextGenerator::new(&server.base_url(), "test-key", Duration::from_secs(5))?;
        let reply = generator.generate(&request("us-west-2")).await?;
        assert_eq!(reply, "{\"html_summary\":\"<p>x</p>\"}");

        mock.assert_async().await;
        Ok(())
    })
}

#[serial]
#[test]
fn block_list_reply_is_concatenated() -> anyhow::Result<()> {
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::new)?;
    rt.block_on(async {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({
                    "content": [
                        { "type": "text", "text": "part one, " },
                        { "type": "text", "text": "part two" }
                    ]
                }));
            })
            .await;

        let generator = HttpTextGenerator::new(&server.base_url(), "", Duration::from_secs(5))?;
        let reply = generator.generate(&request("us-west-2")).await?;
        assert_eq!(reply, "part one, part two");

        mock.assert_async().await;
        Ok(())
    })
}

#[serial]
#[test]
fn error_status_is_reported() -> anyhow::Result<()> {
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::new)?;
    rt.block_on(async {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(429).body("slow down");
            })
            .await;

        let generator = HttpTextGenerator::new(&server.base_url(), "k", Duration::from_secs(5))?;
        let err = generator.generate(&request("us-west-2")).await.unwrap_err();
        assert!(matches!(err, GenerationError::Http(429)));

        mock.assert_async().await;
        Ok(())
    })
}
