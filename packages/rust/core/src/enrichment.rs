//! Description expansion over an OpenAI-compatible chat-completion endpoint.
//!
//! One [`ChatClient`] is built per worker. It sends a single non-streaming
//! request per call and never retries.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use lexenrich_shared::{LexError, LlmConfig, Result};

use crate::prompt;

/// Longest slice of an error body kept in a `Service` error.
const MAX_ERROR_BODY: usize = 200;

/// Turns a term and its short definition into a long-form description.
pub trait DescriptionExpander: Send + Sync {
    fn expand(&self, term: &str, definition: &str) -> impl Future<Output = Result<String>> + Send;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Chat-completion client bound to one endpoint, model, and credential.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: Url,
    model: String,
    api_key: String,
}

impl ChatClient {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| LexError::Service(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: endpoint(&config.base_url)?,
            model: config.model.clone(),
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn complete(&self, user: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: prompt::SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            stream: false,
        };

        let resp = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LexError::Service(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(LexError::Service(format!("HTTP {status}: {snippet}")));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LexError::Service(format!("invalid response body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LexError::Service("response contained no completion".into()))
    }
}

impl DescriptionExpander for ChatClient {
    #[instrument(skip_all, fields(term = %term, model = %self.model))]
    async fn expand(&self, term: &str, definition: &str) -> Result<String> {
        let result = self.complete(&prompt::user_message(term, definition)).await;
        match &result {
            Ok(text) => debug!(chars = text.chars().count(), "description expanded"),
            Err(e) => warn!(error = %e, "expansion failed"),
        }
        result
    }
}

/// `{base_url}/chat/completions`, tolerating a trailing slash.
fn endpoint(base_url: &str) -> Result<Url> {
    let base = base_url.trim_end_matches('/');
    Url::parse(&format!("{base}/chat/completions"))
        .map_err(|e| LexError::config(format!("invalid llm.base_url '{base_url}': {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LlmConfig {
        LlmConfig {
            base_url: format!("{}/v1", server.uri()),
            ..LlmConfig::default()
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        })
    }

    #[test]
    fn endpoint_appends_chat_completions() {
        assert_eq!(
            endpoint("https://api.deepseek.com/v1").unwrap().as_str(),
            "https://api.deepseek.com/v1/chat/completions"
        );
        assert_eq!(
            endpoint("http://localhost:8080/v1/").unwrap().as_str(),
            "http://localhost:8080/v1/chat/completions"
        );
        assert!(endpoint("not a url").is_err());
    }

    #[tokio::test]
    async fn expand_sends_expected_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "deepseek-chat",
                "stream": false,
                "messages": [
                    { "role": "system", "content": prompt::SYSTEM_INSTRUCTION },
                    { "role": "user", "content": "C语言 一种通用的过程式编程语言。" }
                ]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion("C语言是一种编程语言。")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(&server), "sk-test").unwrap();
        let text = client
            .expand("C语言", "一种通用的过程式编程语言。")
            .await
            .expect("expansion should succeed");
        assert_eq!(text, "C语言是一种编程语言。");
    }

    #[tokio::test]
    async fn non_success_status_is_service_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid api key"}"#),
            )
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(&server), "bad").unwrap();
        let err = client.expand("苹果", "").await.unwrap_err();
        match err {
            LexError::Service(msg) => {
                assert!(msg.contains("401"), "got: {msg}");
                assert!(msg.contains("invalid api key"));
            }
            other => panic!("expected Service, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_service_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(&server), "sk-test").unwrap();
        let err = client.expand("苹果", "水果").await.unwrap_err();
        assert!(matches!(err, LexError::Service(_)));
    }

    #[tokio::test]
    async fn undecodable_body_is_service_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(&server), "sk-test").unwrap();
        let err = client.expand("苹果", "水果").await.unwrap_err();
        assert!(err.to_string().contains("invalid response body"));
    }

    #[tokio::test]
    async fn unreachable_service_is_service_error() {
        let config = LlmConfig {
            // Port 9 (discard) is not expected to run an HTTP server.
            base_url: "http://127.0.0.1:9/v1".into(),
            timeout_secs: Some(2),
            ..LlmConfig::default()
        };
        let client = ChatClient::new(&config, "sk-test").unwrap();
        let err = client.expand("苹果", "水果").await.unwrap_err();
        assert!(matches!(err, LexError::Service(_)));
    }
}
