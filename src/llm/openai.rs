//! OpenAI-compatible chat completion provider over reqwest.
//!
//! Speaks the `/chat/completions` wire format, so the same provider works
//! against OpenAI itself or any compatible gateway by changing `base_url`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
};

const PROVIDER: &str = "openai";

/// Provider that posts to `{base_url}/chat/completions`.
pub struct OpenAiCompatProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: impl Into<String>, api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }

    fn completions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    id: Option<String>,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = WireRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::HttpStatus {
                provider: PROVIDER.into(),
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await.map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.into(),
            reason: format!("failed to read body: {e}"),
        })?;
        parse_completion(&text)
    }
}

/// Decode a `/chat/completions` response body.
fn parse_completion(body: &str) -> Result<CompletionResponse, LlmError> {
    let wire: WireResponse = serde_json::from_str(body).map_err(|e| LlmError::InvalidResponse {
        provider: PROVIDER.into(),
        reason: format!("failed to parse response: {e}"),
    })?;

    let choice = wire
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: "response has no choices".into(),
        })?;

    let content = choice.message.content.ok_or_else(|| LlmError::InvalidResponse {
        provider: PROVIDER.into(),
        reason: "first choice has no content".into(),
    })?;

    let usage = wire.usage.unwrap_or(WireUsage {
        prompt_tokens: 0,
        completion_tokens: 0,
    });

    Ok(CompletionResponse {
        content,
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        finish_reason: FinishReason::from_wire(choice.finish_reason.as_deref()),
        response_id: wire.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(
            server.uri(),
            SecretString::from("sk-test"),
            "gpt-3.5-turbo",
        )
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![
            ChatMessage::system("Answer with one word."),
            ChatMessage::user("Subject: hi\n\nBody: hello"),
        ])
        .with_temperature(0.0)
        .with_max_tokens(5)
    }

    #[test]
    fn completions_url_strips_trailing_slash() {
        let p = OpenAiCompatProvider::new(
            "https://api.example.com/v1/",
            SecretString::from("k"),
            "m",
        );
        assert_eq!(p.completions_url(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn parse_rejects_empty_choices() {
        let err = parse_completion(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[test]
    fn parse_rejects_null_content() {
        let err = parse_completion(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[test]
    fn parse_accepts_minimal_shape() {
        let resp = parse_completion(r#"{"choices": [{"message": {"content": "true"}}]}"#).unwrap();
        assert_eq!(resp.content, "true");
        assert_eq!(resp.finish_reason, FinishReason::Unknown);
        assert_eq!(resp.input_tokens, 0);
    }

    #[tokio::test]
    async fn complete_sends_expected_request_shape() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-3.5-turbo",
                "temperature": 0.0,
                "max_tokens": 5,
                "messages": [
                    {"role": "system", "content": "Answer with one word."},
                    {"role": "user", "content": "Subject: hi\n\nBody: hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "true"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 20, "completion_tokens": 1, "total_tokens": 21}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider(&server).complete(request()).await.unwrap();
        assert_eq!(response.content, "true");
        assert_eq!(response.input_tokens, 20);
        assert_eq!(response.output_tokens, 1);
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.response_id.as_deref(), Some("chatcmpl-1"));
    }

    #[tokio::test]
    async fn complete_maps_server_error_to_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let err = provider(&server).complete(request()).await.unwrap_err();
        match err {
            LlmError::HttpStatus { status, body, .. } => {
                assert_eq!(status, 500);
                assert!(body.contains("exploded"));
            }
            other => panic!("Expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_maps_malformed_body_to_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
            .mount(&server)
            .await;

        let err = provider(&server).complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn complete_maps_connection_failure_to_request_failed() {
        // Port 9 (discard) on localhost is not listening in test environments.
        let p = OpenAiCompatProvider::new("http://127.0.0.1:9", SecretString::from("k"), "m");
        let err = p.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed { .. }));
    }
}
