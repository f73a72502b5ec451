//! Minimal Anthropic Messages API client for narrative generation.
//!
//! This crate provides a focused client with:
//! - Non-streaming completions
//! - Streaming completions surfaced as text deltas
//! - Error classification into transient and terminal failures

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio_stream::Stream;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Errors that can occur when talking to the generation API.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures, timeouts, rate limits, server errors and
    /// truncated payloads are transient. Missing credentials, bad requests
    /// and configuration mistakes are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(_) | Error::Timeout(_) | Error::Parse(_) | Error::Stream(_) => true,
            Error::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Error::NoApiKey | Error::Config(_) => false,
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

/// Connection settings for [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Messages API client.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    api_key: String,
    config: ClientConfig,
}

impl Client {
    /// Create a client with the given API key and settings.
    pub fn new(api_key: impl Into<String>, config: ClientConfig) -> Result<Self, Error> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::NoApiKey);
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key,
            config,
        })
    }

    /// Create a client from the `ANTHROPIC_API_KEY` environment variable.
    pub fn from_env(config: ClientConfig) -> Result<Self, Error> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| Error::NoApiKey)?;
        Self::new(api_key, config)
    }

    /// The model requests default to.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send a completion request and return the full response.
    pub async fn complete(&self, request: &Request) -> Result<Response, Error> {
        let response = self.send(request, false).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        Ok(api_response.into())
    }

    /// Send a completion request and stream the response events.
    pub async fn stream(
        &self,
        request: &Request,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, Error>> + Send>>, Error> {
        let response = self.send(request, true).await?;

        // Keep raw bytes across chunks: an SSE line, or a UTF-8 character
        // inside it, may be split between two reads.
        let stream = response
            .bytes_stream()
            .scan(Vec::new(), |buffer, result| {
                let events = match result {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);
                        parse_sse_events_buffered(buffer)
                    }
                    Err(e) => vec![Err(Error::from_reqwest(e))],
                };
                futures::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }

    async fn send(&self, request: &Request, stream: bool) -> Result<reqwest::Response, Error> {
        let api_request = self.build_api_request(request, stream);
        let headers = self.build_headers()?;

        tracing::debug!(
            model = %api_request.model,
            messages = api_request.messages.len(),
            stream,
            "sending generation request"
        );

        let response = self
            .http
            .post(format!("{}/messages", self.config.base_url))
            .headers(headers)
            .json(&api_request)
            .send()
            .await
            .map_err(Error::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        Ok(response)
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }

    fn build_api_request(&self, request: &Request, stream: bool) -> ApiRequest {
        ApiRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.as_str(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: request.temperature,
            stream,
        }
    }
}

// ============================================================================
// Public types
// ============================================================================

/// A completion request.
#[derive(Debug, Clone)]
pub struct Request {
    pub model: Option<String>,
    pub max_tokens: usize,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
}

impl Request {
    /// Create a new request with the given messages.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            max_tokens: 2048,
            system: None,
            messages,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A text message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A completion response.
#[derive(Debug, Clone)]
pub struct Response {
    pub id: String,
    pub model: String,
    pub text: String,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    fn parse(s: &str) -> Self {
        match s {
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Events from a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    MessageStart { id: String, model: String },
    TextDelta { text: String },
    MessageDelta { stop_reason: Option<StopReason> },
    MessageStop,
    Ping,
    Error { message: String },
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    id: String,
    model: String,
    content: Vec<ApiContent>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: ApiUsage,
}

impl From<ApiResponse> for Response {
    fn from(api: ApiResponse) -> Self {
        let text = api
            .content
            .into_iter()
            .filter_map(|c| match c {
                ApiContent::Text { text } => Some(text),
                ApiContent::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Response {
            id: api.id,
            model: api.model,
            text,
            stop_reason: api
                .stop_reason
                .as_deref()
                .map(StopReason::parse)
                .unwrap_or(StopReason::EndTurn),
            usage: Usage {
                input_tokens: api.usage.input_tokens,
                output_tokens: api.usage.output_tokens,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContent {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiStreamEvent {
    MessageStart {
        message: ApiMessageStart,
    },
    ContentBlockStart {},
    ContentBlockDelta {
        delta: ApiDelta,
    },
    ContentBlockStop {},
    MessageDelta {
        delta: ApiMessageDelta,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiError,
    },
}

#[derive(Debug, Deserialize)]
struct ApiMessageStart {
    id: String,
    model: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiMessageDelta {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Parse SSE events from a buffer, consuming complete lines and leaving
/// any partial line for the next chunk.
fn parse_sse_events_buffered(buffer: &mut Vec<u8>) -> Vec<Result<StreamEvent, Error>> {
    let mut events = Vec::new();

    // Only complete lines are decoded; a trailing partial line stays buffered.
    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();
        let line = match std::str::from_utf8(&raw) {
            Ok(line) => line.trim_end_matches(['\n', '\r']),
            Err(e) => {
                events.push(Err(Error::Parse(format!("SSE line is not UTF-8: {e}"))));
                continue;
            }
        };

        if let Some(json_str) = line.strip_prefix("data: ") {
            if json_str == "[DONE]" {
                events.push(Ok(StreamEvent::MessageStop));
            } else if !json_str.is_empty() {
                match serde_json::from_str::<ApiStreamEvent>(json_str) {
                    Ok(event) => {
                        if let Some(event) = convert_stream_event(event) {
                            events.push(Ok(event));
                        }
                    }
                    Err(e) => events.push(Err(Error::Parse(format!("SSE parse error: {e}")))),
                }
            }
        }
        // event:, comment and blank lines carry nothing we need
    }

    events
}

fn convert_stream_event(event: ApiStreamEvent) -> Option<StreamEvent> {
    match event {
        ApiStreamEvent::MessageStart { message } => Some(StreamEvent::MessageStart {
            id: message.id,
            model: message.model,
        }),
        ApiStreamEvent::ContentBlockDelta { delta } => match delta {
            ApiDelta::TextDelta { text } => Some(StreamEvent::TextDelta { text }),
            ApiDelta::Other => None,
        },
        ApiStreamEvent::ContentBlockStart {} | ApiStreamEvent::ContentBlockStop {} => None,
        ApiStreamEvent::MessageDelta { delta } => Some(StreamEvent::MessageDelta {
            stop_reason: delta.stop_reason.as_deref().map(StopReason::parse),
        }),
        ApiStreamEvent::MessageStop => Some(StreamEvent::MessageStop),
        ApiStreamEvent::Ping => Some(StreamEvent::Ping),
        ApiStreamEvent::Error { error } => Some(StreamEvent::Error {
            message: error.message,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_key() {
        let result = Client::new("  ", ClientConfig::default());
        assert!(matches!(result, Err(Error::NoApiKey)));
    }

    #[test]
    fn test_client_with_model() {
        let client = Client::new("test-key", ClientConfig::default().with_model("claude-3-opus"))
            .unwrap();
        assert_eq!(client.model(), "claude-3-opus");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let config = ClientConfig::default().with_base_url("http://localhost:8080/v1/");
        assert_eq!(config.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_request_builder() {
        let request = Request::new(vec![Message::user("Hello")])
            .with_system("You are a storyteller")
            .with_max_tokens(1000)
            .with_temperature(0.7);

        assert_eq!(request.max_tokens, 1000);
        assert!(request.system.is_some());
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.messages[0].role, Role::User);
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::Network("reset".into()).is_transient());
        assert!(Error::Timeout("60s".into()).is_transient());
        assert!(Error::Api { status: 529, message: String::new() }.is_transient());
        assert!(Error::Api { status: 429, message: String::new() }.is_transient());
        assert!(!Error::Api { status: 401, message: String::new() }.is_transient());
        assert!(!Error::NoApiKey.is_transient());
    }

    #[test]
    fn test_parse_response_joins_text() {
        let json = r#"{
            "id": "msg_1",
            "model": "m",
            "content": [{"type": "text", "text": "You are "}, {"type": "text", "text": "lost."}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 3, "output_tokens": 4}
        }"#;
        let api: ApiResponse = serde_json::from_str(json).unwrap();
        let response: Response = api.into();
        assert_eq!(response.text, "You are lost.");
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert_eq!(response.usage.output_tokens, 4);
    }

    #[test]
    fn test_sse_split_across_chunks() {
        let mut buffer = b"event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel".to_vec();
        let events = parse_sse_events_buffered(&mut buffer);
        assert!(events.is_empty());

        buffer.extend_from_slice(b"lo\"}}\n\n");
        let events = parse_sse_events_buffered(&mut buffer);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &StreamEvent::TextDelta {
                text: "Hello".to_string()
            }
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_sse_skips_block_markers() {
        let mut buffer = b"data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\
             data: {\"type\":\"message_stop\"}\n"
            .to_vec();
        let events = parse_sse_events_buffered(&mut buffer);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::MessageStop);
    }

    #[test]
    fn test_sse_character_split_across_chunks() {
        let line = "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Élodie ⚔️\"}}\n";
        let bytes = line.as_bytes();
        // Split inside the two-byte 'É'.
        let cut = line.find('É').unwrap() + 1;

        let mut buffer = bytes[..cut].to_vec();
        assert!(parse_sse_events_buffered(&mut buffer).is_empty());

        buffer.extend_from_slice(&bytes[cut..]);
        let events = parse_sse_events_buffered(&mut buffer);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &StreamEvent::TextDelta {
                text: "Élodie ⚔️".to_string()
            }
        );
        assert!(buffer.is_empty());
    }
}
