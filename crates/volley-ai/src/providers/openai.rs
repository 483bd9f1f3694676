//! OpenAI-compatible Chat Completions streaming client

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    providers::{StreamingClient, get_api_key},
    stream::{CompletionStream, Fragment},
    types::{ChatMessage, CompletionRequest, FinishReason},
};

/// Default endpoint for the hosted OpenAI API
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI API client
pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
    /// Create a new OpenAI client with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = get_api_key(None, "OPENAI_API_KEY")?;
        Ok(Self::new(api_key))
    }

    /// Point the client at another OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(&self, request: CompletionRequest) -> Result<OpenAIRequest> {
        if !request.stream {
            return Err(Error::InvalidConfig(
                "only streaming requests are supported".to_string(),
            ));
        }
        if request.messages.is_empty() {
            return Err(Error::InvalidConfig("transcript is empty".to_string()));
        }

        Ok(OpenAIRequest {
            model: request.model,
            messages: request.messages,
            temperature: request.temperature,
            top_p: request.top_p,
            n: request.n,
            stop: request.stop,
            max_tokens: request.max_tokens,
            presence_penalty: request.presence_penalty,
            frequency_penalty: request.frequency_penalty,
            stream: true,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::InvalidApiKey)?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl StreamingClient for OpenAIClient {
    async fn open_stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let body = self.build_request(request)?;
        let url = format!("{}/chat/completions", self.base_url);

        tracing::debug!(
            model = %body.model,
            messages = body.messages.len(),
            "opening completion stream"
        );

        let request_builder = self.client.post(&url).headers(self.headers()?).json(&body);

        let mut event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        // Wait for the connection so HTTP failures surface before streaming starts
        match event_source.next().await {
            Some(Ok(Event::Open)) => {}
            Some(Ok(Event::Message(_))) => {
                event_source.close();
                return Err(Error::UnexpectedResponse(
                    "event received before the stream opened".to_string(),
                ));
            }
            Some(Err(e)) => {
                event_source.close();
                return Err(error_from_event(e).await);
            }
            None => {
                return Err(Error::UnexpectedResponse(
                    "event stream closed before opening".to_string(),
                ));
            }
        }

        Ok(Box::pin(create_stream(event_source)))
    }
}

fn create_stream(mut event_source: EventSource) -> impl futures::Stream<Item = Result<Fragment>> {
    stream! {
        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        break;
                    }
                    match parse_chunk(&msg.data) {
                        Ok(Some(fragment)) => yield Ok(fragment),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            break;
                        }
                    }
                }
                // Some compatible servers close the body without sending [DONE]
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    yield Err(error_from_event(e).await);
                    break;
                }
            }
        }
        // Never let the event source reconnect
        event_source.close();
    }
}

/// Turn one SSE data payload into a fragment of the first choice.
/// Returns `None` for chunks that carry nothing for that choice.
fn parse_chunk(data: &str) -> Result<Option<Fragment>> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| Error::UnexpectedResponse(format!("Failed to parse chunk: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(Error::api(
            error.error_type.unwrap_or_else(|| "stream_error".to_string()),
            error.message,
        ));
    }

    let Some(choice) = chunk.choices.into_iter().find(|c| c.index == 0) else {
        return Ok(None);
    };

    let text = choice.delta.content.unwrap_or_default();
    let finish_reason = choice.finish_reason.as_deref().map(FinishReason::parse);
    if text.is_empty() && finish_reason.is_none() {
        return Ok(None);
    }

    Ok(Some(Fragment {
        text,
        finish_reason,
    }))
}

async fn error_from_event(err: reqwest_eventsource::Error) -> Error {
    use reqwest_eventsource::Error as EsError;

    match err {
        EsError::InvalidStatusCode(status, response) => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let body = response.text().await.unwrap_or_default();
            error_from_status(status.as_u16(), retry_after, &body)
        }
        EsError::InvalidContentType(value, _) => {
            Error::UnexpectedResponse(format!("unexpected content type: {:?}", value))
        }
        EsError::Transport(e) => Error::Http(e),
        other => Error::Sse(other.to_string()),
    }
}

fn error_from_status(status: u16, retry_after: Option<u64>, body: &str) -> Error {
    let (error_type, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (
            envelope
                .error
                .error_type
                .unwrap_or_else(|| format!("http_{}", status)),
            envelope.error.message,
        ),
        Err(_) => (format!("http_{}", status), body.to_string()),
    };

    match status {
        401 | 403 => Error::Auth(message),
        429 => Error::RateLimited { retry_after },
        _ => Error::Api {
            error_type,
            message,
        },
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    top_p: f32,
    n: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    max_tokens: u32,
    presence_penalty: f32,
    frequency_penalty: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    index: u32,
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![
                ChatMessage::new(Role::System, "be brief"),
                ChatMessage::new(Role::User, "hi"),
            ],
            temperature: 0.7,
            top_p: 1.0,
            n: 1,
            stop: vec![],
            max_tokens: 64,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            stream: true,
        }
    }

    fn sse_body(events: &[&str]) -> String {
        events
            .iter()
            .map(|data| format!("data: {}\n\n", data))
            .collect()
    }

    #[test]
    fn test_build_request_serializes_parameters() {
        let client = OpenAIClient::new("key");
        let body = client.build_request(request()).unwrap();
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["stream"], true);
        assert_eq!(json["n"], 1);
        assert_eq!(json["max_tokens"], 64);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert!(json.get("stop").is_none(), "empty stop should be omitted");
    }

    #[test]
    fn test_build_request_keeps_stop_sequences() {
        let client = OpenAIClient::new("key");
        let mut req = request();
        req.stop = vec!["END".into()];
        let json = serde_json::to_value(client.build_request(req).unwrap()).unwrap();
        assert_eq!(json["stop"], serde_json::json!(["END"]));
    }

    #[test]
    fn test_build_request_rejects_non_streaming() {
        let client = OpenAIClient::new("key");
        let mut req = request();
        req.stream = false;
        assert!(matches!(
            client.build_request(req),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_with_base_url_trims_slash() {
        let client = OpenAIClient::new("key").with_base_url("http://localhost:8080/v1/");
        assert_eq!(client.base_url(), "http://localhost:8080/v1");
    }

    #[test]
    fn test_parse_chunk_text_delta() {
        let fragment = parse_chunk(r#"{"choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(fragment, Fragment::text("Hi"));
    }

    #[test]
    fn test_parse_chunk_role_only_is_skipped() {
        let parsed =
            parse_chunk(r#"{"choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#)
                .unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_parse_chunk_finish_reason() {
        let fragment = parse_chunk(r#"{"choices":[{"index":0,"delta":{},"finish_reason":"length"}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(fragment.text, "");
        assert_eq!(fragment.finish_reason, Some(FinishReason::Length));
    }

    #[test]
    fn test_parse_chunk_ignores_other_choices() {
        let parsed = parse_chunk(r#"{"choices":[{"index":1,"delta":{"content":"x"},"finish_reason":null}]}"#)
            .unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_parse_chunk_error_object() {
        let err = parse_chunk(r#"{"error":{"message":"model overloaded","type":"server_error"}}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Api { ref error_type, .. } if error_type == "server_error"));
    }

    #[test]
    fn test_parse_chunk_garbage() {
        assert!(matches!(
            parse_chunk("not json"),
            Err(Error::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_error_from_status_maps_kinds() {
        assert!(matches!(
            error_from_status(401, None, r#"{"error":{"message":"bad key","type":"invalid_request_error"}}"#),
            Error::Auth(ref m) if m == "bad key"
        ));
        assert!(matches!(
            error_from_status(429, Some(7), ""),
            Error::RateLimited { retry_after: Some(7) }
        ));
        assert!(matches!(
            error_from_status(500, None, "upstream exploded"),
            Error::Api { ref error_type, ref message } if error_type == "http_500" && message == "upstream exploded"
        ));
    }

    #[tokio::test]
    async fn test_open_stream_yields_fragments_until_done() {
        let server = MockServer::start().await;
        let body = sse_body(&[
            r#"{"choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#,
            r#"{"choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#,
            r#"{"choices":[{"index":0,"delta":{"content":", world"},"finish_reason":null}]}"#,
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
            "[DONE]",
        ]);
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = OpenAIClient::new("test-key").with_base_url(server.uri());
        let stream = client.open_stream(request()).await.unwrap();
        let fragments: Vec<Fragment> = stream.map(|f| f.unwrap()).collect().await;

        let texts: Vec<&str> = fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello", ", world", ""]);
        assert_eq!(fragments[2].finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn test_open_stream_surfaces_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_raw(
                r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let client = OpenAIClient::new("wrong").with_base_url(server.uri());
        match client.open_stream(request()).await {
            Err(Error::Auth(message)) => assert!(message.contains("Incorrect API key")),
            Err(other) => panic!("expected auth error, got {}", other),
            Ok(_) => panic!("expected auth error, got a stream"),
        }
    }
}
