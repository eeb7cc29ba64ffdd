use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::retry::RetryPolicy;

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("API key is not configured")]
    MissingApiKey,

    #[error("API key rejected: {0}")]
    ApiKey(String),

    #[error("Model rate limit or quota exceeded: {0}")]
    Quota(String),

    #[error("Model service returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Model request failed: {0}")]
    Transport(String),

    #[error("Model request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model returned no text")]
    EmptyResponse,
}

impl ModelError {
    pub fn is_api_key_problem(&self) -> bool {
        matches!(self, ModelError::MissingApiKey | ModelError::ApiKey(_))
    }

    /// Failures that might succeed on a second attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Transport(_) | ModelError::Timeout(_) | ModelError::EmptyResponse => true,
            ModelError::Upstream { status, .. } => *status >= 500,
            ModelError::MissingApiKey | ModelError::ApiKey(_) | ModelError::Quota(_) => false,
        }
    }

    fn from_status(status: StatusCode, message: String) -> Self {
        let lowered = message.to_lowercase();
        if lowered.contains("api key") || status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            ModelError::ApiKey(message)
        } else if status == StatusCode::TOO_MANY_REQUESTS
            || lowered.contains("rate limit")
            || lowered.contains("quota")
        {
            ModelError::Quota(message)
        } else {
            ModelError::Upstream {
                status: status.as_u16(),
                message,
            }
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        // Never let the request URL leak into user-visible messages
        ModelError::Transport(err.without_url().to_string())
    }
}

/// Inline image taken from a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    /// Base64 text, passed through to the model untouched.
    pub data: String,
}

impl ImagePayload {
    /// Split `data:<mime>;base64,<payload>`. Returns `None` unless the URL
    /// starts with `data:` and has exactly one comma with a non-empty payload.
    pub fn from_data_url(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("data:")?;
        let mut parts = rest.split(',');
        let header = parts.next()?;
        let data = parts.next()?;
        if parts.next().is_some() || data.is_empty() {
            return None;
        }

        let mime_type = header
            .split(';')
            .next()
            .map(str::trim)
            .filter(|mime| !mime.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MIME);

        Some(ImagePayload {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        })
    }
}

/// Text (and vision) completion backend.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, prompt: &str, image: Option<&ImagePayload>) -> Result<String, ModelError>;

    /// Model used for a request with or without an image, for logging.
    fn model_name(&self, with_image: bool) -> &str;

    fn api_key(&self) -> Option<&str>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Google Gemini `generateContent` client.
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    api_base: String,
    text_model: String,
    vision_model: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self, ModelError> {
        let client = ClientBuilder::new()
            .timeout(config.model_timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(GeminiClient {
            client,
            api_key: config.gemini_api_key.clone(),
            api_base: config.gemini_api_base.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            vision_model: config.vision_model.clone(),
            timeout: config.model_timeout,
            retry: RetryPolicy::new(config.retry_attempts, config.retry_base_delay),
        })
    }

    async fn generate_once(
        &self,
        api_key: &str,
        prompt: &str,
        image: Option<&ImagePayload>,
    ) -> Result<String, ModelError> {
        let model = self.model_name(image.is_some());
        let mut parts = vec![Part::Text { text: prompt }];
        if let Some(image) = image {
            parts.push(Part::Inline {
                inline_data: InlineData {
                    mime_type: &image.mime_type,
                    data: &image.data,
                },
            });
        }
        let body = GenerateRequest {
            contents: vec![Content { parts }],
        };

        // Bounds the whole exchange, body read included
        tokio::time::timeout(self.timeout, self.exchange(api_key, model, &body))
            .await
            .map_err(|_| ModelError::Timeout(self.timeout))?
    }

    async fn exchange(
        &self,
        api_key: &str,
        model: &str,
        body: &GenerateRequest<'_>,
    ) -> Result<String, ModelError> {
        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.api_base, model))
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&raw)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown error").to_string());
            return Err(ModelError::from_status(status, message));
        }

        let reply: GenerateResponse = response.json().await.map_err(|e| self.transport_error(e))?;
        extract_text(reply)
    }

    /// The client's own deadline surfaces as a reqwest error; report it as a timeout.
    fn transport_error(&self, err: reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::Timeout(self.timeout)
        } else {
            ModelError::from(err)
        }
    }
}

fn extract_text(reply: GenerateResponse) -> Result<String, ModelError> {
    let text: String = reply
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ModelError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, prompt: &str, image: Option<&ImagePayload>) -> Result<String, ModelError> {
        let api_key = self.api_key.as_deref().ok_or(ModelError::MissingApiKey)?;
        self.retry
            .run_if(
                || self.generate_once(api_key, prompt, image),
                ModelError::is_retryable,
            )
            .await
    }

    fn model_name(&self, with_image: bool) -> &str {
        if with_image {
            &self.vision_model
        } else {
            &self.text_model
        }
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

/// Key shown in diagnostics: first and last four characters only.
pub fn mask_api_key(key: Option<&str>) -> String {
    let Some(key) = key else {
        return "Not available".to_string();
    };
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_data_url_parsing() {
        let payload = ImagePayload::from_data_url("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(payload.mime_type, "image/png");
        assert_eq!(payload.data, "iVBORw0KGgo=");

        let payload = ImagePayload::from_data_url("data:;base64,AAAA").unwrap();
        assert_eq!(payload.mime_type, "image/jpeg");
    }

    #[test]
    fn test_malformed_data_urls_are_rejected() {
        assert!(ImagePayload::from_data_url("not-a-data-url").is_none());
        assert!(ImagePayload::from_data_url("data:image/png;base64").is_none());
        assert!(ImagePayload::from_data_url("data:image/png;base64,").is_none());
        assert!(ImagePayload::from_data_url("data:image/png;base64,AA,AA").is_none());
        assert!(ImagePayload::from_data_url("image/png;base64,AAAA").is_none());
    }

    #[test]
    fn test_status_classification() {
        let err = ModelError::from_status(
            StatusCode::BAD_REQUEST,
            "API key not valid. Please pass a valid API key.".into(),
        );
        assert!(err.is_api_key_problem());
        assert!(!err.is_retryable());

        let err = ModelError::from_status(StatusCode::TOO_MANY_REQUESTS, "Resource exhausted".into());
        assert!(matches!(err, ModelError::Quota(_)));

        let err = ModelError::from_status(StatusCode::SERVICE_UNAVAILABLE, "overloaded".into());
        assert!(err.is_retryable());

        let err = ModelError::from_status(StatusCode::BAD_REQUEST, "bad input".into());
        assert!(matches!(err, ModelError::Upstream { status: 400, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_request_body_shape() {
        let image = ImagePayload {
            mime_type: "image/jpeg".into(),
            data: "AAAA".into(),
        };
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: "describe" },
                    Part::Inline {
                        inline_data: InlineData {
                            mime_type: &image.mime_type,
                            data: &image.data,
                        },
                    },
                ],
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contents": [{
                    "parts": [
                        {"text": "describe"},
                        {"inline_data": {"mime_type": "image/jpeg", "data": "AAAA"}}
                    ]
                }]
            })
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let reply: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello, "},{"text":"world"}],"role":"model"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(reply).unwrap(), "Hello, world");

        let reply: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(extract_text(reply), Err(ModelError::EmptyResponse)));
    }

    #[test]
    fn test_mask_api_key() {
        assert_eq!(mask_api_key(None), "Not available");
        assert_eq!(mask_api_key(Some("short")), "****");
        assert_eq!(mask_api_key(Some("AIzaSyExampleKey1234")), "AIza...1234");
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let client = GeminiClient::new(&Config::default()).unwrap();
        let err = client.generate("hi", None).await.unwrap_err();
        assert!(matches!(err, ModelError::MissingApiKey));
        assert_eq!(client.model_name(true), "gemini-2.0-flash");
    }

    fn stalled_config(addr: std::net::SocketAddr, attempts: u32) -> Config {
        Config {
            gemini_api_key: Some("test-key".to_string()),
            gemini_api_base: format!("http://{}", addr),
            model_timeout: Duration::from_millis(200),
            retry_attempts: attempts,
            retry_base_delay: Duration::from_millis(1),
            ..Config::default()
        }
    }

    /// Accepts connections and never answers, keeping the sockets open.
    async fn silent_server() -> (std::net::SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });
        (addr, accepted)
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let (addr, accepted) = silent_server().await;
        let client = GeminiClient::new(&stalled_config(addr, 1)).unwrap();

        let err = client.generate("hi", None).await.unwrap_err();
        assert!(matches!(err, ModelError::Timeout(_)), "got {:?}", err);
        assert!(err.is_retryable());
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeouts_are_retried() {
        let (addr, accepted) = silent_server().await;
        let client = GeminiClient::new(&stalled_config(addr, 2)).unwrap();

        let err = client.generate("hi", None).await.unwrap_err();
        assert!(matches!(err, ModelError::Timeout(_)), "got {:?}", err);
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stalled_body_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64 * 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 1000\r\n\r\n{")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let client = GeminiClient::new(&stalled_config(addr, 1)).unwrap();
        let err = client.generate("hi", None).await.unwrap_err();
        assert!(matches!(err, ModelError::Timeout(_)), "got {:?}", err);
    }
}
