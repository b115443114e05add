use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{GenerationBackend, GenerationRequest};
use crate::config::{ApiKey, BackendConfig};
use crate::error::{BackendFailureKind, StructurerError, StructurerResult};

/// Google Gemini `generateContent` client
pub struct GeminiBackend {
    client: Client,
    api_key: ApiKey,
    endpoint: String,
    model: String,
    max_retries: usize,
}

impl GeminiBackend {
    pub fn new(config: &BackendConfig, api_key: ApiKey) -> StructurerResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StructurerError::configuration(format!("HTTP client build failed: {}", e)))?;

        Ok(Self::with_client(config, api_key, client))
    }

    fn with_client(config: &BackendConfig, api_key: ApiKey, client: Client) -> Self {
        Self {
            client,
            api_key,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries.max(1),
        }
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    fn request_body(request: &GenerationRequest) -> Value {
        let mut body = json!({
            "contents": [
                { "role": "user", "parts": [{ "text": request.prompt }] }
            ]
        });

        if let Some(schema) = &request.response_schema {
            body["generationConfig"] = json!({
                "responseMimeType": "application/json",
                "responseSchema": schema
            });
        }

        body
    }

    async fn send_once(&self, body: &Value) -> StructurerResult<(StatusCode, String)> {
        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", self.api_key.expose())
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(transport_error)?;
        Ok((status, text))
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> StructurerResult<String> {
        let body = Self::request_body(request);

        // Exponential backoff parameters
        let mut attempt = 0usize;
        let mut delay_ms = 750u64;

        loop {
            attempt += 1;
            info!("➡️ [Gemini] Sending request (attempt {})", attempt);

            let (status, text) = self.send_once(&body).await?;

            match interpret_exchange(status, &text) {
                Exchange::Answer(answer) => {
                    info!("✅ [Gemini] Received {} chars", answer.len());
                    return Ok(answer);
                }
                Exchange::Fail(e) => {
                    warn!("❌ [Gemini] Request failed: {}", e);
                    return Err(e);
                }
                Exchange::Retry(e) if attempt >= self.max_retries => {
                    warn!("❌ [Gemini] Giving up after {} attempts: {}", attempt, e);
                    return Err(e);
                }
                Exchange::Retry(e) => {
                    warn!("⚠️ [Gemini] {} on attempt {}, retrying in {}ms", e, attempt, delay_ms);
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = ((delay_ms as f64) * 1.75).min(5000.0) as u64;
                }
            }
        }
    }
}

/// What one HTTP exchange means for the retry loop
#[derive(Debug)]
enum Exchange {
    Answer(String),
    Retry(StructurerError),
    Fail(StructurerError),
}

/// Decide from the status first; the body is only read as JSON where
/// Gemini promises JSON, so proxy error pages still classify correctly
fn interpret_exchange(status: StatusCode, body: &str) -> Exchange {
    if status.is_success() {
        let answer = serde_json::from_str::<Value>(body)
            .map_err(|e| {
                StructurerError::backend(
                    BackendFailureKind::MalformedResponse,
                    format!("response body is not JSON: {}", e),
                )
            })
            .and_then(|payload| response_text(&payload));
        return match answer {
            Ok(text) => Exchange::Answer(text),
            Err(e) => Exchange::Fail(e),
        };
    }

    let message = serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(error_message)
        .unwrap_or_else(|| body_excerpt(status, body));

    // Gemini reports a bad key as 400 INVALID_ARGUMENT
    let kind = if status == StatusCode::BAD_REQUEST && message.contains("API key") {
        BackendFailureKind::Auth
    } else {
        classify_status(status)
    };
    let error = StructurerError::backend(kind, format!("{}: {}", status, message));

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Exchange::Retry(error)
    } else {
        Exchange::Fail(error)
    }
}

fn body_excerpt(status: StatusCode, body: &str) -> String {
    let excerpt: String = body.trim().chars().take(200).collect();
    if excerpt.is_empty() {
        status.canonical_reason().unwrap_or("no body").to_string()
    } else {
        excerpt
    }
}

fn transport_error(e: reqwest::Error) -> StructurerError {
    let kind = if e.is_timeout() {
        BackendFailureKind::Timeout
    } else {
        BackendFailureKind::Network
    };
    StructurerError::backend(kind, e.to_string())
}

fn classify_status(status: StatusCode) -> BackendFailureKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendFailureKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => BackendFailureKind::Quota,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => BackendFailureKind::Timeout,
        _ => BackendFailureKind::Service,
    }
}

fn error_message(payload: &Value) -> Option<String> {
    payload
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Concatenate the text parts of the first candidate
fn response_text(payload: &Value) -> StructurerResult<String> {
    let candidate = payload
        .pointer("/candidates/0")
        .ok_or_else(|| {
            let reason = payload
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("no candidates returned");
            StructurerError::backend(BackendFailureKind::MalformedResponse, reason.to_string())
        })?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            let reason = candidate
                .get("finishReason")
                .and_then(Value::as_str)
                .unwrap_or("candidate has no content");
            StructurerError::backend(BackendFailureKind::MalformedResponse, reason.to_string())
        })?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    Ok(text)
}
