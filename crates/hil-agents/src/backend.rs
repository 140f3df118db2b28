//! NIM completion backend: one HTTP POST per agent call.
//!
//! The backend is treated as an opaque, possibly slow, possibly failing
//! remote. Everything that can go wrong with a single call is a
//! `BackendError`, which the scheduler absorbs at role granularity; the
//! `CompletionBackend` trait is the seam tests script against.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::OrchestratorConfig;

/// Fixed sampling temperature for every agent call.
pub const SAMPLING_TEMPERATURE: f32 = 0.2;

/// A single call against the completion endpoint failed.
///
/// Always recoverable: the scheduler converts it into a per-role
/// "unavailable" output instead of aborting the run.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed completion body: {0}")]
    Malformed(String),
}

/// The request/response cycle against the chat-completions endpoint.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, BackendError>;
}

/// Completion capability as probed once at process start.
#[derive(Clone)]
pub enum Backend {
    Ready(Arc<dyn CompletionBackend>),
    /// No usable client; the orchestrator short-circuits into the
    /// deterministic fallback path, reporting this reason.
    Offline { reason: String },
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize, Default)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Default)]
struct ChatChoice {
    #[serde(default)]
    message: ChoiceMessage,
}

#[derive(Deserialize, Default)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

/// Pull the generated text out of a parsed response body.
///
/// Missing choices or an absent content field yield an empty string; an
/// empty completion is valid evidence, not an error, and the call unit
/// substitutes a placeholder for it.
fn extract_content(response: ChatResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Shared HTTP client for one orchestration run.
///
/// A single `reqwest::Client` (and thus one connection pool) backs all
/// in-flight calls; the per-call timeout comes from the run configuration.
pub struct NimClient {
    http: reqwest::Client,
    chat_url: String,
    model: String,
    max_tokens: u32,
}

impl NimClient {
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            chat_url: config.chat_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionBackend for NimClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, BackendError> {
        let payload = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: SAMPLING_TEMPERATURE,
            max_tokens: self.max_tokens,
        };

        let response = self.http.post(&self.chat_url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(BackendError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        let text = extract_content(parsed);
        debug!(model = %self.model, chars = text.len(), "completion received");
        Ok(text)
    }
}

/// Check whether the chat endpoint is reachable at all.
///
/// Any HTTP response counts as reachable (a POST-only route may answer GET
/// with 405); only transport-level failure means offline.
pub async fn check_endpoint(url: &str) -> bool {
    reqwest::Client::new()
        .get(url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .is_ok()
}

/// Probe the completion capability once at process start.
///
/// Builds the HTTP client and checks the chat endpoint is reachable; any
/// failure yields `Backend::Offline` with the reason, which sends the run
/// down the deterministic fallback path instead of burning per-role
/// timeouts against a dead endpoint.
pub async fn probe_backend(config: &OrchestratorConfig) -> Backend {
    let client = match NimClient::from_config(config) {
        Ok(client) => client,
        Err(e) => {
            return Backend::Offline {
                reason: e.to_string(),
            }
        }
    };
    if check_endpoint(&config.chat_url).await {
        Backend::Ready(Arc::new(client))
    } else {
        Backend::Offline {
            reason: format!("chat endpoint unreachable: {}", config.chat_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_shape() {
        let payload = ChatRequest {
            model: "nvidia/nemotron-nano-9b-v2",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "sys",
                },
                ChatMessage {
                    role: "user",
                    content: "usr",
                },
            ],
            temperature: SAMPLING_TEMPERATURE,
            max_tokens: 512,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["model"], "nvidia/nemotron-nano-9b-v2");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "usr");
        assert_eq!(value["max_tokens"], 512);
    }

    #[test]
    fn extracts_first_choice_content() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"  hello  "}},{"message":{"content":"ignored"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_content(parsed), "hello");
    }

    #[test]
    fn tolerates_missing_choices_and_fields() {
        let empty: ChatResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(extract_content(empty), "");

        let no_message: ChatResponse = serde_json::from_str(r#"{"choices":[{}]}"#).unwrap();
        assert_eq!(extract_content(no_message), "");
    }

    /// Minimal one-shot HTTP responder; the status line is all that matters.
    async fn serve_one(response: &'static str) -> std::net::SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 512];
            loop {
                let n = stream.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let _ = stream.write_all(response.as_bytes()).await;
        });
        addr
    }

    #[tokio::test]
    async fn check_endpoint_counts_any_http_response_as_reachable() {
        let addr =
            serve_one("HTTP/1.1 405 Method Not Allowed\r\ncontent-length: 0\r\n\r\n").await;
        assert!(check_endpoint(&format!("http://{addr}/v1/chat/completions")).await);
    }

    #[tokio::test]
    async fn probe_backend_goes_offline_when_endpoint_unreachable() {
        let mut config = OrchestratorConfig::default();
        // Nothing listens here; the connection is refused immediately.
        config.chat_url = "http://127.0.0.1:9/v1/chat/completions".to_string();
        match probe_backend(&config).await {
            Backend::Offline { reason } => assert!(reason.contains("127.0.0.1:9")),
            Backend::Ready(_) => panic!("probing a dead endpoint must not yield a ready backend"),
        }
    }

    #[tokio::test]
    async fn probe_backend_is_ready_when_endpoint_answers() {
        let addr = serve_one("HTTP/1.1 405 Method Not Allowed\r\ncontent-length: 0\r\n\r\n").await;
        let mut config = OrchestratorConfig::default();
        config.chat_url = format!("http://{addr}/v1/chat/completions");
        assert!(matches!(probe_backend(&config).await, Backend::Ready(_)));
    }
}
