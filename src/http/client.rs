/// Client abstraction for OpenAI-compatible chat-completion servers.
use crate::error::AppError;
use crate::stream::LineStream;
use serde::Serialize;
use std::time::Duration;

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Body of a `POST /v1/chat/completions` request.
///
/// Built fresh for every attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

impl ChatRequest {
    /// A streaming request carrying a single user turn.
    pub fn user_turn(model: &str, content: &str, temperature: f64, max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: content.to_string(),
            }],
            temperature,
            max_tokens,
            stream: true,
        }
    }
}

/// Status and body lines of a streamed response.
///
/// `lines` is empty when the status is not a success.
pub struct StreamResponse {
    pub status: u16,
    pub lines: LineStream,
}

impl StreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Trait for chat-completion servers under test.
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    /// Reachability probe; returns the ids of the models the server lists.
    ///
    /// A non-success status or a transport failure is an error.
    async fn list_models(&self) -> Result<Vec<String>, AppError>;

    /// Open a streaming chat completion.
    ///
    /// A non-success status is returned as a [`StreamResponse`] rather than
    /// an error; transport failures and deadline overruns are errors.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<StreamResponse, AppError>;

    /// Server base URL, for display.
    fn base_url(&self) -> &str;
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, e.g. `http://192.168.1.1:8000`
    pub base_url: String,
    /// Upper bound on a whole chat request, stream included
    pub timeout: Duration,
    /// Upper bound on the reachability probe
    pub probe_timeout: Duration,
}
