/// OpenAI-compatible (vLLM, llama.cpp, TGI, ...) streaming client.
use crate::error::{AppError, StreamError};
use crate::http::client::{ChatClient, ChatRequest, ClientConfig, StreamResponse};
use crate::stream::into_lines;
use futures::{stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;

/// Client for servers exposing `/v1/chat/completions` and `/v1/models`.
pub struct OpenAICompatClient {
    client: Client,
    config: ClientConfig,
}

/// `GET /v1/models` response.
#[derive(Debug, Deserialize, Default)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAICompatClient {
    /// Create a new client.
    pub fn new(mut config: ClientConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Http(format!("Failed to create HTTP client: {}", e)))?;

        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/v1/models", self.config.base_url)
    }
}

fn stream_error(err: reqwest::Error) -> StreamError {
    if err.is_timeout() {
        StreamError::Timeout
    } else {
        StreamError::Transport(err.to_string())
    }
}

#[async_trait::async_trait]
impl ChatClient for OpenAICompatClient {
    async fn list_models(&self) -> Result<Vec<String>, AppError> {
        let response = self
            .client
            .get(self.models_url())
            .timeout(self.config.probe_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Api(format!("Server returned status {}", status)));
        }

        // Servers that answer with an unexpected body are still reachable.
        let models = response.json::<ModelList>().await.unwrap_or_default();
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<StreamResponse, AppError> {
        let response = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Ok(StreamResponse {
                status,
                lines: stream::empty().boxed(),
            });
        }

        let chunks = Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(stream_error)));
        Ok(StreamResponse {
            status,
            lines: into_lines(chunks),
        })
    }

    fn base_url(&self) -> &str {
        &self.config.base_url
    }
}
