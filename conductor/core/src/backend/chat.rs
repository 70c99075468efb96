//! Chat Completion Backend
//!
//! Client for OpenAI-compatible streaming chat endpoints (DeepSeek by
//! default). Endpoint and key are resolved through [`ConfigLookup`] on every
//! call under `chat.url` and `chat.key`.

use std::sync::Arc;

use async_trait::async_trait;

use super::http::{self, DEFAULT_CONNECT_TIMEOUT};
use super::traits::{ChatBackend, ChatRequest};
use crate::config::ConfigLookup;
use crate::error::GenerationError;
use crate::streaming::ByteStream;

const OPERATION: &str = "chat";

/// Streaming chat completion client
#[derive(Clone)]
pub struct ChatCompletionClient {
    config: Arc<dyn ConfigLookup>,
    http_client: reqwest::Client,
}

impl ChatCompletionClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Transport`] if the HTTP client cannot be
    /// built.
    pub fn new(config: Arc<dyn ConfigLookup>) -> Result<Self, GenerationError> {
        Ok(Self::with_client(config, http::build_client(DEFAULT_CONNECT_TIMEOUT)?))
    }

    /// Create a client reusing an existing HTTP client
    pub fn with_client(config: Arc<dyn ConfigLookup>, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }
}

#[async_trait]
impl ChatBackend for ChatCompletionClient {
    fn name(&self) -> &'static str {
        "chat-completion"
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<ByteStream, GenerationError> {
        let url = self.config.require_value("chat.url")?;
        let key = self.config.require_value("chat.key")?;

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Opening chat stream"
        );

        let response = http::send(
            OPERATION,
            self.http_client
                .post(&url)
                .bearer_auth(key)
                .json(request),
        )
        .await?;

        Ok(http::byte_stream(OPERATION, response))
    }
}

impl std::fmt::Debug for ChatCompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionClient").finish_non_exhaustive()
    }
}
