//! Provider Backend Traits
//!
//! Trait definitions for the providers the pipeline talks to. Stages hold
//! these as trait objects so tests can substitute fakes and embedders can
//! swap vendors without touching orchestration logic.
//!
//! # Design Philosophy
//!
//! - Streaming operations return the raw [`ByteStream`]; decoding into
//!   deltas is the consumer's job, not the backend's.
//! - Request/response operations decode their envelope at the HTTP
//!   boundary and return typed values.
//! - Every operation returns [`GenerationError`]; a provider that answers
//!   with a failure is a [`GenerationError::Provider`], never a panic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::request::{ResultMode, SourceDocument};
use crate::streaming::ByteStream;

// =============================================================================
// Chat Completion
// =============================================================================

/// One chat message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`
    pub role: String,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// System message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Streaming chat completion request (serialized as the wire body)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// Always true; the core only consumes streamed completions
    pub stream: bool,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion length cap
    pub max_tokens: u32,
    /// Conversation, system message first
    pub messages: Vec<ChatMessage>,
}

impl Default for ChatRequest {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            stream: true,
            temperature: 0.7,
            max_tokens: 4000,
            messages: Vec::new(),
        }
    }
}

impl ChatRequest {
    /// Create a request with a single user message
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::user(prompt)],
            ..Default::default()
        }
    }

    /// Prepend a system message
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.messages.insert(0, ChatMessage::system(system));
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Streaming chat-completion provider
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Open a streamed completion and return the raw response body
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ByteStream, GenerationError>;
}

// =============================================================================
// Presentation
// =============================================================================

/// Outline generation input
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineRequest {
    /// Presentation subject
    pub subject: String,
    /// Parsed reference material
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    /// Extra instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Content generation input
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    /// Outline produced by the previous stage
    pub outline_markdown: String,
    /// Parsed reference material
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    /// Extra instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Deck rendering input
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PptxRequest {
    /// Template to render with
    pub template_id: String,
    /// Full slide content
    pub outline_content_markdown: String,
    /// Whether the provider should return its structured slide tree
    pub pptx_property: bool,
}

/// One-call deck generation input
///
/// Serialized inside the wire body next to the `stream` flag.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectPptxRequest {
    /// Template to render with; the provider picks one when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// Presentation subject
    pub subject: String,
    /// Parsed reference material
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    /// Extra instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Whether the provider should return its structured slide tree
    pub pptx_property: bool,
}

/// A presentation template
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    /// Template identifier
    pub id: String,
    /// Category filter value
    #[serde(default, rename = "type")]
    pub category: Option<i64>,
    /// Preview image
    #[serde(default)]
    pub cover_url: Option<String>,
}

/// Rendered deck metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PptInfo {
    /// Deck identifier
    pub id: String,
    /// Subject the provider inferred
    #[serde(default)]
    pub subject: Option<String>,
    /// Preview image
    #[serde(default)]
    pub cover_url: Option<String>,
    /// Template actually used
    #[serde(default)]
    pub template_id: Option<String>,
}

/// Multi-step presentation provider
///
/// Every call except [`PresentationBackend::fetch_file`] carries the
/// short-lived token obtained from the credential broker.
#[async_trait]
pub trait PresentationBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Upload reference material and return its provider-side data URL
    async fn parse_file_data(
        &self,
        token: &str,
        source: &SourceDocument,
    ) -> Result<String, GenerationError>;

    /// Stream an outline
    async fn generate_outline(
        &self,
        token: &str,
        request: &OutlineRequest,
    ) -> Result<ByteStream, GenerationError>;

    /// Stream slide content for an outline
    async fn generate_content(
        &self,
        token: &str,
        request: &ContentRequest,
    ) -> Result<ByteStream, GenerationError>;

    /// Fetch up to `size` templates of category `category`
    async fn random_templates(
        &self,
        token: &str,
        size: usize,
        category: i64,
    ) -> Result<Vec<TemplateSummary>, GenerationError>;

    /// Render a deck
    async fn generate_pptx(
        &self,
        token: &str,
        request: &PptxRequest,
    ) -> Result<PptInfo, GenerationError>;

    /// Outline, content and rendering in one blocking call
    async fn direct_generate_pptx(
        &self,
        token: &str,
        request: &DirectPptxRequest,
    ) -> Result<PptInfo, GenerationError>;

    /// Outline, content and rendering in one streamed call
    ///
    /// Frames carry progress text; the frame with `status: 4` carries the
    /// rendered deck's [`PptInfo`] as its `result`.
    async fn direct_generate_pptx_stream(
        &self,
        token: &str,
        request: &DirectPptxRequest,
    ) -> Result<ByteStream, GenerationError>;

    /// Resolve a time-limited download URL for a deck
    async fn download_pptx(&self, token: &str, ppt_id: &str) -> Result<String, GenerationError>;

    /// Fetch the bytes behind a download URL
    async fn fetch_file(&self, url: &str) -> Result<Vec<u8>, GenerationError>;
}

// =============================================================================
// Document Recognition
// =============================================================================

/// Turns a source document into text
#[async_trait]
pub trait DocumentRecognizer: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Recognize `source`, returning markdown or flattened text
    async fn recognize(
        &self,
        source: &SourceDocument,
        mode: ResultMode,
    ) -> Result<String, GenerationError>;
}
