//! Provider Backend Integration
//!
//! This module provides access to the generation providers through trait
//! interfaces the pipeline stages depend on.
//!
//! # Available Backends
//!
//! - **Chat completion**: OpenAI-compatible streaming chat (DeepSeek)
//! - **Docmee**: multi-step presentation generation, also the token issuer
//! - **Doc2x**: asynchronous document recognition, with Word documents
//!   read locally or rendered to PDF first
//!
//! # Usage
//!
//! ```ignore
//! use genconductor::backend::{ChatBackend, ChatCompletionClient, ChatRequest};
//!
//! let client = ChatCompletionClient::new(config)?;
//! let body = client.stream_chat(&ChatRequest::new("Hello!", "deepseek-chat")).await?;
//! ```

mod chat;
mod doc2x;
mod docmee;
mod docx;
mod envelope;
mod http;
mod traits;

pub use chat::ChatCompletionClient;
pub use doc2x::{Doc2xClient, Doc2xRecognizer};
pub use docmee::DocmeeClient;
pub use http::{build_client, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
pub use traits::{
    ChatBackend, ChatMessage, ChatRequest, ContentRequest, DirectPptxRequest, DocumentRecognizer,
    OutlineRequest, PptInfo, PptxRequest, PresentationBackend, TemplateSummary,
};
