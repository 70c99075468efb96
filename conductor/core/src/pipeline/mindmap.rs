//! Mind-map stage: one streamed chat completion

use std::sync::Arc;

use async_trait::async_trait;

use super::context::RunContext;
use super::stage::{drive_stream, Stage, StageName, StageState};
use crate::backend::{ChatBackend, ChatRequest};
use crate::config::ChatSettings;
use crate::error::GenerationError;
use crate::prompts::{mind_map_system_prompt, mind_map_user_prompt};
use crate::request::GenerationRequest;
use crate::streaming::{ChatDeltaDecoder, StreamingConsumer};

/// Stage name
pub const GENERATE_MINDMAP: StageName = StageName::new("generate-mindmap");

/// State of a mind-map run
#[derive(Clone, Debug)]
pub struct MindMapState {
    /// The request being executed
    pub request: GenerationRequest,
    /// Generated markdown (partial on failure)
    pub markdown: String,
}

impl MindMapState {
    /// Fresh state for a request
    #[must_use]
    pub fn new(request: GenerationRequest) -> Self {
        Self {
            request,
            markdown: String::new(),
        }
    }
}

impl StageState for MindMapState {
    fn request(&self) -> &GenerationRequest {
        &self.request
    }

    fn partial_content(&self) -> String {
        self.markdown.clone()
    }
}

/// Generates the mind map through the chat backend
pub struct GenerateMindMap {
    chat: Arc<dyn ChatBackend>,
    consumer: StreamingConsumer,
    settings: ChatSettings,
}

impl GenerateMindMap {
    /// Stage using `chat` with the given model settings
    pub fn new(
        chat: Arc<dyn ChatBackend>,
        consumer: StreamingConsumer,
        settings: ChatSettings,
    ) -> Self {
        Self {
            chat,
            consumer,
            settings,
        }
    }

    fn chat_request(&self, request: &GenerationRequest) -> ChatRequest {
        ChatRequest::new(
            mind_map_user_prompt(request.topic(), request.extra_prompt()),
            self.settings.model.clone(),
        )
        .with_system(mind_map_system_prompt())
        .with_temperature(self.settings.temperature)
        .with_max_tokens(self.settings.max_tokens)
    }
}

#[async_trait]
impl Stage<MindMapState> for GenerateMindMap {
    fn name(&self) -> StageName {
        GENERATE_MINDMAP
    }

    async fn run(
        &self,
        state: &mut MindMapState,
        ctx: &RunContext,
    ) -> Result<(), GenerationError> {
        let request = self.chat_request(&state.request);
        tracing::debug!(job_id = %ctx.job_id, backend = self.chat.name(), "Requesting mind map");

        let frames = self.chat.stream_chat(&request).await?;
        let outcome = drive_stream(
            &self.consumer,
            frames,
            ChatDeltaDecoder,
            state.request.mode(),
            ctx,
        )
        .await;

        match outcome.into_result() {
            Ok(markdown) => {
                state.markdown = markdown;
                Ok(())
            }
            Err((e, partial)) => {
                state.markdown = partial;
                Err(e)
            }
        }
    }
}
