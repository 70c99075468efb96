//! Recognition stage: document to markdown or text

use std::sync::Arc;

use async_trait::async_trait;

use super::context::RunContext;
use super::stage::{Stage, StageName, StageState};
use crate::backend::DocumentRecognizer;
use crate::error::GenerationError;
use crate::request::{ArtifactKind, GenerationRequest, ResultMode};

/// Stage name
pub const RECOGNIZE_DOCUMENT: StageName = StageName::new("recognize-document");

/// State of a recognition run
#[derive(Clone, Debug)]
pub struct RecognitionState {
    /// The request being executed
    pub request: GenerationRequest,
    /// Recognized content
    pub content: String,
}

impl RecognitionState {
    /// Fresh state for a request
    #[must_use]
    pub fn new(request: GenerationRequest) -> Self {
        Self {
            request,
            content: String::new(),
        }
    }

    /// Requested output shape
    #[must_use]
    pub fn mode(&self) -> ResultMode {
        match self.request.kind() {
            ArtifactKind::RecognizedText { mode } => mode,
            _ => ResultMode::default(),
        }
    }
}

impl StageState for RecognitionState {
    fn request(&self) -> &GenerationRequest {
        &self.request
    }

    fn partial_content(&self) -> String {
        self.content.clone()
    }
}

/// Runs the document recognizer
pub struct RecognizeDocument {
    recognizer: Arc<dyn DocumentRecognizer>,
}

impl RecognizeDocument {
    /// Stage using `recognizer`
    pub fn new(recognizer: Arc<dyn DocumentRecognizer>) -> Self {
        Self { recognizer }
    }
}

#[async_trait]
impl Stage<RecognitionState> for RecognizeDocument {
    fn name(&self) -> StageName {
        RECOGNIZE_DOCUMENT
    }

    async fn run(
        &self,
        state: &mut RecognitionState,
        ctx: &RunContext,
    ) -> Result<(), GenerationError> {
        let Some(source) = state.request.source() else {
            return Err(GenerationError::validation("source document is required"));
        };
        tracing::debug!(
            job_id = %ctx.job_id,
            backend = self.recognizer.name(),
            mode = ?state.mode(),
            "Recognizing document"
        );
        state.content = self.recognizer.recognize(source, state.mode()).await?;
        Ok(())
    }
}
