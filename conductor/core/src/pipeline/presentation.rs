//! Presentation Stages
//!
//! ```text
//! validate-request → acquire-credential → ingest-source? → generate-outline
//!   → generate-content → generate-artifact → resolve-download? → archive-artifact?
//! ```
//!
//! Outline and content are streamed; everything else is request/response.
//! Every provider call after `acquire-credential` carries the brokered token.
//!
//! A request with direct generation replaces the outline, content and
//! artifact stages with a single `generate-direct` call, streamed or not
//! according to the execution mode.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::context::RunContext;
use super::stage::{drive_stream, Stage, StageName, StageState};
use super::template::{select_template, TEMPLATE_CATEGORY};
use crate::backend::{
    ContentRequest, DirectPptxRequest, OutlineRequest, PptInfo, PptxRequest, PresentationBackend,
};
use crate::credentials::TokenBroker;
use crate::error::GenerationError;
use crate::request::{ExecutionMode, GenerationRequest};
use crate::store::FileStore;
use crate::streaming::{PresentationDecoder, ResultSlot, StreamingConsumer};

/// Stage names in execution order
pub const ACQUIRE_CREDENTIAL: StageName = StageName::new("acquire-credential");
/// Optional source upload
pub const INGEST_SOURCE: StageName = StageName::new("ingest-source");
/// Streamed outline
pub const GENERATE_OUTLINE: StageName = StageName::new("generate-outline");
/// Streamed slide content
pub const GENERATE_CONTENT: StageName = StageName::new("generate-content");
/// Template selection and rendering
pub const GENERATE_ARTIFACT: StageName = StageName::new("generate-artifact");
/// Outline, content and rendering in one provider call
pub const GENERATE_DIRECT: StageName = StageName::new("generate-direct");
/// Optional download URL resolution
pub const RESOLVE_DOWNLOAD: StageName = StageName::new("resolve-download");
/// Optional copy into the file store
pub const ARCHIVE_ARTIFACT: StageName = StageName::new("archive-artifact");

/// State accumulated across presentation stages
#[derive(Clone, Debug)]
pub struct PresentationState {
    /// The request being executed
    pub request: GenerationRequest,
    /// Brokered provider token
    pub token: Option<String>,
    /// Provider reference to the uploaded source
    pub data_url: Option<String>,
    /// Outline markdown
    pub outline: String,
    /// Full slide content markdown
    pub content: String,
    /// Template the deck was rendered with
    pub template_id: Option<String>,
    /// Rendered deck
    pub ppt: Option<PptInfo>,
    /// Time-limited download URL
    pub file_url: Option<String>,
    /// URL of the archived copy
    pub archived_url: Option<String>,
}

impl PresentationState {
    /// Fresh state for a request
    #[must_use]
    pub fn new(request: GenerationRequest) -> Self {
        Self {
            request,
            token: None,
            data_url: None,
            outline: String::new(),
            content: String::new(),
            template_id: None,
            ppt: None,
            file_url: None,
            archived_url: None,
        }
    }

    fn token(&self) -> Result<&str, GenerationError> {
        self.token
            .as_deref()
            .ok_or_else(|| GenerationError::validation("provider credential was not acquired"))
    }

    fn ppt_id(&self) -> Result<&str, GenerationError> {
        self.ppt
            .as_ref()
            .map(|p| p.id.as_str())
            .ok_or_else(|| GenerationError::validation("presentation was not generated"))
    }

    fn extra_prompt(&self) -> Option<String> {
        self.request.extra_prompt().map(str::to_string)
    }
}

impl StageState for PresentationState {
    fn request(&self) -> &GenerationRequest {
        &self.request
    }

    fn partial_content(&self) -> String {
        if self.content.is_empty() {
            self.outline.clone()
        } else {
            self.content.clone()
        }
    }
}

/// Obtains the provider token from the broker
pub struct AcquireCredential {
    broker: Arc<TokenBroker>,
    limit: Option<u32>,
}

impl AcquireCredential {
    /// Stage using `broker`, requesting `limit` uses per token
    pub fn new(broker: Arc<TokenBroker>, limit: Option<u32>) -> Self {
        Self { broker, limit }
    }
}

#[async_trait]
impl Stage<PresentationState> for AcquireCredential {
    fn name(&self) -> StageName {
        ACQUIRE_CREDENTIAL
    }

    async fn run(
        &self,
        state: &mut PresentationState,
        _ctx: &RunContext,
    ) -> Result<(), GenerationError> {
        let principal = state.request.principal().to_string();
        state.token = Some(self.broker.get_token(&principal, self.limit).await?);
        Ok(())
    }
}

/// Uploads the source document when one is attached
pub struct IngestSource {
    backend: Arc<dyn PresentationBackend>,
}

impl IngestSource {
    /// Stage using `backend`
    pub fn new(backend: Arc<dyn PresentationBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Stage<PresentationState> for IngestSource {
    fn name(&self) -> StageName {
        INGEST_SOURCE
    }

    fn applies(&self, state: &PresentationState) -> bool {
        state.request.source().is_some_and(|s| !s.is_blank())
    }

    async fn run(
        &self,
        state: &mut PresentationState,
        _ctx: &RunContext,
    ) -> Result<(), GenerationError> {
        let Some(source) = state.request.source() else {
            return Ok(());
        };
        let data_url = self.backend.parse_file_data(state.token()?, source).await?;
        state.data_url = Some(data_url);
        Ok(())
    }
}

/// Streams the outline
pub struct GenerateOutline {
    backend: Arc<dyn PresentationBackend>,
    consumer: StreamingConsumer,
}

impl GenerateOutline {
    /// Stage using `backend`
    pub fn new(backend: Arc<dyn PresentationBackend>, consumer: StreamingConsumer) -> Self {
        Self { backend, consumer }
    }
}

#[async_trait]
impl Stage<PresentationState> for GenerateOutline {
    fn name(&self) -> StageName {
        GENERATE_OUTLINE
    }

    async fn run(
        &self,
        state: &mut PresentationState,
        ctx: &RunContext,
    ) -> Result<(), GenerationError> {
        let request = OutlineRequest {
            subject: state.request.topic().to_string(),
            data_url: state.data_url.clone(),
            prompt: state.extra_prompt(),
        };
        let frames = self
            .backend
            .generate_outline(state.token()?, &request)
            .await?;
        let outcome = drive_stream(
            &self.consumer,
            frames,
            PresentationDecoder::new("generateOutline"),
            state.request.mode(),
            ctx,
        )
        .await;

        match outcome.into_result() {
            Ok(outline) => {
                state.outline = outline;
                Ok(())
            }
            Err((e, partial)) => {
                state.outline = partial;
                Err(e)
            }
        }
    }
}

/// Streams slide content for the outline
pub struct GenerateContent {
    backend: Arc<dyn PresentationBackend>,
    consumer: StreamingConsumer,
}

impl GenerateContent {
    /// Stage using `backend`
    pub fn new(backend: Arc<dyn PresentationBackend>, consumer: StreamingConsumer) -> Self {
        Self { backend, consumer }
    }
}

#[async_trait]
impl Stage<PresentationState> for GenerateContent {
    fn name(&self) -> StageName {
        GENERATE_CONTENT
    }

    async fn run(
        &self,
        state: &mut PresentationState,
        ctx: &RunContext,
    ) -> Result<(), GenerationError> {
        let request = ContentRequest {
            outline_markdown: state.outline.clone(),
            data_url: state.data_url.clone(),
            prompt: state.extra_prompt(),
        };
        let frames = self
            .backend
            .generate_content(state.token()?, &request)
            .await?;
        let outcome = drive_stream(
            &self.consumer,
            frames,
            PresentationDecoder::new("generateContent"),
            state.request.mode(),
            ctx,
        )
        .await;

        match outcome.into_result() {
            Ok(content) => {
                state.content = content;
                Ok(())
            }
            Err((e, partial)) => {
                state.content = partial;
                Err(e)
            }
        }
    }
}

/// Picks a random template and renders the deck
pub struct GenerateArtifact {
    backend: Arc<dyn PresentationBackend>,
    candidates: usize,
}

impl GenerateArtifact {
    /// Stage choosing among `candidates` templates
    pub fn new(backend: Arc<dyn PresentationBackend>, candidates: usize) -> Self {
        Self {
            backend,
            candidates: candidates.max(1),
        }
    }
}

#[async_trait]
impl Stage<PresentationState> for GenerateArtifact {
    fn name(&self) -> StageName {
        GENERATE_ARTIFACT
    }

    async fn run(
        &self,
        state: &mut PresentationState,
        ctx: &RunContext,
    ) -> Result<(), GenerationError> {
        let token = state.token()?.to_string();
        let template_id = pick_template(self.backend.as_ref(), &token, self.candidates, ctx).await?;

        let request = PptxRequest {
            template_id: template_id.clone(),
            outline_content_markdown: state.content.clone(),
            pptx_property: false,
        };
        let ppt = self.backend.generate_pptx(&token, &request).await?;
        tracing::info!(job_id = %ctx.job_id, ppt_id = %ppt.id, "Presentation rendered");

        state.template_id = Some(template_id);
        state.ppt = Some(ppt);
        Ok(())
    }
}

/// Fetch `candidates` templates and pick one at random
async fn pick_template(
    backend: &dyn PresentationBackend,
    token: &str,
    candidates: usize,
    ctx: &RunContext,
) -> Result<String, GenerationError> {
    let templates = backend
        .random_templates(token, candidates, TEMPLATE_CATEGORY)
        .await?;
    let template_id = {
        let mut rng = rand::thread_rng();
        select_template(&templates, &mut rng)?.id.clone()
    };
    tracing::debug!(
        job_id = %ctx.job_id,
        template_id = %template_id,
        offered = templates.len(),
        "Template selected"
    );
    Ok(template_id)
}

/// Generates and renders the deck in one provider call
///
/// In stream mode the provider's progress text is forwarded as deltas and
/// kept as the state's content; the deck metadata arrives with the
/// completing frame. In sync mode the blocking variant is used.
pub struct GenerateDirect {
    backend: Arc<dyn PresentationBackend>,
    consumer: StreamingConsumer,
    candidates: usize,
}

impl GenerateDirect {
    /// Stage choosing among `candidates` templates
    pub fn new(
        backend: Arc<dyn PresentationBackend>,
        consumer: StreamingConsumer,
        candidates: usize,
    ) -> Self {
        Self {
            backend,
            consumer,
            candidates: candidates.max(1),
        }
    }

    async fn stream(
        &self,
        token: &str,
        request: &DirectPptxRequest,
        state: &mut PresentationState,
        ctx: &RunContext,
    ) -> Result<PptInfo, GenerationError> {
        const OPERATION: &str = "directGeneratePptx";
        let frames = self
            .backend
            .direct_generate_pptx_stream(token, request)
            .await?;
        let slot = ResultSlot::default();
        let decoder = PresentationDecoder::new(OPERATION).with_result_slot(Arc::clone(&slot));
        let outcome = drive_stream(&self.consumer, frames, decoder, ExecutionMode::Stream, ctx).await;

        match outcome.into_result() {
            Ok(progress) => state.content = progress,
            Err((e, partial)) => {
                state.content = partial;
                return Err(e);
            }
        }

        let result = slot.lock().take().ok_or_else(|| {
            GenerationError::provider(OPERATION, "stream ended without a presentation")
        })?;
        serde_json::from_value(result).map_err(|e| {
            GenerationError::provider(OPERATION, format!("undecodable presentation result ({e})"))
        })
    }
}

#[async_trait]
impl Stage<PresentationState> for GenerateDirect {
    fn name(&self) -> StageName {
        GENERATE_DIRECT
    }

    async fn run(
        &self,
        state: &mut PresentationState,
        ctx: &RunContext,
    ) -> Result<(), GenerationError> {
        let token = state.token()?.to_string();
        let template_id = pick_template(self.backend.as_ref(), &token, self.candidates, ctx).await?;
        let request = DirectPptxRequest {
            template_id: Some(template_id.clone()),
            subject: state.request.topic().to_string(),
            data_url: state.data_url.clone(),
            prompt: state.extra_prompt(),
            pptx_property: false,
        };

        let ppt = match state.request.mode() {
            ExecutionMode::Sync => self.backend.direct_generate_pptx(&token, &request).await?,
            ExecutionMode::Stream => self.stream(&token, &request, state, ctx).await?,
        };
        tracing::info!(job_id = %ctx.job_id, ppt_id = %ppt.id, "Presentation generated directly");

        state.template_id = Some(template_id);
        state.ppt = Some(ppt);
        Ok(())
    }
}

/// Resolves the download URL for the rendered deck
pub struct ResolveDownload {
    backend: Arc<dyn PresentationBackend>,
}

impl ResolveDownload {
    /// Stage using `backend`
    pub fn new(backend: Arc<dyn PresentationBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Stage<PresentationState> for ResolveDownload {
    fn name(&self) -> StageName {
        RESOLVE_DOWNLOAD
    }

    fn applies(&self, state: &PresentationState) -> bool {
        state.request.resolve_download()
    }

    async fn run(
        &self,
        state: &mut PresentationState,
        _ctx: &RunContext,
    ) -> Result<(), GenerationError> {
        let url = self
            .backend
            .download_pptx(state.token()?, state.ppt_id()?)
            .await?;
        state.file_url = Some(url);
        Ok(())
    }
}

/// Copies the rendered deck into the file store
pub struct ArchiveArtifact {
    backend: Arc<dyn PresentationBackend>,
    files: Arc<dyn FileStore>,
}

impl ArchiveArtifact {
    /// Stage fetching through `backend` and writing to `files`
    pub fn new(backend: Arc<dyn PresentationBackend>, files: Arc<dyn FileStore>) -> Self {
        Self { backend, files }
    }
}

#[async_trait]
impl Stage<PresentationState> for ArchiveArtifact {
    fn name(&self) -> StageName {
        ARCHIVE_ARTIFACT
    }

    fn applies(&self, state: &PresentationState) -> bool {
        state.request.archive()
    }

    async fn run(
        &self,
        state: &mut PresentationState,
        ctx: &RunContext,
    ) -> Result<(), GenerationError> {
        let ppt_id = state.ppt_id()?.to_string();
        let file_url = match &state.file_url {
            Some(url) => url.clone(),
            None => {
                self.backend
                    .download_pptx(state.token()?, &ppt_id)
                    .await?
            }
        };

        let bytes = self.backend.fetch_file(&file_url).await?;
        let name = format!("{ppt_id}.pptx");
        let path = format!("ppt/{}", Utc::now().format("%Y%m%d"));
        let archived = self
            .files
            .upload(&name, &path, bytes)
            .await
            .map_err(|e| GenerationError::transport("archive", e))?;

        tracing::info!(job_id = %ctx.job_id, url = %archived, "Presentation archived");
        state.archived_url = Some(archived);
        Ok(())
    }
}
