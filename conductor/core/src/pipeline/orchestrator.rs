//! Pipeline Orchestrator
//!
//! Entry point of the core: turns a [`GenerationRequest`] into an
//! [`Artifact`] or a [`PipelineFailure`].
//!
//! # Responsibilities
//!
//! - Create the job record and insert it into the [`JobStore`]
//! - Assemble the stage list for the request's artifact kind
//! - Run stages sequentially, recording a [`PipelineTrace`]
//! - Finalize the job exactly once with the final or partial content
//!
//! [`Orchestrator::submit`] runs all of this on its own tokio task and
//! hands the caller a live event channel.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::context::{PipelineEvent, RunContext};
use super::mindmap::{GenerateMindMap, MindMapState};
use super::presentation::{
    AcquireCredential, ArchiveArtifact, GenerateArtifact, GenerateContent, GenerateDirect,
    GenerateOutline, IngestSource, PresentationState, ResolveDownload,
};
use super::recognition::{RecognitionState, RecognizeDocument};
use super::stage::{Pipeline, StageName, StageState, ValidateRequest};
use super::trace::PipelineTrace;
use crate::backend::{ChatBackend, DocumentRecognizer, PresentationBackend};
use crate::config::{ChatSettings, PipelineSettings};
use crate::credentials::TokenBroker;
use crate::error::GenerationError;
use crate::job::{GenerationJob, JobFinalizer, JobId};
use crate::request::{ArtifactKind, GenerationRequest, ResultMode};
use crate::store::{FileStore, InMemoryJobStore, JobStore, MemoryFileStore};
use crate::streaming::StreamingConsumer;

/// Result of a successful run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Artifact {
    /// Mind-map markdown
    MindMap {
        /// Generated markdown
        markdown: String,
    },
    /// Rendered slide deck
    Presentation {
        /// Provider deck identifier
        ppt_id: String,
        /// Slide content markdown
        markdown: String,
        /// Template used
        template_id: String,
        /// Download URL, when resolved
        file_url: Option<String>,
        /// Archived copy, when archived
        archived_url: Option<String>,
    },
    /// Recognized document content
    RecognizedText {
        /// Markdown or flattened text
        content: String,
        /// Which of the two
        mode: ResultMode,
    },
}

impl Artifact {
    /// Text persisted as the job's content
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::MindMap { markdown } | Self::Presentation { markdown, .. } => markdown,
            Self::RecognizedText { content, .. } => content,
        }
    }

    /// Provider-side identifier, if any
    #[must_use]
    pub fn provider_handle(&self) -> Option<&str> {
        match self {
            Self::Presentation { ppt_id, .. } => Some(ppt_id),
            _ => None,
        }
    }
}

/// A failed run
#[derive(Clone, Debug, thiserror::Error)]
#[error("job {job_id} failed at {}: {error}", stage_label(.trace))]
pub struct PipelineFailure {
    /// Job that failed
    pub job_id: JobId,
    /// Every stage attempted, ending with the failed one
    pub trace: PipelineTrace,
    /// The stage error
    pub error: GenerationError,
    /// Content produced before the failure
    pub partial_content: String,
}

impl PipelineFailure {
    /// Stage that failed
    #[must_use]
    pub fn stage(&self) -> Option<StageName> {
        self.trace.failed_stage()
    }
}

fn stage_label(trace: &PipelineTrace) -> &'static str {
    trace.failed_stage().map_or("unknown stage", |s| s.as_str())
}

/// Handle to a job running on its own task
#[derive(Debug)]
pub struct GenerationHandle {
    /// Job identifier
    pub job_id: JobId,
    /// Stage markers and live deltas
    pub events: mpsc::Receiver<PipelineEvent>,
    /// Final result
    pub result: JoinHandle<Result<Artifact, PipelineFailure>>,
}

/// Composes providers into per-kind pipelines
#[derive(Clone)]
pub struct Orchestrator {
    chat: Arc<dyn ChatBackend>,
    presentation: Arc<dyn PresentationBackend>,
    recognizer: Arc<dyn DocumentRecognizer>,
    broker: Arc<TokenBroker>,
    jobs: Arc<dyn JobStore>,
    files: Arc<dyn FileStore>,
    settings: PipelineSettings,
    chat_settings: ChatSettings,
}

impl Orchestrator {
    /// Create an orchestrator with in-memory stores and default settings
    pub fn new(
        chat: Arc<dyn ChatBackend>,
        presentation: Arc<dyn PresentationBackend>,
        recognizer: Arc<dyn DocumentRecognizer>,
        broker: Arc<TokenBroker>,
    ) -> Self {
        Self {
            chat,
            presentation,
            recognizer,
            broker,
            jobs: Arc::new(InMemoryJobStore::new()),
            files: Arc::new(MemoryFileStore::new()),
            settings: PipelineSettings::default(),
            chat_settings: ChatSettings::default(),
        }
    }

    /// Use a different job store
    #[must_use]
    pub fn with_job_store(mut self, jobs: Arc<dyn JobStore>) -> Self {
        self.jobs = jobs;
        self
    }

    /// Use a different file store
    #[must_use]
    pub fn with_file_store(mut self, files: Arc<dyn FileStore>) -> Self {
        self.files = files;
        self
    }

    /// Use the given settings
    #[must_use]
    pub fn with_settings(mut self, settings: PipelineSettings, chat: ChatSettings) -> Self {
        self.settings = settings;
        self.chat_settings = chat;
        self
    }

    fn consumer(&self) -> StreamingConsumer {
        StreamingConsumer::new(self.settings.stream_buffer)
    }

    /// Stage list for a presentation
    #[must_use]
    pub fn presentation_pipeline(&self) -> Pipeline<PresentationState> {
        Pipeline::new()
            .with_stage(ValidateRequest)
            .with_stage(AcquireCredential::new(
                Arc::clone(&self.broker),
                self.settings.token_limit,
            ))
            .with_stage(IngestSource::new(Arc::clone(&self.presentation)))
            .with_stage(GenerateOutline::new(
                Arc::clone(&self.presentation),
                self.consumer(),
            ))
            .with_stage(GenerateContent::new(
                Arc::clone(&self.presentation),
                self.consumer(),
            ))
            .with_stage(GenerateArtifact::new(
                Arc::clone(&self.presentation),
                self.settings.template_candidates,
            ))
            .with_stage(ResolveDownload::new(Arc::clone(&self.presentation)))
            .with_stage(ArchiveArtifact::new(
                Arc::clone(&self.presentation),
                Arc::clone(&self.files),
            ))
    }

    /// Stage list for a presentation generated in one provider call
    #[must_use]
    pub fn direct_presentation_pipeline(&self) -> Pipeline<PresentationState> {
        Pipeline::new()
            .with_stage(ValidateRequest)
            .with_stage(AcquireCredential::new(
                Arc::clone(&self.broker),
                self.settings.token_limit,
            ))
            .with_stage(IngestSource::new(Arc::clone(&self.presentation)))
            .with_stage(GenerateDirect::new(
                Arc::clone(&self.presentation),
                self.consumer(),
                self.settings.template_candidates,
            ))
            .with_stage(ResolveDownload::new(Arc::clone(&self.presentation)))
            .with_stage(ArchiveArtifact::new(
                Arc::clone(&self.presentation),
                Arc::clone(&self.files),
            ))
    }

    /// Stage list for a mind map
    #[must_use]
    pub fn mind_map_pipeline(&self) -> Pipeline<MindMapState> {
        Pipeline::new()
            .with_stage(ValidateRequest)
            .with_stage(GenerateMindMap::new(
                Arc::clone(&self.chat),
                self.consumer(),
                self.chat_settings.clone(),
            ))
    }

    /// Stage list for document recognition
    #[must_use]
    pub fn recognition_pipeline(&self) -> Pipeline<RecognitionState> {
        Pipeline::new()
            .with_stage(ValidateRequest)
            .with_stage(RecognizeDocument::new(Arc::clone(&self.recognizer)))
    }

    /// Run a request to completion on the current task
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineFailure`] carrying the trace, the stage error and
    /// any partial content. The job record is finalized either way.
    pub async fn run(
        &self,
        request: GenerationRequest,
        ctx: RunContext,
    ) -> Result<Artifact, PipelineFailure> {
        let mut job =
            GenerationJob::new(request.kind(), request.principal()).with_id(ctx.job_id.clone());
        if let Err(e) = self.jobs.insert(&job).await {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to persist new job");
        }
        let finalizer = JobFinalizer::new(job.id.clone(), Arc::clone(&self.jobs));

        if let Err(e) = job.start() {
            tracing::warn!(error = %e, "Job state out of sync");
        }
        tracing::info!(
            job_id = %job.id,
            kind = %request.kind(),
            principal = %ctx.principal,
            tenant = ctx.tenant_id.as_deref().unwrap_or("-"),
            mode = ?request.mode(),
            "Job started"
        );

        let result = match request.kind() {
            ArtifactKind::MindMap => {
                self.execute(
                    &self.mind_map_pipeline(),
                    MindMapState::new(request),
                    &ctx,
                    |s| Artifact::MindMap {
                        markdown: s.markdown,
                    },
                )
                .await
            }
            ArtifactKind::Presentation => {
                let pipeline = if request.direct_generation() {
                    self.direct_presentation_pipeline()
                } else {
                    self.presentation_pipeline()
                };
                self.execute(
                    &pipeline,
                    PresentationState::new(request),
                    &ctx,
                    presentation_artifact,
                )
                .await
            }
            ArtifactKind::RecognizedText { mode } => {
                self.execute(
                    &self.recognition_pipeline(),
                    RecognitionState::new(request),
                    &ctx,
                    move |s| Artifact::RecognizedText {
                        content: s.content,
                        mode,
                    },
                )
                .await
            }
        };

        match result {
            Ok((artifact, trace)) => {
                job.append(artifact.content());
                if let Err(e) = job.succeed() {
                    tracing::warn!(error = %e, "Job state out of sync");
                }
                tracing::info!(job_id = %job.id, trace = %trace, "Job succeeded");
                finalizer
                    .succeed(
                        artifact.content().to_string(),
                        artifact.provider_handle().map(str::to_string),
                    )
                    .await;
                Ok(artifact)
            }
            Err((error, trace, partial_content)) => {
                job.append(&partial_content);
                if let Err(e) = job.fail(error.to_string()) {
                    tracing::warn!(error = %e, "Job state out of sync");
                }
                tracing::warn!(
                    job_id = %job.id,
                    trace = %trace,
                    kind = %error.kind(),
                    partial_chars = partial_content.len(),
                    "Job failed"
                );
                finalizer.fail(&error, partial_content.clone()).await;
                Err(PipelineFailure {
                    job_id: job.id,
                    trace,
                    error,
                    partial_content,
                })
            }
        }
    }

    /// Run `request` on its own task and return immediately
    ///
    /// Must be called within a tokio runtime. Dropping the handle's event
    /// receiver cancels any live provider stream; the job is still
    /// finalized with the partial content.
    #[must_use]
    pub fn submit(&self, request: GenerationRequest) -> GenerationHandle {
        let job_id = JobId::generate();
        let (tx, rx) = mpsc::channel(self.settings.event_buffer.max(1));
        let ctx = RunContext::new(job_id.clone(), request.principal()).with_events(tx);

        let orchestrator = self.clone();
        let result = tokio::spawn(async move { orchestrator.run(request, ctx).await });

        GenerationHandle {
            job_id,
            events: rx,
            result,
        }
    }

    async fn execute<S, F>(
        &self,
        pipeline: &Pipeline<S>,
        mut state: S,
        ctx: &RunContext,
        finish: F,
    ) -> Result<(Artifact, PipelineTrace), (GenerationError, PipelineTrace, String)>
    where
        S: StageState,
        F: FnOnce(S) -> Artifact,
    {
        let (trace, outcome) = pipeline.execute(&mut state, ctx).await;
        match outcome {
            Ok(()) => Ok((finish(state), trace)),
            Err(e) => Err((e, trace, state.partial_content())),
        }
    }
}

fn presentation_artifact(state: PresentationState) -> Artifact {
    Artifact::Presentation {
        ppt_id: state.ppt.map(|p| p.id).unwrap_or_default(),
        markdown: state.content,
        template_id: state.template_id.unwrap_or_default(),
        file_url: state.file_url,
        archived_url: state.archived_url,
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("chat_settings", &self.chat_settings)
            .finish_non_exhaustive()
    }
}
