//! Generation Pipelines
//!
//! Ordered, short-circuiting stage lists per artifact kind, and the
//! [`Orchestrator`] that runs them.
//!
//! # Architecture
//!
//! ```text
//! GenerationRequest ──► Orchestrator ──► Pipeline<S> ──► Stage<S> … Stage<S>
//!                          │                 │
//!                          │                 └── PipelineTrace
//!                          ├── JobStore (insert, finalize once)
//!                          └── events ──► caller (StageStarted, Delta, StageFinished)
//! ```
//!
//! | Kind | Stages |
//! | --- | --- |
//! | Presentation | validate-request, acquire-credential, ingest-source?, generate-outline, generate-content, generate-artifact, resolve-download?, archive-artifact? |
//! | Presentation (direct) | validate-request, acquire-credential, ingest-source?, generate-direct, resolve-download?, archive-artifact? |
//! | Mind map | validate-request, generate-mindmap |
//! | Recognized text | validate-request, recognize-document |
//!
//! Stages marked `?` only run when the request asks for them.

mod context;
mod mindmap;
mod orchestrator;
mod presentation;
mod recognition;
mod stage;
mod template;
mod trace;

pub use context::{PipelineEvent, RunContext};
pub use mindmap::{GenerateMindMap, MindMapState, GENERATE_MINDMAP};
pub use orchestrator::{Artifact, GenerationHandle, Orchestrator, PipelineFailure};
pub use presentation::{
    AcquireCredential, ArchiveArtifact, GenerateArtifact, GenerateContent, GenerateDirect,
    GenerateOutline, IngestSource, PresentationState, ResolveDownload, ACQUIRE_CREDENTIAL,
    ARCHIVE_ARTIFACT, GENERATE_ARTIFACT, GENERATE_CONTENT, GENERATE_DIRECT, GENERATE_OUTLINE,
    INGEST_SOURCE, RESOLVE_DOWNLOAD,
};
pub use recognition::{RecognitionState, RecognizeDocument, RECOGNIZE_DOCUMENT};
pub use stage::{Pipeline, Stage, StageName, StageState, ValidateRequest, VALIDATE_REQUEST};
pub use template::{select_template, TEMPLATE_CATEGORY};
pub use trace::{PipelineTrace, StageOutcome, StageRecord};
