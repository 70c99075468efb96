//! Generation Conductor Core - Provider Orchestration
//!
//! This crate mediates between an application and three kinds of
//! generation provider: a streaming chat-completion API, a multi-step
//! presentation API and an asynchronous document-recognition API. Callers
//! get one contract: submit a request, receive incremental progress when
//! available, and get either an artifact or a typed failure that still
//! carries any partial output.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Orchestrator                             │
//! │   GenerationRequest ──► Pipeline<S> (validate → … → archive)     │
//! │        │                    │                                    │
//! │        │     ┌──────────────┼───────────────┬──────────────┐     │
//! │        │     ▼              ▼               ▼              ▼     │
//! │        │ TokenBroker  StreamingConsumer  AsyncTaskPoller  Stores │
//! │        │     │              │               │                    │
//! └────────┼─────┼──────────────┼───────────────┼────────────────────┘
//!          │     ▼              ▼               ▼
//!          │  Docmee       Chat / Docmee      Doc2x
//!          ▼  (tokens)      (event streams)   (submit, poll)
//!     PipelineEvent ──► caller
//! ```
//!
//! # Key Types
//!
//! - [`Orchestrator`]: builds and runs per-kind pipelines, owns job records
//! - [`TokenBroker`]: TTL cache with single-flight credential issuance
//! - [`StreamingConsumer`]: event stream → ordered deltas + accumulated text
//! - [`AsyncTaskPoller`]: submit once, poll until terminal or timeout
//! - [`GenerationError`]: the error every operation returns
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use genconductor::{
//!     backend::{ChatCompletionClient, DocmeeClient, Doc2xClient, Doc2xRecognizer},
//!     GenerationRequest, Orchestrator, TokenBroker, AsyncTaskPoller, SystemClock,
//! };
//!
//! let config = Arc::new(genconductor::config::load_config()?);
//! let clock = Arc::new(SystemClock);
//! let docmee = Arc::new(DocmeeClient::new(config.clone())?);
//! let broker = Arc::new(TokenBroker::new(docmee.clone(), clock.clone(), config.pipeline.token_ttl));
//! let recognizer = Doc2xRecognizer::new(
//!     Doc2xClient::new(config.clone())?,
//!     AsyncTaskPoller::new(clock),
//!     (&config.pipeline).into(),
//! );
//! let orchestrator = Orchestrator::new(
//!     Arc::new(ChatCompletionClient::new(config.clone())?),
//!     docmee,
//!     Arc::new(recognizer),
//!     broker,
//! );
//!
//! let mut handle = orchestrator.submit(GenerationRequest::mind_map("Rust").with_principal("u1"));
//! while let Some(event) = handle.events.recv().await {
//!     // Render StageStarted / Delta / StageFinished
//! }
//! let artifact = handle.result.await??;
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: provider traits and HTTP clients (chat, Docmee, Doc2x)
//! - [`clock`]: injectable time source
//! - [`config`]: TOML/env configuration and key/value lookup
//! - [`credentials`]: token broker
//! - [`error`]: error taxonomy
//! - [`job`]: job records and the single-use finalizer
//! - [`pipeline`]: stages, traces and the orchestrator
//! - [`poller`]: submit/poll engine
//! - [`prompts`]: mind-map prompt shaping
//! - [`request`]: generation requests
//! - [`store`]: job and file persistence seams
//! - [`streaming`]: event-stream consumption

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod poller;
pub mod prompts;
pub mod request;
pub mod store;
pub mod streaming;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    load_config, load_config_from_path, ConductorConfigFile, ConfigError, ConfigLookup,
    ConfigOverrides, ConfigSource, MapConfig,
};
pub use credentials::{Credential, TokenBroker, TokenIssuer};
pub use error::{ErrorKind, GenerationError};
pub use job::{GenerationJob, JobFinalizer, JobId, JobState, JobUpdate};
pub use pipeline::{
    Artifact, GenerationHandle, Orchestrator, PipelineEvent, PipelineFailure, PipelineTrace,
    RunContext, StageName, StageOutcome,
};
pub use poller::{
    AsyncTaskPoller, AsyncTaskProvider, PageFragment, PollPolicy, RemoteStatus, TaskHandle,
    TaskResult,
};
pub use request::{ArtifactKind, ExecutionMode, GenerationRequest, ResultMode, SourceDocument};
pub use store::{FileStore, InMemoryJobStore, JobStore, LocalFileStore, MemoryFileStore};
pub use streaming::{CompletionStream, StreamOutcome, StreamingConsumer, TextDelta};
