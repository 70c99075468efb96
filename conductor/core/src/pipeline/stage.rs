//! Stage abstraction and sequential runner
//!
//! A [`Pipeline`] is an ordered list of boxed [`Stage`]s sharing one
//! mutable state value. Stages run strictly one after another; the first
//! failure stops execution. Optional stages report `applies() == false`
//! and are recorded as skipped without being invoked.

use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;

use super::context::{PipelineEvent, RunContext};
use super::trace::PipelineTrace;
use crate::error::GenerationError;
use crate::request::{ExecutionMode, GenerationRequest};
use crate::streaming::{ByteStream, FrameDecoder, StreamOutcome, StreamingConsumer};

/// Stage identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StageName(&'static str);

impl StageName {
    /// Name a stage
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Name as a string
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// State shared by the stages of one pipeline
pub trait StageState: Send + Sync {
    /// The request being executed
    fn request(&self) -> &GenerationRequest;

    /// Best text produced so far, persisted when the run fails
    fn partial_content(&self) -> String;
}

/// One step of a pipeline
#[async_trait]
pub trait Stage<S: StageState>: Send + Sync {
    /// Stage name used in the trace and events
    fn name(&self) -> StageName;

    /// Whether the stage runs for this state
    fn applies(&self, _state: &S) -> bool {
        true
    }

    /// Execute the stage
    async fn run(&self, state: &mut S, ctx: &RunContext) -> Result<(), GenerationError>;
}

/// Ordered stage list
pub struct Pipeline<S> {
    stages: Vec<Box<dyn Stage<S>>>,
}

impl<S: StageState> Default for Pipeline<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StageState> Pipeline<S> {
    /// Empty pipeline
    #[must_use]
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage
    #[must_use]
    pub fn with_stage(mut self, stage: impl Stage<S> + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Append a boxed stage
    #[must_use]
    pub fn with_boxed(mut self, stage: Box<dyn Stage<S>>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Stage names in execution order
    #[must_use]
    pub fn stage_names(&self) -> Vec<StageName> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order, stopping at the first failure
    pub async fn execute(
        &self,
        state: &mut S,
        ctx: &RunContext,
    ) -> (PipelineTrace, Result<(), GenerationError>) {
        let mut trace = PipelineTrace::new();

        for stage in &self.stages {
            let name = stage.name();
            if !stage.applies(state) {
                tracing::debug!(job_id = %ctx.job_id, stage = %name, "Stage skipped");
                trace.skipped(name);
                continue;
            }

            tracing::info!(job_id = %ctx.job_id, stage = %name, "Stage started");
            ctx.emit(PipelineEvent::StageStarted(name)).await;
            let started = Instant::now();

            match stage.run(state, ctx).await {
                Ok(()) => {
                    trace.succeeded(name, started.elapsed());
                    tracing::info!(
                        job_id = %ctx.job_id,
                        stage = %name,
                        elapsed_ms =
                            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "Stage finished"
                    );
                    ctx.emit(PipelineEvent::StageFinished(name)).await;
                }
                Err(e) => {
                    trace.failed(name, &e, started.elapsed());
                    tracing::warn!(
                        job_id = %ctx.job_id,
                        stage = %name,
                        kind = %e.kind(),
                        error = %e,
                        "Stage failed"
                    );
                    return (trace, Err(e));
                }
            }
        }

        (trace, Ok(()))
    }
}

impl<S> std::fmt::Debug for Pipeline<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .finish()
    }
}

// =============================================================================
// Shared Stages and Helpers
// =============================================================================

/// Name of the validation stage
pub const VALIDATE_REQUEST: StageName = StageName::new("validate-request");

/// Rejects malformed requests before any network call
#[derive(Clone, Copy, Debug, Default)]
pub struct ValidateRequest;

#[async_trait]
impl<S: StageState> Stage<S> for ValidateRequest {
    fn name(&self) -> StageName {
        VALIDATE_REQUEST
    }

    async fn run(&self, state: &mut S, _ctx: &RunContext) -> Result<(), GenerationError> {
        state.request().validate()
    }
}

/// Consume a provider stream according to the execution mode
///
/// In [`ExecutionMode::Stream`] every delta is forwarded to the caller as
/// it arrives; if the caller has gone the provider stream is dropped and
/// the outcome reports [`GenerationError::Cancelled`]. A caller that leaves
/// after the last delta but before the stream ends cancels the run too. In
/// [`ExecutionMode::Sync`] the stream is drained internally.
pub(crate) async fn drive_stream<D: FrameDecoder>(
    consumer: &StreamingConsumer,
    frames: ByteStream,
    decoder: D,
    mode: ExecutionMode,
    ctx: &RunContext,
) -> StreamOutcome {
    let stream = consumer.consume(frames, decoder);
    if mode == ExecutionMode::Sync {
        return stream.finish().await;
    }

    let (mut deltas, outcome) = stream.into_parts();
    while let Some(item) = deltas.next().await {
        // A terminal error item is also carried by the outcome
        let Ok(delta) = item else { continue };
        if ctx.forward(delta).await.is_err() {
            tracing::info!(job_id = %ctx.job_id, "Caller went away, cancelling provider stream");
            drop(deltas);
            return outcome.wait().await;
        }
    }

    let mut outcome = outcome.wait().await;
    if outcome.error.is_none() && ctx.listener_departed() {
        tracing::info!(job_id = %ctx.job_id, "Caller went away after the last delta");
        outcome.error = Some(GenerationError::Cancelled);
    }
    outcome
}
