//! Generation Job Records
//!
//! A [`GenerationJob`] is the persisted record of one pipeline run. The
//! orchestrator owns the job's state machine; stores only ever see the
//! snapshot inserted at creation and the single terminal update written by
//! [`JobFinalizer`].
//!
//! # State Machine
//!
//! ```text
//! Pending ──► Running ──► Succeeded
//!                    └──► Failed
//! Pending ──────────────► Failed
//! ```
//!
//! Transitions are monotonic. A terminal job never changes state again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::GenerationError;
use crate::request::ArtifactKind;
use crate::store::JobStore;

/// Job identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Create a job ID from an existing string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique job ID
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, no stage started yet
    Pending,
    /// Stages are executing
    Running,
    /// Artifact produced
    Succeeded,
    /// A stage failed or the caller cancelled
    Failed,
}

impl JobState {
    /// Human-readable label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }

    /// Whether no further transition is possible
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether moving to `next` is a forward transition
    #[must_use]
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Failed)
                | (Self::Running, Self::Succeeded | Self::Failed)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Rejected state change
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("job {job_id} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    /// Job that was being updated
    pub job_id: JobId,
    /// Current state
    pub from: JobState,
    /// Requested state
    pub to: JobState,
}

/// A generation job record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationJob {
    /// Unique job identifier
    pub id: JobId,
    /// What the job produces
    pub kind: ArtifactKind,
    /// Principal the job runs for
    pub principal: String,
    /// Current state
    state: JobState,
    /// Accumulated generated text
    content: String,
    /// Failure detail, only set once the job has failed
    error: Option<String>,
    /// Provider-side identifier (task uuid, presentation id)
    pub provider_handle: Option<String>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// Last state or content change
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    /// Create a pending job
    pub fn new(kind: ArtifactKind, principal: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::generate(),
            kind,
            principal: principal.into(),
            state: JobState::Pending,
            content: String::new(),
            error: None,
            provider_handle: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Use a caller-chosen identifier
    #[must_use]
    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Content accumulated so far
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Failure detail, if the job failed
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Move to `Running`
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] unless the job is `Pending`.
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.transition(JobState::Running)
    }

    /// Append generated text
    pub fn append(&mut self, text: &str) {
        if self.state.is_terminal() || text.is_empty() {
            return;
        }
        self.content.push_str(text);
        self.updated_at = Utc::now();
    }

    /// Move to `Succeeded`
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] unless the job is `Running`.
    pub fn succeed(&mut self) -> Result<(), InvalidTransition> {
        self.transition(JobState::Succeeded)
    }

    /// Move to `Failed` and record the detail
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if the job is already terminal.
    pub fn fail(&mut self, detail: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(JobState::Failed)?;
        self.error = Some(detail.into());
        Ok(())
    }

    /// Apply a store-side update
    ///
    /// Stores never observe `Running`, so a pending record may jump straight
    /// to a terminal state. Terminal records stay terminal.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if the update would move the record
    /// backwards; the record is left unchanged.
    pub fn apply_update(&mut self, update: JobUpdate) -> Result<(), InvalidTransition> {
        if let Some(next) = update.state {
            let forward = self.state.can_transition_to(next)
                || (self.state == JobState::Pending && next.is_terminal());
            if !forward {
                return Err(InvalidTransition {
                    job_id: self.id.clone(),
                    from: self.state,
                    to: next,
                });
            }
            self.state = next;
        }
        if let Some(content) = update.content {
            self.content = content;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        if update.provider_handle.is_some() {
            self.provider_handle = update.provider_handle;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    fn transition(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                job_id: self.id.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Terminal update written to the job store
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    /// Final or partial content
    pub content: Option<String>,
    /// Failure detail
    pub error: Option<String>,
    /// New state
    pub state: Option<JobState>,
    /// Provider-side identifier learned during the run
    pub provider_handle: Option<String>,
}

/// Single-use terminal writer for a job
///
/// Consuming `self` on every write means a job cannot be finalized twice.
/// Store failures are logged and swallowed; they never fail the pipeline.
pub struct JobFinalizer {
    job_id: JobId,
    store: Arc<dyn JobStore>,
}

impl JobFinalizer {
    /// Create a finalizer for a job already inserted in `store`
    pub fn new(job_id: JobId, store: Arc<dyn JobStore>) -> Self {
        Self { job_id, store }
    }

    /// Job this finalizer writes
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Record success with the final content
    pub async fn succeed(self, content: String, provider_handle: Option<String>) {
        let update = JobUpdate {
            content: Some(content),
            error: None,
            state: Some(JobState::Succeeded),
            provider_handle,
        };
        self.write(update).await;
    }

    /// Record failure together with whatever content was produced
    pub async fn fail(self, error: &GenerationError, partial_content: String) {
        let update = JobUpdate {
            content: (!partial_content.is_empty()).then_some(partial_content),
            error: Some(error.to_string()),
            state: Some(JobState::Failed),
            provider_handle: None,
        };
        self.write(update).await;
    }

    async fn write(self, update: JobUpdate) {
        if let Err(e) = self.store.update_by_id(&self.job_id, update).await {
            tracing::warn!(job_id = %self.job_id, error = %e, "Failed to persist job outcome");
        }
    }
}

impl std::fmt::Debug for JobFinalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobFinalizer")
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryJobStore;
    use tokio_test::{assert_err, assert_ok};

    fn job() -> GenerationJob {
        GenerationJob::new(ArtifactKind::MindMap, "user-1")
    }

    #[test]
    fn test_job_id_generate_is_unique() {
        assert_ne!(JobId::generate(), JobId::generate());
    }

    #[test]
    fn test_forward_transitions() {
        let mut job = job();
        assert_eq!(job.state(), JobState::Pending);
        assert_ok!(job.start());
        job.append("# Title");
        assert_ok!(job.succeed());
        assert_eq!(job.state(), JobState::Succeeded);
        assert!(job.state().is_terminal());
        assert_eq!(job.content(), "# Title");
        assert!(job.error().is_none());
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut job = job();
        job.start().unwrap();
        job.fail("boom").unwrap();

        let err = job.start().unwrap_err();
        assert_eq!(err.from, JobState::Failed);
        assert_eq!(err.to, JobState::Running);
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.error(), Some("boom"));

        assert_err!(job.succeed());
        assert_err!(job.fail("again"));
        assert_eq!(job.error(), Some("boom"));
    }

    #[test]
    fn test_succeed_requires_running() {
        let mut job = job();
        assert_err!(job.succeed());
        assert_eq!(job.state(), JobState::Pending);
    }

    #[test]
    fn test_append_after_terminal_is_ignored() {
        let mut job = job();
        job.start().unwrap();
        job.append("a");
        job.fail("x").unwrap();
        job.append("b");
        assert_eq!(job.content(), "a");
    }

    #[tokio::test]
    async fn test_finalizer_persists_partial_content_on_failure() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = job();
        store.insert(&job).await.unwrap();

        let finalizer = JobFinalizer::new(job.id.clone(), store.clone());
        finalizer
            .fail(&GenerationError::Cancelled, "partial".into())
            .await;

        let stored = store.get(&job.id).unwrap();
        assert_eq!(stored.state(), JobState::Failed);
        assert_eq!(stored.content(), "partial");
        assert_eq!(stored.error(), Some("stream cancelled by caller"));
        assert_eq!(store.update_count(&job.id), 1);
    }

    #[tokio::test]
    async fn test_finalizer_missing_job_is_swallowed() {
        let store = Arc::new(InMemoryJobStore::new());
        let finalizer = JobFinalizer::new(JobId::new("ghost"), store.clone());
        finalizer.succeed("done".into(), None).await;
        assert!(store.get(&JobId::new("ghost")).is_none());
    }
}
