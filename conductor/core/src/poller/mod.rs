//! Asynchronous Task Poller
//!
//! Generic submit → poll-until-terminal engine for providers that process
//! work asynchronously (document recognition). The poller knows nothing
//! about a provider's wire format; it drives an [`AsyncTaskProvider`] and
//! turns the terminal result into text.
//!
//! # Timing
//!
//! Every poll is preceded by one `clock.sleep(interval)`. After each
//! non-terminal status the elapsed time since submission is compared with
//! the policy timeout on the injected [`Clock`]; reaching it ends the wait
//! with [`GenerationError::Timeout`]. The remote task is left running.
//!
//! A transport failure on any single poll aborts the wait immediately.

mod render;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::PipelineSettings;
use crate::error::GenerationError;
use crate::request::ResultMode;

pub use render::markdown_to_text;

/// Provider-side task reference
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskHandle {
    /// Provider-opaque identifier
    pub id: String,
    /// When the task was submitted (injected clock)
    pub submitted_at: Instant,
}

/// One page of a recognized document
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFragment {
    /// Page content as markdown
    pub markdown: String,
}

/// Terminal success payload
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Pages in provider order
    pub pages: Vec<PageFragment>,
}

impl TaskResult {
    /// Assemble the pages into one string
    ///
    /// Pages are joined with `"\n"` in the order the provider returned them.
    #[must_use]
    pub fn assemble(&self, mode: ResultMode) -> String {
        self.pages
            .iter()
            .map(|page| match mode {
                ResultMode::Markdown => page.markdown.clone(),
                ResultMode::Text => markdown_to_text(&page.markdown),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Status reported by one poll
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Still processing; `raw` is the provider's status string
    Pending {
        /// Provider status label
        raw: String,
    },
    /// Finished with a result
    Succeeded(TaskResult),
    /// Finished with a failure
    Failed {
        /// Provider failure message
        message: String,
    },
}

impl RemoteStatus {
    /// Whether the task has finished
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending { .. })
    }
}

/// A provider whose work completes asynchronously
#[async_trait]
pub trait AsyncTaskProvider: Send + Sync {
    /// What the provider is asked to process
    type Request: Send + Sync;

    /// Submit work and return the provider's task identifier
    async fn submit(&self, request: &Self::Request) -> Result<String, GenerationError>;

    /// Query the status of a submitted task
    async fn poll(&self, handle: &TaskHandle) -> Result<RemoteStatus, GenerationError>;
}

/// Interval and upper bound for one wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before each poll
    pub interval: Duration,
    /// Give up once this much time has passed since submission
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

impl From<&PipelineSettings> for PollPolicy {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            interval: settings.poll_interval,
            timeout: settings.poll_timeout,
        }
    }
}

/// Drives [`AsyncTaskProvider`]s to completion
#[derive(Clone)]
pub struct AsyncTaskPoller {
    clock: Arc<dyn Clock>,
}

impl AsyncTaskPoller {
    /// Create a poller on the given clock
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Submit once
    ///
    /// # Errors
    ///
    /// Propagates the provider's submit error unchanged.
    pub async fn submit<P: AsyncTaskProvider + ?Sized>(
        &self,
        provider: &P,
        request: &P::Request,
    ) -> Result<TaskHandle, GenerationError> {
        let id = provider.submit(request).await?;
        tracing::info!(uuid = %id, "Submitted async task");
        Ok(TaskHandle {
            id,
            submitted_at: self.clock.now(),
        })
    }

    /// Poll a submitted task until it finishes or the timeout is reached
    ///
    /// # Errors
    ///
    /// - [`GenerationError::Provider`] when the task reports failure
    /// - [`GenerationError::Timeout`] when the bound is reached
    /// - any poll error, unchanged, on the first failed poll
    pub async fn wait<P: AsyncTaskProvider + ?Sized>(
        &self,
        provider: &P,
        handle: &TaskHandle,
        policy: PollPolicy,
    ) -> Result<TaskResult, GenerationError> {
        let mut polls: u32 = 0;
        loop {
            self.clock.sleep(policy.interval).await;
            polls += 1;

            match provider.poll(handle).await? {
                RemoteStatus::Succeeded(result) => {
                    tracing::info!(
                        uuid = %handle.id,
                        polls,
                        pages = result.pages.len(),
                        "Async task succeeded"
                    );
                    return Ok(result);
                }
                RemoteStatus::Failed { message } => {
                    tracing::warn!(uuid = %handle.id, polls, %message, "Async task failed");
                    return Err(GenerationError::provider("poll", message));
                }
                RemoteStatus::Pending { raw } => {
                    let elapsed = self.clock.elapsed_since(handle.submitted_at);
                    if elapsed >= policy.timeout {
                        tracing::warn!(
                            uuid = %handle.id,
                            polls,
                            elapsed_ms = duration_ms(elapsed),
                            "Async task timed out, remote task left running"
                        );
                        return Err(GenerationError::Timeout {
                            handle: handle.id.clone(),
                            elapsed_ms: duration_ms(elapsed),
                            timeout_ms: duration_ms(policy.timeout),
                        });
                    }
                    tracing::debug!(uuid = %handle.id, status = %raw, polls, "Async task pending");
                }
            }
        }
    }

    /// Submit, wait and assemble the result in `mode`
    ///
    /// # Errors
    ///
    /// See [`AsyncTaskPoller::submit`] and [`AsyncTaskPoller::wait`].
    pub async fn run_to_completion<P: AsyncTaskProvider + ?Sized>(
        &self,
        provider: &P,
        request: &P::Request,
        policy: PollPolicy,
        mode: ResultMode,
    ) -> Result<String, GenerationError> {
        let handle = self.submit(provider, request).await?;
        let result = self.wait(provider, &handle, policy).await?;
        Ok(result.assemble(mode))
    }
}

impl std::fmt::Debug for AsyncTaskPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTaskPoller").finish_non_exhaustive()
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
