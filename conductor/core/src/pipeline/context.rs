//! Run context and caller-facing events

use tokio::sync::mpsc;

use super::stage::StageName;
use crate::error::GenerationError;
use crate::job::JobId;
use crate::streaming::TextDelta;

/// Progress reported to a streaming caller
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A stage began executing
    StageStarted(StageName),
    /// Live text from the running stage
    Delta(TextDelta),
    /// A stage completed successfully
    StageFinished(StageName),
}

/// Per-run context threaded through every stage
#[derive(Clone, Debug)]
pub struct RunContext {
    /// Job being executed
    pub job_id: JobId,
    /// Principal the job runs for
    pub principal: String,
    /// Tenant, when the embedding application is multi-tenant
    pub tenant_id: Option<String>,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl RunContext {
    /// Context without a live event channel
    pub fn new(job_id: JobId, principal: impl Into<String>) -> Self {
        Self {
            job_id,
            principal: principal.into(),
            tenant_id: None,
            events: None,
        }
    }

    /// Set the tenant
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Attach the caller's event channel
    #[must_use]
    pub fn with_events(mut self, events: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Whether a caller is listening for events
    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.events.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Whether a listener was attached and has since gone
    #[must_use]
    pub fn listener_departed(&self) -> bool {
        self.events.as_ref().is_some_and(mpsc::Sender::is_closed)
    }

    /// Report a stage marker; a missing or departed listener is ignored
    pub async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    /// Forward a live delta, waiting for channel capacity
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Cancelled`] when the listener has gone.
    pub async fn forward(&self, delta: TextDelta) -> Result<(), GenerationError> {
        match &self.events {
            Some(tx) => tx
                .send(PipelineEvent::Delta(delta))
                .await
                .map_err(|_| GenerationError::Cancelled),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(text: &str) -> TextDelta {
        TextDelta {
            index: 0,
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn test_forward_without_listener_is_noop() {
        let ctx = RunContext::new(JobId::new("j"), "u");
        assert!(!ctx.has_listener());
        assert!(ctx.forward(delta("x")).await.is_ok());
    }

    #[tokio::test]
    async fn test_forward_to_dropped_listener_is_cancelled() {
        let (tx, rx) = mpsc::channel(1);
        let ctx = RunContext::new(JobId::new("j"), "u").with_events(tx);
        drop(rx);
        assert_eq!(
            ctx.forward(delta("x")).await,
            Err(GenerationError::Cancelled)
        );
        // Stage markers never fail
        ctx.emit(PipelineEvent::StageStarted(StageName::new("s"))).await;
    }

    #[tokio::test]
    async fn test_forward_delivers_delta() {
        let (tx, mut rx) = mpsc::channel(4);
        let ctx = RunContext::new(JobId::new("j"), "u")
            .with_tenant("t1")
            .with_events(tx);
        ctx.forward(delta("hello")).await.unwrap();
        assert_eq!(rx.recv().await, Some(PipelineEvent::Delta(delta("hello"))));
        assert_eq!(ctx.tenant_id.as_deref(), Some("t1"));
    }
}
