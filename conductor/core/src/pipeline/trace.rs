//! Pipeline execution trace

use std::time::Duration;

use serde::Serialize;

use super::stage::StageName;
use crate::error::{ErrorKind, GenerationError};

/// How a stage ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum StageOutcome {
    /// Stage ran to completion
    Succeeded,
    /// Optional stage did not apply and was not invoked
    Skipped,
    /// Stage failed; execution stopped here
    Failed {
        /// Error classification
        kind: ErrorKind,
        /// Error description
        message: String,
    },
}

/// One attempted stage
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    /// Stage name
    pub stage: StageName,
    /// Result
    #[serde(flatten)]
    pub outcome: StageOutcome,
    /// Wall time spent in the stage
    pub elapsed_ms: u64,
}

/// Ordered record of every stage attempted in a run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineTrace {
    records: Vec<StageRecord>,
}

impl PipelineTrace {
    /// Empty trace
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn succeeded(&mut self, stage: StageName, elapsed: Duration) {
        self.push(stage, StageOutcome::Succeeded, elapsed);
    }

    pub(crate) fn skipped(&mut self, stage: StageName) {
        self.push(stage, StageOutcome::Skipped, Duration::ZERO);
    }

    pub(crate) fn failed(&mut self, stage: StageName, error: &GenerationError, elapsed: Duration) {
        self.push(
            stage,
            StageOutcome::Failed {
                kind: error.kind(),
                message: error.to_string(),
            },
            elapsed,
        );
    }

    fn push(&mut self, stage: StageName, outcome: StageOutcome, elapsed: Duration) {
        self.records.push(StageRecord {
            stage,
            outcome,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        });
    }

    /// Records in execution order
    #[must_use]
    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    /// Names of stages that were actually invoked
    #[must_use]
    pub fn invoked(&self) -> Vec<StageName> {
        self.records
            .iter()
            .filter(|r| r.outcome != StageOutcome::Skipped)
            .map(|r| r.stage)
            .collect()
    }

    /// First failed stage, if any
    #[must_use]
    pub fn failed_stage(&self) -> Option<StageName> {
        self.failure().map(|r| r.stage)
    }

    /// First failure record, if any
    #[must_use]
    pub fn failure(&self) -> Option<&StageRecord> {
        self.records
            .iter()
            .find(|r| matches!(r.outcome, StageOutcome::Failed { .. }))
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was attempted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl std::fmt::Display for PipelineTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                f.write_str(" → ")?;
            }
            let mark = match &record.outcome {
                StageOutcome::Succeeded => "ok".to_string(),
                StageOutcome::Skipped => "skipped".to_string(),
                StageOutcome::Failed { kind, .. } => format!("failed:{kind}"),
            };
            write!(f, "{}[{mark}]", record.stage)?;
        }
        Ok(())
    }
}
