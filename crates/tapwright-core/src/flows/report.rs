//! Per-step results of a flow run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::poller::Clock;

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    /// The step ran and the expected state was not reached.
    Failed(String),
    /// A precondition was missing, so the step could not meaningfully run.
    Skipped(String),
}

impl StepOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, StepOutcome::Passed)
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        StepOutcome::Failed(reason.into())
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        StepOutcome::Skipped(reason.into())
    }
}

/// A finished step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub outcome: StepOutcome,
    pub elapsed_ms: u64,
    /// When the step started.
    pub at: DateTime<Utc>,
    /// Informational detail that does not affect the outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A step in progress. Created by [`Step::begin`], closed by
/// [`Step::finish`].
#[derive(Debug)]
pub struct Step {
    name: &'static str,
    at: DateTime<Utc>,
    started: Instant,
    note: Option<String>,
}

impl Step {
    pub fn begin(name: &'static str, clock: &dyn Clock) -> Self {
        Self {
            name,
            at: Utc::now(),
            started: clock.now(),
            note: None,
        }
    }

    /// Attaches an informational note to the record.
    pub fn note(&mut self, note: impl Into<String>) {
        self.note = Some(note.into());
    }

    pub fn finish(self, outcome: StepOutcome, clock: &dyn Clock) -> StepRecord {
        StepRecord {
            name: self.name.to_string(),
            outcome,
            elapsed_ms: clock.now().duration_since(self.started).as_millis() as u64,
            at: self.at,
            note: self.note,
        }
    }
}

/// Overall result of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Passed => "PASSED",
            Verdict::Failed => "FAILED",
            Verdict::Skipped => "SKIPPED",
        })
    }
}

/// Ordered step records of one flow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowReport {
    pub flow: String,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepRecord>,
}

impl FlowReport {
    pub fn new(flow: impl Into<String>) -> Self {
        Self {
            flow: flow.into(),
            started_at: Utc::now(),
            steps: Vec::new(),
        }
    }

    /// Appends `record` and returns whether the flow should continue.
    pub fn push(&mut self, record: StepRecord) -> bool {
        let passed = record.outcome.is_passed();
        match &record.outcome {
            StepOutcome::Passed => debug!(step = %record.name, "step passed"),
            StepOutcome::Failed(reason) => {
                warn!(step = %record.name, %reason, "step failed")
            }
            StepOutcome::Skipped(reason) => {
                info!(step = %record.name, %reason, "step skipped")
            }
        }
        self.steps.push(record);
        passed
    }

    /// The first non-passing step decides; a flow with no such step passed.
    pub fn verdict(&self) -> Verdict {
        self.steps
            .iter()
            .find_map(|step| match step.outcome {
                StepOutcome::Passed => None,
                StepOutcome::Failed(_) => Some(Verdict::Failed),
                StepOutcome::Skipped(_) => Some(Verdict::Skipped),
            })
            .unwrap_or(Verdict::Passed)
    }

    /// The step that stopped the flow, if any.
    pub fn stopped_at(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|step| !step.outcome.is_passed())
    }

    pub fn total_ms(&self) -> u64 {
        self.steps.iter().map(|step| step.elapsed_ms).sum()
    }
}

impl fmt::Display for FlowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} ({}ms)", self.flow, self.verdict(), self.total_ms())?;
        for step in &self.steps {
            let (mark, reason) = match &step.outcome {
                StepOutcome::Passed => ("ok", None),
                StepOutcome::Failed(reason) => ("FAIL", Some(reason)),
                StepOutcome::Skipped(reason) => ("skip", Some(reason)),
            };
            write!(f, "  [{mark:>4}] {} ({}ms)", step.name, step.elapsed_ms)?;
            if let Some(reason) = reason {
                write!(f, ": {reason}")?;
            }
            if let Some(note) = &step.note {
                write!(f, " [{note}]")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
