// pgmigrate/src/workflow/pipeline.rs
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    /// Failed, but the step was best-effort or a verification.
    Warning,
    Failed,
}

#[derive(Debug, Clone)]
pub struct StepRecord {
    pub index: usize,
    pub label: String,
    pub status: StepStatus,
    /// Path or identifier the step produced, if any.
    pub artifact: Option<String>,
    pub detail: Option<String>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    CompletedWithWarnings,
    Failed { exit_code: u8, message: String },
    Skipped(String),
}

impl Outcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Failed { exit_code, .. } => *exit_code,
            _ => 0,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => f.write_str("completed"),
            Outcome::CompletedWithWarnings => f.write_str("completed with warnings"),
            Outcome::Failed { message, .. } => write!(f, "failed: {}", message),
            Outcome::Skipped(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub workflow: String,
    pub run_id: String,
    pub steps: Vec<StepRecord>,
    pub outcome: Outcome,
}

impl WorkflowReport {
    pub fn skipped(workflow: &str, reason: impl Into<String>) -> Self {
        Self {
            workflow: workflow.to_string(),
            run_id: String::new(),
            steps: Vec::new(),
            outcome: Outcome::Skipped(reason.into()),
        }
    }

    /// First eight characters of the run id, as shown in logs.
    pub fn short_run_id(&self) -> &str {
        self.run_id.get(..8).unwrap_or(&self.run_id)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

/// Sequential executor that records one [`StepRecord`] per step.
#[derive(Debug)]
pub struct Pipeline {
    workflow: String,
    run_id: String,
    steps: Vec<StepRecord>,
}

impl Pipeline {
    pub fn new(workflow: &str, run_id: &str) -> Self {
        Self {
            workflow: workflow.to_string(),
            run_id: run_id.to_string(),
            steps: Vec::new(),
        }
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    fn record(&mut self, label: &str, status: StepStatus, detail: Option<String>, started: Instant) {
        self.steps.push(StepRecord {
            index: self.steps.len() + 1,
            label: label.to_string(),
            status,
            artifact: None,
            detail,
            elapsed: started.elapsed(),
        });
    }

    /// Runs a required step. The error is recorded and returned so `?` stops the workflow.
    pub async fn step<T, F>(&mut self, label: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let index = self.steps.len() + 1;
        info!(step = index, "{}...", label);
        let started = Instant::now();
        match fut.await {
            Ok(value) => {
                info!(step = index, "{} done", label);
                self.record(label, StepStatus::Succeeded, None, started);
                Ok(value)
            }
            Err(e) => {
                error!(step = index, error = %e, "{} failed", label);
                self.record(label, StepStatus::Failed, Some(e.to_string()), started);
                Err(e)
            }
        }
    }

    /// Runs a step whose failure is only a warning.
    pub async fn best_effort<T, F>(&mut self, label: &str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        let index = self.steps.len() + 1;
        info!(step = index, "{}...", label);
        let started = Instant::now();
        match fut.await {
            Ok(value) => {
                self.record(label, StepStatus::Succeeded, None, started);
                Some(value)
            }
            Err(e) => {
                warn!(step = index, error = %e, "{} failed, continuing", label);
                self.record(label, StepStatus::Warning, Some(e.to_string()), started);
                None
            }
        }
    }

    /// Runs a verification. A mismatch or an error while checking is a warning.
    pub async fn verify<T, F>(&mut self, label: &str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        let index = self.steps.len() + 1;
        info!(step = index, "{}...", label);
        let started = Instant::now();
        match fut.await {
            Ok(value) => {
                info!(step = index, "{} passed", label);
                self.record(label, StepStatus::Succeeded, None, started);
                Some(value)
            }
            Err(AppError::VerificationMismatch(detail)) => {
                warn!(step = index, detail = %detail, "{}: mismatch", label);
                self.record(label, StepStatus::Warning, Some(detail), started);
                None
            }
            Err(e) => {
                warn!(step = index, error = %e, "{}: could not verify", label);
                self.record(label, StepStatus::Warning, Some(e.to_string()), started);
                None
            }
        }
    }

    /// Records something other than a step failure as a warning on the workflow.
    pub fn warn(&mut self, label: &str, detail: impl Into<String>) {
        let detail = detail.into();
        warn!(detail = %detail, "{}", label);
        self.record(label, StepStatus::Warning, Some(detail), Instant::now());
    }

    /// Attaches an artifact to the most recent step.
    pub fn annotate(&mut self, artifact: impl fmt::Display) {
        if let Some(last) = self.steps.last_mut() {
            last.artifact = Some(artifact.to_string());
        }
    }

    pub fn finish(self, result: Result<()>) -> WorkflowReport {
        let outcome = match result {
            Err(e) => Outcome::Failed {
                exit_code: e.exit_code(),
                message: e.to_string(),
            },
            Ok(()) if self.steps.iter().any(|s| s.status == StepStatus::Warning) => {
                Outcome::CompletedWithWarnings
            }
            Ok(()) => Outcome::Completed,
        };
        WorkflowReport {
            workflow: self.workflow,
            run_id: self.run_id,
            steps: self.steps,
            outcome,
        }
    }
}
