//! Collaborator contracts consumed by the engine
//!
//! The engine delegates the actual work of a job to a [`JobExecutor`] and the
//! fan-out of results to a [`DeliverySink`]. Both run out of process in
//! production deployments; the traits keep the engine testable with stubs.

use async_trait::async_trait;

use crate::types::JobDefinition;

/// Outcome of one executor invocation.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Result text produced by the task
    pub text: String,
    /// Cost in USD, if the executor reports one
    pub cost_usd: Option<f64>,
    /// Wall-clock duration of the task
    pub duration_ms: i64,
    /// Conversation turns consumed, if the executor reports them
    pub num_turns: Option<i64>,
    /// Whether the task failed
    pub is_error: bool,
}

impl RunResult {
    /// A successful result with the given text.
    pub fn success(text: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            text: text.into(),
            cost_usd: None,
            duration_ms,
            num_turns: None,
            is_error: false,
        }
    }

    /// A failed result with the given error text.
    pub fn error(text: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            text: text.into(),
            cost_usd: None,
            duration_ms,
            num_turns: None,
            is_error: true,
        }
    }

    /// Set the reported cost.
    pub fn with_cost_usd(mut self, cost_usd: f64) -> Self {
        self.cost_usd = Some(cost_usd);
        self
    }

    /// Set the reported turn count.
    pub fn with_num_turns(mut self, num_turns: i64) -> Self {
        self.num_turns = Some(num_turns);
        self
    }
}

/// Outcome of one trigger of the execution path.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The job executed; the result was persisted
    Ran(RunResult),
    /// A previous execution of the same job was still in flight; nothing was
    /// executed and nothing was persisted
    Skipped,
}

impl RunOutcome {
    /// True if the trigger was skipped due to overlap.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Performs the actual work of a job.
///
/// Ordinary task failures are reported as `is_error` results; a returned
/// `Err` is converted by the engine into an error result carrying the message
/// as text, so either way the run is recorded.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Execute one job to completion and report its result.
    async fn execute(&self, job: &JobDefinition) -> anyhow::Result<RunResult>;
}

/// Forwards run results to end users.
///
/// Failures are logged by the engine and never affect job state; retries, if
/// any, are the sink's own concern.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Deliver `text` to `target`.
    async fn deliver(&self, target: &str, text: &str) -> anyhow::Result<()>;
}
