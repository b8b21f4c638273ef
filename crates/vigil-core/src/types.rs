//! Job definitions and persisted state types
//!
//! Contains the core data model shared by the scheduler, the source merger,
//! and the state store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::PathBuf;
use uuid::Uuid;

use crate::exec::RunResult;

/// Where a job's prompt text comes from.
///
/// The engine never reads or interprets the prompt; it is carried through to
/// the executor collaborator as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptSource {
    /// Inline prompt text
    Text(String),
    /// Path to a file containing the prompt
    File(PathBuf),
}

/// Declarative description of a recurring agent job.
///
/// Definitions come from the static list supplied at construction or from the
/// dynamic source; the engine treats them as read-only either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Unique job id, stable across sources
    pub id: String,
    /// Human-readable label
    pub label: String,
    /// Cron expression (5/6/7 fields) or interval form (`every 5m`)
    pub schedule_expression: String,
    /// IANA timezone name for cron evaluation (default: UTC)
    pub timezone: Option<String>,
    /// Prompt payload, opaque to the engine
    pub prompt: PromptSource,
    /// Model override for the executor
    pub model: Option<String>,
    /// Turn budget for the executor
    pub max_turns: Option<u32>,
    /// Working directory for the executor
    pub working_dir: Option<PathBuf>,
    /// Delivery target handed to the delivery sink
    pub deliver_target: Option<String>,
    /// Whether run results are delivered at all
    pub announce: bool,
    /// Regex source; a matching result text is persisted but not delivered
    pub suppress_pattern: Option<String>,
    /// System prompt override for the executor
    pub system_prompt: Option<String>,
    /// Disabled jobs are listed but never scheduled
    pub enabled: bool,
}

impl JobDefinition {
    /// Create a definition with the given id, schedule, and prompt.
    ///
    /// `announce` and `enabled` default to true; the label defaults to the id.
    pub fn new(
        id: impl Into<String>,
        schedule_expression: impl Into<String>,
        prompt: PromptSource,
    ) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            schedule_expression: schedule_expression.into(),
            timezone: None,
            prompt,
            model: None,
            max_turns: None,
            working_dir: None,
            deliver_target: None,
            announce: true,
            suppress_pattern: None,
            system_prompt: None,
            enabled: true,
        }
    }

    /// Set the label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the IANA timezone
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Set the model override
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the turn budget
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    /// Set the working directory
    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    /// Set the delivery target
    pub fn with_deliver_target(mut self, target: impl Into<String>) -> Self {
        self.deliver_target = Some(target.into());
        self
    }

    /// Set whether results are delivered
    pub fn with_announce(mut self, announce: bool) -> Self {
        self.announce = announce;
        self
    }

    /// Set the suppress pattern
    pub fn with_suppress_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.suppress_pattern = Some(pattern.into());
        self
    }

    /// Set the system prompt override
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the enabled flag
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Per-job aggregate state, one row per job id.
///
/// Created lazily on first scheduling or first run, updated by upsert, never
/// deleted automatically.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobState {
    /// Job id this row aggregates
    pub job_id: String,
    /// Start time of the most recent run
    pub last_run_at: Option<DateTime<Utc>>,
    /// Next scheduled fire time
    pub next_run_at: Option<DateTime<Utc>>,
    /// Total completed executions; monotonically non-decreasing
    pub run_count: i64,
    /// Error text of the most recent run, if it failed
    pub last_error: Option<String>,
    /// Duration of the most recent run
    pub last_duration_ms: Option<i64>,
    /// Cost of the most recent run
    pub last_cost_usd: Option<f64>,
}

/// Immutable log entry for one completed execution attempt.
///
/// Skipped (overlapping) attempts are never recorded.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunRecord {
    /// Record id
    pub id: String,
    /// Job that ran
    pub job_id: String,
    /// Execution start
    pub started_at: DateTime<Utc>,
    /// Execution end
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration reported by the executor
    pub duration_ms: i64,
    /// Cost reported by the executor
    pub cost_usd: Option<f64>,
    /// Turns consumed, as reported by the executor
    pub num_turns: Option<i64>,
    /// Whether the run failed
    pub is_error: bool,
    /// Result text, truncated to the configured cap
    pub result_text: String,
}

impl RunRecord {
    /// Build a record from an executor result, truncating the result text to
    /// `text_cap` characters.
    pub fn from_result(
        job_id: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        result: &RunResult,
        text_cap: usize,
    ) -> Self {
        let result_text = if result.text.chars().count() > text_cap {
            result.text.chars().take(text_cap).collect()
        } else {
            result.text.clone()
        };
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            started_at,
            finished_at,
            duration_ms: result.duration_ms,
            cost_usd: result.cost_usd,
            num_turns: result.num_turns,
            is_error: result.is_error,
            result_text,
        }
    }
}

/// A job definition annotated with live scheduling state, as returned by
/// [`crate::engine::Scheduler::list_jobs`].
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    /// The effective definition
    pub definition: JobDefinition,
    /// Next fire time; computed on demand for jobs without a live timer
    pub next_run: Option<DateTime<Utc>>,
    /// Start time of the most recent run
    pub last_run: Option<DateTime<Utc>>,
    /// Total completed executions
    pub run_count: i64,
}
