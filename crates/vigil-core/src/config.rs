//! Scheduler configuration and the static job file
//!
//! The static definition source is a TOML document with an optional
//! `[scheduler]` section and one `[[job]]` table per definition:
//!
//! ```toml
//! [scheduler]
//! max_concurrent = 3
//!
//! [[job]]
//! id = "morning-digest"
//! schedule = "0 9 * * *"
//! timezone = "America/New_York"
//! prompt = "Summarize overnight alerts."
//! deliver_target = "#ops"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{JobDefinition, PromptSource};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum concurrent job executions
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Character cap applied to persisted result text
    #[serde(default = "default_result_text_cap")]
    pub result_text_cap: usize,
}

fn default_max_concurrent() -> usize {
    3
}

fn default_result_text_cap() -> usize {
    10_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            result_text_cap: default_result_text_cap(),
        }
    }
}

impl SchedulerConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max concurrent executions
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set the persisted result text cap
    pub fn with_result_text_cap(mut self, cap: usize) -> Self {
        self.result_text_cap = cap;
        self
    }
}

/// Parsed contents of a static job file.
#[derive(Debug, Clone)]
pub struct StaticJobs {
    /// The `[scheduler]` section, defaulted if absent
    pub scheduler: SchedulerConfig,
    /// The `[[job]]` definitions in file order
    pub jobs: Vec<JobDefinition>,
}

#[derive(Debug, Deserialize)]
struct JobsFile {
    #[serde(default)]
    scheduler: SchedulerConfig,
    #[serde(default, rename = "job")]
    jobs: Vec<JobEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobEntry {
    id: String,
    label: Option<String>,
    schedule: String,
    timezone: Option<String>,
    prompt: Option<String>,
    prompt_file: Option<PathBuf>,
    model: Option<String>,
    max_turns: Option<u32>,
    working_dir: Option<PathBuf>,
    deliver_target: Option<String>,
    #[serde(default = "default_true")]
    announce: bool,
    suppress_pattern: Option<String>,
    system_prompt: Option<String>,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool {
    true
}

impl JobEntry {
    fn into_definition(self) -> Result<JobDefinition> {
        let prompt = match (self.prompt, self.prompt_file) {
            (Some(text), None) => PromptSource::Text(text),
            (None, Some(path)) => PromptSource::File(path),
            (Some(_), Some(_)) => {
                return Err(Error::InvalidConfig(format!(
                    "job '{}': 'prompt' and 'prompt_file' are mutually exclusive",
                    self.id
                )))
            }
            (None, None) => {
                return Err(Error::InvalidConfig(format!(
                    "job '{}': one of 'prompt' or 'prompt_file' is required",
                    self.id
                )))
            }
        };

        Ok(JobDefinition {
            label: self.label.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            schedule_expression: self.schedule,
            timezone: self.timezone,
            prompt,
            model: self.model,
            max_turns: self.max_turns,
            working_dir: self.working_dir,
            deliver_target: self.deliver_target,
            announce: self.announce,
            suppress_pattern: self.suppress_pattern,
            system_prompt: self.system_prompt,
            enabled: self.enabled,
        })
    }
}

/// Load and validate a static job file.
///
/// Structural problems (missing prompt, duplicate ids) are rejected here;
/// malformed schedule expressions are not — those are a scheduling-time
/// concern, and one bad expression must not take down the rest of the file.
pub fn load_jobs_file(path: &Path) -> Result<StaticJobs> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::InvalidConfig(format!("failed to read job file {}: {e}", path.display()))
    })?;
    parse_jobs_file(&raw)
}

fn parse_jobs_file(raw: &str) -> Result<StaticJobs> {
    let file: JobsFile = toml::from_str(raw)
        .map_err(|e| Error::InvalidConfig(format!("invalid job file: {e}")))?;

    let mut seen = HashSet::new();
    let mut jobs = Vec::with_capacity(file.jobs.len());
    for entry in file.jobs {
        if !seen.insert(entry.id.clone()) {
            return Err(Error::InvalidConfig(format!(
                "duplicate job id '{}'",
                entry.id
            )));
        }
        jobs.push(entry.into_definition()?);
    }

    Ok(StaticJobs {
        scheduler: file.scheduler,
        jobs,
    })
}
