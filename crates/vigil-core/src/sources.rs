//! Job definition sources and the source merger
//!
//! The engine owns definitions from two places: a static list supplied at
//! construction, and a dynamic store of (schedule, agent) pairs read through
//! the [`DynamicSource`] collaborator. The merger reconciles them into one
//! effective set keyed by id, dynamic entries taking full precedence — no
//! field-level merging. The set is recomputed from scratch on every
//! `start()`/`reload()`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

use crate::types::{JobDefinition, PromptSource};

/// A schedule row from the dynamic store, pre-filtered to enabled rows.
///
/// Schedule ids are conventionally derived from the owning agent's id
/// (`"<agent_id>-default"` for an agent's only schedule), which is what makes
/// the engine's prefix-alias lookups resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRecord {
    /// Schedule id; becomes the effective job id
    pub id: String,
    /// Owning agent
    pub agent_id: String,
    /// Cron or interval expression
    pub expression: String,
    /// IANA timezone name
    pub timezone: Option<String>,
    /// Prompt text for each run
    pub prompt: String,
    /// Delivery target for run results
    pub deliver_target: Option<String>,
    /// Whether run results are delivered
    pub announce: bool,
    /// Regex withholding delivery of matching results
    pub suppress_pattern: Option<String>,
}

/// An agent row from the dynamic store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent id
    pub id: String,
    /// Human-readable agent name
    pub label: String,
    /// Model the agent runs on
    pub model: Option<String>,
    /// Turn budget per run
    pub max_turns: Option<u32>,
    /// Working directory for runs
    pub working_dir: Option<PathBuf>,
    /// System prompt override
    pub system_prompt: Option<String>,
}

/// One joined (schedule, agent) pair from the dynamic store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicJob {
    /// The schedule row
    pub schedule: ScheduleRecord,
    /// The agent it runs
    pub agent: AgentRecord,
}

impl DynamicJob {
    /// Translate into the common definition shape.
    pub fn into_definition(self) -> JobDefinition {
        JobDefinition {
            id: self.schedule.id,
            label: self.agent.label,
            schedule_expression: self.schedule.expression,
            timezone: self.schedule.timezone,
            prompt: PromptSource::Text(self.schedule.prompt),
            model: self.agent.model,
            max_turns: self.agent.max_turns,
            working_dir: self.agent.working_dir,
            deliver_target: self.schedule.deliver_target,
            announce: self.schedule.announce,
            suppress_pattern: self.schedule.suppress_pattern,
            system_prompt: self.agent.system_prompt,
            enabled: true,
        }
    }
}

/// Read-only view of the dynamic job store.
///
/// Called on every `start()`/`reload()`, so implementations should be cheap
/// to query repeatedly.
#[async_trait]
pub trait DynamicSource: Send + Sync {
    /// Fetch the enabled (schedule, agent) pairs.
    async fn fetch_enabled(&self) -> anyhow::Result<Vec<DynamicJob>>;
}

/// Merge the static list with the dynamic store into the effective set.
///
/// Dynamic entries replace static entries sharing an id. A dynamic read
/// failure degrades to static-only scheduling rather than failing the
/// caller.
pub(crate) async fn merge_sources(
    static_jobs: &[JobDefinition],
    dynamic: Option<&dyn DynamicSource>,
) -> Vec<JobDefinition> {
    let mut merged: BTreeMap<String, JobDefinition> = static_jobs
        .iter()
        .map(|job| (job.id.clone(), job.clone()))
        .collect();

    if let Some(source) = dynamic {
        match source.fetch_enabled().await {
            Ok(rows) => {
                for row in rows {
                    let definition = row.into_definition();
                    merged.insert(definition.id.clone(), definition);
                }
            }
            Err(e) => {
                warn!(error = %e, "dynamic source unavailable; scheduling static definitions only");
            }
        }
    }

    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_job(id: &str) -> JobDefinition {
        JobDefinition::new(id, "0 9 * * *", PromptSource::Text("static prompt".into()))
    }

    fn dynamic_job(schedule_id: &str, agent_id: &str) -> DynamicJob {
        DynamicJob {
            schedule: ScheduleRecord {
                id: schedule_id.to_string(),
                agent_id: agent_id.to_string(),
                expression: "every 10m".to_string(),
                timezone: Some("Europe/Berlin".to_string()),
                prompt: "dynamic prompt".to_string(),
                deliver_target: Some("#ops".to_string()),
                announce: true,
                suppress_pattern: None,
            },
            agent: AgentRecord {
                id: agent_id.to_string(),
                label: "Reporter".to_string(),
                model: Some("opus".to_string()),
                max_turns: Some(12),
                working_dir: None,
                system_prompt: None,
            },
        }
    }

    struct FixedSource(Vec<DynamicJob>);

    #[async_trait]
    impl DynamicSource for FixedSource {
        async fn fetch_enabled(&self) -> anyhow::Result<Vec<DynamicJob>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl DynamicSource for BrokenSource {
        async fn fetch_enabled(&self) -> anyhow::Result<Vec<DynamicJob>> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_dynamic_overrides_static_on_id_collision() {
        let statics = vec![static_job("reporter-default"), static_job("digest")];
        let source = FixedSource(vec![dynamic_job("reporter-default", "reporter")]);

        let merged = merge_sources(&statics, Some(&source)).await;
        assert_eq!(merged.len(), 2);

        let reporter = merged.iter().find(|j| j.id == "reporter-default").unwrap();
        assert_eq!(reporter.model.as_deref(), Some("opus"));
        assert_eq!(reporter.schedule_expression, "every 10m");

        let digest = merged.iter().find(|j| j.id == "digest").unwrap();
        assert!(digest.model.is_none());
    }

    #[tokio::test]
    async fn test_read_failure_degrades_to_static_only() {
        let statics = vec![static_job("digest")];
        let merged = merge_sources(&statics, Some(&BrokenSource)).await;
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "digest");
    }

    #[tokio::test]
    async fn test_translation_maps_agent_and_schedule_fields() {
        let def = dynamic_job("reporter-default", "reporter").into_definition();
        assert_eq!(def.id, "reporter-default");
        assert_eq!(def.label, "Reporter");
        assert_eq!(def.timezone.as_deref(), Some("Europe/Berlin"));
        assert_eq!(def.max_turns, Some(12));
        assert_eq!(def.deliver_target.as_deref(), Some("#ops"));
        assert_eq!(def.prompt, PromptSource::Text("dynamic prompt".into()));
        assert!(def.enabled);
    }

    #[tokio::test]
    async fn test_no_dynamic_source_keeps_static_set() {
        let statics = vec![static_job("a"), static_job("b")];
        let merged = merge_sources(&statics, None).await;
        assert_eq!(merged.len(), 2);
    }
}
