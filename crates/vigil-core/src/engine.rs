//! Scheduler execution engine
//!
//! Owns the effective job set and one timer task per enabled job. Each timer
//! computes the next fire time, persists it, sleeps, then awaits the
//! execution path to completion before re-arming, so a timer never re-fires
//! while its previous firing is still executing. The execution path itself
//! enforces per-job overlap prevention and the system-wide slot cap, records
//! every completed attempt, and hands announced results to the delivery
//! sink.

use chrono::Utc;
use dashmap::DashSet;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::exec::{DeliverySink, JobExecutor, RunOutcome, RunResult};
use crate::schedule::Schedule;
use crate::slots::SlotPool;
use crate::sources::{merge_sources, DynamicSource};
use crate::store::StateStore;
use crate::types::{JobDefinition, JobSnapshot, RunRecord};

/// One enabled definition bound to one live timer.
struct JobHandle {
    schedule: Schedule,
    cancel: CancellationToken,
}

struct SchedulerInner {
    config: SchedulerConfig,
    store: Arc<StateStore>,
    slots: SlotPool,
    executor: Arc<dyn JobExecutor>,
    delivery: Option<Arc<dyn DeliverySink>>,
    dynamic: Option<Arc<dyn DynamicSource>>,
    static_jobs: Vec<JobDefinition>,
    handles: RwLock<HashMap<String, JobHandle>>,
    // Transient by design: a crash mid-run must not leave a job permanently
    // blocked, so this set is never persisted.
    running: DashSet<String>,
}

/// Scheduled job execution engine.
///
/// Cheap to clone; all clones drive the same engine.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Start building a scheduler.
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Merge the definition sources and bind a timer to every enabled job
    /// not already bound.
    ///
    /// A definition with a malformed schedule expression is logged and
    /// excluded from the live timer set; it never fails the engine.
    pub async fn start(&self) -> Result<()> {
        let jobs = self.inner.effective_jobs().await;
        let mut handles = self.inner.handles.write().await;
        let mut bound = 0usize;

        for definition in jobs {
            if !definition.enabled || handles.contains_key(&definition.id) {
                continue;
            }

            let schedule = match Schedule::parse(
                &definition.schedule_expression,
                definition.timezone.as_deref(),
            ) {
                Ok(schedule) => schedule,
                Err(e) => {
                    warn!(job_id = %definition.id, error = %e, "invalid schedule; job excluded");
                    continue;
                }
            };

            if let Some(next) = schedule.next_after(Utc::now()) {
                self.inner.store.upsert_next_run(&definition.id, next).await?;
            }

            let cancel = CancellationToken::new();
            handles.insert(
                definition.id.clone(),
                JobHandle {
                    schedule: schedule.clone(),
                    cancel: cancel.clone(),
                },
            );
            spawn_timer(self.inner.clone(), definition, schedule, cancel);
            bound += 1;
        }

        info!(jobs = bound, "scheduler started");
        Ok(())
    }

    /// Stop every live timer.
    ///
    /// In-flight executions are not cancelled; they run to completion and
    /// still write their records.
    pub async fn stop(&self) {
        let mut handles = self.inner.handles.write().await;
        for handle in handles.values() {
            handle.cancel.cancel();
        }
        let stopped = handles.len();
        handles.clear();
        info!(jobs = stopped, "scheduler stopped");
    }

    /// Tear down all timers and re-merge the sources.
    ///
    /// Call after the dynamic store changed out-of-band.
    pub async fn reload(&self) -> Result<()> {
        self.stop().await;
        self.start().await
    }

    /// Trigger a job immediately, bypassing its timer.
    ///
    /// The id is resolved exactly first, then as a derived-alias prefix
    /// (`"{id}-"`), so a dynamic schedule can be triggered by its owning
    /// agent's id. Overlap prevention and the slot cap still apply.
    pub async fn run_now(&self, id: &str) -> Result<RunOutcome> {
        let jobs = self.inner.effective_jobs().await;
        let alias = format!("{id}-");
        let definition = jobs
            .iter()
            .find(|job| job.id == id)
            .or_else(|| jobs.iter().find(|job| job.id.starts_with(&alias)))
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;

        self.inner.execute_job(definition).await
    }

    /// The effective definitions annotated with live scheduling state.
    ///
    /// Jobs without a live timer (disabled, or excluded for a malformed
    /// expression that has since been fixed) get their next fire time
    /// computed on demand.
    pub async fn list_jobs(&self) -> Result<Vec<JobSnapshot>> {
        let jobs = self.inner.effective_jobs().await;
        let states: HashMap<String, (Option<chrono::DateTime<Utc>>, i64)> = self
            .inner
            .store
            .list_states()
            .await?
            .into_iter()
            .map(|state| (state.job_id.clone(), (state.last_run_at, state.run_count)))
            .collect();

        let handles = self.inner.handles.read().await;
        let now = Utc::now();

        Ok(jobs
            .into_iter()
            .map(|definition| {
                let next_run = handles
                    .get(&definition.id)
                    .map(|handle| handle.schedule.clone())
                    .or_else(|| {
                        Schedule::parse(
                            &definition.schedule_expression,
                            definition.timezone.as_deref(),
                        )
                        .ok()
                    })
                    .and_then(|schedule| schedule.next_after(now));
                let (last_run, run_count) = states
                    .get(&definition.id)
                    .cloned()
                    .unwrap_or((None, 0));
                JobSnapshot {
                    definition,
                    next_run,
                    last_run,
                    run_count,
                }
            })
            .collect())
    }

    /// Most-recent-first run history for a job id or derived alias.
    pub async fn run_history(&self, id: &str, limit: i64) -> Result<Vec<RunRecord>> {
        self.inner.store.run_history(id, limit).await
    }

    /// Number of jobs currently executing.
    pub fn running_count(&self) -> usize {
        self.inner.running.len()
    }

    /// Number of free execution slots.
    pub fn available_slots(&self) -> usize {
        self.inner.slots.available()
    }
}

impl SchedulerInner {
    async fn effective_jobs(&self) -> Vec<JobDefinition> {
        merge_sources(&self.static_jobs, self.dynamic.as_deref()).await
    }

    /// The execution path shared by timer fires and manual triggers.
    ///
    /// The running-flag check-and-set is synchronous and happens before any
    /// suspension point; there is no window between "check not running" and
    /// "mark running".
    async fn execute_job(&self, definition: &JobDefinition) -> Result<RunOutcome> {
        if !self.running.insert(definition.id.clone()) {
            debug!(job_id = %definition.id, "previous execution still in flight; skipping");
            return Ok(RunOutcome::Skipped);
        }

        let outcome = self.run_exclusive(definition).await;
        // The slot permit was released inside run_exclusive; clear the flag last.
        self.running.remove(&definition.id);
        outcome.map(RunOutcome::Ran)
    }

    async fn run_exclusive(&self, definition: &JobDefinition) -> Result<RunResult> {
        let _slot = self.slots.acquire().await;

        info!(job_id = %definition.id, label = %definition.label, "executing job");
        let started_at = Utc::now();
        let started = tokio::time::Instant::now();

        let result = match self.executor.execute(definition).await {
            Ok(result) => result,
            Err(e) => {
                warn!(job_id = %definition.id, error = %e, "executor failed");
                RunResult::error(e.to_string(), started.elapsed().as_millis() as i64)
            }
        };
        let finished_at = Utc::now();

        let record = RunRecord::from_result(
            &definition.id,
            started_at,
            finished_at,
            &result,
            self.config.result_text_cap,
        );
        self.store.record_run(&record).await?;

        // A manual trigger on a definition whose expression never parsed
        // leaves the stored next-run untouched.
        if let Ok(schedule) = Schedule::parse(
            &definition.schedule_expression,
            definition.timezone.as_deref(),
        ) {
            if let Some(next) = schedule.next_after(finished_at) {
                self.store.upsert_next_run(&definition.id, next).await?;
            }
        }

        self.announce(definition, &result).await;

        info!(
            job_id = %definition.id,
            is_error = result.is_error,
            duration_ms = result.duration_ms,
            "job finished"
        );
        Ok(result)
    }

    async fn announce(&self, definition: &JobDefinition, result: &RunResult) {
        if !definition.announce {
            return;
        }
        let Some(target) = definition.deliver_target.as_deref() else {
            debug!(job_id = %definition.id, "announce set but no deliver target");
            return;
        };
        if let Some(pattern) = definition.suppress_pattern.as_deref() {
            match Regex::new(pattern) {
                Ok(re) if re.is_match(&result.text) => {
                    debug!(job_id = %definition.id, "result matched suppress pattern; delivery withheld");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(job_id = %definition.id, error = %e, "invalid suppress pattern; delivering anyway");
                }
            }
        }
        let Some(sink) = &self.delivery else {
            return;
        };
        if let Err(e) = sink.deliver(target, &result.text).await {
            warn!(job_id = %definition.id, deliver_target = target, error = %e, "delivery failed");
        }
    }
}

/// Drive one job's timer until cancelled.
fn spawn_timer(
    inner: Arc<SchedulerInner>,
    definition: JobDefinition,
    schedule: Schedule,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let Some(next) = schedule.next_after(now) else {
                warn!(job_id = %definition.id, "schedule has no future fire time; timer exiting");
                break;
            };
            if let Err(e) = inner.store.upsert_next_run(&definition.id, next).await {
                warn!(job_id = %definition.id, error = %e, "failed to persist next run time");
            }

            let wait = (next - now).to_std().unwrap_or_default();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            // Deliberately outside the select: cancellation stops future
            // firings only, never an execution already in flight.
            if let Err(e) = inner.execute_job(&definition).await {
                error!(job_id = %definition.id, error = %e, "scheduled execution failed");
            }

            if cancel.is_cancelled() {
                break;
            }
        }
        debug!(job_id = %definition.id, "timer stopped");
    });
}

/// Builder for [`Scheduler`]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    store: Option<Arc<StateStore>>,
    executor: Option<Arc<dyn JobExecutor>>,
    delivery: Option<Arc<dyn DeliverySink>>,
    dynamic: Option<Arc<dyn DynamicSource>>,
    static_jobs: Vec<JobDefinition>,
}

impl SchedulerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            store: None,
            executor: None,
            delivery: None,
            dynamic: None,
            static_jobs: Vec::new(),
        }
    }

    /// Set the configuration
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the state store
    pub fn store(mut self, store: Arc<StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the task executor collaborator
    pub fn executor(mut self, executor: Arc<dyn JobExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the delivery sink collaborator
    pub fn delivery(mut self, delivery: Arc<dyn DeliverySink>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// Set the dynamic definition source
    pub fn dynamic_source(mut self, source: Arc<dyn DynamicSource>) -> Self {
        self.dynamic = Some(source);
        self
    }

    /// Set the static definition list
    pub fn static_jobs(mut self, jobs: Vec<JobDefinition>) -> Self {
        self.static_jobs = jobs;
        self
    }

    /// Build the scheduler
    pub fn build(self) -> Result<Scheduler> {
        let store = self
            .store
            .ok_or_else(|| Error::InvalidConfig("store is required".to_string()))?;
        let executor = self
            .executor
            .ok_or_else(|| Error::InvalidConfig("executor is required".to_string()))?;

        let slots = SlotPool::new(self.config.max_concurrent);
        Ok(Scheduler {
            inner: Arc::new(SchedulerInner {
                config: self.config,
                store,
                slots,
                executor,
                delivery: self.delivery,
                dynamic: self.dynamic,
                static_jobs: self.static_jobs,
                handles: RwLock::new(HashMap::new()),
                running: DashSet::new(),
            }),
        })
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
