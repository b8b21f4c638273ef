//! Vigil Core - Scheduled Agent Job Engine
//!
//! This crate runs recurring, autonomous agent jobs on cron-like or interval
//! schedules. It guarantees that a job never has two executions in flight at
//! once, bounds total concurrent executions with a FIFO slot pool, persists
//! run history and next-fire timestamps across restarts, and optionally
//! forwards each run's result to a delivery collaborator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │    Scheduler     │  Per-job timers, overlap prevention, execute path
//! └────────┬─────────┘
//!          │
//!    ┌─────┴──────┬─────────────┬──────────────┐
//!    ▼            ▼             ▼              ▼
//! ┌────────┐ ┌──────────┐ ┌───────────┐ ┌────────────┐
//! │Schedule│ │ SlotPool │ │StateStore │ │   merger   │
//! │  eval  │ │ (FIFO ⩽3)│ │ (SQLite)  │ │static+dyn  │
//! └────────┘ └──────────┘ └───────────┘ └────────────┘
//! ```
//!
//! The work itself is delegated to collaborators: a [`JobExecutor`] performs
//! a job and reports a [`RunResult`]; a [`DeliverySink`] forwards announced
//! results; a [`DynamicSource`] supplies live-editable definitions that
//! override the static list by id.
//!
//! # Example
//!
//! ```ignore
//! use vigil_core::{load_jobs_file, Scheduler, StateStore};
//! use std::sync::Arc;
//!
//! let static_jobs = load_jobs_file(&config_dir.join("jobs.toml"))?;
//! let store = Arc::new(StateStore::from_path(&data_dir.join("vigil.db")).await?);
//!
//! let scheduler = Scheduler::builder()
//!     .config(static_jobs.scheduler)
//!     .store(store)
//!     .executor(executor)
//!     .delivery(sink)
//!     .dynamic_source(agents_db)
//!     .static_jobs(static_jobs.jobs)
//!     .build()?;
//!
//! scheduler.start().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod schedule;
pub mod slots;
pub mod sources;
pub mod store;
pub mod types;

pub use config::{load_jobs_file, SchedulerConfig, StaticJobs};
pub use engine::{Scheduler, SchedulerBuilder};
pub use error::{Error, Result};
pub use exec::{DeliverySink, JobExecutor, RunOutcome, RunResult};
pub use schedule::Schedule;
pub use slots::{SlotPermit, SlotPool};
pub use sources::{AgentRecord, DynamicJob, DynamicSource, ScheduleRecord};
pub use store::StateStore;
pub use types::{JobDefinition, JobSnapshot, JobState, PromptSource, RunRecord};
