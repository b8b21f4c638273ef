use super::StateStore;
use crate::error::Result;
use crate::types::{JobState, RunRecord};
use chrono::{DateTime, Utc};

impl StateStore {
    /// Set a job's next fire time, creating the aggregate row if needed.
    pub async fn upsert_next_run(
        &self,
        job_id: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO job_state (job_id, next_run_at)
            VALUES (?, ?)
            ON CONFLICT(job_id) DO UPDATE SET next_run_at = excluded.next_run_at
            "#,
        )
        .bind(job_id)
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append a run record and fold it into the aggregate row.
    ///
    /// Both writes happen in one transaction so history and aggregate always
    /// reflect the same execution.
    pub async fn record_run(&self, record: &RunRecord) -> Result<()> {
        let last_error = record.is_error.then(|| record.result_text.clone());

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO job_runs (
                id, job_id, started_at, finished_at, duration_ms,
                cost_usd, num_turns, is_error, result_text
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.job_id)
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(record.duration_ms)
        .bind(record.cost_usd)
        .bind(record.num_turns)
        .bind(record.is_error)
        .bind(&record.result_text)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO job_state (
                job_id, last_run_at, run_count, last_error, last_duration_ms, last_cost_usd
            ) VALUES (?, ?, 1, ?, ?, ?)
            ON CONFLICT(job_id) DO UPDATE SET
                last_run_at = excluded.last_run_at,
                run_count = job_state.run_count + 1,
                last_error = excluded.last_error,
                last_duration_ms = excluded.last_duration_ms,
                last_cost_usd = excluded.last_cost_usd
            "#,
        )
        .bind(&record.job_id)
        .bind(record.started_at)
        .bind(last_error)
        .bind(record.duration_ms)
        .bind(record.cost_usd)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Read a job's aggregate state by exact id.
    pub async fn read_state(&self, job_id: &str) -> Result<Option<JobState>> {
        let state = sqlx::query_as("SELECT * FROM job_state WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(state)
    }

    /// List every aggregate row.
    pub async fn list_states(&self) -> Result<Vec<JobState>> {
        let states = sqlx::query_as("SELECT * FROM job_state ORDER BY job_id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(states)
    }

    /// Most-recent-first run history for a job.
    ///
    /// Exact id first; when nothing matches, ids beginning with `"{job_id}-"`
    /// are tried, so a dynamic schedule can be queried by its owning agent's
    /// id.
    pub async fn run_history(&self, job_id: &str, limit: i64) -> Result<Vec<RunRecord>> {
        let records: Vec<RunRecord> = sqlx::query_as(
            r#"
            SELECT * FROM job_runs
            WHERE job_id = ?
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(job_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        if !records.is_empty() {
            return Ok(records);
        }

        let records = sqlx::query_as(
            r#"
            SELECT * FROM job_runs
            WHERE job_id LIKE ? || '-%'
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(job_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
