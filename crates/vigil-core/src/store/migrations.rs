use super::StateStore;
use crate::error::Result;

impl StateStore {
    /// Run database migrations
    pub(super) async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_state (
                job_id TEXT PRIMARY KEY,
                last_run_at TIMESTAMP,
                next_run_at TIMESTAMP,
                run_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                last_duration_ms INTEGER,
                last_cost_usd REAL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_runs (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                started_at TIMESTAMP NOT NULL,
                finished_at TIMESTAMP NOT NULL,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                cost_usd REAL,
                num_turns INTEGER,
                is_error BOOLEAN NOT NULL DEFAULT FALSE,
                result_text TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_runs_job ON job_runs(job_id)")
            .execute(&mut *tx)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_state_next_run ON job_state(next_run_at)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}
