use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use super::store::{Finish, JobStore, StoreError};
use crate::models::job::{Job, JobOutcome, JobStatus};

const JOB_COLUMNS: &str =
    "id, prompt, status, image_url, error_message, created_at, completed_at, failed_at";

/// PostgreSQL-backed job store.
///
/// Deletes are soft: the row keeps its primary key (so the id can never be
/// issued again) and `deleted_at` hides it from every read.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_job(row: &PgRow) -> Result<Job, StoreError> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str)
        .map_err(|_| StoreError::Corrupt(format!("unknown status '{}'", status_str)))?;

    Ok(Job {
        id: row.try_get("id")?,
        prompt: row.try_get("prompt")?,
        status,
        image_url: row.try_get("image_url")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
        failed_at: row.try_get("failed_at")?,
    })
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO image_jobs (id, prompt, status, image_url, error_message,
                                    created_at, completed_at, failed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(job.id)
        .bind(&job.prompt)
        .bind(job.status.to_string())
        .bind(&job.image_url)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.completed_at)
        .bind(job.failed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate(job.id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM image_jobs WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM image_jobs WHERE deleted_at IS NULL \
             ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_job).collect()
    }

    async fn list_pending(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM image_jobs \
             WHERE status = 'pending' AND deleted_at IS NULL \
             ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_job).collect()
    }

    async fn count_by_status(&self) -> Result<HashMap<JobStatus, usize>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS total
            FROM image_jobs
            WHERE deleted_at IS NULL
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for row in rows {
            let status_str: String = row.try_get("status")?;
            let status = JobStatus::from_str(&status_str)
                .map_err(|_| StoreError::Corrupt(format!("unknown status '{}'", status_str)))?;
            let total: i64 = row.try_get("total")?;
            counts.insert(status, total as usize);
        }
        Ok(counts)
    }

    async fn finish(
        &self,
        id: Uuid,
        outcome: &JobOutcome,
        at: DateTime<Utc>,
    ) -> Result<Finish, StoreError> {
        let (image_url, error_message) = match outcome {
            JobOutcome::Completed { image_url } => (Some(image_url.as_str()), None),
            JobOutcome::Failed { error_message } => (None, Some(error_message.as_str())),
        };

        // The status predicate makes the terminal write a single atomic
        // compare-and-set; concurrent callbacks cannot both match.
        let updated = sqlx::query(&format!(
            r#"
            UPDATE image_jobs
            SET status = $2,
                image_url = $3,
                error_message = $4,
                completed_at = CASE WHEN $2 = 'completed' THEN $5 ELSE NULL END,
                failed_at = CASE WHEN $2 = 'failed' THEN $5 ELSE NULL END
            WHERE id = $1 AND status = 'pending' AND deleted_at IS NULL
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(outcome.status().to_string())
        .bind(image_url)
        .bind(error_message)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(Finish::Applied(row_to_job(&row)?));
        }

        Ok(match self.get(id).await? {
            Some(job) => Finish::AlreadyTerminal(job),
            None => Finish::Missing,
        })
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE image_jobs
            SET deleted_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
