use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::job::{Job, JobOutcome, JobStatus};

/// Result of a conditional terminal write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finish {
    /// The job was pending and now carries the outcome.
    Applied(Job),
    /// The job had already reached a terminal state; nothing was written.
    AlreadyTerminal(Job),
    /// No live job with that id (never existed or deleted).
    Missing,
}

/// Durable storage of jobs keyed by id.
///
/// Implementations must be read-after-write consistent and must apply
/// `finish` atomically per job: the pending check and the write happen in
/// one critical section.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with `Duplicate` if a live job holds the id.
    async fn insert(&self, job: &Job) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// All live jobs, newest `created_at` first.
    async fn list(&self) -> Result<Vec<Job>, StoreError>;

    /// Live pending jobs, oldest first.
    async fn list_pending(&self) -> Result<Vec<Job>, StoreError>;

    async fn finish(
        &self,
        id: Uuid,
        outcome: &JobOutcome,
        at: DateTime<Utc>,
    ) -> Result<Finish, StoreError>;

    /// Number of live jobs per status. Statuses with no jobs may be absent.
    async fn count_by_status(&self) -> Result<HashMap<JobStatus, usize>, StoreError>;

    /// Remove a job from every read. Returns `false` if no live job matched.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Connectivity check used by the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job id already used: {0}")]
    Duplicate(Uuid),

    #[error("Corrupt job record: {0}")]
    Corrupt(String),
}
