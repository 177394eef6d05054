use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::JobStore;
use crate::models::job::{Job, JobStatus};
use crate::services::lifecycle::JobError;

/// Optional narrowing of a listing.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub status: Option<JobStatus>,
    pub limit: Option<usize>,
}

/// Read-only view of the job store.
///
/// Every call is a fresh snapshot; observers re-list to see progress.
#[derive(Clone)]
pub struct JobListing {
    store: Arc<dyn JobStore>,
}

impl JobListing {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// All jobs, newest `created_at` first.
    pub async fn list(&self) -> Result<Vec<Job>, JobError> {
        self.list_filtered(&ListQuery::default()).await
    }

    pub async fn list_filtered(&self, query: &ListQuery) -> Result<Vec<Job>, JobError> {
        let mut jobs = self.store.list().await?;

        // Order is by creation time regardless of what the store returned.
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        if let Some(status) = query.status {
            jobs.retain(|job| job.status == status);
        }
        if let Some(limit) = query.limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    /// Number of jobs per status.
    pub async fn counts(&self) -> Result<BTreeMap<String, usize>, JobError> {
        let mut counts = BTreeMap::new();
        for status in [JobStatus::Pending, JobStatus::Completed, JobStatus::Failed] {
            counts.insert(status.to_string(), 0);
        }
        for (status, total) in self.store.count_by_status().await? {
            counts.insert(status.to_string(), total);
        }
        Ok(counts)
    }
}
