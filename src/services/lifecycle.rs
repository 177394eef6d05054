//! Job lifecycle: submission, dispatch to the generation backend and the
//! single terminal transition of each job.
//!
//! Submit persists a `pending` job and returns at once. Generation runs on
//! its own tokio task, bounded by a semaphore shared across all jobs. The
//! outcome is recorded through [`JobManager::complete`] or
//! [`JobManager::fail`], which only ever write to a job that is still
//! pending. Callbacks for deleted jobs are discarded.

use chrono::{DateTime, Duration as ChronoDuration, SubsecRound, Utc};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::db::{Finish, JobStore, StoreError};
use crate::models::job::{Job, JobOutcome, JobStatus};
use crate::services::generator::{generate_with_deadline, GenerationError, ImageGenerator};

/// Explicit retry policy for failed generation attempts.
///
/// `max_attempts = 1` (the default) disables retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, doubling from `initial_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Maximum prompt length in characters, after trimming.
    pub max_prompt_length: usize,
    /// Simultaneous backend calls across all jobs.
    pub max_concurrent_generations: usize,
    pub generation_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            max_prompt_length: 2000,
            max_concurrent_generations: 4,
            generation_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

/// What a completion or failure callback did to the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The job left `pending` with this callback.
    Applied(Job),
    /// The job was already terminal; it is returned unchanged.
    Ignored(Job),
    /// The job no longer exists.
    Discarded,
}

/// Hands out strictly increasing creation timestamps.
#[derive(Debug, Default)]
struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Microsecond resolution survives a round trip through Postgres timestamptz.
        let mut now = Utc::now().trunc_subsecs(6);
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + ChronoDuration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}

#[derive(Clone)]
pub struct JobManager {
    store: Arc<dyn JobStore>,
    generator: Arc<dyn ImageGenerator>,
    permits: Arc<Semaphore>,
    clock: Arc<MonotonicClock>,
    settings: Arc<ManagerSettings>,
}

impl JobManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        generator: Arc<dyn ImageGenerator>,
        settings: ManagerSettings,
    ) -> Self {
        let permits = settings.max_concurrent_generations.max(1);
        Self {
            store,
            generator,
            permits: Arc::new(Semaphore::new(permits)),
            clock: Arc::new(MonotonicClock::default()),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Create a pending job and start generating its image in the background.
    pub async fn submit(&self, prompt: &str) -> Result<Job, JobError> {
        let prompt = self.validate_prompt(prompt)?;
        let job = Job::pending(Uuid::new_v4(), prompt, self.clock.now());

        self.store.insert(&job).await?;

        metrics::counter!("image_jobs_submitted_total").increment(1);
        tracing::info!(job_id = %job.id, "Image job submitted");

        self.dispatch(job.clone());
        Ok(job)
    }

    pub async fn get(&self, id: Uuid) -> Result<Job, JobError> {
        self.store.get(id).await?.ok_or(JobError::NotFound(id))
    }

    /// Remove a job. An in-flight generation keeps running; its result is
    /// dropped when it arrives.
    pub async fn delete(&self, id: Uuid) -> Result<(), JobError> {
        if !self.store.delete(id).await? {
            return Err(JobError::NotFound(id));
        }
        tracing::info!(job_id = %id, "Image job deleted");
        Ok(())
    }

    /// Record a successful generation.
    pub async fn complete(&self, id: Uuid, image_url: String) -> Result<Transition, JobError> {
        self.finish(id, JobOutcome::Completed { image_url }).await
    }

    /// Record a failed generation.
    pub async fn fail(&self, id: Uuid, error_message: String) -> Result<Transition, JobError> {
        self.finish(id, JobOutcome::Failed { error_message }).await
    }

    /// Re-dispatch every job still pending in the store, e.g. after a restart.
    pub async fn resume_pending(&self) -> Result<usize, JobError> {
        let pending = self.store.list_pending().await?;
        let count = pending.len();
        for job in pending {
            self.dispatch(job);
        }
        if count > 0 {
            tracing::info!(count, "Resumed pending image jobs");
        }
        Ok(count)
    }

    fn validate_prompt(&self, prompt: &str) -> Result<String, JobError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(JobError::InvalidArgument("prompt must not be empty".to_string()));
        }

        let length = prompt.chars().count();
        if length > self.settings.max_prompt_length {
            return Err(JobError::InvalidArgument(format!(
                "prompt is {} characters, maximum is {}",
                length, self.settings.max_prompt_length
            )));
        }
        Ok(prompt.to_string())
    }

    async fn finish(&self, id: Uuid, outcome: JobOutcome) -> Result<Transition, JobError> {
        let status = outcome.status();
        let transition = match self.store.finish(id, &outcome, Utc::now()).await? {
            Finish::Applied(job) => Transition::Applied(job),
            Finish::AlreadyTerminal(job) => Transition::Ignored(job),
            Finish::Missing => Transition::Discarded,
        };

        match &transition {
            Transition::Applied(job) => {
                match status {
                    JobStatus::Completed => {
                        metrics::counter!("image_jobs_completed_total").increment(1);
                        tracing::info!(job_id = %id, "Image job completed");
                    }
                    _ => {
                        metrics::counter!("image_jobs_failed_total").increment(1);
                        tracing::warn!(
                            job_id = %id,
                            error = job.error_message.as_deref().unwrap_or_default(),
                            "Image job failed"
                        );
                    }
                }
            }
            Transition::Ignored(job) => {
                tracing::debug!(
                    job_id = %id,
                    status = %job.status,
                    attempted = %status,
                    "Ignoring callback for terminal job"
                );
            }
            Transition::Discarded => {
                metrics::counter!("image_jobs_discarded_callbacks_total").increment(1);
                tracing::debug!(job_id = %id, "Discarding callback for deleted job");
            }
        }

        Ok(transition)
    }

    fn dispatch(&self, job: Job) {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_generation(job).await;
        });
    }

    /// Still worth generating: present and pending. A store error is not
    /// treated as a deletion; the attempt goes ahead.
    async fn still_pending(&self, id: Uuid) -> bool {
        match self.store.get(id).await {
            Ok(Some(job)) => job.status == JobStatus::Pending,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Could not re-check job before generation");
                true
            }
        }
    }

    async fn run_generation(&self, job: Job) {
        let retry = &self.settings.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = {
                let Ok(_permit) = self.permits.acquire().await else {
                    tracing::error!(job_id = %job.id, "Generation semaphore closed");
                    return;
                };

                if !self.still_pending(job.id).await {
                    tracing::debug!(job_id = %job.id, "Job no longer pending, skipping generation");
                    return;
                }

                tracing::debug!(job_id = %job.id, attempt, "Calling generation backend");
                metrics::gauge!("image_generations_in_flight").increment(1.0);
                let start = Instant::now();

                let result = generate_with_deadline(
                    self.generator.as_ref(),
                    &job.prompt,
                    self.settings.generation_timeout,
                )
                .await;

                metrics::gauge!("image_generations_in_flight").decrement(1.0);
                metrics::histogram!("image_generation_seconds").record(start.elapsed().as_secs_f64());
                result
            };

            let outcome = match result {
                Ok(image) => JobOutcome::Completed {
                    image_url: image.into_image_url(),
                },
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    let delay = retry.backoff(attempt);
                    tracing::warn!(
                        job_id = %job.id,
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Generation attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                Err(e) => JobOutcome::Failed {
                    error_message: failure_message(&e, attempt),
                },
            };

            self.record_outcome(job.id, outcome).await;
            return;
        }
    }

    /// Persist a generation outcome, retrying store failures until the write
    /// lands.
    async fn record_outcome(&self, id: Uuid, outcome: JobOutcome) {
        let mut write_attempt = 1;
        loop {
            match self.finish(id, outcome.clone()).await {
                Ok(_) => return,
                Err(e) => {
                    let delay = self.settings.retry.backoff(write_attempt);
                    tracing::error!(
                        job_id = %id,
                        write_attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Failed to record generation outcome, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    write_attempt += 1;
                }
            }
        }
    }
}

fn failure_message(error: &GenerationError, attempts: u32) -> String {
    if attempts > 1 {
        format!("{} (after {} attempts)", error, attempts)
    } else {
        error.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Job store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}
