use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of an image generation job.
///
/// `Pending` is the only non-terminal state. Once a job is `Completed` or
/// `Failed` it never changes again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// Terminal result of a generation attempt, applied to a pending job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { image_url: String },
    Failed { error_message: String },
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed { .. } => JobStatus::Completed,
            JobOutcome::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// A prompt-to-image generation job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub prompt: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn pending(id: Uuid, prompt: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            prompt,
            status: JobStatus::Pending,
            image_url: None,
            error_message: None,
            created_at,
            completed_at: None,
            failed_at: None,
        }
    }

    /// Apply a terminal outcome. Returns `false` and leaves the job untouched
    /// if it already left `Pending`.
    pub fn apply(&mut self, outcome: &JobOutcome, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        match outcome {
            JobOutcome::Completed { image_url } => {
                self.status = JobStatus::Completed;
                self.image_url = Some(image_url.clone());
                self.completed_at = Some(at);
            }
            JobOutcome::Failed { error_message } => {
                self.status = JobStatus::Failed;
                self.error_message = Some(error_message.clone());
                self.failed_at = Some(at);
            }
        }
        true
    }
}
