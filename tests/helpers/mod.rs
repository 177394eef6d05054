//! Scripted generation backends and polling helpers shared by the tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::sleep;
use uuid::Uuid;

use image_jobs::db::{JobStore, MemoryJobStore};
use image_jobs::models::job::{Job, JobStatus};
use image_jobs::services::generator::{GeneratedImage, GenerationError, ImageGenerator};
use image_jobs::services::lifecycle::{JobManager, ManagerSettings};

pub type GenerationResult = Result<GeneratedImage, GenerationError>;

/// Succeeds with `http://x/<prompt>.jpg` after an optional delay.
pub struct StaticGenerator {
    pub delay: Duration,
}

#[async_trait]
impl ImageGenerator for StaticGenerator {
    async fn generate(&self, prompt: &str) -> GenerationResult {
        sleep(self.delay).await;
        Ok(GeneratedImage::Url(format!("http://x/{}.jpg", prompt.replace(' ', "-"))))
    }
}

/// Always rejects the prompt.
pub struct RejectingGenerator;

#[async_trait]
impl ImageGenerator for RejectingGenerator {
    async fn generate(&self, _prompt: &str) -> GenerationResult {
        Err(GenerationError::Rejected("prompt blocked: SAFETY".to_string()))
    }
}

/// Never resolves; callbacks are delivered by hand.
pub struct StalledGenerator;

#[async_trait]
impl ImageGenerator for StalledGenerator {
    async fn generate(&self, _prompt: &str) -> GenerationResult {
        std::future::pending().await
    }
}

/// Each prompt waits until the test releases it with a chosen result.
#[derive(Default)]
pub struct GatedGenerator {
    waiting: Mutex<HashMap<String, oneshot::Receiver<GenerationResult>>>,
    calls: AtomicUsize,
}

impl GatedGenerator {
    /// Register a gate for `prompt`; send on the returned sender to resolve it.
    pub fn gate(&self, prompt: &str) -> oneshot::Sender<GenerationResult> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().unwrap().insert(prompt.to_string(), rx);
        tx
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for GatedGenerator {
    async fn generate(&self, prompt: &str) -> GenerationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rx = self.waiting.lock().unwrap().remove(prompt);
        match rx {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(GenerationError::Malformed("gate dropped".to_string()))),
            None => Err(GenerationError::Malformed(format!("no gate for '{}'", prompt))),
        }
    }
}

/// Fails with a retryable 503 the first `failures` calls, then succeeds.
pub struct FlakyGenerator {
    pub failures: usize,
    pub calls: AtomicUsize,
}

impl FlakyGenerator {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ImageGenerator for FlakyGenerator {
    async fn generate(&self, _prompt: &str) -> GenerationResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(GenerationError::Api {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: "overloaded".to_string(),
            })
        } else {
            Ok(GeneratedImage::Url("http://x/retried.jpg".to_string()))
        }
    }
}

/// Records the highest number of overlapping calls.
#[derive(Default)]
pub struct PeakTracker {
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

#[async_trait]
impl ImageGenerator for PeakTracker {
    async fn generate(&self, prompt: &str) -> GenerationResult {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        sleep(Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(GeneratedImage::Url(format!("http://x/{}.jpg", prompt)))
    }
}

pub fn settings() -> ManagerSettings {
    ManagerSettings {
        max_concurrent_generations: 64,
        generation_timeout: Duration::from_secs(5),
        ..ManagerSettings::default()
    }
}

pub fn manager_with(
    generator: Arc<dyn ImageGenerator>,
    settings: ManagerSettings,
) -> (JobManager, Arc<dyn JobStore>) {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    (JobManager::new(store.clone(), generator, settings), store)
}

/// Poll until the job leaves `pending` (panics after 5 seconds).
pub async fn wait_for_terminal(manager: &JobManager, id: Uuid) -> Job {
    for _ in 0..500 {
        let job = manager.get(id).await.expect("job should exist");
        if job.status != JobStatus::Pending {
            return job;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not reach a terminal state within 5 seconds", id);
}

/// Poll until `check` holds (panics after 5 seconds).
pub async fn eventually<F: Fn() -> bool>(check: F, what: &str) {
    for _ in 0..500 {
        if check() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}
