use std::sync::Arc;

use crate::db::JobStore;
use crate::services::{lifecycle::JobManager, listing::JobListing};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub jobs: JobManager,
    pub listing: JobListing,
}

impl AppState {
    pub fn new(store: Arc<dyn JobStore>, jobs: JobManager) -> Self {
        Self {
            listing: JobListing::new(store.clone()),
            store,
            jobs,
        }
    }
}
