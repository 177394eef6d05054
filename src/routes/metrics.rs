use axum::extract::State;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;

/// Install the global Prometheus recorder and describe the job metrics.
///
/// Can only succeed once per process.
pub fn install_recorder() -> Result<Arc<PrometheusHandle>, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!("image_jobs_submitted_total", "Image jobs accepted by submit");
    metrics::describe_counter!("image_jobs_completed_total", "Image jobs that produced an image");
    metrics::describe_counter!("image_jobs_failed_total", "Image jobs that ended in failure");
    metrics::describe_counter!(
        "image_jobs_discarded_callbacks_total",
        "Generation results dropped because the job was deleted"
    );
    metrics::describe_histogram!(
        "image_generation_seconds",
        "Duration of a single generation backend call"
    );
    metrics::describe_gauge!(
        "image_generations_in_flight",
        "Generation backend calls currently running"
    );

    Ok(Arc::new(handle))
}

/// `/metrics` route carrying its own state, mergeable into the API router.
pub fn router(handle: Arc<PrometheusHandle>) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .with_state(handle)
}

/// GET /metrics — Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> String {
    handle.render()
}
