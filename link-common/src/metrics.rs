use std::future::Future;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::liveness::Liveness;

/// Bind a `TcpListener` on the provided bind address to serve a `Router` on it, until `shutdown` resolves.
/// This function is intended to take a Router as returned by `setup_metrics_router`.
pub async fn serve<F>(router: Router, bind: &str, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Build a Router for the metrics and liveness endpoints.
pub fn setup_metrics_router(liveness: Liveness) -> Result<Router, BuildError> {
    let recorder_handle = setup_metrics_recorder()?;

    Ok(metrics_router(recorder_handle, liveness))
}

fn metrics_router(recorder_handle: PrometheusHandle, liveness: Liveness) -> Router {
    Router::new()
        .route(
            "/metrics",
            get(move || std::future::ready(recorder_handle.render())),
        )
        .route(
            "/_liveness",
            get(move || std::future::ready(liveness.get_status())),
        )
}

pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)?
        .install_recorder()
}
