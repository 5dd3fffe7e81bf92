//! HTTP exposition of the metrics.
//!
//! - `GET <metrics path>` - Prometheus text exposition, gathered per request
//! - `GET /` - Index page linking to the metrics path

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::Registry;
use std::future::IntoFuture;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use crate::config::ExporterConfig;
use crate::metrics::encode;

struct AppState {
    registry: Registry,
    metrics_path: String,
}

/// Builds the router serving `registry` on `metrics_path`.
pub fn build_router(registry: Registry, metrics_path: &str) -> Router {
    let state = Arc::new(AppState {
        registry,
        metrics_path: metrics_path.to_string(),
    });

    Router::new()
        .route(metrics_path, get(metrics))
        .route("/", get(index))
        .with_state(state)
}

pub fn index_page(metrics_path: &str) -> String {
    format!(
        "<html>
    <head><title>IPA Healthcheck Exporter</title></head>
    <body>
    <h1>IPA Healthcheck Exporter</h1>
    <p><a href='{}'>Metrics</a></p>
    </body>
</html>",
        metrics_path
    )
}

async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(index_page(&state.metrics_path))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let registry = state.registry.clone();
    // Collecting runs ipa-healthcheck, which blocks.
    match tokio::task::spawn_blocking(move || encode(&registry)).await {
        Ok(Ok(body)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Ok(Err(err)) => {
            error!("Failed to encode metrics: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
        Err(err) => {
            error!("Metrics collection task failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serves until SIGINT or SIGTERM is received.
///
/// Returns as soon as a signal arrives, without waiting for in-flight scrapes.
pub async fn serve(config: &ExporterConfig, registry: Registry) -> io::Result<()> {
    let app = build_router(registry, &config.metrics_path);
    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr).await?;
    info!("ipa-healthcheck exporter listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app).into_future() => result,
        signal = shutdown_signal() => {
            info!("Received {}, exiting", signal?);
            Ok(())
        }
    }
}

async fn shutdown_signal() -> io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map(|_| "SIGINT")
    }
}
