//! HTTP surface: webhook receiver, queue management, and cron trigger.

pub mod cron;
pub mod error;
pub mod queue;
pub mod state;
pub mod webhook;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde_json::json;
use tokio::sync::Notify;
use tracing::warn;

pub use state::HttpState;

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route(
            "/webhooks/hashnode",
            get(webhook::describe).post(webhook::receive),
        )
        .route(
            "/api/distribution/queue",
            get(queue::list).post(queue::enqueue).delete(queue::remove),
        )
        .route("/api/distribution/queue/stats", get(queue::stats))
        .route("/api/distribution/activity", get(queue::activity))
        .route("/api/cron/social", get(cron::trigger).post(cron::trigger))
        .with_state(state)
}

async fn health(State(state): State<HttpState>) -> impl IntoResponse {
    match state.queue.stats().await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "details": err.to_string() })),
        ),
    }
}

/// Await the serve future, but once `shutdown_started` fires give in-flight
/// connections at most `deadline` to drain before abandoning them.
pub async fn drain_within<F>(
    serve: F,
    shutdown_started: Arc<Notify>,
    deadline: Duration,
) -> std::io::Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        result = serve => result,
        () = async {
            shutdown_started.notified().await;
            tokio::time::sleep(deadline).await;
        } => {
            warn!(
                target = "diramo::shutdown",
                deadline_ms = deadline.as_millis() as u64,
                "drain deadline passed, dropping open connections"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[tokio::test]
    async fn drain_gives_up_after_the_deadline() {
        let shutdown = Arc::new(Notify::new());
        shutdown.notify_one();

        let result = drain_within(
            std::future::pending::<io::Result<()>>(),
            shutdown,
            Duration::from_millis(20),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn drain_passes_through_a_server_that_finishes() {
        let shutdown = Arc::new(Notify::new());
        let result = drain_within(async { Ok(()) }, shutdown, Duration::from_secs(30)).await;
        assert!(result.is_ok());
    }
}
