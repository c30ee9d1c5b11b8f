//! HTTP endpoints for health checks and metrics.

use std::time::Instant;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use prometheus::{Encoder, Registry, TextEncoder};
use sentinel_monitor::HealthChecker;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub health: HealthChecker,
    pub registry: Registry,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    match state.health.status() {
        Ok(report) if report.ok => (StatusCode::OK, Json(report.status)).into_response(),
        Ok(report) => (StatusCode::INTERNAL_SERVER_ERROR, Json(report.status)).into_response(),
        Err(e) => {
            warn!("health check failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&state.registry.gather(), &mut buffer) {
        Ok(()) => (
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        %method,
        %uri,
        status = response.status().as_u16(),
        elapsed = ?start.elapsed(),
        "request"
    );

    response
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use http_body_util::BodyExt;
    use sentinel_bootable::Bootable;
    use sentinel_monitor::{HealthChecks, HeadMonitor, HeadMonitorOptions, Poller, PollerOptions};
    use sentinel_node_client::{BootstrapStatus, ChainId, SyncState};
    use sentinel_node_client_mock::{MockBlock, MockNodeClient, mock_protocol_hash};
    use tower::ServiceExt;

    use super::*;

    struct Fixture {
        app: Router,
        poller: Poller<MockNodeClient>,
    }

    async fn fixture(checks: HealthChecks, bootstrap: BootstrapStatus) -> Fixture {
        let client =
            MockNodeClient::new(vec![MockBlock::new(1, 0, 0, mock_protocol_hash(1), 8)]);
        client.set_bootstrap_state(bootstrap);

        let registry = Registry::new();
        let head = HeadMonitor::connect(
            client.clone(),
            HeadMonitorOptions {
                chain_id: ChainId::default(),
                timeout: Duration::from_secs(5),
                tolerance: Duration::from_secs(1),
                reconnect_delay: Duration::from_secs(10),
                use_timestamps: true,
                registry: Some(registry.clone()),
            },
        )
        .await
        .unwrap();
        let poller = Poller::new(
            client,
            head.protocols_reader(),
            PollerOptions {
                chain_id: ChainId::default(),
                timeout: Duration::from_secs(5),
                poll_interval: Duration::from_secs(15),
                registry: Some(registry.clone()),
            },
        )
        .unwrap();

        let app = router(AppState {
            health: HealthChecker::new(
                checks,
                poller.bootstrap_reader(),
                head.block_delay_status(),
            ),
            registry,
        });

        Fixture { app, poller }
    }

    impl Fixture {
        async fn poll(&self) {
            self.poller.start().await.unwrap();
            while self.poller.bootstrap_status().is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }

        async fn get(&self, uri: &str) -> (StatusCode, String) {
            let response = self
                .app
                .clone()
                .oneshot(
                    axum::http::Request::builder()
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            let status = response.status();
            let body = response.into_body().collect().await.unwrap().to_bytes();

            (status, String::from_utf8(body.to_vec()).unwrap())
        }
    }

    const SYNCED: BootstrapStatus = BootstrapStatus {
        bootstrapped: true,
        sync_state: SyncState::Synced,
    };

    #[tokio::test]
    async fn test_health_ok() {
        let checks = HealthChecks {
            use_bootstrapped: true,
            use_sync_state: true,
            use_block_delay: false,
        };
        let fixture = fixture(checks, SYNCED).await;
        fixture.poll().await;

        let (status, body) = fixture.get("/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&body).unwrap(),
            serde_json::json!({
                "bootstrapped": true,
                "synced": true,
                "block_delay_ok": false,
            })
        );
    }

    #[tokio::test]
    async fn test_health_degraded() {
        let fixture = fixture(HealthChecks::default(), SYNCED).await;
        fixture.poll().await;

        let (status, body) = fixture.get("/health").await;

        // The head monitor never ran, so the block delay check fails.
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&body).unwrap()["block_delay_ok"],
            false
        );
    }

    #[tokio::test]
    async fn test_health_without_data() {
        let fixture = fixture(HealthChecks::default(), SYNCED).await;

        let (status, body) = fixture.get("/health").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "no bootstrap status available yet");
    }

    #[tokio::test]
    async fn test_metrics() {
        let fixture = fixture(HealthChecks::default(), SYNCED).await;
        fixture.poll().await;

        let (status, body) = fixture.get("/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("tezos_node_bootstrapped 1"));
        assert!(body.contains("tezos_node_block_delay_ok 0"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let fixture = fixture(HealthChecks::default(), SYNCED).await;

        let (status, _) = fixture.get("/nope").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
