use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::AppState;
use crate::handlers::{health, resources, watch, webhook};
use crate::request_id::request_id_middleware;
use pkg_constants::network::WEBHOOK_PATH;

/// Listen addresses passed from the binary's CLI.
pub struct ServerConfig {
    pub webhook_addr: SocketAddr,
    pub api_addr: SocketAddr,
}

/// Alert receiver. Kept on its own port, apart from health and metrics.
pub fn webhook_router(state: AppState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(webhook::receive_alerts))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Health, metrics, watch and owner/workload CRUD.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/metrics", get(health::metrics))
        .route("/api/v1/watch", get(watch::watch_events))
        .route(
            "/api/v1/namespaces/{ns}/scalingtargets",
            post(resources::create_scaling_target).get(resources::list_scaling_targets),
        )
        .route(
            "/api/v1/namespaces/{ns}/scalingtargets/{name}",
            get(resources::get_scaling_target).delete(resources::delete_scaling_target),
        )
        .route(
            "/api/v1/namespaces/{ns}/deployments",
            post(resources::create_deployment).get(resources::list_deployments),
        )
        .route(
            "/api/v1/namespaces/{ns}/deployments/{name}",
            get(resources::get_deployment),
        )
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Serves both routers until either listener fails.
pub async fn start_server(config: ServerConfig, state: AppState) -> anyhow::Result<()> {
    let webhook_listener = TcpListener::bind(config.webhook_addr).await?;
    let api_listener = TcpListener::bind(config.api_addr).await?;
    info!("Starting webhook server on {}", config.webhook_addr);
    info!("Starting API server on {}", config.api_addr);

    let webhook_app = webhook_router(state.clone());
    let api_app = api_router(state);
    tokio::try_join!(
        async { axum::serve(webhook_listener, webhook_app).await },
        async { axum::serve(api_listener, api_app).await },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pkg_controllers::ScalingPolicy;
    use pkg_metrics::MetricsRegistry;
    use pkg_state::memory::MemoryStore;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState {
            store: Arc::new(MemoryStore::new()),
            policy: Arc::new(ScalingPolicy::default()),
            metrics: Arc::new(MetricsRegistry::for_autoscaler()),
        }
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn healthz_and_metrics() {
        let health = api_router(state()).oneshot(get_request("/healthz")).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let metrics = api_router(state()).oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(metrics.status(), StatusCode::OK);
        let body = axum::body::to_bytes(metrics.into_body(), 64 * 1024).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("autoscaler_reconcile_passes_total"));
    }

    #[tokio::test]
    async fn webhook_is_not_served_on_api_port() {
        let response = api_router(state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(WEBHOOK_PATH)
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn caller_request_id_is_echoed() {
        let response = api_router(state())
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
            Some("abc-123")
        );
    }
}
