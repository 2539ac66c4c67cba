//! Alertmanager webhook receiver: turns an alert batch into a replica count
//! for the owner's workload.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use pkg_controllers::scaling::{alert_target, scale_workload};
use pkg_metrics::names;
use pkg_state::{ResourceStoreExt, StoreError};
use pkg_types::alert::AlertmanagerPayload;
use pkg_types::scaling_target::{OwnerKey, ScalingTarget};

use crate::AppState;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("malformed alert payload: {0}")]
    Malformed(String),

    #[error("ScalingTarget {0} not found")]
    UnknownTarget(OwnerKey),

    #[error("failed to scale workload: {0}")]
    Downstream(#[from] StoreError),
}

impl WebhookError {
    fn status(&self) -> StatusCode {
        match self {
            WebhookError::Malformed(_) => StatusCode::BAD_REQUEST,
            WebhookError::UnknownTarget(_) => StatusCode::NOT_FOUND,
            WebhookError::Downstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// POST /webhook
pub async fn receive_alerts(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    state.metrics.counter_inc(names::WEBHOOK_REQUESTS);
    match apply_alerts(&state, &body).await {
        Ok(()) => Ok(StatusCode::OK),
        Err(e) => {
            let counter = match e {
                WebhookError::Downstream(_) => names::WEBHOOK_FAILED,
                _ => names::WEBHOOK_REJECTED,
            };
            state.metrics.counter_inc(counter);
            warn!("Webhook request failed: {}", e);
            Err(e)
        }
    }
}

async fn apply_alerts(state: &AppState, body: &[u8]) -> Result<(), WebhookError> {
    let payload: AlertmanagerPayload =
        serde_json::from_slice(body).map_err(|e| WebhookError::Malformed(e.to_string()))?;
    if payload.alerts.is_empty() {
        return Err(WebhookError::Malformed("no alerts in batch".to_string()));
    }
    let key = alert_target(&payload).ok_or_else(|| {
        WebhookError::Malformed("first alert carries no ScalingTarget labels".to_string())
    })?;
    let decision = state.policy.decide(&payload);

    let owner: ScalingTarget = match state.store.get_object(&key.namespace, &key.name).await {
        Ok(owner) => owner,
        Err(e) if e.is_not_found() => return Err(WebhookError::UnknownTarget(key)),
        Err(e) => return Err(e.into()),
    };

    let previous = scale_workload(state.store.as_ref(), &owner, decision.desired_replicas).await?;
    state
        .metrics
        .gauge_set(names::LAST_DESIRED_REPLICAS, decision.desired_replicas as i64);
    info!(
        "ScalingTarget {}: severity {} scaled {} from {} to {} replicas",
        key,
        decision.severity.as_deref().unwrap_or("<none>"),
        owner.spec.application_ref.deployment_name,
        previous,
        decision.desired_replicas
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::webhook_router;
    use axum::body::Body;
    use axum::http::Request;
    use pkg_controllers::ScalingPolicy;
    use pkg_metrics::MetricsRegistry;
    use pkg_state::memory::{MemoryStore, StoreOp};
    use pkg_types::deployment::Deployment;
    use pkg_types::kind::ResourceKind;
    use pkg_types::scaling_target::{ApplicationReference, ScalingTargetSpec};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn seeded() -> (MemoryStore, AppState) {
        let store = MemoryStore::new();
        let owner = ScalingTarget::new(
            "orders-svc",
            "prod",
            ScalingTargetSpec {
                application_ref: ApplicationReference {
                    deployment_name: "orders-deploy".to_string(),
                    deployment_port: "8080".to_string(),
                    deployment_service: "orders".to_string(),
                },
                scaling_query: "up == 0".to_string(),
                ..Default::default()
            },
        );
        store.create_object(&owner).await.unwrap();
        store
            .create_object(&Deployment::new("orders-deploy", "prod", 1))
            .await
            .unwrap();
        store.clear_calls();
        let state = AppState {
            store: Arc::new(store.clone()),
            policy: Arc::new(ScalingPolicy::default()),
            metrics: Arc::new(MetricsRegistry::for_autoscaler()),
        };
        (store, state)
    }

    fn alert_body(severity: &str, target: &str) -> String {
        serde_json::json!({
            "receiver": "webhook_receiver",
            "status": "firing",
            "alerts": [{
                "status": "firing",
                "labels": {
                    "alertname": "orders-svc-scaling",
                    "severity": severity,
                    "scaling_target": target,
                    "scaling_target_namespace": "prod",
                },
                "annotations": {},
                "startsAt": "2026-10-18T10:00:00Z",
                "endsAt": "0001-01-01T00:00:00Z",
                "generatorURL": "http://prometheus/graph",
                "fingerprint": "c4d2a1",
            }],
            "groupLabels": {"namespace": "prod"},
            "commonLabels": {},
            "commonAnnotations": {},
            "externalURL": "http://alertmanager",
            "version": "4",
            "groupKey": "{}:{namespace=\"prod\"}",
            "truncatedAlerts": 0,
        })
        .to_string()
    }

    async fn post(state: AppState, body: impl Into<Body>) -> Response {
        webhook_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .body(body.into())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn replicas(store: &MemoryStore) -> u32 {
        let deployment: Deployment = store.get_object("prod", "orders-deploy").await.unwrap();
        deployment.spec.replicas
    }

    #[tokio::test]
    async fn critical_alert_scales_to_five() {
        let (store, state) = seeded().await;
        let metrics = state.metrics.clone();

        let response = post(state, alert_body("critical", "orders-svc")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert!(body.is_empty());
        assert_eq!(replicas(&store).await, 5);
        assert_eq!(metrics.gauge_value(names::LAST_DESIRED_REPLICAS), 5);
    }

    #[tokio::test]
    async fn severities_map_to_replica_counts() {
        for (severity, expected) in [("warning", 3), ("info", 1), ("", 1)] {
            let (store, state) = seeded().await;
            let response = post(state, alert_body(severity, "orders-svc")).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(replicas(&store).await, expected, "severity {:?}", severity);
        }
    }

    #[tokio::test]
    async fn unparseable_body_is_rejected_without_writes() {
        let (store, state) = seeded().await;
        let metrics = state.metrics.clone();

        let response = post(state, "{not json").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(store.writes().is_empty());
        assert_eq!(replicas(&store).await, 1);
        assert_eq!(metrics.counter_value(names::WEBHOOK_REJECTED), 1);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let (store, state) = seeded().await;
        let response = post(state, r#"{"alerts": []}"#).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn unknown_owner_is_not_found() {
        let (store, state) = seeded().await;
        let response = post(state, alert_body("critical", "billing-svc")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn workload_failure_is_server_error() {
        let (store, state) = seeded().await;
        let metrics = state.metrics.clone();
        store.inject_failure(StoreOp::Update, ResourceKind::Deployment);

        let response = post(state, alert_body("critical", "orders-svc")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(replicas(&store).await, 1);
        assert_eq!(metrics.counter_value(names::WEBHOOK_FAILED), 1);
    }
}
