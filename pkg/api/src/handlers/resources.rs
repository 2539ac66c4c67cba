use axum::{
    Json,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use pkg_constants::autoscaler::TEARDOWN_CURSOR_ANNOTATION;
use pkg_state::{ResourceStoreExt, StoreError};
use pkg_types::deployment::Deployment;
use pkg_types::kind::ResourceKind;
use pkg_types::scaling_target::{ScalingTarget, ScalingTargetStatus};
use pkg_types::validate::{validate_name, validate_scaling_target};

use crate::AppState;

fn store_error_response(e: StoreError) -> Response {
    let status = if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else if e.is_already_exists() {
        StatusCode::CONFLICT
    } else {
        warn!("Store error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, e.to_string()).into_response()
}

// ============================================================
// ScalingTargets
// ============================================================

pub async fn create_scaling_target(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
    Json(mut target): Json<ScalingTarget>,
) -> impl IntoResponse {
    target.metadata.namespace = ns.clone();
    // Lifecycle fields belong to the controller.
    target.metadata.finalizers.clear();
    target.metadata.deletion_timestamp = None;
    target.metadata.annotations.remove(TEARDOWN_CURSOR_ANNOTATION);
    target.metadata.creation_timestamp = Some(chrono::Utc::now());
    target.status = ScalingTargetStatus::default();

    if let Err(e) = validate_scaling_target(&target) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    match state.store.create_object(&target).await {
        Ok(()) => {
            info!("Created ScalingTarget {}/{}", ns, target.name());
            (StatusCode::CREATED, Json(target)).into_response()
        }
        Err(e) => store_error_response(e),
    }
}

pub async fn list_scaling_targets(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
) -> impl IntoResponse {
    match state.store.list_objects::<ScalingTarget>(Some(&ns)).await {
        Ok(targets) => (StatusCode::OK, Json(targets)).into_response(),
        Err(e) => store_error_response(e),
    }
}

pub async fn get_scaling_target(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_object::<ScalingTarget>(&ns, &name).await {
        Ok(target) => (StatusCode::OK, Json(target)).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// Graceful: an owner holding the finalizer is only marked for deletion and
/// stays readable until its teardown finishes.
pub async fn delete_scaling_target(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> impl IntoResponse {
    match state
        .store
        .delete(ResourceKind::ScalingTarget, &ns, &name)
        .await
    {
        Ok(()) => {
            info!("Deletion requested for ScalingTarget {}/{}", ns, name);
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => store_error_response(e),
    }
}

// ============================================================
// Deployments
// ============================================================

pub async fn create_deployment(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
    Json(mut deployment): Json<Deployment>,
) -> impl IntoResponse {
    deployment.metadata.namespace = ns.clone();
    deployment.metadata.creation_timestamp = Some(chrono::Utc::now());
    if let Err(e) = validate_name(&deployment.metadata.name) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    match state.store.create_object(&deployment).await {
        Ok(()) => {
            info!(
                "Created deployment {}/{} ({} replicas)",
                ns, deployment.metadata.name, deployment.spec.replicas
            );
            (StatusCode::CREATED, Json(deployment)).into_response()
        }
        Err(e) => store_error_response(e),
    }
}

pub async fn list_deployments(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
) -> impl IntoResponse {
    match state.store.list_objects::<Deployment>(Some(&ns)).await {
        Ok(deployments) => (StatusCode::OK, Json(deployments)).into_response(),
        Err(e) => store_error_response(e),
    }
}

pub async fn get_deployment(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_object::<Deployment>(&ns, &name).await {
        Ok(deployment) => (StatusCode::OK, Json(deployment)).into_response(),
        Err(e) => store_error_response(e),
    }
}
