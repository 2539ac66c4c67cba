pub mod handlers;
pub mod request_id;
pub mod server;

use std::sync::Arc;

use pkg_controllers::ScalingPolicy;
use pkg_metrics::MetricsRegistry;
use pkg_state::ResourceStore;

/// Shared application state injected into all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ResourceStore>,
    pub policy: Arc<ScalingPolicy>,
    pub metrics: Arc<MetricsRegistry>,
}
