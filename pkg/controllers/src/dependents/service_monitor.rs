use pkg_constants::autoscaler::APP_LABEL;
use pkg_types::kind::ResourceKind;
use pkg_types::monitoring::{Endpoint, LabelSelector, ServiceMonitor, ServiceMonitorSpec};
use pkg_types::scaling_target::ScalingTarget;

use super::{BuildContext, Dependent, DependentId, encode};
use crate::error::DependentError;
use crate::labels::{dependent_labels, dependent_meta, dependent_name, propagated_annotations};

pub const SUFFIX: &str = "-svcm";

pub const METRICS_PORT: &str = "metrics";
pub const METRICS_PATH: &str = "/metrics";
pub const SCRAPE_INTERVAL: &str = "30s";

/// Scrape target declaration for the owner's workload service.
pub struct ServiceMonitorDependent;

pub fn service_monitor(owner: &ScalingTarget) -> ServiceMonitor {
    let name = dependent_name(owner.name(), SUFFIX);
    ServiceMonitor {
        api_version: ResourceKind::ServiceMonitor.api_version().to_string(),
        kind: ResourceKind::ServiceMonitor.to_string(),
        metadata: dependent_meta(
            &name,
            owner.namespace(),
            dependent_labels(&name, owner, None),
            propagated_annotations(owner),
        ),
        spec: ServiceMonitorSpec {
            selector: LabelSelector::single(
                APP_LABEL,
                &owner.spec.application_ref.deployment_name,
            ),
            endpoints: vec![Endpoint {
                port: METRICS_PORT.to_string(),
                interval: SCRAPE_INTERVAL.to_string(),
                path: METRICS_PATH.to_string(),
            }],
        },
    }
}

impl Dependent for ServiceMonitorDependent {
    fn id(&self) -> DependentId {
        DependentId::ServiceMonitor
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::ServiceMonitor
    }

    fn suffix(&self) -> &'static str {
        SUFFIX
    }

    fn predecessors(&self) -> &'static [DependentId] {
        &[DependentId::ClusterRoleBinding]
    }

    fn build(&self, owner: &ScalingTarget, _ctx: &BuildContext) -> Result<Vec<u8>, DependentError> {
        encode(&service_monitor(owner))
    }
}
