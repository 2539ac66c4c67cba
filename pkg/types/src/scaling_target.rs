use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::impl_resource;
use crate::kind::ResourceKind;
use crate::meta::ObjectMeta;

// --- Application reference ---

/// The workload being observed and, ultimately, scaled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationReference {
    pub deployment_name: String,
    /// Port (number or name) the workload exposes metrics on.
    pub deployment_port: String,
    pub deployment_service: String,
}

// --- ScalingTarget spec ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingTargetSpec {
    #[serde(rename = "applicationRef")]
    pub application_ref: ApplicationReference,
    /// Resource parameters for the monitoring stack, e.g. `memory -> 256Mi`.
    #[serde(default)]
    pub scaling_params_mapping: BTreeMap<String, String>,
    /// Alerting expression whose firing triggers a scaling decision.
    pub scaling_query: String,
    /// Severity label attached to the generated alert. Defaults to `warning`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_severity: Option<String>,
}

// --- ScalingTarget status ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalingTargetStatus {
    #[serde(default)]
    pub replicas: u32,
}

// --- ScalingTarget ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingTarget {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ScalingTargetSpec,
    #[serde(default)]
    pub status: ScalingTargetStatus,
}

fn default_api_version() -> String {
    ResourceKind::ScalingTarget.api_version().to_string()
}

fn default_kind() -> String {
    ResourceKind::ScalingTarget.to_string()
}

impl_resource!(ScalingTarget, ResourceKind::ScalingTarget);

impl ScalingTarget {
    pub fn new(name: &str, namespace: &str, spec: ScalingTargetSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta::new(name, namespace),
            spec,
            status: ScalingTargetStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn key(&self) -> OwnerKey {
        OwnerKey::new(self.namespace(), self.name())
    }

    /// Memory request for the Prometheus instance, if the owner set one.
    pub fn memory_request(&self) -> Option<&str> {
        self.spec
            .scaling_params_mapping
            .get("memory")
            .map(String::as_str)
    }
}

// --- Owner key ---

/// Identity of a ScalingTarget: what the work queue hands the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerKey {
    pub namespace: String,
    pub name: String,
}

impl OwnerKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_manifest() {
        let raw = r#"{
            "metadata": {"name": "orders-svc", "namespace": "prod"},
            "spec": {
                "applicationRef": {
                    "deploymentName": "orders-deploy",
                    "deploymentPort": "8080",
                    "deploymentService": "orders"
                },
                "scalingParamsMapping": {"memory": "512Mi"},
                "scalingQuery": "sum(rate(http_requests_total[1m])) > 100"
            }
        }"#;
        let target: ScalingTarget = serde_json::from_str(raw).unwrap();
        assert_eq!(target.kind, "ScalingTarget");
        assert_eq!(target.api_version, "buildpiper.opstreelabs.in/v1");
        assert_eq!(target.spec.application_ref.deployment_name, "orders-deploy");
        assert_eq!(target.memory_request(), Some("512Mi"));
        assert_eq!(target.status.replicas, 0);
        assert_eq!(target.key().to_string(), "prod/orders-svc");
    }
}
