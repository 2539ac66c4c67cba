use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::impl_resource;
use crate::kind::ResourceKind;
use crate::meta::ObjectMeta;

// --- Deployment status ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    #[serde(default)]
    pub ready_replicas: u32,
    #[serde(default)]
    pub available_replicas: u32,
}

// --- Deployment spec ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub replicas: u32,
    /// Label selector for matching pods
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    /// Pod template, carried opaquely; only `replicas` is ever patched here.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub template: serde_json::Value,
}

// --- Deployment ---

/// The scaled workload. Owned by users, only its replica count is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: DeploymentSpec,
    #[serde(default)]
    pub status: DeploymentStatus,
}

fn default_api_version() -> String {
    ResourceKind::Deployment.api_version().to_string()
}

fn default_kind() -> String {
    ResourceKind::Deployment.to_string()
}

impl_resource!(Deployment, ResourceKind::Deployment);

impl Deployment {
    pub fn new(name: &str, namespace: &str, replicas: u32) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta::new(name, namespace),
            spec: DeploymentSpec {
                replicas,
                ..Default::default()
            },
            status: DeploymentStatus::default(),
        }
    }
}
