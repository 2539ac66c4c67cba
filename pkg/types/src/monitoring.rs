//! Monitoring-stack objects: the Prometheus operator's custom resources.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::impl_resource;
use crate::kind::ResourceKind;
use crate::meta::ObjectMeta;

// --- Shared selectors ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn single(key: &str, value: &str) -> Self {
        let mut match_labels = BTreeMap::new();
        match_labels.insert(key.to_string(), value.to_string());
        Self { match_labels }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

// --- ServiceMonitor ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub port: String,
    pub interval: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMonitorSpec {
    pub selector: LabelSelector,
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitor {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ServiceMonitorSpec,
}

impl_resource!(ServiceMonitor, ResourceKind::ServiceMonitor);

// --- Alertmanager ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityContext {
    pub run_as_user: i64,
    pub run_as_group: i64,
    pub fs_group: i64,
    pub run_as_non_root: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerSpec {
    pub replicas: u32,
    pub image: String,
    /// Secret holding `alertmanager.yaml`.
    pub config_secret: String,
    pub alertmanager_config_selector: LabelSelector,
    pub security_context: PodSecurityContext,
    #[serde(default)]
    pub force_enable_cluster_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alertmanager {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: AlertmanagerSpec,
}

impl_resource!(Alertmanager, ResourceKind::Alertmanager);

// --- PrometheusRule ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub alert: String,
    pub expr: String,
    #[serde(rename = "for")]
    pub for_duration: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub name: String,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrometheusRuleSpec {
    pub groups: Vec<RuleGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusRule {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: PrometheusRuleSpec,
}

impl_resource!(PrometheusRule, ResourceKind::PrometheusRule);

// --- Prometheus ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertmanagerEndpoint {
    pub namespace: String,
    pub name: String,
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertingSpec {
    pub alertmanagers: Vec<AlertmanagerEndpoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusSpec {
    pub image: String,
    pub service_account_name: String,
    pub replicas: u32,
    pub shards: u32,
    #[serde(default)]
    pub resources: ResourceRequirements,
    pub alerting: AlertingSpec,
    pub rule_selector: LabelSelector,
    pub service_monitor_selector: LabelSelector,
    pub additional_scrape_configs: SecretKeySelector,
    pub scrape_interval: String,
    pub retention: String,
    pub log_level: String,
    pub log_format: String,
    pub route_prefix: String,
    pub enable_remote_write_receiver: bool,
    pub enable_admin_api: bool,
    pub wal_compression: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prometheus {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: PrometheusSpec,
}

impl_resource!(Prometheus, ResourceKind::Prometheus);
