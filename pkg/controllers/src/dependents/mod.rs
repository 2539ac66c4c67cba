//! Dependent resource managers.
//!
//! Every child object of a ScalingTarget is described by one [`Dependent`]
//! implementation: its store kind, its fixed name suffix, the dependents
//! that must exist before it, and a builder for its desired payload. Get,
//! Create and Delete are shared. Each issues exactly one store call and
//! never retries; retrying is the reconciler's job.

mod alertmanager;
mod prometheus;
mod rbac;
mod service_account;
mod service_monitor;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use pkg_constants::network::{DEFAULT_WEBHOOK_HOST, DEFAULT_WEBHOOK_PORT, WEBHOOK_PATH};
use pkg_state::{ResourceStore, StoreError};
use pkg_types::kind::ResourceKind;
use pkg_types::scaling_target::ScalingTarget;

use crate::error::DependentError;
use crate::labels::{dependent_name, owner_name};

pub use alertmanager::{AlertmanagerConfigDependent, AlertmanagerDependent, alertmanager_config};
pub use prometheus::{
    AlertingRuleDependent, PrometheusDependent, ScrapeConfigDependent, validate_quantity,
};
pub use rbac::{ClusterRoleBindingDependent, ClusterRoleDependent};
pub use service_account::ServiceAccountDependent;
pub use service_monitor::ServiceMonitorDependent;

/// Identity of each dependent in the owner's graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependentId {
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    ServiceMonitor,
    AlertmanagerConfig,
    Alertmanager,
    AlertingRule,
    ScrapeConfig,
    Prometheus,
}

impl std::fmt::Display for DependentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DependentId::ServiceAccount => "ServiceAccount",
            DependentId::ClusterRole => "ClusterRole",
            DependentId::ClusterRoleBinding => "ClusterRoleBinding",
            DependentId::ServiceMonitor => "ServiceMonitor",
            DependentId::AlertmanagerConfig => "AlertManager config Secret",
            DependentId::Alertmanager => "AlertManager",
            DependentId::AlertingRule => "Alerting Rule",
            DependentId::ScrapeConfig => "Prometheus scrape-config Secret",
            DependentId::Prometheus => "Prometheus instance",
        };
        write!(f, "{}", label)
    }
}

/// Process-wide inputs to the payload builders.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Where generated Alertmanager configs deliver notifications.
    pub webhook_url: String,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self {
            webhook_url: format!(
                "http://{}:{}{}",
                DEFAULT_WEBHOOK_HOST, DEFAULT_WEBHOOK_PORT, WEBHOOK_PATH
            ),
        }
    }
}

pub(crate) fn encode<T: Serialize>(obj: &T) -> Result<Vec<u8>, DependentError> {
    Ok(serde_json::to_vec(obj)?)
}

#[async_trait]
pub trait Dependent: Send + Sync {
    fn id(&self) -> DependentId;

    fn kind(&self) -> ResourceKind;

    fn suffix(&self) -> &'static str;

    /// Dependents that must already exist before this one is created.
    fn predecessors(&self) -> &'static [DependentId] {
        &[]
    }

    /// Desired payload derived from the owner.
    fn build(&self, owner: &ScalingTarget, ctx: &BuildContext) -> Result<Vec<u8>, DependentError>;

    fn name(&self, owner: &ScalingTarget) -> String {
        dependent_name(owner.name(), self.suffix())
    }

    fn namespace<'a>(&self, owner: &'a ScalingTarget) -> &'a str {
        if self.kind().is_cluster_scoped() {
            ""
        } else {
            owner.namespace()
        }
    }

    async fn get(
        &self,
        store: &dyn ResourceStore,
        owner: &ScalingTarget,
    ) -> Result<Vec<u8>, StoreError> {
        let name = self.name(owner);
        match store.get(self.kind(), self.namespace(owner), &name).await {
            Ok(data) => {
                debug!("{} {} fetched", self.id(), name);
                Ok(data)
            }
            Err(e) if e.is_not_found() => {
                info!("{} {} doesn't exist", self.id(), name);
                Err(e)
            }
            Err(e) => {
                warn!("Failed to fetch {} {}: {}", self.id(), name, e);
                Err(e)
            }
        }
    }

    async fn create(
        &self,
        store: &dyn ResourceStore,
        owner: &ScalingTarget,
        ctx: &BuildContext,
    ) -> Result<(), DependentError> {
        let name = self.name(owner);
        let data = self.build(owner, ctx)?;
        store
            .create(self.kind(), self.namespace(owner), &name, &data)
            .await?;
        info!("{} {} created", self.id(), name);
        Ok(())
    }

    /// Returns false when the object was already gone.
    async fn delete(
        &self,
        store: &dyn ResourceStore,
        owner: &ScalingTarget,
    ) -> Result<bool, StoreError> {
        let name = self.name(owner);
        match store.delete(self.kind(), self.namespace(owner), &name).await {
            Ok(()) => {
                info!("{} {} deleted", self.id(), name);
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                debug!("{} {} already absent", self.id(), name);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

/// Creation order. Identity and RBAC precede the monitors running under
/// them; the Alertmanager and its config precede the Prometheus instance
/// that references it.
pub static CONVERGENCE_ORDER: [&dyn Dependent; 9] = [
    &ServiceAccountDependent,
    &ClusterRoleDependent,
    &ClusterRoleBindingDependent,
    &ServiceMonitorDependent,
    &AlertmanagerConfigDependent,
    &AlertmanagerDependent,
    &AlertingRuleDependent,
    &ScrapeConfigDependent,
    &PrometheusDependent,
];

/// Deletion order while the owner is terminating: consumers before the
/// objects they reference.
pub static TEARDOWN_ORDER: [&dyn Dependent; 9] = [
    &PrometheusDependent,
    &ScrapeConfigDependent,
    &AlertingRuleDependent,
    &AlertmanagerDependent,
    &AlertmanagerConfigDependent,
    &ServiceAccountDependent,
    &ClusterRoleBindingDependent,
    &ClusterRoleDependent,
    &ServiceMonitorDependent,
];

/// Owner name a dependent object belongs to, recovered from its name.
pub fn owner_of(kind: ResourceKind, name: &str) -> Option<String> {
    CONVERGENCE_ORDER
        .iter()
        .filter(|d| d.kind() == kind)
        .find_map(|d| owner_name(name, d.suffix()))
        .map(str::to_string)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pkg_types::scaling_target::{ApplicationReference, ScalingTargetSpec};
    use std::collections::{BTreeMap, HashSet};

    pub(crate) fn orders_svc() -> ScalingTarget {
        let mut mapping = BTreeMap::new();
        mapping.insert("memory".to_string(), "512Mi".to_string());
        ScalingTarget::new(
            "orders-svc",
            "prod",
            ScalingTargetSpec {
                application_ref: ApplicationReference {
                    deployment_name: "orders-deploy".to_string(),
                    deployment_port: "8080".to_string(),
                    deployment_service: "orders".to_string(),
                },
                scaling_params_mapping: mapping,
                scaling_query: "sum(rate(http_requests_total[1m])) > 100".to_string(),
                alert_severity: None,
            },
        )
    }

    #[test]
    fn predecessors_precede_in_convergence_order() {
        let mut seen = HashSet::new();
        for dependent in CONVERGENCE_ORDER.iter() {
            for pred in dependent.predecessors() {
                assert!(
                    seen.contains(pred),
                    "{} is ordered before its predecessor {}",
                    dependent.id(),
                    pred
                );
            }
            assert!(seen.insert(dependent.id()), "{} listed twice", dependent.id());
        }
    }

    #[test]
    fn teardown_covers_every_dependent() {
        let created: HashSet<_> = CONVERGENCE_ORDER.iter().map(|d| d.id()).collect();
        let deleted: HashSet<_> = TEARDOWN_ORDER.iter().map(|d| d.id()).collect();
        assert_eq!(created, deleted);
        assert_eq!(TEARDOWN_ORDER.len(), CONVERGENCE_ORDER.len());
    }

    #[test]
    fn names_follow_suffix_table() {
        let owner = orders_svc();
        let names: Vec<_> = CONVERGENCE_ORDER.iter().map(|d| d.name(&owner)).collect();
        assert_eq!(
            names,
            vec![
                "orders-svc-sa",
                "orders-svc-clusterrole",
                "orders-svc-rolebinding",
                "orders-svc-svcm",
                "orders-svc-alertsecret",
                "orders-svc-alert",
                "orders-svc-prometheus-rule",
                "orders-svc-secret",
                "orders-svc-prometheus-instance",
            ]
        );
    }

    #[test]
    fn every_name_is_unique_per_kind() {
        let owner = orders_svc();
        let keys: HashSet<_> = CONVERGENCE_ORDER
            .iter()
            .map(|d| (d.kind(), d.name(&owner)))
            .collect();
        assert_eq!(keys.len(), CONVERGENCE_ORDER.len());
    }

    #[test]
    fn owner_is_recovered_from_dependent_names() {
        let owner = orders_svc();
        for dependent in CONVERGENCE_ORDER.iter() {
            assert_eq!(
                owner_of(dependent.kind(), &dependent.name(&owner)).as_deref(),
                Some("orders-svc"),
                "{}",
                dependent.id()
            );
        }
        assert_eq!(owner_of(ResourceKind::Secret, "unrelated"), None);
    }

    #[test]
    fn cluster_scoped_dependents_have_no_namespace() {
        let owner = orders_svc();
        assert_eq!(ClusterRoleDependent.namespace(&owner), "");
        assert_eq!(ClusterRoleBindingDependent.namespace(&owner), "");
        assert_eq!(ServiceAccountDependent.namespace(&owner), "prod");
    }
}
