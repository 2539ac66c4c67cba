use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::meta::ObjectMeta;

/// Every resource type the store knows how to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    ScalingTarget,
    Deployment,
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    Secret,
    ServiceMonitor,
    Alertmanager,
    PrometheusRule,
    Prometheus,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::ScalingTarget,
        ResourceKind::Deployment,
        ResourceKind::ServiceAccount,
        ResourceKind::ClusterRole,
        ResourceKind::ClusterRoleBinding,
        ResourceKind::Secret,
        ResourceKind::ServiceMonitor,
        ResourceKind::Alertmanager,
        ResourceKind::PrometheusRule,
        ResourceKind::Prometheus,
    ];

    /// Lowercase plural used as the registry path segment.
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::ScalingTarget => "scalingtargets",
            ResourceKind::Deployment => "deployments",
            ResourceKind::ServiceAccount => "serviceaccounts",
            ResourceKind::ClusterRole => "clusterroles",
            ResourceKind::ClusterRoleBinding => "clusterrolebindings",
            ResourceKind::Secret => "secrets",
            ResourceKind::ServiceMonitor => "servicemonitors",
            ResourceKind::Alertmanager => "alertmanagers",
            ResourceKind::PrometheusRule => "prometheusrules",
            ResourceKind::Prometheus => "prometheuses",
        }
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            ResourceKind::ScalingTarget => "buildpiper.opstreelabs.in/v1",
            ResourceKind::Deployment => "apps/v1",
            ResourceKind::ServiceAccount | ResourceKind::Secret => "v1",
            ResourceKind::ClusterRole | ResourceKind::ClusterRoleBinding => {
                "rbac.authorization.k8s.io/v1"
            }
            ResourceKind::ServiceMonitor
            | ResourceKind::Alertmanager
            | ResourceKind::PrometheusRule
            | ResourceKind::Prometheus => "monitoring.coreos.com/v1",
        }
    }

    /// Cluster-scoped kinds ignore the namespace when addressed.
    pub fn is_cluster_scoped(&self) -> bool {
        matches!(
            self,
            ResourceKind::ClusterRole | ResourceKind::ClusterRoleBinding
        )
    }

    pub fn from_plural(plural: &str) -> Option<ResourceKind> {
        Self::ALL.into_iter().find(|k| k.plural() == plural)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceKind::ScalingTarget => "ScalingTarget",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::ServiceAccount => "ServiceAccount",
            ResourceKind::ClusterRole => "ClusterRole",
            ResourceKind::ClusterRoleBinding => "ClusterRoleBinding",
            ResourceKind::Secret => "Secret",
            ResourceKind::ServiceMonitor => "ServiceMonitor",
            ResourceKind::Alertmanager => "Alertmanager",
            ResourceKind::PrometheusRule => "PrometheusRule",
            ResourceKind::Prometheus => "Prometheus",
        };
        write!(f, "{}", name)
    }
}

/// A typed object that can be persisted in the store.
pub trait Resource: Serialize + DeserializeOwned + Send + Sync {
    const KIND: ResourceKind;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;
}

/// Implements [`Resource`] for an envelope struct with a `metadata` field.
#[macro_export]
macro_rules! impl_resource {
    ($ty:ty, $kind:expr) => {
        impl $crate::kind::Resource for $ty {
            const KIND: $crate::kind::ResourceKind = $kind;

            fn meta(&self) -> &$crate::meta::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut $crate::meta::ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plural_round_trips_for_every_kind() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_plural(kind.plural()), Some(kind));
        }
        assert_eq!(ResourceKind::from_plural("pods"), None);
    }

    #[test]
    fn only_rbac_cluster_objects_are_cluster_scoped() {
        let scoped: Vec<_> = ResourceKind::ALL
            .into_iter()
            .filter(|k| k.is_cluster_scoped())
            .collect();
        assert_eq!(
            scoped,
            vec![ResourceKind::ClusterRole, ResourceKind::ClusterRoleBinding]
        );
    }
}
