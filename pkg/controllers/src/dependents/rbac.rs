//! Cluster-wide read access for the per-owner Prometheus.

use pkg_types::kind::ResourceKind;
use pkg_types::rbac::{
    ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject, SubjectKind,
};
use pkg_types::scaling_target::ScalingTarget;

use super::{BuildContext, Dependent, DependentId, encode, service_account};
use crate::error::DependentError;
use crate::labels::{dependent_labels, dependent_meta, dependent_name, propagated_annotations};

pub const ROLE_SUFFIX: &str = "-clusterrole";
pub const BINDING_SUFFIX: &str = "-rolebinding";

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Discovery and scrape permissions Prometheus needs across the cluster.
fn scrape_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            api_groups: strings(&[""]),
            resources: strings(&["nodes", "nodes/metrics", "services", "endpoints", "pods"]),
            verbs: strings(&["get", "list", "watch"]),
            ..Default::default()
        },
        PolicyRule {
            api_groups: strings(&[""]),
            resources: strings(&["configmaps"]),
            verbs: strings(&["get"]),
            ..Default::default()
        },
        PolicyRule {
            api_groups: strings(&["networking.k8s.io"]),
            resources: strings(&["ingresses"]),
            verbs: strings(&["get", "list", "watch"]),
            ..Default::default()
        },
        PolicyRule {
            non_resource_urls: strings(&["/metrics"]),
            verbs: strings(&["get"]),
            ..Default::default()
        },
    ]
}

pub fn cluster_role(owner: &ScalingTarget) -> ClusterRole {
    let name = dependent_name(owner.name(), ROLE_SUFFIX);
    ClusterRole {
        api_version: ResourceKind::ClusterRole.api_version().to_string(),
        kind: ResourceKind::ClusterRole.to_string(),
        metadata: dependent_meta(
            &name,
            "",
            dependent_labels(&name, owner, None),
            propagated_annotations(owner),
        ),
        rules: scrape_rules(),
    }
}

/// Binds `<owner>-clusterrole` to the owner's service account.
///
/// Both RBAC objects are cluster-scoped and named after the owner alone, so
/// same-named owners in different namespaces share them. The binding keeps
/// the subject of whichever owner created it first, and tearing down either
/// owner deletes the pair for both.
pub fn cluster_role_binding(owner: &ScalingTarget) -> ClusterRoleBinding {
    let name = dependent_name(owner.name(), BINDING_SUFFIX);
    ClusterRoleBinding {
        api_version: ResourceKind::ClusterRoleBinding.api_version().to_string(),
        kind: ResourceKind::ClusterRoleBinding.to_string(),
        metadata: dependent_meta(
            &name,
            "",
            dependent_labels(&name, owner, None),
            propagated_annotations(owner),
        ),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: ResourceKind::ClusterRole.to_string(),
            name: dependent_name(owner.name(), ROLE_SUFFIX),
        },
        subjects: vec![Subject {
            kind: SubjectKind::ServiceAccount,
            name: dependent_name(owner.name(), service_account::SUFFIX),
            namespace: Some(owner.namespace().to_string()),
        }],
    }
}

pub struct ClusterRoleDependent;

impl Dependent for ClusterRoleDependent {
    fn id(&self) -> DependentId {
        DependentId::ClusterRole
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::ClusterRole
    }

    fn suffix(&self) -> &'static str {
        ROLE_SUFFIX
    }

    fn build(&self, owner: &ScalingTarget, _ctx: &BuildContext) -> Result<Vec<u8>, DependentError> {
        encode(&cluster_role(owner))
    }
}

pub struct ClusterRoleBindingDependent;

impl Dependent for ClusterRoleBindingDependent {
    fn id(&self) -> DependentId {
        DependentId::ClusterRoleBinding
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::ClusterRoleBinding
    }

    fn suffix(&self) -> &'static str {
        BINDING_SUFFIX
    }

    fn predecessors(&self) -> &'static [DependentId] {
        &[DependentId::ServiceAccount, DependentId::ClusterRole]
    }

    fn build(&self, owner: &ScalingTarget, _ctx: &BuildContext) -> Result<Vec<u8>, DependentError> {
        encode(&cluster_role_binding(owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependents::tests::orders_svc;

    #[test]
    fn binding_grants_role_to_owner_service_account() {
        let owner = orders_svc();
        let binding = cluster_role_binding(&owner);
        assert_eq!(binding.role_ref.name, "orders-svc-clusterrole");
        assert_eq!(binding.role_ref.kind, "ClusterRole");
        assert_eq!(binding.subjects.len(), 1);
        assert_eq!(binding.subjects[0].name, "orders-svc-sa");
        assert_eq!(binding.subjects[0].namespace.as_deref(), Some("prod"));
        assert!(binding.metadata.namespace.is_empty());
    }

    #[test]
    fn role_allows_metrics_endpoint() {
        let role = cluster_role(&orders_svc());
        assert!(
            role.rules
                .iter()
                .any(|r| r.non_resource_urls == vec!["/metrics".to_string()])
        );
        assert_eq!(role.metadata.labels.get("app").map(String::as_str), Some("orders-svc-clusterrole"));
    }
}
