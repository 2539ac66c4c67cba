//! Naming and labeling shared by every dependent resource.

use std::collections::BTreeMap;

use pkg_constants::autoscaler::{
    APP_LABEL, SKIP_RECONCILE_ANNOTATION, TEARDOWN_CURSOR_ANNOTATION,
};
use pkg_types::meta::{ObjectMeta, filter_annotations};
use pkg_types::scaling_target::ScalingTarget;

/// Deterministic dependent name: owner name plus the kind's fixed suffix.
pub fn dependent_name(owner: &str, suffix: &str) -> String {
    format!("{}{}", owner, suffix)
}

/// Inverse of [`dependent_name`]; `None` if `name` does not carry `suffix`.
pub fn owner_name<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    name.strip_suffix(suffix).filter(|owner| !owner.is_empty())
}

/// `{app: name}` merged with the owner's labels and an optional
/// kind-specific discriminator. `app` and the discriminator win on conflict.
pub fn dependent_labels(
    name: &str,
    owner: &ScalingTarget,
    discriminator: Option<(&str, &str)>,
) -> BTreeMap<String, String> {
    let mut labels = owner.metadata.labels.clone();
    labels.insert(APP_LABEL.to_string(), name.to_string());
    if let Some((key, value)) = discriminator {
        labels.insert(key.to_string(), value.to_string());
    }
    labels
}

/// Owner annotations minus tooling noise and the controller's own markers.
pub fn propagated_annotations(owner: &ScalingTarget) -> BTreeMap<String, String> {
    let mut annotations = filter_annotations(owner.metadata.annotations.clone());
    annotations.remove(SKIP_RECONCILE_ANNOTATION);
    annotations.remove(TEARDOWN_CURSOR_ANNOTATION);
    annotations
}

/// Metadata for a dependent in `namespace` (empty for cluster-scoped kinds).
pub fn dependent_meta(
    name: &str,
    namespace: &str,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
) -> ObjectMeta {
    ObjectMeta::new(name, namespace)
        .with_labels(labels)
        .with_annotations(annotations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::scaling_target::ScalingTargetSpec;

    fn owner() -> ScalingTarget {
        let mut target = ScalingTarget::new("orders-svc", "prod", ScalingTargetSpec::default());
        target
            .metadata
            .labels
            .insert("team".to_string(), "payments".to_string());
        target
            .metadata
            .labels
            .insert("app".to_string(), "orders".to_string());
        target.metadata.annotations.insert(
            "kubectl.kubernetes.io/last-applied-configuration".to_string(),
            "{}".to_string(),
        );
        target
            .metadata
            .annotations
            .insert(SKIP_RECONCILE_ANNOTATION.to_string(), String::new());
        target
            .metadata
            .annotations
            .insert("owner".to_string(), "sre".to_string());
        target
    }

    #[test]
    fn names_round_trip() {
        let name = dependent_name("orders-svc", "-svcm");
        assert_eq!(name, "orders-svc-svcm");
        assert_eq!(owner_name(&name, "-svcm"), Some("orders-svc"));
        assert_eq!(owner_name(&name, "-sa"), None);
        assert_eq!(owner_name("-sa", "-sa"), None);
    }

    #[test]
    fn app_and_discriminator_override_owner_labels() {
        let labels = dependent_labels(
            "orders-svc-alert",
            &owner(),
            Some(("alertManager_setup_type", "Cluster")),
        );
        assert_eq!(labels["app"], "orders-svc-alert");
        assert_eq!(labels["team"], "payments");
        assert_eq!(labels["alertManager_setup_type"], "Cluster");
    }

    #[test]
    fn annotations_drop_noise_and_control_markers() {
        let annotations = propagated_annotations(&owner());
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations["owner"], "sre");
    }
}
