//! Alert severity to replica count.

use tracing::info;

use pkg_constants::autoscaler::{
    CRITICAL_REPLICAS, FALLBACK_REPLICAS, SEVERITY_LABEL, TARGET_NAME_LABEL,
    TARGET_NAMESPACE_LABEL, WARNING_REPLICAS,
};
use pkg_state::{ResourceStore, ResourceStoreExt, StoreError};
use pkg_types::alert::AlertmanagerPayload;
use pkg_types::config::ScalingPolicyConfig;
use pkg_types::deployment::Deployment;
use pkg_types::scaling_target::{OwnerKey, ScalingTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingDecision {
    pub desired_replicas: u32,
    /// Severity label of the alert the decision was made from, if any.
    pub severity: Option<String>,
}

/// Ordered `(severity, replicas)` rules; the first exact match wins and
/// anything unmatched, including a missing label, gets the fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingPolicy {
    rules: Vec<(String, u32)>,
    fallback: u32,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            rules: vec![
                ("critical".to_string(), CRITICAL_REPLICAS),
                ("warning".to_string(), WARNING_REPLICAS),
            ],
            fallback: FALLBACK_REPLICAS,
        }
    }
}

impl ScalingPolicy {
    /// Configured rules replace the defaults wholesale; an empty rule list
    /// keeps them.
    pub fn from_config(config: &ScalingPolicyConfig) -> Self {
        let defaults = Self::default();
        let rules = if config.rules.is_empty() {
            defaults.rules
        } else {
            config
                .rules
                .iter()
                .map(|r| (r.severity.clone(), r.replicas))
                .collect()
        };
        Self {
            rules,
            fallback: config.default_replicas.unwrap_or(defaults.fallback),
        }
    }

    pub fn replicas_for(&self, severity: Option<&str>) -> u32 {
        severity
            .and_then(|s| self.rules.iter().find(|(rule, _)| rule == s))
            .map(|(_, replicas)| *replicas)
            .unwrap_or(self.fallback)
    }

    /// Only the first alert of the batch is considered.
    pub fn decide(&self, payload: &AlertmanagerPayload) -> ScalingDecision {
        let severity = payload
            .alerts
            .first()
            .and_then(|a| a.label(SEVERITY_LABEL))
            .map(str::to_string);
        ScalingDecision {
            desired_replicas: self.replicas_for(severity.as_deref()),
            severity,
        }
    }
}

/// Owner the batch was raised for, from the correlation labels the
/// generated alerting rule attaches.
pub fn alert_target(payload: &AlertmanagerPayload) -> Option<OwnerKey> {
    let alert = payload.alerts.first()?;
    let name = alert.label(TARGET_NAME_LABEL).filter(|s| !s.is_empty())?;
    let namespace = alert
        .label(TARGET_NAMESPACE_LABEL)
        .filter(|s| !s.is_empty())?;
    Some(OwnerKey::new(namespace, name))
}

/// Sets the owner's workload to `replicas`. Returns the previous count.
/// Writing the same value again is harmless, so no comparison is made.
pub async fn scale_workload(
    store: &dyn ResourceStore,
    owner: &ScalingTarget,
    replicas: u32,
) -> Result<u32, StoreError> {
    let workload = &owner.spec.application_ref.deployment_name;
    let mut deployment: Deployment = store.get_object(owner.namespace(), workload).await?;
    let previous = deployment.spec.replicas;
    deployment.spec.replicas = replicas;
    store.update_object(&deployment).await?;
    info!(
        "Deployment {}/{}: replicas {} -> {}",
        owner.namespace(),
        workload,
        previous,
        replicas
    );
    Ok(previous)
}
