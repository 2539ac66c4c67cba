//! Reconciliation and scaling constants.

// ─── Owner metadata ───────────────────────────────────────────────────────

/// Finalizer token that gates physical deletion of a ScalingTarget.
pub const FINALIZER: &str = "customautoscalingFinalizer";

/// Presence of this annotation pauses reconciliation of the owner.
pub const SKIP_RECONCILE_ANNOTATION: &str = "buildpiper.opstreelabs.in/skip-reconcile";

/// Index of the next pending teardown step, persisted while terminating.
pub const TEARDOWN_CURSOR_ANNOTATION: &str = "buildpiper.opstreelabs.in/teardown-cursor";

/// Annotations injected by client tooling that must not leak onto dependents.
pub const FILTERED_ANNOTATIONS: &[&str] = &[
    "kubectl.kubernetes.io/last-applied-configuration",
    "banzaicloud.com/last-applied",
];

// ─── Labels ───────────────────────────────────────────────────────────────

/// Label carrying a dependent's own name.
pub const APP_LABEL: &str = "app";

/// Discriminator label placed on the Alertmanager.
pub const ALERTMANAGER_SETUP_LABEL: &str = "alertManager_setup_type";

/// Discriminator label placed on the Prometheus instance.
pub const TARGET_JOB_LABEL: &str = "target_job";

/// Alert label naming the ScalingTarget an alert belongs to.
pub const TARGET_NAME_LABEL: &str = "scaling_target";

/// Alert label naming the ScalingTarget's namespace.
pub const TARGET_NAMESPACE_LABEL: &str = "scaling_target_namespace";

/// Alert label holding the severity used for the scaling decision.
pub const SEVERITY_LABEL: &str = "severity";

/// Severity attached to generated alerting rules when the owner names none.
pub const DEFAULT_ALERT_SEVERITY: &str = "warning";

// ─── Timing ───────────────────────────────────────────────────────────────

/// Fixed delay before an owner is reconciled again.
pub const REQUEUE_SECS: u64 = 10;

// ─── Images ───────────────────────────────────────────────────────────────

pub const ALERTMANAGER_IMAGE: &str = "quay.io/prometheus/alertmanager:v0.25.0";

pub const PROMETHEUS_IMAGE: &str = "quay.io/prometheus/prometheus:v2.42.0";

// ─── Scaling ──────────────────────────────────────────────────────────────

/// Replicas applied for a `critical` alert under the built-in policy.
pub const CRITICAL_REPLICAS: u32 = 5;

/// Replicas applied for a `warning` alert under the built-in policy.
pub const WARNING_REPLICAS: u32 = 3;

/// Replicas applied when no policy rule matches.
pub const FALLBACK_REPLICAS: u32 = 1;
