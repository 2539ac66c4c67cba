use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Names of the series the controller and webhook report.
pub mod names {
    pub const RECONCILE_PASSES: &str = "autoscaler_reconcile_passes_total";
    pub const RECONCILE_ERRORS: &str = "autoscaler_reconcile_errors_total";
    pub const RECONCILE_SKIPPED: &str = "autoscaler_reconcile_skipped_total";
    pub const DEPENDENTS_CREATED: &str = "autoscaler_dependents_created_total";
    pub const DEPENDENTS_DELETED: &str = "autoscaler_dependents_deleted_total";
    pub const TEARDOWNS_COMPLETED: &str = "autoscaler_teardowns_completed_total";
    pub const WEBHOOK_REQUESTS: &str = "autoscaler_webhook_requests_total";
    pub const WEBHOOK_REJECTED: &str = "autoscaler_webhook_rejected_total";
    pub const WEBHOOK_FAILED: &str = "autoscaler_webhook_failed_total";
    pub const LAST_DESIRED_REPLICAS: &str = "autoscaler_last_desired_replicas";
    pub const QUEUE_DEPTH: &str = "autoscaler_queue_depth";
}

/// A lightweight, thread-safe metrics registry that renders in Prometheus text exposition format.
pub struct MetricsRegistry {
    counters: RwLock<BTreeMap<String, Counter>>,
    gauges: RwLock<BTreeMap<String, Gauge>>,
}

/// Monotonically increasing counter.
pub struct Counter {
    value: AtomicU64,
    help: String,
}

/// Value that can go up or down.
pub struct Gauge {
    value: AtomicI64,
    help: String,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            gauges: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registry pre-populated with every series in [`names`].
    pub fn for_autoscaler() -> Self {
        let registry = Self::new();
        registry.register_counter(names::RECONCILE_PASSES, "Reconciliation passes run");
        registry.register_counter(
            names::RECONCILE_ERRORS,
            "Reconciliation passes that stopped on an error",
        );
        registry.register_counter(
            names::RECONCILE_SKIPPED,
            "Passes skipped by the skip-reconcile annotation",
        );
        registry.register_counter(names::DEPENDENTS_CREATED, "Dependent resources created");
        registry.register_counter(names::DEPENDENTS_DELETED, "Dependent resources deleted");
        registry.register_counter(
            names::TEARDOWNS_COMPLETED,
            "Owners released after a complete teardown",
        );
        registry.register_counter(names::WEBHOOK_REQUESTS, "Alert webhook requests received");
        registry.register_counter(names::WEBHOOK_REJECTED, "Alert webhook requests rejected as malformed");
        registry.register_counter(
            names::WEBHOOK_FAILED,
            "Alert webhook requests that failed against the workload",
        );
        registry.register_gauge(
            names::LAST_DESIRED_REPLICAS,
            "Replica count applied by the most recent scaling decision",
        );
        registry.register_gauge(names::QUEUE_DEPTH, "Owner keys waiting for reconciliation");
        registry
    }

    fn counters_read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Counter>> {
        self.counters.read().unwrap_or_else(|e| e.into_inner())
    }

    fn counters_write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Counter>> {
        self.counters.write().unwrap_or_else(|e| e.into_inner())
    }

    fn gauges_read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Gauge>> {
        self.gauges.read().unwrap_or_else(|e| e.into_inner())
    }

    fn gauges_write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Gauge>> {
        self.gauges.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a counter. If it already exists, this is a no-op.
    pub fn register_counter(&self, name: &str, help: &str) {
        self.counters_write()
            .entry(name.to_string())
            .or_insert_with(|| Counter {
                value: AtomicU64::new(0),
                help: help.to_string(),
            });
    }

    /// Register a gauge. If it already exists, this is a no-op.
    pub fn register_gauge(&self, name: &str, help: &str) {
        self.gauges_write()
            .entry(name.to_string())
            .or_insert_with(|| Gauge {
                value: AtomicI64::new(0),
                help: help.to_string(),
            });
    }

    /// Increment a counter by 1.
    pub fn counter_inc(&self, name: &str) {
        self.counter_add(name, 1);
    }

    /// Increment a counter by a given amount.
    pub fn counter_add(&self, name: &str, val: u64) {
        if let Some(c) = self.counters_read().get(name) {
            c.value.fetch_add(val, Ordering::Relaxed);
        }
    }

    /// Current value of a counter, 0 if unregistered.
    pub fn counter_value(&self, name: &str) -> u64 {
        self.counters_read()
            .get(name)
            .map(|c| c.value.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Set a gauge to a specific value.
    pub fn gauge_set(&self, name: &str, val: i64) {
        if let Some(g) = self.gauges_read().get(name) {
            g.value.store(val, Ordering::Relaxed);
        }
    }

    pub fn gauge_value(&self, name: &str) -> i64 {
        self.gauges_read()
            .get(name)
            .map(|g| g.value.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut output = String::new();

        for (name, counter) in self.counters_read().iter() {
            output.push_str(&format!("# HELP {} {}\n", name, counter.help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!(
                "{} {}\n",
                name,
                counter.value.load(Ordering::Relaxed)
            ));
        }

        for (name, gauge) in self.gauges_read().iter() {
            output.push_str(&format!("# HELP {} {}\n", name, gauge.help));
            output.push_str(&format!("# TYPE {} gauge\n", name));
            output.push_str(&format!(
                "{} {}\n",
                name,
                gauge.value.load(Ordering::Relaxed)
            ));
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_series_are_ignored() {
        let registry = MetricsRegistry::new();
        registry.counter_inc("nope");
        registry.gauge_set("nope", 3);
        assert_eq!(registry.counter_value("nope"), 0);
        assert!(registry.render().is_empty());
    }

    #[test]
    fn renders_exposition_format() {
        let registry = MetricsRegistry::for_autoscaler();
        registry.counter_inc(names::RECONCILE_PASSES);
        registry.counter_add(names::DEPENDENTS_CREATED, 9);
        registry.gauge_set(names::LAST_DESIRED_REPLICAS, 5);

        let text = registry.render();
        assert!(text.contains("# TYPE autoscaler_reconcile_passes_total counter\n"));
        assert!(text.contains("autoscaler_reconcile_passes_total 1\n"));
        assert!(text.contains("autoscaler_dependents_created_total 9\n"));
        assert!(text.contains("# TYPE autoscaler_last_desired_replicas gauge\n"));
        assert!(text.contains("autoscaler_last_desired_replicas 5\n"));
    }
}
