//! The evaluation path: alerting rule, scrape config and the Prometheus
//! instance that runs both.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;

use pkg_constants::autoscaler::{
    APP_LABEL, DEFAULT_ALERT_SEVERITY, PROMETHEUS_IMAGE, SEVERITY_LABEL, TARGET_JOB_LABEL,
    TARGET_NAME_LABEL, TARGET_NAMESPACE_LABEL,
};
use pkg_types::kind::ResourceKind;
use pkg_types::monitoring::{
    AlertingSpec, AlertmanagerEndpoint, LabelSelector, Prometheus, PrometheusRule,
    PrometheusRuleSpec, PrometheusSpec, ResourceRequirements, Rule, RuleGroup, SecretKeySelector,
};
use pkg_types::scaling_target::ScalingTarget;
use pkg_types::secret::Secret;

use super::{BuildContext, Dependent, DependentId, alertmanager, encode, service_account,
    service_monitor};
use crate::error::DependentError;
use crate::labels::{dependent_labels, dependent_meta, dependent_name, propagated_annotations};

pub const RULE_SUFFIX: &str = "-prometheus-rule";
pub const SCRAPE_SUFFIX: &str = "-secret";
pub const INSTANCE_SUFFIX: &str = "-prometheus-instance";

pub const SCRAPE_CONFIG_KEY: &str = "scrape-config.yml";
const RULE_GROUP: &str = "rule";
const RULE_FOR: &str = "10s";
const ALERTMANAGER_PORT: &str = "alert-port";

const REPLICAS: u32 = 3;
const SHARDS: u32 = 1;
const SCRAPE_INTERVAL: &str = "30s";
const RETENTION: &str = "20d";

// --- Alerting rule ---

/// Single alert whose expression is the owner's query, labeled so the
/// webhook can find its way back to the owner.
pub fn prometheus_rule(owner: &ScalingTarget) -> PrometheusRule {
    let name = dependent_name(owner.name(), RULE_SUFFIX);
    let severity = owner
        .spec
        .alert_severity
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_ALERT_SEVERITY.to_string());

    let mut labels = BTreeMap::new();
    labels.insert(SEVERITY_LABEL.to_string(), severity);
    labels.insert(TARGET_NAME_LABEL.to_string(), owner.name().to_string());
    labels.insert(TARGET_NAMESPACE_LABEL.to_string(), owner.namespace().to_string());

    PrometheusRule {
        api_version: ResourceKind::PrometheusRule.api_version().to_string(),
        kind: ResourceKind::PrometheusRule.to_string(),
        metadata: dependent_meta(
            &name,
            owner.namespace(),
            dependent_labels(&name, owner, None),
            propagated_annotations(owner),
        ),
        spec: PrometheusRuleSpec {
            groups: vec![RuleGroup {
                name: RULE_GROUP.to_string(),
                rules: vec![Rule {
                    alert: format!("{}-scaling", owner.name()),
                    expr: owner.spec.scaling_query.clone(),
                    for_duration: RULE_FOR.to_string(),
                    labels,
                }],
            }],
        },
    }
}

pub struct AlertingRuleDependent;

impl Dependent for AlertingRuleDependent {
    fn id(&self) -> DependentId {
        DependentId::AlertingRule
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::PrometheusRule
    }

    fn suffix(&self) -> &'static str {
        RULE_SUFFIX
    }

    fn build(&self, owner: &ScalingTarget, _ctx: &BuildContext) -> Result<Vec<u8>, DependentError> {
        encode(&prometheus_rule(owner))
    }
}

// --- Scrape config ---

/// Additional scrape job pointing at the workload's service and port.
pub fn scrape_config(owner: &ScalingTarget) -> Result<String, DependentError> {
    let app = &owner.spec.application_ref;
    let document = json!([{
        "job_name": owner.name(),
        "static_configs": [{
            "targets": [format!("{}:{}", app.deployment_service, app.deployment_port)],
        }],
    }]);
    serde_yaml::to_string(&document)
        .map_err(|e| DependentError::Config(format!("scrape config: {}", e)))
}

pub fn scrape_config_secret(owner: &ScalingTarget) -> Result<Secret, DependentError> {
    let name = dependent_name(owner.name(), SCRAPE_SUFFIX);
    let mut data = BTreeMap::new();
    data.insert(
        SCRAPE_CONFIG_KEY.to_string(),
        STANDARD.encode(scrape_config(owner)?),
    );
    Ok(Secret {
        api_version: ResourceKind::Secret.api_version().to_string(),
        kind: ResourceKind::Secret.to_string(),
        metadata: dependent_meta(
            &name,
            owner.namespace(),
            dependent_labels(&name, owner, None),
            propagated_annotations(owner),
        ),
        secret_type: "Opaque".to_string(),
        data,
        string_data: BTreeMap::new(),
    })
}

pub struct ScrapeConfigDependent;

impl Dependent for ScrapeConfigDependent {
    fn id(&self) -> DependentId {
        DependentId::ScrapeConfig
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Secret
    }

    fn suffix(&self) -> &'static str {
        SCRAPE_SUFFIX
    }

    fn build(&self, owner: &ScalingTarget, _ctx: &BuildContext) -> Result<Vec<u8>, DependentError> {
        encode(&scrape_config_secret(owner)?)
    }
}

// --- Prometheus instance ---

const BINARY_SUFFIXES: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SUFFIXES: [&str; 10] = ["n", "u", "m", "", "k", "M", "G", "T", "P", "E"];

/// Checks `quantity` against the platform's resource quantity grammar:
/// an unsigned decimal number followed by a binary suffix, a decimal
/// suffix or an `e`/`E` exponent.
pub fn validate_quantity(quantity: &str) -> Result<(), String> {
    let digits_end = quantity
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(quantity.len());
    let (number, suffix) = quantity.split_at(digits_end);

    let mut parts = number.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next();
    let number_ok = match fraction {
        Some(f) => !f.contains('.') && !(whole.is_empty() && f.is_empty()),
        None => !whole.is_empty(),
    };
    if !number_ok {
        return Err(format!("quantity {:?} has no valid number", quantity));
    }

    let suffix_ok = BINARY_SUFFIXES.contains(&suffix)
        || DECIMAL_SUFFIXES.contains(&suffix)
        || suffix
            .strip_prefix(['e', 'E'])
            .map(|exp| {
                let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
                !exp.is_empty() && exp.chars().all(|c| c.is_ascii_digit())
            })
            .unwrap_or(false);
    if !suffix_ok {
        return Err(format!("quantity {:?} has unknown suffix {:?}", quantity, suffix));
    }
    Ok(())
}

pub fn prometheus(owner: &ScalingTarget) -> Result<Prometheus, DependentError> {
    let name = dependent_name(owner.name(), INSTANCE_SUFFIX);
    let app = &owner.spec.application_ref;

    let mut requests = BTreeMap::new();
    if let Some(memory) = owner.memory_request() {
        validate_quantity(memory).map_err(DependentError::Config)?;
        requests.insert("memory".to_string(), memory.to_string());
    }

    Ok(Prometheus {
        api_version: ResourceKind::Prometheus.api_version().to_string(),
        kind: ResourceKind::Prometheus.to_string(),
        metadata: dependent_meta(
            &name,
            owner.namespace(),
            dependent_labels(&name, owner, Some((TARGET_JOB_LABEL, &app.deployment_name))),
            propagated_annotations(owner),
        ),
        spec: PrometheusSpec {
            image: PROMETHEUS_IMAGE.to_string(),
            service_account_name: dependent_name(owner.name(), service_account::SUFFIX),
            replicas: REPLICAS,
            shards: SHARDS,
            resources: ResourceRequirements { requests },
            alerting: AlertingSpec {
                alertmanagers: vec![AlertmanagerEndpoint {
                    namespace: owner.namespace().to_string(),
                    name: dependent_name(owner.name(), alertmanager::INSTANCE_SUFFIX),
                    port: ALERTMANAGER_PORT.to_string(),
                }],
            },
            rule_selector: LabelSelector::single(
                APP_LABEL,
                &dependent_name(owner.name(), RULE_SUFFIX),
            ),
            service_monitor_selector: LabelSelector::single(
                APP_LABEL,
                &dependent_name(owner.name(), service_monitor::SUFFIX),
            ),
            additional_scrape_configs: SecretKeySelector {
                name: dependent_name(owner.name(), SCRAPE_SUFFIX),
                key: SCRAPE_CONFIG_KEY.to_string(),
            },
            scrape_interval: SCRAPE_INTERVAL.to_string(),
            retention: RETENTION.to_string(),
            log_level: "info".to_string(),
            log_format: "logfmt".to_string(),
            route_prefix: "/".to_string(),
            enable_remote_write_receiver: true,
            enable_admin_api: false,
            wal_compression: true,
        },
    })
}

pub struct PrometheusDependent;

impl Dependent for PrometheusDependent {
    fn id(&self) -> DependentId {
        DependentId::Prometheus
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Prometheus
    }

    fn suffix(&self) -> &'static str {
        INSTANCE_SUFFIX
    }

    fn predecessors(&self) -> &'static [DependentId] {
        &[
            DependentId::ServiceAccount,
            DependentId::Alertmanager,
            DependentId::AlertingRule,
            DependentId::ScrapeConfig,
        ]
    }

    fn build(&self, owner: &ScalingTarget, _ctx: &BuildContext) -> Result<Vec<u8>, DependentError> {
        encode(&prometheus(owner)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependents::tests::orders_svc;

    #[test]
    fn rule_carries_query_verbatim_and_correlation_labels() {
        let rule = prometheus_rule(&orders_svc());
        let r = &rule.spec.groups[0].rules[0];
        assert_eq!(r.expr, "sum(rate(http_requests_total[1m])) > 100");
        assert_eq!(r.for_duration, "10s");
        assert_eq!(r.labels.get(SEVERITY_LABEL).map(String::as_str), Some("warning"));
        assert_eq!(r.labels.get(TARGET_NAME_LABEL).map(String::as_str), Some("orders-svc"));
        assert_eq!(r.labels.get(TARGET_NAMESPACE_LABEL).map(String::as_str), Some("prod"));
    }

    #[test]
    fn rule_severity_follows_owner() {
        let mut owner = orders_svc();
        owner.spec.alert_severity = Some("critical".to_string());
        let rule = prometheus_rule(&owner);
        assert_eq!(
            rule.spec.groups[0].rules[0].labels.get(SEVERITY_LABEL).map(String::as_str),
            Some("critical")
        );
    }

    #[test]
    fn scrape_secret_targets_service_port() {
        let secret = scrape_config_secret(&orders_svc()).unwrap();
        let encoded = secret.data.get(SCRAPE_CONFIG_KEY).unwrap();
        let decoded = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(decoded.contains("orders:8080"), "{}", decoded);
        assert!(decoded.contains("job_name: orders-svc"), "{}", decoded);
    }

    #[test]
    fn instance_wires_sibling_objects() {
        let instance = prometheus(&orders_svc()).unwrap();
        let spec = &instance.spec;
        assert_eq!(instance.metadata.name, "orders-svc-prometheus-instance");
        assert_eq!(spec.service_account_name, "orders-svc-sa");
        assert_eq!(spec.replicas, 3);
        assert_eq!(spec.resources.requests.get("memory").map(String::as_str), Some("512Mi"));
        assert_eq!(spec.alerting.alertmanagers[0].name, "orders-svc-alert");
        assert_eq!(
            spec.rule_selector.match_labels.get(APP_LABEL).map(String::as_str),
            Some("orders-svc-prometheus-rule")
        );
        assert_eq!(spec.additional_scrape_configs.name, "orders-svc-secret");
        assert_eq!(
            instance.metadata.labels.get(TARGET_JOB_LABEL).map(String::as_str),
            Some("orders-deploy")
        );
    }

    #[test]
    fn invalid_memory_is_a_config_error() {
        let mut owner = orders_svc();
        owner
            .spec
            .scaling_params_mapping
            .insert("memory".to_string(), "lots".to_string());
        assert!(matches!(prometheus(&owner), Err(DependentError::Config(_))));
    }

    #[test]
    fn quantity_grammar() {
        for ok in ["512Mi", "1Gi", "100", "0.5", "1.5G", "2e3", "128974848", "129M", ".5Ki"] {
            assert!(validate_quantity(ok).is_ok(), "{}", ok);
        }
        for bad in ["", "lots", "Mi", "5Xi", "1.2.3", "12 Mi", "-1Gi", "1e"] {
            assert!(validate_quantity(bad).is_err(), "{}", bad);
        }
    }
}
