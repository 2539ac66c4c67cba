use serde::{Deserialize, Serialize};

/// Controller configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// data-dir: /var/lib/autoscaler/data
/// webhook-port: 3030
/// api-port: 8080
/// requeue-seconds: 10
/// workers: 4
/// webhook-url: http://autoscaler-webhook.autoscaler-system.svc:3030/webhook
/// scaling-policy:
///   rules:
///     - severity: critical
///       replicas: 5
///     - severity: warning
///       replicas: 3
///   default-replicas: 1
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfigFile {
    #[serde(default, alias = "data-dir")]
    pub data_dir: Option<String>,
    #[serde(default, alias = "webhook-port")]
    pub webhook_port: Option<u16>,
    #[serde(default, alias = "api-port")]
    pub api_port: Option<u16>,
    #[serde(default, alias = "requeue-seconds")]
    pub requeue_seconds: Option<u64>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default, alias = "webhook-url")]
    pub webhook_url: Option<String>,
    #[serde(default, alias = "scaling-policy")]
    pub scaling_policy: Option<ScalingPolicyConfig>,
}

/// Ordered severity → replicas table. The first matching rule wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalingPolicyConfig {
    #[serde(default)]
    pub rules: Vec<SeverityRuleConfig>,
    #[serde(default, alias = "default-replicas")]
    pub default_replicas: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityRuleConfig {
    pub severity: String,
    pub replicas: u32,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}
