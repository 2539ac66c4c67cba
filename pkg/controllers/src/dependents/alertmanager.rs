//! The notification path: Alertmanager routing config and the instance
//! that loads it.

use std::collections::BTreeMap;

use serde_json::json;

use pkg_constants::autoscaler::{
    ALERTMANAGER_IMAGE, ALERTMANAGER_SETUP_LABEL, APP_LABEL,
};
use pkg_types::kind::ResourceKind;
use pkg_types::monitoring::{Alertmanager, AlertmanagerSpec, LabelSelector, PodSecurityContext};
use pkg_types::scaling_target::ScalingTarget;
use pkg_types::secret::Secret;

use super::{BuildContext, Dependent, DependentId, encode};
use crate::error::DependentError;
use crate::labels::{dependent_labels, dependent_meta, dependent_name, propagated_annotations};

pub const CONFIG_SUFFIX: &str = "-alertsecret";
pub const INSTANCE_SUFFIX: &str = "-alert";

/// Key the Alertmanager operator reads its config from.
pub const CONFIG_KEY: &str = "alertmanager.yaml";
pub const RECEIVER: &str = "webhook_receiver";

const REPLICAS: u32 = 3;
const SETUP_TYPE: &str = "Cluster";
const RUN_AS_USER: i64 = 1000;
const RUN_AS_GROUP: i64 = 2000;
const FS_GROUP: i64 = 2000;

const MANAGED_MARKER: &str = "buildpiper.opstreelabs.in";
const INSTANCE_MARKER: &str = "buildpiper.opstreelabs.AlertInstance";
const WEBHOOK_MARKER: &str = "buildpiper.opstreelabs.WebhookIntegration";

/// Routing document: everything goes to the webhook receiver, and critical
/// alerts inhibit lower severities for the same alert and namespace.
pub fn alertmanager_config(webhook_url: &str) -> Result<String, DependentError> {
    let inhibit = |source: &str, target: &str| {
        json!({
            "source_matchers": [format!("severity = {}", source)],
            "target_matchers": [format!("severity =~ {}", target)],
            "equal": ["namespace", "alertname"],
        })
    };
    let document = json!({
        "global": { "resolve_timeout": "5m" },
        "inhibit_rules": [
            inhibit("critical", "warning|info"),
            inhibit("warning", "info"),
            {
                "source_matchers": ["alertname = InfoInhibitor"],
                "target_matchers": ["severity = info"],
                "equal": ["namespace"],
            },
        ],
        "receivers": [{
            "name": RECEIVER,
            "webhook_configs": [{
                "url": webhook_url,
                "send_resolved": false,
            }],
        }],
        "route": {
            "group_by": ["namespace"],
            "group_wait": "30s",
            "group_interval": "5m",
            "repeat_interval": "12h",
            "receiver": RECEIVER,
        },
    });
    serde_yaml::to_string(&document)
        .map_err(|e| DependentError::Config(format!("alertmanager config: {}", e)))
}

pub fn alertmanager_config_secret(
    owner: &ScalingTarget,
    ctx: &BuildContext,
) -> Result<Secret, DependentError> {
    let name = dependent_name(owner.name(), CONFIG_SUFFIX);
    let mut string_data = BTreeMap::new();
    string_data.insert(CONFIG_KEY.to_string(), alertmanager_config(&ctx.webhook_url)?);
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
        data: BTreeMap::new(),
        string_data,
    })
}

pub fn alertmanager(owner: &ScalingTarget) -> Alertmanager {
    let name = dependent_name(owner.name(), INSTANCE_SUFFIX);
    let config_name = dependent_name(owner.name(), CONFIG_SUFFIX);

    // Owner annotations override the markers.
    let mut annotations = BTreeMap::new();
    annotations.insert(MANAGED_MARKER.to_string(), "true".to_string());
    annotations.insert(INSTANCE_MARKER.to_string(), name.clone());
    annotations.insert(WEBHOOK_MARKER.to_string(), "true".to_string());
    annotations.extend(propagated_annotations(owner));

    Alertmanager {
        api_version: ResourceKind::Alertmanager.api_version().to_string(),
        kind: ResourceKind::Alertmanager.to_string(),
        metadata: dependent_meta(
            &name,
            owner.namespace(),
            dependent_labels(&name, owner, Some((ALERTMANAGER_SETUP_LABEL, SETUP_TYPE))),
            annotations,
        ),
        spec: AlertmanagerSpec {
            replicas: REPLICAS,
            image: ALERTMANAGER_IMAGE.to_string(),
            config_secret: config_name.clone(),
            alertmanager_config_selector: LabelSelector::single(APP_LABEL, &config_name),
            security_context: PodSecurityContext {
                run_as_user: RUN_AS_USER,
                run_as_group: RUN_AS_GROUP,
                fs_group: FS_GROUP,
                run_as_non_root: true,
            },
            force_enable_cluster_mode: false,
        },
    }
}

pub struct AlertmanagerConfigDependent;

impl Dependent for AlertmanagerConfigDependent {
    fn id(&self) -> DependentId {
        DependentId::AlertmanagerConfig
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Secret
    }

    fn suffix(&self) -> &'static str {
        CONFIG_SUFFIX
    }

    fn build(&self, owner: &ScalingTarget, ctx: &BuildContext) -> Result<Vec<u8>, DependentError> {
        encode(&alertmanager_config_secret(owner, ctx)?)
    }
}

pub struct AlertmanagerDependent;

impl Dependent for AlertmanagerDependent {
    fn id(&self) -> DependentId {
        DependentId::Alertmanager
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Alertmanager
    }

    fn suffix(&self) -> &'static str {
        INSTANCE_SUFFIX
    }

    fn predecessors(&self) -> &'static [DependentId] {
        &[DependentId::AlertmanagerConfig]
    }

    fn build(&self, owner: &ScalingTarget, _ctx: &BuildContext) -> Result<Vec<u8>, DependentError> {
        encode(&alertmanager(owner))
    }
}
