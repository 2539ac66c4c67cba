use pkg_types::kind::ResourceKind;
use pkg_types::rbac::ServiceAccount;
use pkg_types::scaling_target::ScalingTarget;

use super::{BuildContext, Dependent, DependentId, encode};
use crate::error::DependentError;
use crate::labels::{dependent_labels, dependent_meta, dependent_name, propagated_annotations};

pub const SUFFIX: &str = "-sa";

/// Identity the Prometheus instance runs under.
pub struct ServiceAccountDependent;

pub fn service_account(owner: &ScalingTarget) -> ServiceAccount {
    let name = dependent_name(owner.name(), SUFFIX);
    ServiceAccount {
        api_version: ResourceKind::ServiceAccount.api_version().to_string(),
        kind: ResourceKind::ServiceAccount.to_string(),
        metadata: dependent_meta(
            &name,
            owner.namespace(),
            dependent_labels(&name, owner, None),
            propagated_annotations(owner),
        ),
    }
}

impl Dependent for ServiceAccountDependent {
    fn id(&self) -> DependentId {
        DependentId::ServiceAccount
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::ServiceAccount
    }

    fn suffix(&self) -> &'static str {
        SUFFIX
    }

    fn build(&self, owner: &ScalingTarget, _ctx: &BuildContext) -> Result<Vec<u8>, DependentError> {
        encode(&service_account(owner))
    }
}
