use anyhow::{Result, bail};

use crate::scaling_target::ScalingTarget;

/// Validate a Kubernetes-style resource name.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > 63 {
        bail!("name '{}' exceeds 63 characters (got {})", name, name.len());
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must not start or end with a hyphen", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        );
    }
    Ok(())
}

/// Validate a ScalingTarget before it is admitted to the store.
pub fn validate_scaling_target(target: &ScalingTarget) -> Result<()> {
    validate_name(target.name())?;
    validate_name(target.namespace())?;
    let app = &target.spec.application_ref;
    validate_name(&app.deployment_name)?;
    if app.deployment_service.is_empty() {
        bail!("applicationRef.deploymentService must not be empty");
    }
    if app.deployment_port.is_empty() {
        bail!("applicationRef.deploymentPort must not be empty");
    }
    if target.spec.scaling_query.trim().is_empty() {
        bail!("scalingQuery must not be empty");
    }
    Ok(())
}
