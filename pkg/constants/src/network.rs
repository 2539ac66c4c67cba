//! Network-related constants.

/// Default port for the alert webhook listener.
pub const DEFAULT_WEBHOOK_PORT: u16 = 3030;

/// Default port for the management API (health, metrics, resources).
pub const DEFAULT_API_PORT: u16 = 8080;

/// Route the alert webhook is served on.
pub const WEBHOOK_PATH: &str = "/webhook";

/// Host name the generated Alertmanager config posts alerts to when no
/// explicit webhook URL is configured.
pub const DEFAULT_WEBHOOK_HOST: &str = "autoscaler-webhook.autoscaler-system.svc";
