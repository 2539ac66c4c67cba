//! ScalingTarget reconciliation: the dependent resource graph, the
//! finalizer lifecycle, the per-owner reconciler and the work queue that
//! drives it, plus the severity policy the alert webhook applies.

pub mod controller;
pub mod dependents;
pub mod error;
pub mod finalizer;
pub mod labels;
pub mod reconciler;
pub mod scaling;

pub use controller::ScalingTargetController;
pub use reconciler::{Action, Reconciler};
pub use scaling::{ScalingDecision, ScalingPolicy};
