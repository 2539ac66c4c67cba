//! One reconciliation pass for one ScalingTarget.

use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, debug, error, info, info_span, warn};

use pkg_constants::autoscaler::{REQUEUE_SECS, SKIP_RECONCILE_ANNOTATION};
use pkg_metrics::{MetricsRegistry, names};
use pkg_state::{ResourceStore, ResourceStoreExt, StoreError};
use pkg_types::deployment::Deployment;
use pkg_types::scaling_target::{OwnerKey, ScalingTarget};

use crate::dependents::{BuildContext, CONVERGENCE_ORDER, DependentId};
use crate::error::DependentError;
use crate::finalizer::{FinalizerState, ensure_finalizer, run_teardown};

/// What the work queue should do with a key after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    RequeueAfter(Duration),
    /// The owner is gone; forget the key until the next event.
    Done,
}

pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    ctx: BuildContext,
    requeue: Duration,
    metrics: Arc<MetricsRegistry>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ResourceStore>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            store,
            ctx: BuildContext::default(),
            requeue: Duration::from_secs(REQUEUE_SECS),
            metrics,
        }
    }

    pub fn with_context(mut self, ctx: BuildContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_requeue(mut self, requeue: Duration) -> Self {
        self.requeue = requeue;
        self
    }

    /// Runs one pass. Never fails: every error is logged, counted and turned
    /// into a requeue so one owner cannot stall the others.
    pub async fn reconcile(&self, key: &OwnerKey) -> Action {
        let span = info_span!("reconcile", namespace = %key.namespace, name = %key.name);
        self.reconcile_pass(key).instrument(span).await
    }

    async fn reconcile_pass(&self, key: &OwnerKey) -> Action {
        self.metrics.counter_inc(names::RECONCILE_PASSES);
        let store = self.store.as_ref();
        let requeue = Action::RequeueAfter(self.requeue);

        let mut owner: ScalingTarget = match store.get_object(&key.namespace, &key.name).await {
            Ok(owner) => owner,
            Err(e) if e.is_not_found() => {
                debug!("ScalingTarget {} not found, nothing to do", key);
                return Action::Done;
            }
            Err(e) => {
                warn!("ScalingTarget {}: fetch failed: {}", key, e);
                self.metrics.counter_inc(names::RECONCILE_ERRORS);
                return requeue;
            }
        };

        if owner
            .metadata
            .annotations
            .contains_key(SKIP_RECONCILE_ANNOTATION)
        {
            info!("ScalingTarget {}: skip-reconcile set, leaving untouched", key);
            self.metrics.counter_inc(names::RECONCILE_SKIPPED);
            return requeue;
        }

        if let Err(e) = ensure_finalizer(store, &mut owner).await {
            warn!("ScalingTarget {}: failed to add finalizer: {}", key, e);
            self.metrics.counter_inc(names::RECONCILE_ERRORS);
            return requeue;
        }

        match FinalizerState::of(&owner) {
            FinalizerState::Active => {}
            FinalizerState::Terminating { next } => {
                info!("ScalingTarget {}: terminating, teardown from step {}", key, next);
                return match run_teardown(store, &mut owner, &self.metrics).await {
                    Ok(()) => Action::Done,
                    Err(e) => {
                        warn!("ScalingTarget {}: {}", key, e);
                        self.metrics.counter_inc(names::RECONCILE_ERRORS);
                        requeue
                    }
                };
            }
            FinalizerState::Purged => {
                debug!("ScalingTarget {}: finalizer already released", key);
                return Action::Done;
            }
        }

        match self.converge(&owner).await {
            Ok(()) => {
                if let Err(e) = self.mirror_status(&mut owner).await {
                    warn!("ScalingTarget {}: status update failed: {}", key, e);
                    self.metrics.counter_inc(names::RECONCILE_ERRORS);
                }
            }
            Err((step, DependentError::Config(msg))) => {
                error!(
                    "ScalingTarget {}: invalid configuration for {}: {}",
                    key, step, msg
                );
                self.metrics.counter_inc(names::RECONCILE_ERRORS);
            }
            Err((step, e)) => {
                warn!("ScalingTarget {}: {} not converged: {}", key, step, e);
                self.metrics.counter_inc(names::RECONCILE_ERRORS);
            }
        }
        requeue
    }

    /// Walks the convergence table once, creating whatever is missing.
    /// Stops at the first failing step, so every step only runs once all
    /// entries before it (its predecessors among them) have converged.
    async fn converge(&self, owner: &ScalingTarget) -> Result<(), (DependentId, DependentError)> {
        let store = self.store.as_ref();

        for dependent in CONVERGENCE_ORDER.iter() {
            let id = dependent.id();
            match dependent.get(store, owner).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    match dependent.create(store, owner, &self.ctx).await {
                        Ok(()) => self.metrics.counter_inc(names::DEPENDENTS_CREATED),
                        Err(e) if e.is_already_exists() => {
                            debug!("{} {} created concurrently", id, dependent.name(owner));
                        }
                        Err(e) => return Err((id, e)),
                    }
                }
                Err(e) => return Err((id, e.into())),
            }
        }
        Ok(())
    }

    /// Copies the workload's replica count into the owner status when they
    /// differ.
    async fn mirror_status(&self, owner: &mut ScalingTarget) -> Result<(), StoreError> {
        let workload = &owner.spec.application_ref.deployment_name;
        let deployment: Deployment = match self
            .store
            .get_object(owner.namespace(), workload)
            .await
        {
            Ok(d) => d,
            Err(e) if e.is_not_found() => {
                debug!("Deployment {}/{} not found, status unchanged", owner.namespace(), workload);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if owner.status.replicas == deployment.spec.replicas {
            return Ok(());
        }
        info!(
            "ScalingTarget {}/{}: status.replicas {} -> {}",
            owner.namespace(),
            owner.name(),
            owner.status.replicas,
            deployment.spec.replicas
        );
        owner.status.replicas = deployment.spec.replicas;
        self.store.update_object(&*owner).await
    }
}
