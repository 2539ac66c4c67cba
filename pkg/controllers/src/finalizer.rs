//! Finalizer lifecycle of a ScalingTarget.
//!
//! While the owner carries [`FINALIZER`] the store will not drop it. Once a
//! deletion is requested the owner turns terminating and the dependents are
//! deleted in [`TEARDOWN_ORDER`]. The token is removed only after every
//! step succeeded, so a failed teardown leaves the owner in place for the
//! next pass. The index of the first unfinished step is kept in
//! [`TEARDOWN_CURSOR_ANNOTATION`] so a resumed teardown skips what is done.

use tracing::{info, warn};

use pkg_constants::autoscaler::{FINALIZER, TEARDOWN_CURSOR_ANNOTATION};
use pkg_metrics::{MetricsRegistry, names};
use pkg_state::{ResourceStore, ResourceStoreExt, StoreError};
use pkg_types::scaling_target::ScalingTarget;

use crate::dependents::{DependentId, TEARDOWN_ORDER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    /// Not marked for deletion.
    Active,
    /// Marked for deletion, token still held; `next` indexes [`TEARDOWN_ORDER`].
    Terminating { next: usize },
    /// Marked for deletion and the token is gone; nothing left to do here.
    Purged,
}

impl FinalizerState {
    pub fn of(owner: &ScalingTarget) -> Self {
        if !owner.metadata.is_terminating() {
            FinalizerState::Active
        } else if owner.metadata.has_finalizer(FINALIZER) {
            FinalizerState::Terminating {
                next: teardown_cursor(owner),
            }
        } else {
            FinalizerState::Purged
        }
    }
}

/// First teardown step not yet completed. Unparseable values restart from 0,
/// which is safe because deleting an absent dependent succeeds.
pub fn teardown_cursor(owner: &ScalingTarget) -> usize {
    owner
        .metadata
        .annotations
        .get(TEARDOWN_CURSOR_ANNOTATION)
        .and_then(|v| v.parse::<usize>().ok())
        .map(|n| n.min(TEARDOWN_ORDER.len()))
        .unwrap_or(0)
}

/// Adds the token to a live owner and drops any teardown cursor it carries,
/// then persists it. Returns whether a write happened. Terminating owners
/// are left alone.
///
/// A cursor is only meaningful for the deletion that recorded it; one found
/// on a live owner would let a later teardown skip steps.
pub async fn ensure_finalizer(
    store: &dyn ResourceStore,
    owner: &mut ScalingTarget,
) -> Result<bool, StoreError> {
    if owner.metadata.is_terminating() {
        return Ok(false);
    }
    let stale_cursor = owner
        .metadata
        .annotations
        .remove(TEARDOWN_CURSOR_ANNOTATION)
        .is_some();
    let added = owner.metadata.add_finalizer(FINALIZER);
    if !stale_cursor && !added {
        return Ok(false);
    }
    store.update_object(&*owner).await?;
    if stale_cursor {
        warn!(
            "ScalingTarget {}/{}: dropped teardown cursor from live owner",
            owner.namespace(),
            owner.name()
        );
    }
    if added {
        info!(
            "ScalingTarget {}/{}: finalizer added",
            owner.namespace(),
            owner.name()
        );
    }
    Ok(true)
}

#[derive(Debug, thiserror::Error)]
pub enum TeardownError {
    #[error("deleting {step} failed: {source}")]
    Step {
        step: DependentId,
        #[source]
        source: StoreError,
    },
    #[error("releasing the finalizer failed: {0}")]
    Release(#[source] StoreError),
}

/// Runs the remaining teardown steps for a terminating owner.
///
/// Stops at the first failing delete and records how far it got. On
/// success the token is removed and the owner persisted, at which point
/// the store drops it.
pub async fn run_teardown(
    store: &dyn ResourceStore,
    owner: &mut ScalingTarget,
    metrics: &MetricsRegistry,
) -> Result<(), TeardownError> {
    let start = teardown_cursor(owner);
    for (index, dependent) in TEARDOWN_ORDER.iter().enumerate().skip(start) {
        match dependent.delete(store, owner).await {
            Ok(true) => metrics.counter_inc(names::DEPENDENTS_DELETED),
            Ok(false) => {}
            Err(source) => {
                warn!(
                    "ScalingTarget {}/{}: teardown stopped at {}: {}",
                    owner.namespace(),
                    owner.name(),
                    dependent.id(),
                    source
                );
                record_cursor(store, owner, index).await;
                return Err(TeardownError::Step {
                    step: dependent.id(),
                    source,
                });
            }
        }
    }

    owner.metadata.annotations.remove(TEARDOWN_CURSOR_ANNOTATION);
    owner.metadata.remove_finalizer(FINALIZER);
    store
        .update_object(&*owner)
        .await
        .map_err(TeardownError::Release)?;
    metrics.counter_inc(names::TEARDOWNS_COMPLETED);
    info!(
        "ScalingTarget {}/{}: teardown complete, finalizer removed",
        owner.namespace(),
        owner.name()
    );
    Ok(())
}

/// Best effort: a lost cursor only means redoing deletes that succeed anyway.
async fn record_cursor(store: &dyn ResourceStore, owner: &mut ScalingTarget, index: usize) {
    if index == 0 || teardown_cursor(owner) == index {
        return;
    }
    owner
        .metadata
        .annotations
        .insert(TEARDOWN_CURSOR_ANNOTATION.to_string(), index.to_string());
    if let Err(e) = store.update_object(&*owner).await {
        warn!(
            "ScalingTarget {}/{}: failed to record teardown cursor: {}",
            owner.namespace(),
            owner.name(),
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependents::BuildContext;
    use crate::dependents::tests::orders_svc;
    use chrono::Utc;
    use pkg_state::memory::MemoryStore;
    use pkg_types::kind::ResourceKind;

    #[test]
    fn state_follows_metadata() {
        let mut owner = orders_svc();
        assert_eq!(FinalizerState::of(&owner), FinalizerState::Active);

        owner.metadata.add_finalizer(FINALIZER);
        owner.metadata.deletion_timestamp = Some(Utc::now());
        assert_eq!(
            FinalizerState::of(&owner),
            FinalizerState::Terminating { next: 0 }
        );

        owner
            .metadata
            .annotations
            .insert(TEARDOWN_CURSOR_ANNOTATION.to_string(), "4".to_string());
        assert_eq!(
            FinalizerState::of(&owner),
            FinalizerState::Terminating { next: 4 }
        );

        owner.metadata.remove_finalizer(FINALIZER);
        assert_eq!(FinalizerState::of(&owner), FinalizerState::Purged);
    }

    #[tokio::test]
    async fn live_owner_loses_teardown_cursor() {
        let store = MemoryStore::new();
        let mut owner = orders_svc();
        owner
            .metadata
            .annotations
            .insert(TEARDOWN_CURSOR_ANNOTATION.to_string(), "9".to_string());
        store.create_object(&owner).await.unwrap();

        assert!(ensure_finalizer(&store, &mut owner).await.unwrap());

        let stored: ScalingTarget = store.get_object("prod", "orders-svc").await.unwrap();
        assert!(stored.metadata.has_finalizer(FINALIZER));
        assert!(!stored.metadata.annotations.contains_key(TEARDOWN_CURSOR_ANNOTATION));

        // Token present and no cursor: nothing to write.
        store.clear_calls();
        let mut owner = stored;
        assert!(!ensure_finalizer(&store, &mut owner).await.unwrap());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn teardown_of_owner_with_missing_dependents_still_releases() {
        let store = MemoryStore::new();
        let metrics = MetricsRegistry::for_autoscaler();
        let mut owner = orders_svc();
        owner.metadata.add_finalizer(FINALIZER);
        store.create_object(&owner).await.unwrap();
        // Only the service account was ever created.
        let sa = TEARDOWN_ORDER
            .iter()
            .find(|d| d.id() == DependentId::ServiceAccount)
            .unwrap();
        sa.create(&store, &owner, &BuildContext::default()).await.unwrap();
        store
            .delete(ResourceKind::ScalingTarget, "prod", "orders-svc")
            .await
            .unwrap();
        let mut owner: ScalingTarget = store.get_object("prod", "orders-svc").await.unwrap();
        assert_eq!(teardown_cursor(&owner), 0);

        run_teardown(&store, &mut owner, &metrics).await.unwrap();

        assert!(!store.contains(ResourceKind::ServiceAccount, "prod", "orders-svc-sa"));
        assert!(!store.contains(ResourceKind::ScalingTarget, "prod", "orders-svc"));
        assert_eq!(metrics.counter_value(names::DEPENDENTS_DELETED), 1);
        assert_eq!(metrics.counter_value(names::TEARDOWNS_COMPLETED), 1);
    }

    #[test]
    fn cursor_is_clamped_and_tolerant() {
        let mut owner = orders_svc();
        owner
            .metadata
            .annotations
            .insert(TEARDOWN_CURSOR_ANNOTATION.to_string(), "99".to_string());
        assert_eq!(teardown_cursor(&owner), TEARDOWN_ORDER.len());
        owner
            .metadata
            .annotations
            .insert(TEARDOWN_CURSOR_ANNOTATION.to_string(), "x".to_string());
        assert_eq!(teardown_cursor(&owner), 0);
    }
}
