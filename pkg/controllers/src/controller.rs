use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use pkg_metrics::{MetricsRegistry, names};
use pkg_state::watch::{EventType, WatchEvent};
use pkg_state::{ResourceStore, ResourceStoreExt};
use pkg_types::kind::ResourceKind;
use pkg_types::scaling_target::{OwnerKey, ScalingTarget};

use crate::dependents::owner_of;
use crate::reconciler::{Action, Reconciler};

/// Pending, running and re-triggered owner keys.
///
/// A key is in at most one of `due` and `in_flight`. A trigger for a key
/// that is running marks it dirty so it runs again as soon as it finishes.
#[derive(Debug, Default)]
struct WorkQueue {
    due: HashMap<OwnerKey, Instant>,
    in_flight: HashSet<OwnerKey>,
    dirty: HashSet<OwnerKey>,
}

impl WorkQueue {
    fn trigger(&mut self, key: OwnerKey, now: Instant) {
        if self.in_flight.contains(&key) {
            self.dirty.insert(key);
            return;
        }
        let at = self.due.entry(key).or_insert(now);
        if *at > now {
            *at = now;
        }
    }

    /// Up to `limit` due keys, earliest first, moved to in-flight.
    fn take_due(&mut self, now: Instant, limit: usize) -> Vec<OwnerKey> {
        let mut ready: Vec<(Instant, OwnerKey)> = self
            .due
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(k, at)| (*at, k.clone()))
            .collect();
        ready.sort();
        ready.truncate(limit);
        ready
            .into_iter()
            .map(|(_, key)| {
                self.due.remove(&key);
                self.in_flight.insert(key.clone());
                key
            })
            .collect()
    }

    fn complete(&mut self, key: OwnerKey, action: Action, now: Instant) {
        self.in_flight.remove(&key);
        if self.dirty.remove(&key) {
            self.due.insert(key, now);
            return;
        }
        match action {
            Action::RequeueAfter(delay) => {
                self.due.insert(key, now + delay);
            }
            Action::Done => {}
        }
    }

    fn tracked(&self) -> impl Iterator<Item = &OwnerKey> {
        self.due.keys().chain(self.in_flight.iter())
    }

    fn len(&self) -> usize {
        self.due.len() + self.in_flight.len()
    }
}

/// Owner keys a store event should wake up.
///
/// Any change to an owner wakes it. Deleting a dependent wakes the owner
/// whose deterministic name it carries so the object gets recreated. A
/// cluster-scoped dependent has no namespace, so every tracked owner with
/// the recovered name is woken.
fn keys_for_event(event: &WatchEvent, queue: &WorkQueue) -> Vec<OwnerKey> {
    let Some((kind, namespace, name)) = event.object() else {
        return Vec::new();
    };
    match kind {
        ResourceKind::ScalingTarget => vec![OwnerKey::new(namespace, name)],
        ResourceKind::Deployment => Vec::new(),
        _ if event.event_type == EventType::Delete => {
            let Some(owner) = owner_of(kind, &name) else {
                return Vec::new();
            };
            if kind.is_cluster_scoped() {
                queue
                    .tracked()
                    .filter(|k| k.name == owner)
                    .cloned()
                    .collect()
            } else {
                vec![OwnerKey::new(namespace, owner)]
            }
        }
        _ => Vec::new(),
    }
}

/// Drives [`Reconciler`] passes from store events and requeue timers.
///
/// Distinct owners reconcile concurrently up to `workers` at a time; a
/// single owner never has two passes running at once.
pub struct ScalingTargetController {
    store: Arc<dyn ResourceStore>,
    reconciler: Arc<Reconciler>,
    metrics: Arc<MetricsRegistry>,
    workers: usize,
    tick: Duration,
}

impl ScalingTargetController {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        reconciler: Reconciler,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            store,
            reconciler: Arc::new(reconciler),
            metrics,
            workers: 4,
            tick: Duration::from_secs(1),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// How often due requeues are checked for.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Start the controller loop as a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("ScalingTargetController started (workers={})", self.workers);
            self.run().await;
        })
    }

    async fn run(self) {
        let mut event_rx = self.store.event_log().subscribe();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(OwnerKey, Action)>();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut queue = WorkQueue::default();
        let mut needs_resync = !self.resync(&mut queue).await;
        let mut interval = tokio::time::interval(self.tick);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if needs_resync {
                        needs_resync = !self.resync(&mut queue).await;
                    }
                }
                result = event_rx.recv() => match result {
                    Ok(event) => {
                        let now = Instant::now();
                        for key in keys_for_event(&event, &queue) {
                            debug!("ScalingTarget {} triggered by {}", key, event.key);
                            queue.trigger(key, now);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("ScalingTargetController missed {} events, relisting", missed);
                        needs_resync = !self.resync(&mut queue).await;
                    }
                    Err(RecvError::Closed) => break,
                },
                Some((key, action)) = done_rx.recv() => {
                    queue.complete(key, action, Instant::now());
                }
            }
            self.dispatch(&mut queue, &semaphore, &done_tx);
            self.metrics.gauge_set(names::QUEUE_DEPTH, queue.len() as i64);
        }
        info!("ScalingTargetController stopped");
    }

    /// Enqueues every stored owner. Returns false if the list failed.
    async fn resync(&self, queue: &mut WorkQueue) -> bool {
        match self.store.list_objects::<ScalingTarget>(None).await {
            Ok(owners) => {
                let now = Instant::now();
                info!("ScalingTargetController enqueued {} owners", owners.len());
                for owner in owners {
                    queue.trigger(owner.key(), now);
                }
                true
            }
            Err(e) => {
                warn!("ScalingTargetController failed to list owners: {}", e);
                false
            }
        }
    }

    fn dispatch(
        &self,
        queue: &mut WorkQueue,
        semaphore: &Arc<Semaphore>,
        done_tx: &mpsc::UnboundedSender<(OwnerKey, Action)>,
    ) {
        let keys = queue.take_due(Instant::now(), semaphore.available_permits());
        for key in keys {
            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                queue.complete(key.clone(), Action::RequeueAfter(Duration::ZERO), Instant::now());
                continue;
            };
            let reconciler = self.reconciler.clone();
            let done_tx = done_tx.clone();
            tokio::spawn(async move {
                let action = reconciler.reconcile(&key).await;
                drop(permit);
                let _ = done_tx.send((key, action));
            });
        }
    }
}
