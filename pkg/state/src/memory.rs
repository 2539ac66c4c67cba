use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use pkg_types::kind::ResourceKind;

use crate::error::StoreError;
use crate::lifecycle::{DeleteOutcome, UpdateOutcome, classify_delete, classify_update};
use crate::store::{ResourceStore, kind_prefix, object_key};
use crate::watch::{EventLog, EventType};

/// Store operations, as recorded and as targeted by fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    Create,
    Update,
    Delete,
    List,
}

impl StoreOp {
    pub fn is_write(&self) -> bool {
        matches!(self, StoreOp::Create | StoreOp::Update | StoreOp::Delete)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub kind: ResourceKind,
    pub name: String,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, Vec<u8>>,
    calls: Vec<StoreCall>,
    faults: Vec<(StoreOp, ResourceKind)>,
}

/// In-process store. Records every call and can be told to fail
/// operations on a given kind, which makes it the backend of choice for
/// exercising controllers against failures.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    event_log: EventLog,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `op` on `kind` with an Other error until cleared.
    pub fn inject_failure(&self, op: StoreOp, kind: ResourceKind) {
        self.lock().faults.push((op, kind));
    }

    pub fn clear_failures(&self) {
        self.lock().faults.clear();
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Recorded create/update/delete calls.
    pub fn writes(&self) -> Vec<StoreCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op.is_write())
            .cloned()
            .collect()
    }

    pub fn contains(&self, kind: ResourceKind, namespace: &str, name: &str) -> bool {
        self.lock()
            .objects
            .contains_key(&object_key(kind, namespace, name))
    }

    /// Sorted keys of every stored object.
    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a test thread panicked mid-call.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the call and apply any injected fault.
    fn enter(&self, op: StoreOp, kind: ResourceKind, name: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall {
            op,
            kind,
            name: name.to_string(),
        });
        if inner.faults.iter().any(|(o, k)| *o == op && *k == kind) {
            return Err(StoreError::Other(anyhow::anyhow!(
                "injected {:?} failure for {} {}",
                op,
                kind,
                name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<u8>, StoreError> {
        self.enter(StoreOp::Get, kind, name)?;
        let key = object_key(kind, namespace, name);
        self.lock()
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(kind, key))
    }

    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        data: &[u8],
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::Create, kind, name)?;
        let key = object_key(kind, namespace, name);
        {
            let mut inner = self.lock();
            if inner.objects.contains_key(&key) {
                return Err(StoreError::already_exists(kind, key));
            }
            inner.objects.insert(key.clone(), data.to_vec());
        }
        self.event_log.emit(EventType::Put, key).await;
        Ok(())
    }

    async fn update(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        data: &[u8],
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::Update, kind, name)?;
        let key = object_key(kind, namespace, name);
        let event = {
            let mut inner = self.lock();
            let existing = inner
                .objects
                .get(&key)
                .ok_or_else(|| StoreError::not_found(kind, key.clone()))?;
            match classify_update(existing, data)? {
                UpdateOutcome::Persist(data) => {
                    inner.objects.insert(key.clone(), data);
                    EventType::Put
                }
                UpdateOutcome::Purge => {
                    inner.objects.remove(&key);
                    EventType::Delete
                }
            }
        };
        self.event_log.emit(event, key).await;
        Ok(())
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::Delete, kind, name)?;
        let key = object_key(kind, namespace, name);
        let event = {
            let mut inner = self.lock();
            let existing = inner
                .objects
                .get(&key)
                .ok_or_else(|| StoreError::not_found(kind, key.clone()))?;
            match classify_delete(existing)? {
                DeleteOutcome::Remove => {
                    inner.objects.remove(&key);
                    Some(EventType::Delete)
                }
                DeleteOutcome::MarkTerminating(data) => {
                    inner.objects.insert(key.clone(), data);
                    Some(EventType::Put)
                }
                DeleteOutcome::AlreadyTerminating => None,
            }
        };
        if let Some(event) = event {
            self.event_log.emit(event, key).await;
        }
        Ok(())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        self.enter(StoreOp::List, kind, namespace.unwrap_or_default())?;
        let prefix = kind_prefix(kind, namespace);
        Ok(self
            .lock()
            .objects
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| v.clone())
            .collect())
    }

    fn event_log(&self) -> &EventLog {
        &self.event_log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ResourceStoreExt;
    use pkg_types::deployment::Deployment;
    use pkg_types::scaling_target::{ScalingTarget, ScalingTargetSpec};

    #[tokio::test]
    async fn classifies_missing_and_duplicate_objects() {
        let store = MemoryStore::new();
        let err = store
            .get(ResourceKind::Secret, "prod", "orders-svc-secret")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        store
            .create(ResourceKind::Secret, "prod", "orders-svc-secret", b"{}")
            .await
            .unwrap();
        let err = store
            .create(ResourceKind::Secret, "prod", "orders-svc-secret", b"{}")
            .await
            .unwrap_err();
        assert!(err.is_already_exists());

        let err = store
            .update(ResourceKind::Secret, "prod", "missing", b"{}")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        let err = store
            .delete(ResourceKind::Secret, "prod", "missing")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn injected_failures_are_scoped_to_op_and_kind() {
        let store = MemoryStore::new();
        store.inject_failure(StoreOp::Create, ResourceKind::ClusterRole);

        let err = store
            .create(ResourceKind::ClusterRole, "", "r", b"{}")
            .await
            .unwrap_err();
        assert!(!err.is_not_found() && !err.is_already_exists());
        store
            .create(ResourceKind::ServiceAccount, "prod", "sa", b"{}")
            .await
            .unwrap();

        store.clear_failures();
        store
            .create(ResourceKind::ClusterRole, "", "r", b"{}")
            .await
            .unwrap();
        assert_eq!(store.writes().len(), 3);
    }

    #[tokio::test]
    async fn finalizers_gate_physical_deletion() {
        let store = MemoryStore::new();
        let mut target = ScalingTarget::new("orders-svc", "prod", ScalingTargetSpec::default());
        target.metadata.add_finalizer("customautoscalingFinalizer");
        store.create_object(&target).await.unwrap();

        store
            .delete(ResourceKind::ScalingTarget, "prod", "orders-svc")
            .await
            .unwrap();
        let mut terminating: ScalingTarget =
            store.get_object("prod", "orders-svc").await.unwrap();
        assert!(terminating.metadata.is_terminating());

        terminating
            .metadata
            .remove_finalizer("customautoscalingFinalizer");
        store.update_object(&terminating).await.unwrap();
        assert!(!store.contains(ResourceKind::ScalingTarget, "prod", "orders-svc"));
    }

    #[tokio::test]
    async fn update_from_copy_read_before_deletion_stays_terminating() {
        let store = MemoryStore::new();
        let mut target = ScalingTarget::new("orders-svc", "prod", ScalingTargetSpec::default());
        target.metadata.add_finalizer("customautoscalingFinalizer");
        store.create_object(&target).await.unwrap();
        let mut stale: ScalingTarget = store.get_object("prod", "orders-svc").await.unwrap();

        store
            .delete(ResourceKind::ScalingTarget, "prod", "orders-svc")
            .await
            .unwrap();
        stale.status.replicas = 3;
        store.update_object(&stale).await.unwrap();

        let stored: ScalingTarget = store.get_object("prod", "orders-svc").await.unwrap();
        assert!(stored.metadata.is_terminating());
        assert_eq!(stored.status.replicas, 3);
    }

    #[tokio::test]
    async fn typed_list_skips_undecodable_entries() {
        let store = MemoryStore::new();
        store
            .create_object(&Deployment::new("a", "prod", 1))
            .await
            .unwrap();
        store
            .create(ResourceKind::Deployment, "prod", "broken", b"{not json")
            .await
            .unwrap();

        let listed: Vec<Deployment> = store.list_objects(Some("prod")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].metadata.name, "a");
    }

    #[tokio::test]
    async fn list_is_scoped_by_namespace() {
        let store = MemoryStore::new();
        store
            .create_object(&Deployment::new("a", "prod", 1))
            .await
            .unwrap();
        store
            .create_object(&Deployment::new("b", "staging", 1))
            .await
            .unwrap();
        assert_eq!(
            store
                .list_objects::<Deployment>(Some("prod"))
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            store.list_objects::<Deployment>(None).await.unwrap().len(),
            2
        );
    }
}
