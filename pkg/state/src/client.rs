use async_trait::async_trait;
use slatedb::Db;
use slatedb::object_store::local::LocalFileSystem;
use slatedb::object_store::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use pkg_types::kind::ResourceKind;

use crate::error::StoreError;
use crate::lifecycle::{DeleteOutcome, UpdateOutcome, classify_delete, classify_update};
use crate::store::{ResourceStore, kind_prefix, object_key};
use crate::watch::{EventLog, EventType};

/// Persistent state store backed by SlateDB on a local filesystem.
/// In production this would use S3/R2/MinIO via the `object_store` crate.
#[derive(Clone)]
pub struct StateStore {
    db: Db,
    /// Serializes read-modify-write sequences (create-if-absent, update-if-present).
    write_lock: Arc<Mutex<()>>,
    pub event_log: EventLog,
}

impl StateStore {
    /// Open (or create) a state store rooted at `path` on the local filesystem.
    pub async fn new(path: &str) -> anyhow::Result<Self> {
        info!("Opening SlateDB state store at {}", path);

        // Ensure the data directory exists before opening the object store
        std::fs::create_dir_all(path)
            .map_err(|e| anyhow::anyhow!("Failed to create data directory {}: {}", path, e))?;

        let object_store = Arc::new(
            LocalFileSystem::new_with_prefix(path)
                .map_err(|e| anyhow::anyhow!("Failed to create local object store: {}", e))?,
        );
        let db = Db::open(Path::from("/"), object_store)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open SlateDB: {}", e))?;
        Ok(Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
            event_log: EventLog::default(),
        })
    }

    async fn put_raw(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.db
            .put(key.as_bytes(), value)
            .await
            .map_err(|e| StoreError::Other(anyhow::anyhow!("SlateDB put failed: {}", e)))
            .map(|_| ())
    }

    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.db.get(key.as_bytes()).await {
            Ok(Some(bytes)) => Ok(Some(bytes.to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Other(anyhow::anyhow!(
                "SlateDB get failed: {}",
                e
            ))),
        }
    }

    async fn delete_raw(&self, key: &str) -> Result<(), StoreError> {
        self.db
            .delete(key.as_bytes())
            .await
            .map_err(|e| StoreError::Other(anyhow::anyhow!("SlateDB delete failed: {}", e)))
            .map(|_| ())
    }

    /// List all values whose keys start with `prefix`.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut results = Vec::new();
        let mut iter = self
            .db
            .scan_prefix(prefix.as_bytes())
            .await
            .map_err(|e| StoreError::Other(anyhow::anyhow!("SlateDB scan_prefix failed: {}", e)))?;

        while let Ok(Some(kv)) = iter.next().await {
            results.push(kv.value.to_vec());
        }
        Ok(results)
    }

    /// Flush and close the database.
    pub async fn close(self) -> anyhow::Result<()> {
        info!("Closing SlateDB state store");
        self.db
            .close()
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB close failed: {}", e))
    }
}

#[async_trait]
impl ResourceStore for StateStore {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<u8>, StoreError> {
        let key = object_key(kind, namespace, name);
        self.get_raw(&key)
            .await?
            .ok_or_else(|| StoreError::not_found(kind, key))
    }

    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        data: &[u8],
    ) -> Result<(), StoreError> {
        let key = object_key(kind, namespace, name);
        let _guard = self.write_lock.lock().await;
        if self.get_raw(&key).await?.is_some() {
            return Err(StoreError::already_exists(kind, key));
        }
        self.put_raw(&key, data).await?;
        debug!("Created {}", key);
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
        let key = object_key(kind, namespace, name);
        let _guard = self.write_lock.lock().await;
        let existing = self
            .get_raw(&key)
            .await?
            .ok_or_else(|| StoreError::not_found(kind, key.clone()))?;
        match classify_update(&existing, data)? {
            UpdateOutcome::Persist(data) => {
                self.put_raw(&key, &data).await?;
                self.event_log.emit(EventType::Put, key).await;
            }
            UpdateOutcome::Purge => {
                self.delete_raw(&key).await?;
                info!("Purged {} (finalizers released)", key);
                self.event_log.emit(EventType::Delete, key).await;
            }
        }
        Ok(())
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let key = object_key(kind, namespace, name);
        let _guard = self.write_lock.lock().await;
        let existing = self
            .get_raw(&key)
            .await?
            .ok_or_else(|| StoreError::not_found(kind, key.clone()))?;
        match classify_delete(&existing)? {
            DeleteOutcome::Remove => {
                self.delete_raw(&key).await?;
                self.event_log.emit(EventType::Delete, key).await;
            }
            DeleteOutcome::MarkTerminating(data) => {
                self.put_raw(&key, &data).await?;
                self.event_log.emit(EventType::Put, key).await;
            }
            DeleteOutcome::AlreadyTerminating => {}
        }
        Ok(())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        self.list_prefix(&kind_prefix(kind, namespace)).await
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

    #[tokio::test]
    async fn create_get_update_delete_round() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().to_str().unwrap()).await.unwrap();

        let deploy = Deployment::new("orders-deploy", "prod", 1);
        store.create_object(&deploy).await.unwrap();
        let err = store.create_object(&deploy).await.unwrap_err();
        assert!(err.is_already_exists());

        let mut fetched: Deployment = store.get_object("prod", "orders-deploy").await.unwrap();
        assert_eq!(fetched.spec.replicas, 1);
        fetched.spec.replicas = 5;
        store.update_object(&fetched).await.unwrap();
        let fetched: Deployment = store.get_object("prod", "orders-deploy").await.unwrap();
        assert_eq!(fetched.spec.replicas, 5);

        assert_eq!(
            store
                .list_objects::<Deployment>(Some("prod"))
                .await
                .unwrap()
                .len(),
            1
        );

        store
            .delete(ResourceKind::Deployment, "prod", "orders-deploy")
            .await
            .unwrap();
        let err = store
            .get(ResourceKind::Deployment, "prod", "orders-deploy")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.event_log.current_seq().await, 3);

        store.close().await.unwrap();
    }
}
