use async_trait::async_trait;
use tracing::warn;

use pkg_constants::state::REGISTRY_PREFIX;
use pkg_types::kind::{Resource, ResourceKind};

use crate::error::StoreError;
use crate::watch::EventLog;

/// Registry key of a single object.
///
/// Namespaced kinds live under `/registry/<plural>/<namespace>/<name>`,
/// cluster-scoped kinds under `/registry/<plural>/<name>`.
pub fn object_key(kind: ResourceKind, namespace: &str, name: &str) -> String {
    if kind.is_cluster_scoped() {
        format!("{}/{}/{}", REGISTRY_PREFIX, kind.plural(), name)
    } else {
        format!("{}/{}/{}/{}", REGISTRY_PREFIX, kind.plural(), namespace, name)
    }
}

/// Key prefix covering every object of `kind`, optionally within one namespace.
pub fn kind_prefix(kind: ResourceKind, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !kind.is_cluster_scoped() => {
            format!("{}/{}/{}/", REGISTRY_PREFIX, kind.plural(), ns)
        }
        _ => format!("{}/{}/", REGISTRY_PREFIX, kind.plural()),
    }
}

/// Inverse of [`object_key`]: `(kind, namespace, name)`.
pub fn parse_key(key: &str) -> Option<(ResourceKind, String, String)> {
    let rest = key.strip_prefix(REGISTRY_PREFIX)?.strip_prefix('/')?;
    let mut parts = rest.split('/');
    let kind = ResourceKind::from_plural(parts.next()?)?;
    let (namespace, name) = if kind.is_cluster_scoped() {
        (String::new(), parts.next()?.to_string())
    } else {
        (parts.next()?.to_string(), parts.next()?.to_string())
    };
    if parts.next().is_some() || name.is_empty() {
        return None;
    }
    Some((kind, namespace, name))
}

/// Get/Create/Update/Delete over named, namespaced, typed objects.
///
/// Objects travel as serialized JSON; [`ResourceStoreExt`] layers typed
/// access on top. Failures are classified as NotFound, AlreadyExists or
/// Other so callers can branch on them.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<u8>, StoreError>;

    /// Fails with AlreadyExists if the key is taken.
    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        data: &[u8],
    ) -> Result<(), StoreError>;

    /// Fails with NotFound if the key is absent. An update that leaves an
    /// object terminating with no finalizers purges it.
    async fn update(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        data: &[u8],
    ) -> Result<(), StoreError>;

    /// Fails with NotFound if the key is absent. Objects holding finalizers
    /// are only stamped with a deletion timestamp.
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str)
    -> Result<(), StoreError>;

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Log of every mutation applied through this store.
    fn event_log(&self) -> &EventLog;
}

/// Best-effort registry key for a listed entry that failed to decode.
fn entry_key(data: &[u8], kind: ResourceKind) -> String {
    #[derive(serde::Deserialize)]
    struct Named {
        #[serde(default)]
        metadata: pkg_types::meta::ObjectMeta,
    }
    match serde_json::from_slice::<Named>(data) {
        Ok(n) if !n.metadata.name.is_empty() => {
            object_key(kind, &n.metadata.namespace, &n.metadata.name)
        }
        _ => format!("{}<unreadable>", kind_prefix(kind, None)),
    }
}

/// Typed convenience layer over [`ResourceStore`].
#[async_trait]
pub trait ResourceStoreExt: ResourceStore {
    async fn get_object<T: Resource>(&self, namespace: &str, name: &str) -> Result<T, StoreError> {
        let data = self.get(T::KIND, namespace, name).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    async fn create_object<T: Resource>(&self, obj: &T) -> Result<(), StoreError> {
        let data = serde_json::to_vec(obj)?;
        let meta = obj.meta();
        self.create(T::KIND, &meta.namespace, &meta.name, &data)
            .await
    }

    async fn update_object<T: Resource>(&self, obj: &T) -> Result<(), StoreError> {
        let data = serde_json::to_vec(obj)?;
        let meta = obj.meta();
        self.update(T::KIND, &meta.namespace, &meta.name, &data)
            .await
    }

    async fn list_objects<T: Resource>(&self, namespace: Option<&str>) -> Result<Vec<T>, StoreError> {
        let entries = self.list(T::KIND, namespace).await?;
        Ok(entries
            .iter()
            .filter_map(|v| match serde_json::from_slice::<T>(v) {
                Ok(obj) => Some(obj),
                Err(e) => {
                    warn!(
                        "Skipping undecodable {} {}: {}",
                        T::KIND,
                        entry_key(v, T::KIND),
                        e
                    );
                    None
                }
            })
            .collect())
    }
}

impl<S: ResourceStore + ?Sized> ResourceStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_and_cluster_keys() {
        assert_eq!(
            object_key(ResourceKind::ServiceAccount, "prod", "orders-svc-sa"),
            "/registry/serviceaccounts/prod/orders-svc-sa"
        );
        assert_eq!(
            object_key(ResourceKind::ClusterRole, "prod", "orders-svc-clusterrole"),
            "/registry/clusterroles/orders-svc-clusterrole"
        );
    }

    #[test]
    fn parse_key_inverts_object_key() {
        let key = object_key(ResourceKind::Prometheus, "prod", "orders-svc-prometheus-instance");
        assert_eq!(
            parse_key(&key),
            Some((
                ResourceKind::Prometheus,
                "prod".to_string(),
                "orders-svc-prometheus-instance".to_string()
            ))
        );

        let key = object_key(ResourceKind::ClusterRoleBinding, "", "orders-svc-rolebinding");
        assert_eq!(
            parse_key(&key),
            Some((
                ResourceKind::ClusterRoleBinding,
                String::new(),
                "orders-svc-rolebinding".to_string()
            ))
        );

        assert_eq!(parse_key("/registry/pods/prod/x"), None);
        assert_eq!(parse_key("/registry/secrets/prod"), None);
        assert_eq!(parse_key("/other/secrets/prod/x"), None);
    }

    #[test]
    fn undecodable_entries_are_named_when_possible() {
        let misshapen = br#"{"metadata":{"name":"orders-svc","namespace":"prod"},"spec":42}"#;
        assert_eq!(
            entry_key(misshapen, ResourceKind::ScalingTarget),
            "/registry/scalingtargets/prod/orders-svc"
        );
        assert_eq!(
            entry_key(b"{not json", ResourceKind::ScalingTarget),
            "/registry/scalingtargets/<unreadable>"
        );
    }

    #[test]
    fn prefix_scopes_to_namespace() {
        assert_eq!(
            kind_prefix(ResourceKind::ScalingTarget, Some("prod")),
            "/registry/scalingtargets/prod/"
        );
        assert_eq!(
            kind_prefix(ResourceKind::ClusterRole, Some("prod")),
            "/registry/clusterroles/"
        );
        assert_eq!(
            kind_prefix(ResourceKind::Secret, None),
            "/registry/secrets/"
        );
    }
}
