//! Platform-side deletion semantics shared by every backend.
//!
//! Deleting an object that still holds finalizers only stamps
//! `metadata.deletionTimestamp`; the object is purged once an update
//! leaves it terminating with an empty finalizer set. Once stamped, the
//! timestamp survives every later update, so a writer holding an older
//! copy cannot revive the object.

use chrono::Utc;
use serde::Deserialize;

use pkg_types::meta::ObjectMeta;

use crate::error::StoreError;

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    metadata: ObjectMeta,
}

fn metadata_of(data: &[u8]) -> Option<ObjectMeta> {
    serde_json::from_slice::<Envelope>(data)
        .ok()
        .map(|e| e.metadata)
}

#[derive(Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Store these bytes; they may differ from the caller's if a deletion
    /// stamp was carried over.
    Persist(Vec<u8>),
    Purge,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Nothing holds the object: remove the key.
    Remove,
    /// Finalizers present: persist this rewritten object instead.
    MarkTerminating(Vec<u8>),
    /// Already terminating; nothing to write.
    AlreadyTerminating,
}

pub fn classify_update(existing: &[u8], incoming: &[u8]) -> Result<UpdateOutcome, StoreError> {
    let data = match carried_deletion_stamp(existing, incoming)? {
        Some(rewritten) => rewritten,
        None => incoming.to_vec(),
    };
    Ok(match metadata_of(&data) {
        Some(meta) if meta.is_purgeable() => UpdateOutcome::Purge,
        _ => UpdateOutcome::Persist(data),
    })
}

/// Rewrites `incoming` with the stored deletion stamp when the stored copy is
/// terminating and `incoming` dropped the stamp.
fn carried_deletion_stamp(existing: &[u8], incoming: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
    let stamp = match metadata_of(existing).and_then(|m| m.deletion_timestamp) {
        Some(stamp) => stamp,
        None => return Ok(None),
    };
    if metadata_of(incoming).is_some_and(|m| m.deletion_timestamp.is_some()) {
        return Ok(None);
    }
    let mut value: serde_json::Value = serde_json::from_slice(incoming)?;
    match value
        .get_mut("metadata")
        .and_then(serde_json::Value::as_object_mut)
    {
        Some(metadata) => {
            metadata.insert("deletionTimestamp".to_string(), serde_json::to_value(stamp)?);
        }
        None => return Ok(None),
    }
    Ok(Some(serde_json::to_vec(&value)?))
}

pub fn classify_delete(existing: &[u8]) -> Result<DeleteOutcome, StoreError> {
    let meta = match metadata_of(existing) {
        Some(meta) if !meta.finalizers.is_empty() => meta,
        _ => return Ok(DeleteOutcome::Remove),
    };
    if meta.is_terminating() {
        return Ok(DeleteOutcome::AlreadyTerminating);
    }

    let mut value: serde_json::Value = serde_json::from_slice(existing)?;
    let stamp = serde_json::to_value(Utc::now())?;
    match value
        .get_mut("metadata")
        .and_then(serde_json::Value::as_object_mut)
    {
        Some(metadata) => {
            metadata.insert("deletionTimestamp".to_string(), stamp);
        }
        None => return Ok(DeleteOutcome::Remove),
    }
    Ok(DeleteOutcome::MarkTerminating(serde_json::to_vec(&value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delete_without_finalizers_removes() {
        let data = serde_json::to_vec(&json!({"metadata": {"name": "a"}})).unwrap();
        assert_eq!(classify_delete(&data).unwrap(), DeleteOutcome::Remove);
    }

    #[test]
    fn delete_with_finalizers_stamps_timestamp() {
        let data = serde_json::to_vec(&json!({
            "metadata": {"name": "a", "finalizers": ["customautoscalingFinalizer"]},
            "spec": {"x": 1}
        }))
        .unwrap();
        let DeleteOutcome::MarkTerminating(rewritten) = classify_delete(&data).unwrap() else {
            panic!("expected graceful deletion");
        };
        let value: serde_json::Value = serde_json::from_slice(&rewritten).unwrap();
        assert!(value["metadata"]["deletionTimestamp"].is_string());
        assert_eq!(value["spec"]["x"], 1);
        assert_eq!(
            classify_delete(&rewritten).unwrap(),
            DeleteOutcome::AlreadyTerminating
        );
    }

    #[test]
    fn update_purges_only_released_terminating_objects() {
        let live = serde_json::to_vec(&json!({"metadata": {"name": "a"}})).unwrap();
        assert_eq!(
            classify_update(&live, &live).unwrap(),
            UpdateOutcome::Persist(live.clone())
        );

        let held = serde_json::to_vec(&json!({"metadata": {
            "name": "a",
            "finalizers": ["f"],
            "deletionTimestamp": "2024-01-01T00:00:00Z"
        }}))
        .unwrap();
        assert_eq!(
            classify_update(&held, &held).unwrap(),
            UpdateOutcome::Persist(held.clone())
        );

        let released = serde_json::to_vec(&json!({"metadata": {
            "name": "a",
            "deletionTimestamp": "2024-01-01T00:00:00Z"
        }}))
        .unwrap();
        assert_eq!(classify_update(&held, &released).unwrap(), UpdateOutcome::Purge);
    }

    #[test]
    fn update_from_stale_copy_keeps_deletion_stamp() {
        let stored = serde_json::to_vec(&json!({"metadata": {
            "name": "a",
            "finalizers": ["f"],
            "deletionTimestamp": "2024-01-01T00:00:00Z"
        }}))
        .unwrap();
        let stale = serde_json::to_vec(&json!({
            "metadata": {"name": "a", "finalizers": ["f"]},
            "status": {"replicas": 4}
        }))
        .unwrap();

        let UpdateOutcome::Persist(written) = classify_update(&stored, &stale).unwrap() else {
            panic!("held object must persist");
        };
        let value: serde_json::Value = serde_json::from_slice(&written).unwrap();
        assert!(value["metadata"]["deletionTimestamp"].is_string());
        assert_eq!(value["status"]["replicas"], 4);

        let stale_released =
            serde_json::to_vec(&json!({"metadata": {"name": "a"}})).unwrap();
        assert_eq!(
            classify_update(&stored, &stale_released).unwrap(),
            UpdateOutcome::Purge
        );
    }
}
