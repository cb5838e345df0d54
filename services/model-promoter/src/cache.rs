//! Concurrent in-memory registry of model records.
//!
//! Process-lifetime projection of the durable registry; rebuildable at any
//! time from the object store, so nothing here is persisted. Keyed by
//! `family + "-" + version`.

use crate::model::ModelRecord;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("record `{0}` already cached")]
    AlreadyExists(String),
    #[error("record `{0}` not found")]
    NotFound(String),
}

fn cache_key(family: &str, version: &str) -> String {
    format!("{family}-{version}")
}

/// Safe for concurrent use from any number of callers; the lock is internal
/// and never held across an await point.
#[derive(Default)]
pub struct ModelCache {
    records: RwLock<HashMap<String, ModelRecord>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record under its `(family, version)` key. A colliding key is
    /// reported, never silently overwritten.
    pub fn add(&self, record: ModelRecord) -> Result<(), CacheError> {
        if record.version().is_empty() {
            return Err(CacheError::InvalidArgument("record version must not be empty"));
        }
        let key = record.cache_key();
        let mut records = self.records.write();
        if records.contains_key(&key) {
            return Err(CacheError::AlreadyExists(key));
        }
        records.insert(key, record);
        Ok(())
    }

    /// Remove the record keyed by `(family, version)`; reports whether an
    /// entry was actually removed.
    pub fn remove(&self, family: &str, version: &str) -> Result<bool, CacheError> {
        if family.is_empty() || version.is_empty() {
            return Err(CacheError::InvalidArgument("family and version must not be empty"));
        }
        Ok(self.records.write().remove(&cache_key(family, version)).is_some())
    }

    /// Replace the entry keyed by `old` with `new` (which may key differently).
    /// Returns `false` as a no-op when `old` is not present. Both steps run
    /// under a single write-lock acquisition, though callers should not rely
    /// on cross-key atomicity as part of the contract.
    pub fn update(&self, old: &ModelRecord, new: ModelRecord) -> Result<bool, CacheError> {
        if new.version().is_empty() {
            return Err(CacheError::InvalidArgument("replacement version must not be empty"));
        }
        let mut records = self.records.write();
        if records.remove(&old.cache_key()).is_none() {
            return Ok(false);
        }
        records.insert(new.cache_key(), new);
        Ok(true)
    }

    pub fn find(&self, family: &str, version: &str) -> Result<ModelRecord, CacheError> {
        if family.is_empty() || version.is_empty() {
            return Err(CacheError::InvalidArgument("family and version must not be empty"));
        }
        let key = cache_key(family, version);
        self.records
            .read()
            .get(&key)
            .cloned()
            .ok_or(CacheError::NotFound(key))
    }

    /// Point-in-time snapshot; additions and removals after the call are not
    /// observed by the returned sequence.
    pub fn list(&self) -> Vec<ModelRecord> {
        self.records.read().values().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{decode_model_metadata, FAMILY_LINEAR_REGRESSION};

    fn record(version: &str) -> ModelRecord {
        let doc = serde_json::json!({
            "model_type": "Ridge (Linear)",
            "training_timestamp": version,
            "target": "minutes_until_dry",
            "feature_names": ["humidity"],
            "alpha": 1.0,
            "cross_val_splits": 5,
            "rmse_cv": 50.0,
            "r2": 0.8
        });
        decode_model_metadata(&serde_json::to_vec(&doc).unwrap(), format!("https://store/models/{version}.onnx")).unwrap()
    }

    #[test]
    fn add_then_find_round_trips() {
        let cache = ModelCache::new();
        cache.add(record("v1")).unwrap();
        let found = cache.find(FAMILY_LINEAR_REGRESSION, "v1").unwrap();
        assert_eq!(found.version(), "v1");
        assert_eq!(found.download_url(), "https://store/models/v1.onnx");
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn duplicate_insert_reported() {
        let cache = ModelCache::new();
        cache.add(record("v1")).unwrap();
        let err = cache.add(record("v1")).unwrap_err();
        assert!(matches!(err, CacheError::AlreadyExists(_)));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn find_without_add_is_not_found() {
        let cache = ModelCache::new();
        let err = cache.find(FAMILY_LINEAR_REGRESSION, "missing").unwrap_err();
        assert!(matches!(err, CacheError::NotFound(_)));
    }

    #[test]
    fn empty_key_fields_rejected() {
        let cache = ModelCache::new();
        assert!(matches!(cache.find("", "v1"), Err(CacheError::InvalidArgument(_))));
        assert!(matches!(cache.remove(FAMILY_LINEAR_REGRESSION, ""), Err(CacheError::InvalidArgument(_))));
    }

    #[test]
    fn remove_reports_presence() {
        let cache = ModelCache::new();
        cache.add(record("v1")).unwrap();
        assert!(cache.remove(FAMILY_LINEAR_REGRESSION, "v1").unwrap());
        assert!(!cache.remove(FAMILY_LINEAR_REGRESSION, "v1").unwrap());
        assert!(cache.is_empty());
    }

    #[test]
    fn update_rekeys_and_reports_noop() {
        let cache = ModelCache::new();
        let old = record("v1");
        cache.add(old.clone()).unwrap();
        assert!(cache.update(&old, record("v2")).unwrap());
        assert!(cache.find(FAMILY_LINEAR_REGRESSION, "v1").is_err());
        assert!(cache.find(FAMILY_LINEAR_REGRESSION, "v2").is_ok());
        // old no longer present: no-op, nothing inserted
        assert!(!cache.update(&old, record("v3")).unwrap());
        assert!(cache.find(FAMILY_LINEAR_REGRESSION, "v3").is_err());
    }

    #[test]
    fn list_is_a_snapshot() {
        let cache = ModelCache::new();
        cache.add(record("v1")).unwrap();
        let snapshot = cache.list();
        cache.add(record("v2")).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(cache.list().len(), 2);
    }
}
