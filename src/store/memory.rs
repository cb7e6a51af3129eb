use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{DocumentStore, Query, StoreError, validate_collection};

/// In-memory document store.
///
/// Thread-safe via `RwLock`. Not durable; data is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<usize, StoreError> {
        validate_collection(collection)?;
        if docs.iter().any(|d| !d.is_object()) {
            return Err(StoreError::InvalidDocument);
        }

        let mut store = self
            .collections
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let n = docs.len();
        store.entry(collection.to_string()).or_default().extend(docs);
        Ok(n)
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        validate_collection(collection)?;
        let store = self
            .collections
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let hits = store
            .get(collection)
            .map(|docs| docs.iter().filter(|d| query.matches(d)).cloned().collect())
            .unwrap_or_default();

        Ok(query.finish(hits))
    }

    async fn delete_many(&self, collection: &str, query: &Query) -> Result<usize, StoreError> {
        validate_collection(collection)?;
        let mut store = self
            .collections
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let Some(docs) = store.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !query.matches(d));
        Ok(before - docs.len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_bulk_insert_is_all_or_nothing() {
        let store = MemoryStore::new();
        let err = store
            .insert_many("c", vec![json!({"a": 1}), json!(42)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocument));
        assert!(store.find("c", &Query::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_many_removes_only_matches() {
        let store = MemoryStore::new();
        store
            .insert_many("c", vec![json!({"k": "x"}), json!({"k": "y"}), json!({"k": "x"})])
            .await
            .unwrap();
        assert_eq!(store.delete_many("c", &Query::new().eq("k", "x")).await.unwrap(), 2);
        assert_eq!(store.find("c", &Query::new()).await.unwrap(), vec![json!({"k": "y"})]);
        assert_eq!(store.delete_many("other", &Query::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_unknown_collection_is_empty() {
        let store = MemoryStore::new();
        assert!(store.find("nothing", &Query::new()).await.unwrap().is_empty());
    }
}
