//! Document store abstraction.
//!
//! Pipelines only need insert / bulk insert, find with sort/limit/projection,
//! distinct values and a "most recent per key" grouping. [`DocumentStore`]
//! exposes exactly that over `serde_json::Value` documents:
//! - [`MemoryStore`]: in-process, for tests and throwaway runs
//! - [`JsonlStore`]: append-only JSON-lines files, one per collection
//!
//! Every collection is append-only. "Latest" views are derived at read time
//! with [`DocumentStore::latest_per_key`], never by updating in place.
//! Retention of derived collections goes through
//! [`DocumentStore::delete_many`].

mod jsonl;
mod memory;
pub mod query;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;
pub use query::{Filter, Order, Query};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

/// Collection names used across the crate.
pub mod collections {
    pub const RAINFALL_RECORDS: &str = "rainfall_records";
    pub const WATER_LEVEL_RECORDS: &str = "water_level_records";
    pub const RADAR_SAMPLES: &str = "radar_samples";
    pub const MONITOR_RUNS: &str = "monitor_runs";
    pub const FORECASTS: &str = "forecasts";
    pub const FORECAST_VERIFICATIONS: &str = "forecast_verifications";
    pub const ACCURACY_HISTORY: &str = "accuracy_history";
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid collection name '{0}'")]
    InvalidCollection(String),
    #[error("documents must be JSON objects")]
    InvalidDocument,
    #[error("storage error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Appends every document or none of them.
    async fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<usize, StoreError>;

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError>;

    /// Removes every document matching `query`'s filters. Only used for
    /// retention of derived collections.
    async fn delete_many(&self, collection: &str, query: &Query) -> Result<usize, StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;

    async fn insert(&self, collection: &str, doc: Value) -> Result<(), StoreError> {
        self.insert_many(collection, vec![doc]).await.map(|_| ())
    }

    /// Distinct values of `field`, in first-seen order.
    async fn distinct(&self, collection: &str, field: &str) -> Result<Vec<Value>, StoreError> {
        let docs = self.find(collection, &Query::new()).await?;
        let mut out: Vec<Value> = Vec::new();
        for doc in &docs {
            if let Some(v) = query::field(doc, field) {
                if !v.is_null() && !out.contains(v) {
                    out.push(v.clone());
                }
            }
        }
        Ok(out)
    }

    /// For every distinct `key` among documents matching `query`'s filters,
    /// keeps the document with the greatest `time_field`; later inserts win
    /// ties. Sort, limit and projection of `query` apply to the result.
    async fn latest_per_key(
        &self,
        collection: &str,
        key: &str,
        time_field: &str,
        query: &Query,
    ) -> Result<Vec<Value>, StoreError> {
        let docs = self.find(collection, &query.filters_only()).await?;

        let mut order: Vec<String> = Vec::new();
        let mut latest: HashMap<String, Value> = HashMap::new();

        for doc in docs {
            let Some(k) = query::field(&doc, key).map(key_string) else {
                continue;
            };
            match latest.get(&k) {
                Some(current) => {
                    let newer = match (query::field(&doc, time_field), query::field(current, time_field)) {
                        (Some(a), Some(b)) => query::compare(a, b) != Some(std::cmp::Ordering::Less),
                        (Some(_), None) => true,
                        (None, _) => false,
                    };
                    if newer {
                        latest.insert(k, doc);
                    }
                }
                None => {
                    order.push(k.clone());
                    latest.insert(k, doc);
                }
            }
        }

        let grouped = order.into_iter().filter_map(|k| latest.remove(&k)).collect();
        Ok(query.finish(grouped))
    }
}

fn key_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Serializes and bulk-inserts typed records.
pub async fn insert_records<T: Serialize>(
    store: &dyn DocumentStore,
    collection: &str,
    records: &[T],
) -> Result<usize, StoreError> {
    let docs = records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    store.insert_many(collection, docs).await
}

/// Runs `query` and deserializes each hit into `T`.
pub async fn find_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    query: &Query,
) -> Result<Vec<T>, StoreError> {
    store
        .find(collection, query)
        .await?
        .into_iter()
        .map(|d| serde_json::from_value(d).map_err(StoreError::from))
        .collect()
}

pub(crate) fn validate_collection(name: &str) -> Result<(), StoreError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}
