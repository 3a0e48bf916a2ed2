//! In-process document store.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

use super::{
    compare_values, timestamp_now, Document, DocumentStore, Query, SortOrder, StoreError,
    CREATED_AT_FIELD, ID_FIELD,
};

struct Stored {
    /// Insertion order, used to break ordering ties
    seq: u64,
    doc: Document,
}

/// Document store held in memory.
///
/// Each collection lives behind one map shard lock, which makes
/// compare-and-set atomic. Can be switched to fail every call.
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Stored>>,
    next_seq: AtomicU64,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of records in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }
}

fn has_id(stored: &Stored, id: &str) -> bool {
    stored.doc.get(ID_FIELD).and_then(Value::as_str) == Some(id)
}

fn merge(doc: &mut Document, patch: Document) {
    for (field, value) in patch {
        if field != ID_FIELD {
            doc.insert(field, value);
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, mut doc: Document) -> Result<Document, StoreError> {
        self.check()?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        doc.insert(CREATED_AT_FIELD.to_string(), Value::String(timestamp_now()));

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(Stored {
                seq,
                doc: doc.clone(),
            });

        debug!(collection, id = %id, "Inserted document");
        Ok(doc)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.check()?;
        Ok(self.collections.get(collection).and_then(|records| {
            records
                .iter()
                .find(|s| has_id(s, id))
                .map(|s| s.doc.clone())
        }))
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> Result<bool, StoreError> {
        self.check()?;
        let Some(mut records) = self.collections.get_mut(collection) else {
            return Ok(false);
        };
        match records.iter_mut().find(|s| has_id(s, id)) {
            Some(stored) => {
                merge(&mut stored.doc, patch);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn compare_and_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: &Value,
        patch: Document,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let Some(mut records) = self.collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some(stored) = records.iter_mut().find(|s| has_id(s, id)) else {
            return Ok(false);
        };

        if stored.doc.get(field).unwrap_or(&Value::Null) != expected {
            debug!(collection, id, field, "Compare-and-set lost");
            return Ok(false);
        }

        merge(&mut stored.doc, patch);
        Ok(true)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.check()?;
        let Some(records) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<&Stored> = records.iter().filter(|s| query.matches(&s.doc)).collect();

        if let Some(order) = &query.order {
            hits.sort_by(|a, b| {
                let by_field = compare_values(a.doc.get(&order.field), b.doc.get(&order.field))
                    .then(a.seq.cmp(&b.seq));
                match order.order {
                    SortOrder::Ascending => by_field,
                    SortOrder::Descending => by_field.reverse(),
                }
            });
        }

        Ok(hits.into_iter().map(|s| s.doc.clone()).collect())
    }
}
