//! Document store abstraction.
//!
//! Records are JSON objects grouped in named collections. The store assigns
//! `id` and `createdAt` on insert; everything else is opaque to it.
//! [`Collection`] adds typed serde conversion and a per-call deadline on top
//! of any [`DocumentStore`].

pub mod memory;
#[cfg(feature = "mongo")]
pub mod mongo;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use reclaim_core::{Claim, ClaimAttempt, MatchCandidate, Report, ReportKind, UserProfile};

use crate::verification::ClaimSession;

pub use memory::MemoryStore;
#[cfg(feature = "mongo")]
pub use mongo::MongoStore;

/// A stored record.
pub type Document = Map<String, Value>;

/// Collection names.
pub mod names {
    pub const LOST_ITEMS: &str = "lostItems";
    pub const FOUND_ITEMS: &str = "foundItems";
    pub const MATCHES: &str = "matches";
    pub const CLAIM_ATTEMPTS: &str = "claimAttempts";
    pub const CLAIMS: &str = "claims";
    pub const CLAIM_SESSIONS: &str = "claimSessions";
    pub const USERS: &str = "users";
}

/// Field holding the store-assigned identifier.
pub const ID_FIELD: &str = "id";
/// Field holding the store-assigned write time.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Error types for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable")]
    Unavailable,

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Store call timed out after {0}ms")]
    Timeout(u64),

    #[error("Document conversion failed: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Result ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
}

impl OrderBy {
    pub fn newest_first() -> Self {
        Self {
            field: CREATED_AT_FIELD.to_string(),
            order: SortOrder::Descending,
        }
    }
}

/// Equality filters plus optional ordering.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub order: Option<OrderBy>,
}

impl Query {
    /// Every record of the collection.
    pub fn all() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order = Some(order);
        self
    }

    /// Whether a document passes every filter. A missing field equals `null`.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| doc.get(field).unwrap_or(&Value::Null) == value)
    }
}

/// Ordering of two field values: nulls first, numbers numerically, strings
/// lexicographically. Mixed types compare equal.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a.unwrap_or(&Value::Null), b.unwrap_or(&Value::Null)) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Fixed-width UTC timestamp, so lexicographic order is chronological.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Build a patch document from field/value pairs.
pub fn patch<const N: usize>(fields: [(&str, Value); N]) -> Document {
    fields
        .into_iter()
        .map(|(field, value)| (field.to_string(), value))
        .collect()
}

/// Core trait for document stores.
///
/// Implementations must make `compare_and_set` atomic with respect to
/// concurrent writers of the same record.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new record. Returns it with `id` and `createdAt` assigned.
    async fn insert(&self, collection: &str, doc: Document) -> Result<Document, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Merge `patch` into a record. Returns `false` if the record does not exist.
    async fn update(&self, collection: &str, id: &str, patch: Document) -> Result<bool, StoreError>;

    /// Merge `patch` into a record only if `field` currently equals
    /// `expected`. Returns whether the write happened.
    async fn compare_and_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: &Value,
        patch: Document,
    ) -> Result<bool, StoreError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;
}

/// Typed view of one collection.
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    name: &'static str,
    timeout: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            name: self.name,
            timeout: self.timeout,
            _marker: PhantomData,
        }
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn DocumentStore>, name: &'static str, timeout: Duration) -> Self {
        Self {
            store,
            name,
            timeout,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    async fn call<R>(
        &self,
        operation: impl Future<Output = Result<R, StoreError>>,
    ) -> Result<R, StoreError> {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout.as_millis() as u64))?
    }

    /// Insert a record, ignoring any `id`/`createdAt` it carries.
    pub async fn insert(&self, item: &T) -> Result<T, StoreError> {
        let doc = to_document(item)?;
        let stored = self.call(self.store.insert(self.name, doc)).await?;
        from_document(stored)
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        match self.call(self.store.get(self.name, id)).await? {
            Some(doc) => from_document(doc).map(Some),
            None => Ok(None),
        }
    }

    pub async fn update(&self, id: &str, patch: Document) -> Result<bool, StoreError> {
        self.call(self.store.update(self.name, id, patch)).await
    }

    pub async fn compare_and_set(
        &self,
        id: &str,
        field: &str,
        expected: &Value,
        patch: Document,
    ) -> Result<bool, StoreError> {
        self.call(self.store.compare_and_set(self.name, id, field, expected, patch))
            .await
    }

    pub async fn query(&self, query: &Query) -> Result<Vec<T>, StoreError> {
        self.call(self.store.query(self.name, query))
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }
}

fn to_document<T: Serialize>(item: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(item) {
        Ok(Value::Object(mut doc)) => {
            doc.remove(ID_FIELD);
            doc.remove(CREATED_AT_FIELD);
            Ok(doc)
        }
        Ok(other) => Err(StoreError::Serialization(format!(
            "expected an object, got {}",
            other
        ))),
        Err(e) => Err(StoreError::Serialization(e.to_string())),
    }
}

fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(doc)).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// All collections used by the service, over one store.
#[derive(Clone)]
pub struct Collections {
    pub lost_items: Collection<Report>,
    pub found_items: Collection<Report>,
    pub matches: Collection<MatchCandidate>,
    pub claim_attempts: Collection<ClaimAttempt>,
    pub claims: Collection<Claim>,
    pub claim_sessions: Collection<ClaimSession>,
    pub users: Collection<UserProfile>,
}

impl Collections {
    pub fn new(store: Arc<dyn DocumentStore>, timeout: Duration) -> Self {
        Self {
            lost_items: Collection::new(store.clone(), names::LOST_ITEMS, timeout),
            found_items: Collection::new(store.clone(), names::FOUND_ITEMS, timeout),
            matches: Collection::new(store.clone(), names::MATCHES, timeout),
            claim_attempts: Collection::new(store.clone(), names::CLAIM_ATTEMPTS, timeout),
            claims: Collection::new(store.clone(), names::CLAIMS, timeout),
            claim_sessions: Collection::new(store.clone(), names::CLAIM_SESSIONS, timeout),
            users: Collection::new(store, names::USERS, timeout),
        }
    }

    /// Collection holding reports of `kind`.
    pub fn reports(&self, kind: ReportKind) -> &Collection<Report> {
        match kind {
            ReportKind::Lost => &self.lost_items,
            ReportKind::Found => &self.found_items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_filters_treat_missing_as_null() {
        let doc = patch([("status", json!("unclaimed")), ("userId", json!("u1"))]);
        assert!(Query::all().eq("status", "unclaimed").matches(&doc));
        assert!(!Query::all().eq("userId", "u2").matches(&doc));
        assert!(Query::all().eq("claimedBy", Value::Null).matches(&doc));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!("b")), Some(&json!("a"))), Ordering::Greater);
        assert_eq!(compare_values(None, Some(&json!("a"))), Ordering::Less);
    }

    #[test]
    fn test_timestamps_are_fixed_width() {
        let a = timestamp_now();
        let b = timestamp_now();
        assert_eq!(a.len(), b.len());
        assert!(a.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&a).is_ok());
    }

    #[tokio::test]
    async fn test_collection_round_trip_assigns_id() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let users: Collection<UserProfile> =
            Collection::new(store, names::USERS, Duration::from_secs(1));

        let stored = users
            .insert(&UserProfile {
                id: "ignored".into(),
                email: "owner@campus.edu".into(),
                display_name: None,
            })
            .await
            .unwrap();

        assert_ne!(stored.id, "ignored");
        let fetched = users.get(&stored.id).await.unwrap().unwrap();
        assert_eq!(fetched.email, "owner@campus.edu");
    }

    /// Store whose reads never finish in time.
    struct StalledStore {
        inner: MemoryStore,
        delay: Duration,
    }

    #[async_trait]
    impl DocumentStore for StalledStore {
        async fn insert(&self, collection: &str, doc: Document) -> Result<Document, StoreError> {
            self.inner.insert(collection, doc).await
        }

        async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.get(collection, id).await
        }

        async fn update(&self, collection: &str, id: &str, patch: Document) -> Result<bool, StoreError> {
            self.inner.update(collection, id, patch).await
        }

        async fn compare_and_set(
            &self,
            collection: &str,
            id: &str,
            field: &str,
            expected: &Value,
            patch: Document,
        ) -> Result<bool, StoreError> {
            self.inner.compare_and_set(collection, id, field, expected, patch).await
        }

        async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.query(collection, query).await
        }
    }

    #[tokio::test]
    async fn test_collection_call_times_out() {
        let store: Arc<dyn DocumentStore> = Arc::new(StalledStore {
            inner: MemoryStore::new(),
            delay: Duration::from_secs(5),
        });
        let users: Collection<UserProfile> =
            Collection::new(store, names::USERS, Duration::from_millis(10));

        let stored = users
            .insert(&UserProfile {
                email: "owner@campus.edu".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(matches!(users.get(&stored.id).await, Err(StoreError::Timeout(10))));
        assert!(matches!(users.query(&Query::all()).await, Err(StoreError::Timeout(10))));
    }
}
