//! MongoDB document store.
//!
//! Records use Mongo's `_id` ObjectId, exposed to the rest of the service as
//! the hex `id` field. Compare-and-set is a filtered `update_one`.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson};
use futures_util::{Stream, TryStreamExt};
use mongodb::{Client, Collection};
use serde_json::Value;
use tracing::info;

use super::{
    timestamp_now, Document, DocumentStore, Query, SortOrder, StoreError, CREATED_AT_FIELD,
    ID_FIELD,
};

/// MongoDB-backed document store.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db_name: String,
}

impl MongoStore {
    /// Connect and verify the connection.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        info!("Connecting to MongoDB at {}", uri);

        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::Backend(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    fn collection(&self, name: &str) -> Collection<bson::Document> {
        self.client.database(&self.db_name).collection(name)
    }
}

fn backend(context: &str) -> impl Fn(mongodb::error::Error) -> StoreError + '_ {
    move |e| StoreError::Backend(format!("{} failed: {}", context, e))
}

fn to_bson_document(doc: &Document) -> Result<bson::Document, StoreError> {
    bson::to_document(doc).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn to_bson(value: &Value) -> Result<Bson, StoreError> {
    bson::to_bson(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Drain a cursor. A read error anywhere fails the whole read.
async fn read_all<S>(cursor: S) -> Result<Vec<Document>, StoreError>
where
    S: Stream<Item = mongodb::error::Result<bson::Document>>,
{
    let raw: Vec<bson::Document> = cursor.try_collect().await.map_err(backend("Cursor read"))?;
    Ok(raw.into_iter().map(from_bson_document).collect())
}

/// Convert a stored record back to JSON, mapping `_id` to `id`.
fn from_bson_document(mut raw: bson::Document) -> Document {
    let id = raw.get_object_id("_id").ok().map(|oid| oid.to_hex());
    raw.remove("_id");

    let mut doc = match Bson::Document(raw).into_relaxed_extjson() {
        Value::Object(map) => map,
        _ => Document::new(),
    };
    if let Some(id) = id {
        doc.insert(ID_FIELD.to_string(), Value::String(id));
    }
    doc
}

/// Filter selecting one record by `id`. `None` when the id cannot exist.
fn id_filter(id: &str) -> Option<bson::Document> {
    ObjectId::parse_str(id).ok().map(|oid| doc! { "_id": oid })
}

fn query_filter(query: &Query) -> Result<bson::Document, StoreError> {
    let mut filter = bson::Document::new();
    for (field, value) in &query.filters {
        if field == ID_FIELD {
            match value.as_str().and_then(|id| ObjectId::parse_str(id).ok()) {
                Some(oid) => filter.insert("_id", oid),
                None => filter.insert("_id", Bson::Null),
            };
        } else {
            filter.insert(field.clone(), to_bson(value)?);
        }
    }
    Ok(filter)
}

fn set_clause(mut patch: Document) -> Result<bson::Document, StoreError> {
    patch.remove(ID_FIELD);
    Ok(doc! { "$set": to_bson_document(&patch)? })
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert(&self, collection: &str, mut doc: Document) -> Result<Document, StoreError> {
        doc.remove(ID_FIELD);
        doc.insert(CREATED_AT_FIELD.to_string(), Value::String(timestamp_now()));

        let result = self
            .collection(collection)
            .insert_one(to_bson_document(&doc)?)
            .await
            .map_err(backend("Insert"))?;

        let id = result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| StoreError::Backend("Failed to get inserted ID".into()))?;

        doc.insert(ID_FIELD.to_string(), Value::String(id.to_hex()));
        Ok(doc)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let Some(filter) = id_filter(id) else {
            return Ok(None);
        };
        let found = self
            .collection(collection)
            .find_one(filter)
            .await
            .map_err(backend("Find"))?;
        Ok(found.map(from_bson_document))
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> Result<bool, StoreError> {
        let Some(filter) = id_filter(id) else {
            return Ok(false);
        };
        let result = self
            .collection(collection)
            .update_one(filter, set_clause(patch)?)
            .await
            .map_err(backend("Update"))?;
        Ok(result.matched_count == 1)
    }

    async fn compare_and_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: &Value,
        patch: Document,
    ) -> Result<bool, StoreError> {
        let Some(mut filter) = id_filter(id) else {
            return Ok(false);
        };
        filter.insert(field, to_bson(expected)?);

        let result = self
            .collection(collection)
            .update_one(filter, set_clause(patch)?)
            .await
            .map_err(backend("Compare-and-set"))?;
        Ok(result.matched_count == 1)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut find = self.collection(collection).find(query_filter(query)?);
        if let Some(order) = &query.order {
            let direction = match order.order {
                SortOrder::Ascending => 1,
                SortOrder::Descending => -1,
            };
            let mut sort = bson::Document::new();
            sort.insert(order.field.clone(), direction);
            find = find.sort(sort);
        }

        let cursor = find.await.map_err(backend("Find"))?;

        read_all(cursor).await
    }
}
