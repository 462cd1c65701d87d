use crate::db::document::{
    DeleteResult, ID_FIELD, InsertOneResult, Query, Record, Update, UpdateResult, new_record_id,
};
use crate::error::StoreError;
use futures::TryStreamExt;
use mongodb::bson::{self, Bson, Document, doc, oid::ObjectId};
use serde_json::Value;
use std::collections::BTreeMap;

/// A collection on the live MongoDB server, speaking the shared vocabulary.
#[derive(Clone)]
pub struct LiveCollection {
    inner: mongodb::Collection<Document>,
}

impl LiveCollection {
    pub fn new(inner: mongodb::Collection<Document>) -> Self {
        Self { inner }
    }

    pub async fn find_one(&self, query: Query) -> Result<Option<Record>, StoreError> {
        let filter = to_bson_document(query.fields())?;
        let found = self.inner.find_one(filter).await?;
        found.map(from_bson_document).transpose()
    }

    pub async fn find(&self, query: Query) -> Result<Vec<Record>, StoreError> {
        let filter = to_bson_document(query.fields())?;
        let docs: Vec<Document> = self.inner.find(filter).await?.try_collect().await?;
        docs.into_iter().map(from_bson_document).collect()
    }

    pub async fn insert_one(&self, mut record: Record) -> Result<InsertOneResult, StoreError> {
        let id = new_record_id();
        record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        self.inner.insert_one(to_bson_document(&record)?).await?;
        Ok(InsertOneResult { inserted_id: id })
    }

    pub async fn update_one(
        &self,
        query: Query,
        update: Update,
    ) -> Result<UpdateResult, StoreError> {
        if update.is_empty() {
            return Ok(UpdateResult::default());
        }
        let filter = to_bson_document(query.fields())?;
        let res = self
            .inner
            .update_one(filter, to_bson_document(&update.to_document())?)
            .await?;
        Ok(UpdateResult {
            matched_count: res.matched_count,
            modified_count: res.modified_count,
        })
    }

    pub async fn delete_one(&self, query: Query) -> Result<DeleteResult, StoreError> {
        let filter = to_bson_document(query.fields())?;
        let res = self.inner.delete_one(filter).await?;
        Ok(DeleteResult {
            deleted_count: res.deleted_count,
        })
    }

    /// Number of records per distinct value of `field`. Missing values group under `"null"`.
    pub async fn count_by(&self, field: &str) -> Result<BTreeMap<String, u64>, StoreError> {
        let pipeline = vec![doc! {
            "$group": { "_id": format!("${field}"), "count": { "$sum": 1 } }
        }];
        let rows: Vec<Document> = self.inner.aggregate(pipeline).await?.try_collect().await?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let key = match row.get("_id") {
                Some(Bson::String(s)) => s.clone(),
                Some(Bson::Null) | None => "null".to_string(),
                Some(other) => other.to_string(),
            };
            let count = match row.get("count") {
                Some(Bson::Int32(n)) => *n as u64,
                Some(Bson::Int64(n)) => *n as u64,
                _ => 0,
            };
            counts.insert(key, count);
        }
        Ok(counts)
    }
}

/// JSON record to BSON. A hex `_id` becomes a real `ObjectId`.
pub fn to_bson_document(record: &Record) -> Result<Document, StoreError> {
    let mut doc = bson::to_document(record)?;
    let oid = match doc.get(ID_FIELD) {
        Some(Bson::String(hex)) => ObjectId::parse_str(hex).ok(),
        _ => None,
    };
    if let Some(oid) = oid {
        doc.insert(ID_FIELD, oid);
    }
    Ok(doc)
}

/// BSON to JSON record. `ObjectId`s and datetimes are rendered as strings.
pub fn from_bson_document(doc: Document) -> Result<Record, StoreError> {
    let mut record = Record::new();
    for (key, value) in doc {
        record.insert(key, bson_to_json(value));
    }
    Ok(record)
}

fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .map(Value::String)
            .unwrap_or_else(|_| Value::String(dt.to_string())),
        Bson::Document(doc) => Value::Object(
            doc.into_iter()
                .map(|(k, v)| (k, bson_to_json(v)))
                .collect(),
        ),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        other => other.into_relaxed_extjson(),
    }
}
