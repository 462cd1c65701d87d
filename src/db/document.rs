//! Query/update vocabulary shared by the live and fallback backends.

use mongodb::bson::oid::ObjectId;
use serde_json::{Map, Value};
use tracing::warn;

/// One stored entity: field name to JSON value.
pub type Record = Map<String, Value>;

/// Reserved field holding the generated identifier inside every record.
pub const ID_FIELD: &str = "_id";

/// Generate a fresh 96-bit identifier in its 24-char hex form.
pub fn new_record_id() -> String {
    ObjectId::new().to_hex()
}

/// Conjunction of exact field equalities. An empty query matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query(Record);

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &Record {
        &self.0
    }

    /// Every queried field must be present in `record` and equal to the expected value.
    pub fn matches(&self, record: &Record) -> bool {
        self.0.iter().all(|(field, expected)| {
            record
                .get(field)
                .is_some_and(|actual| values_equal(actual, expected))
        })
    }
}

impl From<Record> for Query {
    fn from(fields: Record) -> Self {
        Self(fields)
    }
}

/// Field equality as the store sees it. Numbers compare by value, so `1`
/// equals `1.0`; two integers compare exactly, never through `f64`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_f64() || y.is_f64() => {
            x.as_f64() == y.as_f64()
        }
        (Value::Number(x), Value::Number(y)) => as_integer(x) == as_integer(y),
        _ => a == b,
    }
}

fn as_integer(n: &serde_json::Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Set-style partial field replacement, i.e. `{"$set": {...}}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    set: Record,
}

impl Update {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and_set(field, value)
    }

    pub fn and_set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Parse an update document. `$set` is honoured; a bare object without
    /// operators is an implicit `$set`. Any other operator is dropped, and so
    /// are plain fields sitting next to operators.
    pub fn from_document(doc: Record) -> Self {
        let has_operators = doc.keys().any(|k| k.starts_with('$'));
        if !has_operators {
            return Self { set: doc };
        }

        let mut set = Record::new();
        for (key, fields) in doc {
            match (key.as_str(), fields) {
                ("$set", Value::Object(fields)) => set.extend(fields),
                (field, _) if !field.starts_with('$') => warn!(
                    field,
                    "plain field mixed with update operators ignored; wrap it in $set"
                ),
                (op, _) => warn!(operator = op, "unsupported update operator ignored"),
            }
        }
        Self { set }
    }

    pub fn to_document(&self) -> Record {
        let mut doc = Record::new();
        doc.insert("$set".to_string(), Value::Object(self.set.clone()));
        doc
    }

    /// Apply in place. Returns whether any field actually changed.
    /// The identifier field is immutable and is never overwritten.
    pub fn apply(&self, record: &mut Record) -> bool {
        let mut modified = false;
        for (field, value) in &self.set {
            if field == ID_FIELD {
                warn!("attempt to overwrite record identifier ignored");
                continue;
            }
            if !record.get(field).is_some_and(|old| values_equal(old, value)) {
                record.insert(field.clone(), value.clone());
                modified = true;
            }
        }
        modified
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOneResult {
    pub inserted_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}
