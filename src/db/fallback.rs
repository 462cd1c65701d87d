//! File-persisted, in-process stand-in for a document collection.
//!
//! Used whenever no live MongoDB connection exists. All verbs run inside a
//! single ractor actor, so the load/mutate/persist cycle has exactly one
//! writer and concurrent requests cannot interleave their file writes.
//!
//! Known limitation: persistence failures are logged and dropped. The
//! in-memory state stays authoritative for the process lifetime, but a
//! failed write means those changes are lost on restart.

use crate::db::document::{
    DeleteResult, ID_FIELD, InsertOneResult, Query, Record, Update, UpdateResult, new_record_id,
};
use crate::error::StoreError;
use indexmap::IndexMap;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Identifier to record, in insertion order.
pub type Records = IndexMap<String, Record>;

#[derive(Debug)]
pub enum FallbackMessage {
    FindOne(Query, RpcReplyPort<Option<Record>>),
    Find(Query, RpcReplyPort<Vec<Record>>),
    InsertOne(Record, RpcReplyPort<InsertOneResult>),
    UpdateOne(Query, Update, RpcReplyPort<UpdateResult>),
    DeleteOne(Query, RpcReplyPort<DeleteResult>),
}

/// Handle to the fallback collection. Cheap to clone; every clone talks to
/// the same actor and therefore the same backing file.
#[derive(Clone)]
pub struct FallbackCollection {
    actor: ActorRef<FallbackMessage>,
}

impl FallbackCollection {
    /// Spawn the engine, loading whatever `path` currently holds.
    /// A missing or malformed file yields an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let (actor, _jh) = Actor::spawn(None, FallbackActor, path)
            .await
            .map_err(|e| StoreError::Actor(format!("spawn fallback store failed: {e}")))?;
        Ok(Self { actor })
    }

    /// First record matching `query`, in insertion order.
    pub async fn find_one(&self, query: Query) -> Option<Record> {
        ractor::call!(self.actor, FallbackMessage::FindOne, query)
            .inspect_err(|e| warn!(error = %e, "fallback find_one failed; reporting not found"))
            .ok()
            .flatten()
    }

    /// Snapshot of every record matching `query`. No projection, sort or paging.
    pub async fn find(&self, query: Query) -> Vec<Record> {
        ractor::call!(self.actor, FallbackMessage::Find, query)
            .inspect_err(|e| warn!(error = %e, "fallback find failed; reporting empty"))
            .unwrap_or_default()
    }

    pub async fn insert_one(&self, record: Record) -> InsertOneResult {
        // The id is minted here so a dead actor still hands back a well-formed result.
        let mut record = record;
        let id = new_record_id();
        record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        ractor::call!(self.actor, FallbackMessage::InsertOne, record).unwrap_or_else(|e| {
            warn!(error = %e, "fallback insert_one failed; record dropped");
            InsertOneResult { inserted_id: id }
        })
    }

    /// Never fails: no match is reported as zero matched/modified.
    pub async fn update_one(&self, query: Query, update: Update) -> UpdateResult {
        ractor::call!(self.actor, FallbackMessage::UpdateOne, query, update).unwrap_or_else(|e| {
            warn!(error = %e, "fallback update_one failed; reporting no-op");
            UpdateResult::default()
        })
    }

    pub async fn delete_one(&self, query: Query) -> DeleteResult {
        ractor::call!(self.actor, FallbackMessage::DeleteOne, query).unwrap_or_else(|e| {
            warn!(error = %e, "fallback delete_one failed; reporting no-op");
            DeleteResult::default()
        })
    }

    /// Stop the engine. Pending messages are drained first.
    pub fn close(&self) {
        self.actor.stop(None);
    }
}

struct FallbackState {
    path: PathBuf,
    records: Records,
}

impl FallbackState {
    fn first_match(&self, query: &Query) -> Option<&String> {
        self.records
            .iter()
            .find(|(_, rec)| query.matches(rec))
            .map(|(id, _)| id)
    }

    /// Degraded-mode policy: a failed write is logged and the change stays in memory only.
    async fn persist(&self) {
        if let Err(e) = save_snapshot(&self.path, &self.records).await {
            warn!(
                path = %self.path.display(),
                error = %e,
                "fallback store write failed; change kept in memory only"
            );
        }
    }
}

struct FallbackActor;

#[ractor::async_trait]
impl Actor for FallbackActor {
    type Msg = FallbackMessage;
    type State = FallbackState;
    type Arguments = PathBuf;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        path: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        // Degraded-mode policy: an unreadable snapshot means an empty store.
        let records = match load_snapshot(&path).await {
            Ok(records) => records,
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no fallback snapshot; starting empty");
                Records::new()
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "fallback snapshot unreadable; starting empty"
                );
                Records::new()
            }
        };
        info!(
            path = %path.display(),
            records = records.len(),
            "fallback store ready"
        );
        Ok(FallbackState { path, records })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            FallbackMessage::FindOne(query, rp) => {
                let found = state
                    .first_match(&query)
                    .and_then(|id| state.records.get(id))
                    .cloned();
                let _ = rp.send(found);
            }
            FallbackMessage::Find(query, rp) => {
                let found = state
                    .records
                    .values()
                    .filter(|rec| query.matches(rec))
                    .cloned()
                    .collect();
                let _ = rp.send(found);
            }
            FallbackMessage::InsertOne(mut record, rp) => {
                let existing = record
                    .get(ID_FIELD)
                    .and_then(Value::as_str)
                    .filter(|id| !state.records.contains_key(*id))
                    .map(str::to_string);
                let id = match existing {
                    Some(id) => id,
                    None => {
                        let id = new_record_id();
                        record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                        id
                    }
                };
                state.records.insert(id.clone(), record);
                state.persist().await;
                debug!(id = %id, "fallback record inserted");
                let _ = rp.send(InsertOneResult { inserted_id: id });
            }
            FallbackMessage::UpdateOne(query, update, rp) => {
                let mut result = UpdateResult::default();
                if let Some(id) = state.first_match(&query).cloned()
                    && let Some(rec) = state.records.get_mut(&id)
                {
                    result.matched_count = 1;
                    if update.apply(rec) {
                        result.modified_count = 1;
                        state.persist().await;
                    }
                }
                let _ = rp.send(result);
            }
            FallbackMessage::DeleteOne(query, rp) => {
                let mut result = DeleteResult::default();
                if let Some(id) = state.first_match(&query).cloned() {
                    state.records.shift_remove(&id);
                    result.deleted_count = 1;
                    state.persist().await;
                }
                let _ = rp.send(result);
            }
        }
        Ok(())
    }
}

/// Read and parse the snapshot file.
pub async fn load_snapshot(path: &Path) -> Result<Records, StoreError> {
    let raw = tokio::fs::read(path).await?;
    let records: Records = serde_json::from_slice(&raw)?;
    Ok(records)
}

/// Write the full map to a sibling temp file, then rename it over `path`,
/// so readers never observe a half-written snapshot.
pub async fn save_snapshot(path: &Path, records: &Records) -> Result<(), StoreError> {
    let body = serde_json::to_vec(records)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn record(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    fn user(name: &str, email: &str) -> Record {
        record(json!({
            "username": name,
            "email": email,
            "is_active": true,
            "profile": {"district": "Nashik", "crops": ["onion", "grape"]},
        }))
    }

    async fn open_in(dir: &tempfile::TempDir) -> FallbackCollection {
        FallbackCollection::open(dir.path().join("users.json"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn insert_then_find_one_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;

        let original = user("ravi", "ravi@example.com");
        let res = store.insert_one(original.clone()).await;

        let found = store
            .find_one(Query::eq("email", "ravi@example.com"))
            .await
            .expect("record should be found");

        let mut expected = original;
        expected.insert(ID_FIELD.to_string(), json!(res.inserted_id));
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn find_one_miss_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;
        store.insert_one(user("ravi", "ravi@example.com")).await;
        assert!(store.find_one(Query::eq("username", "nobody")).await.is_none());
    }

    #[tokio::test]
    async fn find_applies_and_semantics_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;
        store.insert_one(record(json!({"a": 1, "b": 1}))).await;
        store.insert_one(record(json!({"a": 1, "b": 2}))).await;

        let hits = store.find(Query::eq("a", 1).and("b", 1)).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].get("b"), Some(&json!(1)));

        let all = store.find(Query::all()).await;
        let bs: Vec<_> = all.iter().map(|r| r["b"].clone()).collect();
        assert_eq!(bs, vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn update_no_match_is_zero_effect() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;
        store.insert_one(user("ravi", "ravi@example.com")).await;
        let before = store.find(Query::all()).await;

        let res = store
            .update_one(Query::eq("username", "ghost"), Update::set("full_name", "X"))
            .await;

        assert_eq!(res, UpdateResult::default());
        assert_eq!(store.find(Query::all()).await, before);
    }

    #[tokio::test]
    async fn update_and_delete_touch_first_match_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;
        store.insert_one(record(json!({"kind": "x", "n": 1}))).await;
        store.insert_one(record(json!({"kind": "x", "n": 2}))).await;

        let res = store
            .update_one(Query::eq("kind", "x"), Update::set("seen", true))
            .await;
        assert_eq!(res.matched_count, 1);
        assert_eq!(res.modified_count, 1);
        assert_eq!(store.find(Query::eq("seen", true)).await.len(), 1);

        let del = store.delete_one(Query::eq("kind", "x")).await;
        assert_eq!(del.deleted_count, 1);
        let left = store.find(Query::all()).await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0]["n"], json!(2));

        let miss = store.delete_one(Query::eq("kind", "y")).await;
        assert_eq!(miss.deleted_count, 0);
    }

    #[tokio::test]
    async fn state_survives_reconstruction() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;
        store.insert_one(user("ravi", "ravi@example.com")).await;
        store.insert_one(user("asha", "asha@example.com")).await;
        let before = store.find(Query::all()).await;
        store.close();
        drop(store);

        let reopened = open_in(&dir).await;
        assert_eq!(reopened.find(Query::all()).await, before);
    }

    #[tokio::test]
    async fn missing_or_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let missing = FallbackCollection::open(&path).await.unwrap();
        assert!(missing.find(Query::all()).await.is_empty());
        missing.close();

        std::fs::write(&path, b"{not json").unwrap();
        let corrupt = FallbackCollection::open(&path).await.unwrap();
        assert!(corrupt.find(Query::all()).await.is_empty());

        let res = corrupt.insert_one(user("ravi", "ravi@example.com")).await;
        let found = corrupt.find_one(Query::eq("username", "ravi")).await.unwrap();
        assert_eq!(found[ID_FIELD], json!(res.inserted_id));

        let on_disk = load_snapshot(&path).await.unwrap();
        assert_eq!(on_disk.len(), 1);
    }

    #[tokio::test]
    async fn unwritable_path_keeps_serving_from_memory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FallbackCollection::open(dir.path().join("missing-dir").join("users.json"))
            .await
            .unwrap();

        store.insert_one(user("ravi", "ravi@example.com")).await;
        assert!(store.find_one(Query::eq("username", "ravi")).await.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_all_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let store = FallbackCollection::open(&path).await.unwrap();

        let tasks: Vec<_> = (0..200)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move { store.insert_one(record(json!({ "n": n }))).await })
            })
            .collect();
        let mut ids = HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap().inserted_id);
        }
        assert_eq!(ids.len(), 200);

        let on_disk = load_snapshot(&path).await.unwrap();
        assert_eq!(on_disk.len(), 200);
        assert!(ids.iter().all(|id| on_disk.contains_key(id)));
        assert_eq!(store.find(Query::all()).await.len(), 200);
    }

    #[tokio::test]
    async fn generated_ids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;

        let mut ids = HashSet::new();
        for n in 0..1000 {
            let res = store.insert_one(record(json!({ "n": n }))).await;
            ids.insert(res.inserted_id);
        }
        assert_eq!(ids.len(), 1000);
        assert_eq!(store.find(Query::all()).await.len(), 1000);
    }
}
