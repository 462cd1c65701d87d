use crate::config::DbConfig;
use crate::db::document::{DeleteResult, InsertOneResult, Query, Record, Update, UpdateResult};
use crate::db::fallback::FallbackCollection;
use crate::db::live::LiveCollection;
use crate::error::StoreError;
use backon::{ExponentialBuilder, Retryable};
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tracing::{error, info, warn};

const USERS: &str = "users";

/// Owns the live MongoDB connection, if any, and the lazily created fallback.
///
/// Built once at startup and shared with every handler. `connect` and
/// `disconnect` are meant to be called exactly once each, from `main`.
pub struct DatabaseManager {
    config: DbConfig,
    live: RwLock<Option<LiveConnection>>,
    fallback: OnceCell<FallbackDatabase>,
}

struct LiveConnection {
    client: mongodb::Client,
    db: mongodb::Database,
}

impl DatabaseManager {
    pub fn new(config: DbConfig) -> Self {
        Self {
            config,
            live: RwLock::new(None),
            fallback: OnceCell::new(),
        }
    }

    /// Try to reach MongoDB. Never fails: on any error the process keeps
    /// running in degraded mode and `get_database` hands out the fallback.
    pub async fn connect(&self) {
        let url = self.config.mongodb_url.as_str();
        match self.try_connect().await {
            Ok(conn) => {
                info!(url, database = %self.config.database_name, "connected to MongoDB");
                *self.live.write().await = Some(conn);
            }
            Err(e) => {
                error!(url, error = %e, "failed to connect to MongoDB");
                warn!("starting without database; using fallback store");
            }
        }
    }

    async fn try_connect(&self) -> Result<LiveConnection, StoreError> {
        let timeout = self.config.connect_timeout;
        let mut opts = ClientOptions::parse(self.config.mongodb_url.as_str()).await?;
        opts.app_name = Some("kisan-setu".to_string());
        opts.connect_timeout = Some(timeout);
        opts.server_selection_timeout = Some(timeout);

        let client = mongodb::Client::with_options(opts)?;
        let db = client.database(&self.config.database_name);

        let ping = || async {
            tokio::time::timeout(timeout, db.run_command(doc! { "ping": 1 }))
                .await
                .map_err(|_| StoreError::Timeout(timeout))??;
            Ok::<_, StoreError>(())
        };
        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(1))
            .with_max_times(self.config.connect_attempts.saturating_sub(1));

        ping.retry(retry_policy)
            .notify(|e: &StoreError, after: Duration| {
                warn!(error = %e, retry_in = ?after, "MongoDB ping failed");
            })
            .await?;

        Ok(LiveConnection { client, db })
    }

    /// Close the live connection if there is one. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let Some(conn) = self.live.write().await.take() else {
            return;
        };
        conn.client.shutdown().await;
        info!("disconnected from MongoDB");
    }

    pub async fn is_connected(&self) -> bool {
        self.live.read().await.is_some()
    }

    /// The live database when connected, otherwise the process-wide fallback,
    /// created on first use and reused afterwards.
    pub async fn get_database(&self) -> Database {
        if let Some(conn) = self.live.read().await.as_ref() {
            return Database::Live(LiveDatabase {
                db: conn.db.clone(),
            });
        }
        let fallback = self
            .fallback
            .get_or_init(|| async {
                warn!("database not available, using persistent fallback store");
                FallbackDatabase::open(&self.config.fallback_path).await
            })
            .await;
        Database::Fallback(fallback.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    Live,
    Fallback,
}

#[derive(Clone)]
pub enum Database {
    Live(LiveDatabase),
    Fallback(FallbackDatabase),
}

impl Database {
    pub fn mode(&self) -> BackendMode {
        match self {
            Database::Live(_) => BackendMode::Live,
            Database::Fallback(_) => BackendMode::Fallback,
        }
    }

    pub fn users(&self) -> Collection {
        match self {
            Database::Live(db) => Collection::Live(db.collection(USERS)),
            Database::Fallback(db) => Collection::Fallback(db.users.clone()),
        }
    }
}

#[derive(Clone)]
pub struct LiveDatabase {
    db: mongodb::Database,
}

impl LiveDatabase {
    pub fn collection(&self, name: &str) -> LiveCollection {
        LiveCollection::new(self.db.collection(name))
    }
}

/// Stand-in for a logical database. Only the `users` collection is emulated.
#[derive(Clone)]
pub struct FallbackDatabase {
    users: FallbackCollection,
}

impl FallbackDatabase {
    async fn open(path: &Path) -> Self {
        let users = FallbackCollection::open(path)
            .await
            .expect("failed to spawn fallback store");
        Self { users }
    }
}

/// One collection, whichever backend it lives on. Callers use the same
/// verbs either way; fallback calls always return `Ok`.
#[derive(Clone)]
pub enum Collection {
    Live(LiveCollection),
    Fallback(FallbackCollection),
}

impl Collection {
    pub async fn find_one(&self, query: Query) -> Result<Option<Record>, StoreError> {
        match self {
            Collection::Live(c) => c.find_one(query).await,
            Collection::Fallback(c) => Ok(c.find_one(query).await),
        }
    }

    pub async fn find(&self, query: Query) -> Result<Vec<Record>, StoreError> {
        match self {
            Collection::Live(c) => c.find(query).await,
            Collection::Fallback(c) => Ok(c.find(query).await),
        }
    }

    pub async fn insert_one(&self, record: Record) -> Result<InsertOneResult, StoreError> {
        match self {
            Collection::Live(c) => c.insert_one(record).await,
            Collection::Fallback(c) => Ok(c.insert_one(record).await),
        }
    }

    pub async fn update_one(
        &self,
        query: Query,
        update: Update,
    ) -> Result<UpdateResult, StoreError> {
        match self {
            Collection::Live(c) => c.update_one(query, update).await,
            Collection::Fallback(c) => Ok(c.update_one(query, update).await),
        }
    }

    pub async fn delete_one(&self, query: Query) -> Result<DeleteResult, StoreError> {
        match self {
            Collection::Live(c) => c.delete_one(query).await,
            Collection::Fallback(c) => Ok(c.delete_one(query).await),
        }
    }

    /// Live-store-only aggregate. `None` means unavailable in degraded mode.
    pub async fn count_by(
        &self,
        field: &str,
    ) -> Result<Option<BTreeMap<String, u64>>, StoreError> {
        match self {
            Collection::Live(c) => c.count_by(field).await.map(Some),
            Collection::Fallback(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use url::Url;

    fn config_in(dir: &tempfile::TempDir) -> DbConfig {
        let mut cfg = Config::default().db();
        cfg.fallback_path = dir.path().join("mock_users.json");
        cfg.mongodb_url = Url::parse("mongodb://127.0.0.1:1").unwrap();
        cfg.connect_timeout = Duration::from_millis(300);
        cfg.connect_attempts = 1;
        cfg
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let manager = DatabaseManager::new(config_in(&dir));
        manager.disconnect().await;
        manager.disconnect().await;
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn unreachable_server_degrades_to_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let manager = DatabaseManager::new(config_in(&dir));

        manager.connect().await;
        assert!(!manager.is_connected().await);

        let db = manager.get_database().await;
        assert_eq!(db.mode(), BackendMode::Fallback);
        manager.disconnect().await;
    }

    #[tokio::test]
    async fn fallback_is_created_once_and_shared() {
        let dir = tempfile::tempdir().unwrap();
        let manager = DatabaseManager::new(config_in(&dir));

        let first = manager.get_database().await.users();
        let mut rec = Record::new();
        rec.insert("username".to_string(), json!("ravi"));
        let inserted = first.insert_one(rec).await.unwrap();

        let second = manager.get_database().await.users();
        let found = second
            .find_one(Query::eq("username", "ravi"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found["_id"], json!(inserted.inserted_id));
    }

    #[tokio::test]
    async fn fallback_reports_aggregates_as_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let manager = DatabaseManager::new(config_in(&dir));
        let users = manager.get_database().await.users();
        assert_eq!(users.count_by("user_type").await.unwrap(), None);
    }
}
