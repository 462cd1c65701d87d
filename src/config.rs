use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

/// Process-wide configuration, resolved once from defaults and `KISAN_*` env vars.
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::figment()
        .extract()
        .expect("FATAL: invalid KISAN_* configuration")
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mongodb_url: Url,
    pub database_name: String,
    /// File holding the fallback store snapshot, relative to the working directory.
    pub fallback_path: PathBuf,
    pub connect_timeout_secs: u64,
    pub connect_attempts: usize,
    pub listen_addr: String,
    pub loglevel: String,
    pub secret_key: String,
    pub token_ttl_minutes: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongodb_url: Url::parse("mongodb://localhost:27017")
                .expect("default mongodb url is valid"),
            database_name: "kisan_setu".to_string(),
            fallback_path: PathBuf::from("mock_users.json"),
            connect_timeout_secs: 5,
            connect_attempts: 2,
            listen_addr: "0.0.0.0:8001".to_string(),
            loglevel: "info".to_string(),
            secret_key: "kisan-setu-dev-secret-change-me".to_string(),
            token_ttl_minutes: 30,
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default())).merge(Env::prefixed("KISAN_"))
    }

    /// The subset of settings the persistence layer needs.
    pub fn db(&self) -> DbConfig {
        DbConfig {
            mongodb_url: self.mongodb_url.clone(),
            database_name: self.database_name.clone(),
            fallback_path: self.fallback_path.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs.max(1)),
            connect_attempts: self.connect_attempts.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub mongodb_url: Url,
    pub database_name: String,
    pub fallback_path: PathBuf,
    pub connect_timeout: Duration,
    pub connect_attempts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.mongodb_url.as_str(), "mongodb://localhost:27017");
        assert_eq!(cfg.database_name, "kisan_setu");
        assert_eq!(cfg.fallback_path, PathBuf::from("mock_users.json"));

        let db = cfg.db();
        assert_eq!(db.connect_timeout, Duration::from_secs(5));
        assert_eq!(db.connect_attempts, 2);
    }

    #[test]
    fn env_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("KISAN_DATABASE_NAME", "other_db");
            jail.set_env("KISAN_CONNECT_TIMEOUT_SECS", "1");
            let cfg: Config = Config::figment().extract()?;
            assert_eq!(cfg.database_name, "other_db");
            assert_eq!(cfg.connect_timeout_secs, 1);
            Ok(())
        });
    }
}
