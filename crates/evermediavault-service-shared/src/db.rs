//! MySQL connection pool, connectivity probe and scoped units of work.
//!
//! - [`PoolConfig`]: pool limits derived from settings
//! - [`DbPool`]: `sqlx` pool wrapper; connects lazily so the service can boot
//!   without a reachable database
//! - [`ConnectivityProbe`]: the capability the readiness endpoint consumes
//! - [`DbPool::unit_of_work`]: commit-on-success, rollback-on-failure sessions
//! - [`Model`] / [`RecordTimestamps`]: base pieces for persisted entities

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{ConnectOptions, MySql, MySqlPool, Transaction};

use crate::config::Settings;
use crate::error::short_type_name;

/// Errors that can occur during pool operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Failed to check out a connection from the pool.
    #[error("failed to get connection from pool: {message}")]
    Checkout { message: String },

    /// Failed to open the initial connection.
    #[error("failed to build connection pool: {message}")]
    Build { message: String },
}

impl PoolError {
    pub fn checkout(message: impl Into<String>) -> Self {
        Self::Checkout {
            message: message.into(),
        }
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
        }
    }
}

/// Configuration for the database connection pool.
#[derive(Clone)]
pub struct PoolConfig {
    host: String,
    port: u16,
    user: String,
    password: String,
    database: String,
    charset: String,
    max_connections: u32,
    recycle: Duration,
    acquire_timeout: Duration,
    echo: bool,
}

impl PoolConfig {
    /// Derive pool configuration from settings.
    ///
    /// The pool may grow to `DB_POOL_SIZE + DB_MAX_OVERFLOW` connections;
    /// connections are retired after `DB_POOL_RECYCLE` seconds.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            host: settings.db_host.clone(),
            port: settings.db_port,
            user: settings.db_user.clone(),
            password: settings.db_password.clone(),
            database: settings.db_name.clone(),
            charset: settings.db_charset.clone(),
            max_connections: settings
                .db_pool_size
                .saturating_add(settings.db_max_overflow)
                .max(1),
            recycle: settings.db_pool_recycle(),
            acquire_timeout: settings.db_connect_timeout(),
            echo: settings.db_echo,
        }
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    pub fn recycle(&self) -> Duration {
        self.recycle
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .charset(&self.charset);

        if self.echo {
            options
        } else {
            options.disable_statement_logging()
        }
    }

    fn pool_options(&self) -> MySqlPoolOptions {
        MySqlPoolOptions::new()
            .max_connections(self.max_connections)
            .idle_timeout(Some(self.recycle))
            .max_lifetime(Some(self.recycle))
            .acquire_timeout(self.acquire_timeout)
            .test_before_acquire(true)
    }
}

impl std::fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("recycle", &self.recycle)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}

/// Pooled MySQL handle shared by request handlers.
///
/// Cloning is cheap; all clones share the same pool.
#[derive(Debug, Clone)]
pub struct DbPool {
    inner: MySqlPool,
}

impl DbPool {
    /// Build the pool without opening a connection.
    ///
    /// Connections are established on first checkout.
    pub fn connect_lazy(config: &PoolConfig) -> Self {
        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            max_connections = config.max_connections,
            "database pool configured"
        );

        Self {
            inner: config.pool_options().connect_lazy_with(config.connect_options()),
        }
    }

    /// Build the pool and open the first connection eagerly.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Build` if the database cannot be reached.
    pub async fn connect(config: &PoolConfig) -> Result<Self, PoolError> {
        let inner = config
            .pool_options()
            .connect_with(config.connect_options())
            .await
            .map_err(|err| PoolError::build(err.to_string()))?;

        Ok(Self { inner })
    }

    /// Check out a connection. It returns to the pool when dropped.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Checkout` if no connection is available within the
    /// acquire timeout.
    pub async fn acquire(&self) -> Result<PoolConnection<MySql>, PoolError> {
        self.inner
            .acquire()
            .await
            .map_err(|err| PoolError::checkout(err.to_string()))
    }

    /// The underlying `sqlx` pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.inner
    }

    /// Run `work` inside a transaction.
    ///
    /// Commits when `work` returns `Ok`, rolls back when it returns `Err`.
    /// If the future is dropped or panics mid-way the transaction is rolled
    /// back when it is dropped. The connection always returns to the pool.
    ///
    /// ```ignore
    /// let id = pool
    ///     .unit_of_work(|tx| {
    ///         Box::pin(async move {
    ///             let row = sqlx::query("INSERT INTO media (title) VALUES (?)")
    ///                 .bind("clip")
    ///                 .execute(&mut **tx)
    ///                 .await?;
    ///             Ok::<_, AppError>(row.last_insert_id())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn unit_of_work<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut Transaction<'static, MySql>) -> BoxFuture<'c, Result<T, E>>,
        E: From<sqlx::Error>,
    {
        let mut tx = self.inner.begin().await?;

        match work(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!(error = %rollback, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Failure reported by a [`ConnectivityProbe`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// The dependency answered with an error or could not be reached.
    #[error("{0}")]
    Unavailable(String),

    /// The probe did not finish within its time budget.
    #[error("database probe timed out")]
    TimedOut,
}

/// A cheap round-trip check against a downstream dependency.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn check(&self) -> Result<(), ProbeError>;
}

#[async_trait]
impl ConnectivityProbe for DbPool {
    async fn check(&self) -> Result<(), ProbeError> {
        let mut conn = self
            .acquire()
            .await
            .map_err(|err| ProbeError::Unavailable(err.to_string()))?;

        sqlx::query("SELECT 1")
            .execute(&mut *conn)
            .await
            .map_err(|err| ProbeError::Unavailable(err.to_string()))?;

        Ok(())
    }
}

/// Run `probe` with an upper time bound.
///
/// Timing out drops the in-flight check, releasing any connection it holds.
pub async fn check_with_timeout(
    probe: &dyn ConnectivityProbe,
    timeout: Duration,
) -> Result<(), ProbeError> {
    match tokio::time::timeout(timeout, probe.check()).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::TimedOut),
    }
}

/// Base trait for persisted entities.
pub trait Model {
    /// Table backing this entity; the lower-cased type name by default.
    fn table_name() -> String {
        short_type_name::<Self>().to_lowercase()
    }
}

/// Creation and update timestamps stored on every row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecordTimestamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordTimestamps {
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the row as modified.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MediaItem;
    impl Model for MediaItem {}

    struct Playlist;
    impl Model for Playlist {
        fn table_name() -> String {
            "playlists".to_string()
        }
    }

    struct SlowProbe;

    #[async_trait]
    impl ConnectivityProbe for SlowProbe {
        async fn check(&self) -> Result<(), ProbeError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[test]
    fn test_pool_config_from_settings() {
        let settings = Settings::from_lookup(|key| match key {
            "DB_POOL_SIZE" => Some("4".to_string()),
            "DB_MAX_OVERFLOW" => Some("6".to_string()),
            "DB_POOL_RECYCLE" => Some("120".to_string()),
            "DB_CONNECT_TIMEOUT_SECONDS" => Some("3".to_string()),
            _ => None,
        })
        .unwrap();

        let config = PoolConfig::from_settings(&settings);
        assert_eq!(config.max_connections(), 10);
        assert_eq!(config.recycle(), Duration::from_secs(120));
        assert_eq!(config.acquire_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::from_settings(&Settings::default());
        assert_eq!(config.max_connections(), 30);
        assert_eq!(config.recycle(), Duration::from_secs(3600));
    }

    #[test]
    fn test_pool_config_never_zero_connections() {
        let settings = Settings::from_lookup(|key| match key {
            "DB_POOL_SIZE" | "DB_MAX_OVERFLOW" => Some("0".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(PoolConfig::from_settings(&settings).max_connections(), 1);
    }

    #[test]
    fn test_pool_config_debug_redacts_password() {
        let settings = Settings::from_lookup(|key| match key {
            "DB_PASSWORD" => Some("hunter2".to_string()),
            _ => None,
        })
        .unwrap();

        let debug = format!("{:?}", PoolConfig::from_settings(&settings));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_pool_error_display() {
        assert!(PoolError::checkout("refused").to_string().contains("refused"));
        assert!(PoolError::build("bad url").to_string().contains("bad url"));
    }

    #[test]
    fn test_model_table_name() {
        assert_eq!(MediaItem::table_name(), "mediaitem");
        assert_eq!(Playlist::table_name(), "playlists");
    }

    #[test]
    fn test_record_timestamps_touch() {
        let mut ts = RecordTimestamps::now();
        let created = ts.created_at;
        ts.touch();
        assert_eq!(ts.created_at, created);
        assert!(ts.updated_at >= created);
    }

    #[tokio::test]
    async fn test_lazy_pool_boots_without_database() {
        let settings = Settings::from_lookup(|key| match key {
            "DB_HOST" => Some("127.0.0.1".to_string()),
            "DB_PORT" => Some("1".to_string()),
            "DB_CONNECT_TIMEOUT_SECONDS" => Some("1".to_string()),
            _ => None,
        })
        .unwrap();

        let pool = DbPool::connect_lazy(&PoolConfig::from_settings(&settings));
        let result = pool.check().await;
        assert!(matches!(result, Err(ProbeError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        let result = check_with_timeout(&SlowProbe, Duration::from_millis(20)).await;
        assert_eq!(result, Err(ProbeError::TimedOut));
        assert_eq!(
            ProbeError::TimedOut.to_string(),
            "database probe timed out"
        );
    }

    /// Needs a live MySQL reachable at `EVERMEDIAVAULT_TEST_DATABASE_URL`.
    #[tokio::test]
    #[ignore]
    async fn test_unit_of_work_against_live_database() {
        let url = std::env::var("EVERMEDIAVAULT_TEST_DATABASE_URL")
            .expect("EVERMEDIAVAULT_TEST_DATABASE_URL must be set");
        let pool = DbPool {
            inner: MySqlPool::connect(&url).await.unwrap(),
        };

        pool.check().await.unwrap();

        let committed: i64 = pool
            .unit_of_work(|tx| {
                Box::pin(async move {
                    let value: i64 = sqlx::query_scalar("SELECT 41 + 1")
                        .fetch_one(&mut **tx)
                        .await?;
                    Ok::<_, sqlx::Error>(value)
                })
            })
            .await
            .unwrap();
        assert_eq!(committed, 42);

        let failed: Result<(), sqlx::Error> = pool
            .unit_of_work(|_tx| Box::pin(async move { Err(sqlx::Error::RowNotFound) }))
            .await;
        assert!(matches!(failed, Err(sqlx::Error::RowNotFound)));
    }
}
