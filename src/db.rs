use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge, histogram};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Shared sea-orm pool; every service holds an `Arc<DbPool>`
pub type DbPool = DatabaseConnection;

/// Pool tuning. `sqlite::memory:` needs `max_connections = 1`, since each
/// in-memory connection is a separate database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Opens the pool. SQL statement logging stays off; request spans already
/// carry the service call.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!(max = config.max_connections, min = config.min_connections, "Opening database pool");

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("quickcommerce_db.max_connections", config.max_connections as f64);

    let db_pool = Database::connect(opt).await.map_err(|e| {
        error!(error = %e, "Database connection failed");
        counter!("quickcommerce_db.connection_failures", 1);
        ServiceError::DatabaseError(e)
    })?;

    info!(max_connections = config.max_connections, "Database pool ready");
    Ok(db_pool)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Runs the embedded schema migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running database migrations");
    let start = Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(ServiceError::DatabaseError);

    let elapsed = start.elapsed();
    histogram!("quickcommerce_db.migration.duration", elapsed);
    match &result {
        Ok(_) => info!(elapsed_ms = elapsed.as_millis() as u64, "Migrations applied"),
        Err(e) => error!(error = %e, elapsed_ms = elapsed.as_millis() as u64, "Migrations failed"),
    }

    result
}

/// Round-trip ping used by `/health`.
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let start = Instant::now();
    let result = pool.ping().await.map_err(ServiceError::DatabaseError);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "Database ping ok");
            gauge!(
                "quickcommerce_db.connection_latency",
                elapsed.as_millis() as f64
            );
        }
        Err(e) => {
            error!(error = %e, elapsed_ms = elapsed.as_millis() as u64, "Database ping failed");
            counter!("quickcommerce_db.connection_failures", 1);
        }
    }

    result
}

/// Single-connection in-memory SQLite with the schema applied.
#[cfg(test)]
pub(crate) async fn migrated_memory_pool() -> DbPool {
    let pool = memory_pool().await;
    run_migrations(&pool).await.expect("migrations");
    pool
}

#[cfg(test)]
async fn memory_pool() -> DbPool {
    // Every sqlite in-memory connection is its own database
    establish_connection_with_config(&DbConfig {
        url: "sqlite::memory:".into(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    })
    .await
    .expect("in-memory sqlite")
}
