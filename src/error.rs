// =============================================================================
// Error taxonomy for the Trade Store / Engine boundary
// =============================================================================
//
// The coordinator and engine use `anyhow::Result` at the process boundary
// (see main.rs, coordinator.rs); these variants exist for call sites that
// need to match on a specific failure kind rather than just log-and-continue.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("no position with store_id {0}")]
    PositionNotFound(i64),

    #[error("no budget row for strategy {0}")]
    NoBudget(String),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("broker adapter error: {0}")]
    Broker(#[from] anyhow::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
