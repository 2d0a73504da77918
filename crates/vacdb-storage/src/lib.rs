//! Relational persistence for vacdb: statement execution, schema resets,
//! idempotent upserts and the report query layer.
//!
//! The store is reached through a `sqlx` [`AnyPool`], so the same code runs
//! against Postgres in production and a SQLite file in tests.

use std::time::Duration;

use sqlx::any::Any;
use sqlx::pool::PoolOptions;
use sqlx::AnyPool;
use thiserror::Error;

pub mod executor;
pub mod reports;
pub mod schema;
pub mod upsert;

pub use executor::{Param, QueryExecutor, QueryResult, Statement, StatementKind};
pub use reports::{DbManager, TableCounts, VacancyReports};
pub use schema::{ensure_postgres_database, is_postgres_url, SchemaManager, SchemaStatus};
pub use upsert::{UpsertEngine, UpsertSummary};

pub const CRATE_NAME: &str = "vacdb-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connecting to database: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("statement `{statement}` failed: {source}")]
    Statement {
        statement: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("decoding row: {0}")]
    Decode(#[source] sqlx::Error),
    #[error("invalid database name {0:?}")]
    InvalidDatabaseName(String),
}

impl StoreError {
    pub(crate) fn statement(sql: &str, source: sqlx::Error) -> Self {
        Self::Statement {
            statement: summarize_sql(sql),
            source,
        }
    }
}

fn summarize_sql(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 80 {
        let head: String = flat.chars().take(77).collect();
        format!("{head}...")
    } else {
        flat
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "postgres://postgres@localhost:5432/companies_and_vacancies".to_string(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// Build the connection factory every executor call acquires from.
pub async fn connect(config: &DbConfig) -> Result<AnyPool, StoreError> {
    sqlx::any::install_default_drivers();
    PoolOptions::<Any>::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.url)
        .await
        .map_err(StoreError::Connect)
}
