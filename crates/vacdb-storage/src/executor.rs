//! Parameterized statement execution against the pooled store.

use std::fmt;

use sqlx::any::{Any, AnyArguments, AnyRow};
use sqlx::AnyPool;
use sqlx::query::Query;
use tracing::{debug, warn};

use crate::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Read,
    Write,
}

/// Bound parameter value. Caller-supplied values only ever reach the store this way.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    Int(i64),
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for Param {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
    pub kind: StatementKind,
}

impl Statement {
    pub fn read(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            kind: StatementKind::Read,
        }
    }

    pub fn write(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            kind: StatementKind::Write,
        }
    }

    pub fn bind(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }
}

/// Outcome of one statement: rows for reads, affected count for writes.
#[derive(Default)]
pub struct QueryResult {
    pub rows: Vec<AnyRow>,
    pub rows_affected: u64,
}

impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("rows", &self.rows.len())
            .field("rows_affected", &self.rows_affected)
            .finish()
    }
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn bind_params<'q>(sql: &'q str, params: &'q [Param]) -> Query<'q, Any, AnyArguments<'q>> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            Param::Text(value) => query.bind(value.as_str()),
            Param::Int(value) => query.bind(*value),
        };
    }
    query
}

/// Executes statements on a connection acquired per call from the pool.
///
/// Reads return their rows; writes run inside a transaction that is committed
/// on success and rolled back on failure. Failures come back as
/// [`StoreError`], so an empty `Ok` result always means "no rows".
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    pool: AnyPool,
}

impl QueryExecutor {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub async fn run(&self, statement: &Statement) -> Result<QueryResult, StoreError> {
        match statement.kind {
            StatementKind::Read => {
                let rows = self.fetch_rows(statement).await?;
                Ok(QueryResult {
                    rows,
                    rows_affected: 0,
                })
            }
            StatementKind::Write => {
                let mut results = self.run_in_transaction(std::slice::from_ref(statement)).await?;
                Ok(results.pop().unwrap_or_default())
            }
        }
    }

    pub async fn fetch_all(&self, statement: &Statement) -> Result<Vec<AnyRow>, StoreError> {
        self.run(statement).await.map(|result| result.rows)
    }

    pub async fn execute(&self, statement: &Statement) -> Result<u64, StoreError> {
        self.run(statement).await.map(|result| result.rows_affected)
    }

    async fn fetch_rows(&self, statement: &Statement) -> Result<Vec<AnyRow>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::Connect)?;
        bind_params(&statement.sql, &statement.params)
            .fetch_all(&mut *conn)
            .await
            .map_err(|err| {
                warn!(error = %err, "read statement failed");
                StoreError::statement(&statement.sql, err)
            })
    }

    /// Run all statements in one transaction; either every statement commits or none does.
    pub async fn run_in_transaction(
        &self,
        statements: &[Statement],
    ) -> Result<Vec<QueryResult>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Connect)?;
        let mut results = Vec::with_capacity(statements.len());

        for statement in statements {
            let query = bind_params(&statement.sql, &statement.params);
            let outcome = match statement.kind {
                StatementKind::Read => query.fetch_all(&mut *tx).await.map(|rows| QueryResult {
                    rows,
                    rows_affected: 0,
                }),
                StatementKind::Write => query.execute(&mut *tx).await.map(|done| QueryResult {
                    rows: Vec::new(),
                    rows_affected: done.rows_affected(),
                }),
            };

            match outcome {
                Ok(result) => results.push(result),
                Err(err) => {
                    warn!(error = %err, "statement failed; rolling back");
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "rollback failed");
                    }
                    return Err(StoreError::statement(&statement.sql, err));
                }
            }
        }

        tx.commit().await.map_err(|err| StoreError::statement("COMMIT", err))?;
        debug!(statements = statements.len(), "transaction committed");
        Ok(results)
    }
}
