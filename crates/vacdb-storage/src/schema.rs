//! Drop-and-recreate management of the `employers` and `vacancies` tables.

use std::fmt;
use std::str::FromStr;

use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, Connection};
use tracing::info;

use crate::executor::{QueryExecutor, Statement};
use crate::StoreError;

pub const EMPLOYERS_TABLE: &str = "employers";
pub const VACANCIES_TABLE: &str = "vacancies";

const DROP_VACANCIES: &str = "DROP TABLE IF EXISTS vacancies";
const DROP_EMPLOYERS: &str = "DROP TABLE IF EXISTS employers";

const CREATE_EMPLOYERS: &str = r#"
CREATE TABLE employers (
    employer VARCHAR(100) PRIMARY KEY NOT NULL,
    open_vacancies VARCHAR(100)
)
"#;

const CREATE_VACANCIES: &str = r#"
CREATE TABLE vacancies (
    name_vacancy TEXT NOT NULL,
    employer VARCHAR(100) NOT NULL,
    location VARCHAR(100) NOT NULL,
    salary_from BIGINT NOT NULL CHECK (salary_from >= 0),
    salary_to BIGINT NOT NULL CHECK (salary_to >= 0),
    currency VARCHAR(10) NOT NULL,
    url TEXT NOT NULL,
    FOREIGN KEY (employer) REFERENCES employers (employer),
    UNIQUE (name_vacancy, employer)
)
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaStatus {
    pub table: &'static str,
}

impl fmt::Display for SchemaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table '{}' created/recreated", self.table)
    }
}

#[derive(Debug, Clone)]
pub struct SchemaManager {
    executor: QueryExecutor,
}

impl SchemaManager {
    pub fn new(executor: QueryExecutor) -> Self {
        Self { executor }
    }

    /// Drop `employers` together with everything depending on it, then recreate it empty.
    ///
    /// The only dependent is `vacancies`, which is dropped first; it stays absent
    /// until [`Self::reset_vacancy_table`] runs.
    pub async fn reset_employer_table(&self) -> Result<SchemaStatus, StoreError> {
        self.executor
            .run_in_transaction(&[
                Statement::write(DROP_VACANCIES),
                Statement::write(DROP_EMPLOYERS),
                Statement::write(CREATE_EMPLOYERS),
            ])
            .await?;
        info!(table = EMPLOYERS_TABLE, "table reset");
        Ok(SchemaStatus {
            table: EMPLOYERS_TABLE,
        })
    }

    pub async fn reset_vacancy_table(&self) -> Result<SchemaStatus, StoreError> {
        self.executor
            .run_in_transaction(&[
                Statement::write(DROP_VACANCIES),
                Statement::write(CREATE_VACANCIES),
            ])
            .await?;
        info!(table = VACANCIES_TABLE, "table reset");
        Ok(SchemaStatus {
            table: VACANCIES_TABLE,
        })
    }

    pub async fn reset_all(&self) -> Result<Vec<SchemaStatus>, StoreError> {
        Ok(vec![
            self.reset_employer_table().await?,
            self.reset_vacancy_table().await?,
        ])
    }
}

pub fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}

fn valid_database_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Create the database named in `url` when it does not exist yet.
///
/// Connects to the `postgres` maintenance database to check `pg_database`.
/// Returns `true` when the database was created.
pub async fn ensure_postgres_database(url: &str) -> Result<bool, StoreError> {
    let options = PgConnectOptions::from_str(url).map_err(StoreError::Connect)?;
    let name = options.get_database().unwrap_or("postgres").to_string();
    if !valid_database_name(&name) {
        return Err(StoreError::InvalidDatabaseName(name));
    }

    let mut conn = options
        .database("postgres")
        .connect()
        .await
        .map_err(StoreError::Connect)?;

    let check = "SELECT 1 FROM pg_database WHERE datname = $1";
    let exists = sqlx::query(check)
        .bind(name.as_str())
        .fetch_optional(&mut conn)
        .await
        .map_err(|err| StoreError::statement(check, err))?
        .is_some();

    if !exists {
        // identifiers cannot be bound; the name was restricted to [A-Za-z0-9_] above
        let create = format!("CREATE DATABASE \"{name}\"");
        sqlx::query(&create)
            .execute(&mut conn)
            .await
            .map_err(|err| StoreError::statement(&create, err))?;
        info!(database = %name, "database created");
    }

    let _ = conn.close().await;
    Ok(!exists)
}
