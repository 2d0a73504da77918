//! Read-only aggregate and filter views over the stored vacancies.

use async_trait::async_trait;
use sqlx::any::AnyRow;
use sqlx::Row;
use vacdb_core::{AverageSalary, EmployerVacancyCount, Vacancy, VacancyReport};

use crate::executor::{QueryExecutor, Statement};
use crate::StoreError;

const VACANCY_COLUMNS: &str =
    "v.name_vacancy, v.employer, v.location, v.salary_from, v.salary_to, v.currency, v.url";

/// Average midpoint over rows with both bounds set, rounded to cents.
const AVERAGE_MIDPOINT: &str = r#"
SELECT CAST(ROUND(AVG((salary_from + salary_to) / 2.0), 2) AS DOUBLE PRECISION) AS avg_salary
  FROM vacancies
 WHERE salary_from > 0 AND salary_to > 0
"#;

/// The five report views over stored vacancies.
#[async_trait]
pub trait VacancyReports: Send + Sync {
    async fn companies_and_vacancy_counts(&self) -> Result<Vec<EmployerVacancyCount>, StoreError>;

    async fn all_vacancies(&self) -> Result<Vec<VacancyReport>, StoreError>;

    async fn average_salary(&self) -> Result<AverageSalary, StoreError>;

    /// Vacancies whose midpoint is strictly above [`Self::average_salary`].
    async fn vacancies_above_average(&self) -> Result<Vec<VacancyReport>, StoreError>;

    /// Case-insensitive substring match on the vacancy title.
    async fn vacancies_by_keyword(&self, keyword: &str) -> Result<Vec<VacancyReport>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCounts {
    pub employers: i64,
    pub vacancies: i64,
}

#[derive(Debug, Clone)]
pub struct DbManager {
    executor: QueryExecutor,
}

impl DbManager {
    pub fn new(executor: QueryExecutor) -> Self {
        Self { executor }
    }

    async fn vacancy_reports(&self, statement: Statement) -> Result<Vec<VacancyReport>, StoreError> {
        let rows = self.executor.fetch_all(&statement).await?;
        rows.iter()
            .map(|row| vacancy_from_row(row).map(|v| VacancyReport::from(&v)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Decode)
    }

    pub async fn table_counts(&self) -> Result<TableCounts, StoreError> {
        let rows = self
            .executor
            .fetch_all(&Statement::read(
                "SELECT (SELECT COUNT(*) FROM employers) AS employers, \
                        (SELECT COUNT(*) FROM vacancies) AS vacancies",
            ))
            .await?;
        let Some(row) = rows.first() else {
            return Ok(TableCounts {
                employers: 0,
                vacancies: 0,
            });
        };
        Ok(TableCounts {
            employers: row.try_get("employers").map_err(StoreError::Decode)?,
            vacancies: row.try_get("vacancies").map_err(StoreError::Decode)?,
        })
    }

    /// Vacancies whose employer has no row in `employers`; zero whenever the
    /// foreign key holds.
    pub async fn orphaned_vacancy_count(&self) -> Result<i64, StoreError> {
        let rows = self
            .executor
            .fetch_all(&Statement::read(
                "SELECT COUNT(*) AS orphans \
                   FROM vacancies v \
                   LEFT JOIN employers e ON e.employer = v.employer \
                  WHERE e.employer IS NULL",
            ))
            .await?;
        match rows.first() {
            Some(row) => row.try_get("orphans").map_err(StoreError::Decode),
            None => Ok(0),
        }
    }
}

fn vacancy_from_row(row: &AnyRow) -> Result<Vacancy, sqlx::Error> {
    Ok(Vacancy {
        name_vacancy: row.try_get("name_vacancy")?,
        employer: row.try_get("employer")?,
        location: row.try_get("location")?,
        salary_from: row.try_get("salary_from")?,
        salary_to: row.try_get("salary_to")?,
        currency: row.try_get("currency")?,
        url: row.try_get("url")?,
    })
}

/// `LIKE` pattern matching `keyword` anywhere, with wildcards in it escaped.
///
/// Case is left alone; the query folds both sides with the store's `LOWER`.
fn contains_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl VacancyReports for DbManager {
    async fn companies_and_vacancy_counts(&self) -> Result<Vec<EmployerVacancyCount>, StoreError> {
        let rows = self
            .executor
            .fetch_all(&Statement::read(
                r#"
                SELECT v.employer AS employer, COUNT(v.name_vacancy) AS vacancies
                  FROM vacancies v
                 GROUP BY v.employer
                 ORDER BY v.employer
                "#,
            ))
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(EmployerVacancyCount {
                employer: row.try_get("employer").map_err(StoreError::Decode)?,
                vacancies: row.try_get("vacancies").map_err(StoreError::Decode)?,
            });
        }
        Ok(out)
    }

    async fn all_vacancies(&self) -> Result<Vec<VacancyReport>, StoreError> {
        self.vacancy_reports(Statement::read(format!(
            "SELECT {VACANCY_COLUMNS} FROM vacancies v ORDER BY v.employer, v.name_vacancy"
        )))
        .await
    }

    async fn average_salary(&self) -> Result<AverageSalary, StoreError> {
        let rows = self.executor.fetch_all(&Statement::read(AVERAGE_MIDPOINT)).await?;
        let avg = match rows.first() {
            Some(row) => row
                .try_get::<Option<f64>, _>("avg_salary")
                .map_err(StoreError::Decode)?,
            None => None,
        };
        Ok(AverageSalary(avg))
    }

    async fn vacancies_above_average(&self) -> Result<Vec<VacancyReport>, StoreError> {
        self.vacancy_reports(Statement::read(format!(
            r#"
            SELECT {VACANCY_COLUMNS}
              FROM vacancies v
             WHERE (v.salary_from + v.salary_to) / 2.0 > ({AVERAGE_MIDPOINT})
             ORDER BY v.employer, v.name_vacancy
            "#
        )))
        .await
    }

    async fn vacancies_by_keyword(&self, keyword: &str) -> Result<Vec<VacancyReport>, StoreError> {
        self.vacancy_reports(
            Statement::read(format!(
                r#"
                SELECT {VACANCY_COLUMNS}
                  FROM vacancies v
                 WHERE LOWER(v.name_vacancy) LIKE LOWER($1) ESCAPE '\'
                 ORDER BY v.employer, v.name_vacancy
                "#
            ))
            .bind(contains_pattern(keyword)),
        )
        .await
    }
}
