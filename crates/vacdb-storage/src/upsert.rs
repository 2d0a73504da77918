//! Insert-or-skip writes that keep `vacancies.employer` resolvable.

use std::fmt;

use tracing::{debug, info};
use vacdb_core::{Employer, Vacancy, UNKNOWN_OPEN_VACANCIES};

use crate::executor::{QueryExecutor, Statement};
use crate::schema::{EMPLOYERS_TABLE, VACANCIES_TABLE};
use crate::StoreError;

const INSERT_EMPLOYER: &str =
    "INSERT INTO employers (employer, open_vacancies) VALUES ($1, $2) ON CONFLICT (employer) DO NOTHING";

const INSERT_VACANCY: &str = r#"
INSERT INTO vacancies (name_vacancy, employer, location, salary_from, salary_to, currency, url)
VALUES ($1, $2, $3, $4, $5, $6, $7)
ON CONFLICT (name_vacancy, employer) DO NOTHING
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertSummary {
    pub table: &'static str,
    pub inserted: usize,
    pub skipped: usize,
    /// Employers created on the fly because a vacancy referenced them first.
    pub employers_created: usize,
}

impl UpsertSummary {
    fn new(table: &'static str) -> Self {
        Self {
            table,
            inserted: 0,
            skipped: 0,
            employers_created: 0,
        }
    }
}

impl fmt::Display for UpsertSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table '{}': {} inserted, {} skipped as duplicates",
            self.table, self.inserted, self.skipped
        )?;
        if self.employers_created > 0 {
            write!(f, ", {} employers created", self.employers_created)?;
        }
        Ok(())
    }
}

fn employer_statement(name: &str, open_vacancies: &str) -> Statement {
    Statement::write(INSERT_EMPLOYER).bind(name).bind(open_vacancies)
}

fn vacancy_statement(vacancy: &Vacancy) -> Statement {
    Statement::write(INSERT_VACANCY)
        .bind(&vacancy.name_vacancy)
        .bind(&vacancy.employer)
        .bind(&vacancy.location)
        .bind(vacancy.salary_from)
        .bind(vacancy.salary_to)
        .bind(&vacancy.currency)
        .bind(&vacancy.url)
}

#[derive(Debug, Clone)]
pub struct UpsertEngine {
    executor: QueryExecutor,
}

impl UpsertEngine {
    pub fn new(executor: QueryExecutor) -> Self {
        Self { executor }
    }

    /// Insert employers, leaving existing rows (and their `open_vacancies`) untouched.
    ///
    /// Each insert commits on its own; the first failure aborts the rest of the batch.
    pub async fn upsert_employers(&self, employers: &[Employer]) -> Result<UpsertSummary, StoreError> {
        let mut summary = UpsertSummary::new(EMPLOYERS_TABLE);
        for employer in employers {
            let affected = self
                .executor
                .execute(&employer_statement(&employer.employer, &employer.open_vacancies))
                .await?;
            if affected > 0 {
                summary.inserted += 1;
            } else {
                summary.skipped += 1;
            }
        }
        info!(%summary, "employers upserted");
        Ok(summary)
    }

    /// Insert vacancies, creating any employer they reference that is not stored yet.
    ///
    /// The employer and the vacancy insert share one transaction per vacancy, so a
    /// stored vacancy always has its employer row.
    pub async fn upsert_vacancies(&self, vacancies: &[Vacancy]) -> Result<UpsertSummary, StoreError> {
        let mut summary = UpsertSummary::new(VACANCIES_TABLE);
        for vacancy in vacancies {
            let results = self
                .executor
                .run_in_transaction(&[
                    employer_statement(&vacancy.employer, UNKNOWN_OPEN_VACANCIES),
                    vacancy_statement(vacancy),
                ])
                .await?;

            if results[0].rows_affected > 0 {
                debug!(employer = %vacancy.employer, "employer created from vacancy reference");
                summary.employers_created += 1;
            }
            if results[1].rows_affected > 0 {
                summary.inserted += 1;
            } else {
                summary.skipped += 1;
            }
        }
        info!(%summary, "vacancies upserted");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::{DbManager, VacancyReports};
    use crate::test_support::{reset_schema, sqlite_executor};
    use sqlx::Row;

    fn vacancy(title: &str, employer: &str, from: i64, to: i64) -> Vacancy {
        Vacancy {
            name_vacancy: title.to_string(),
            employer: employer.to_string(),
            location: "Moscow".to_string(),
            salary_from: from,
            salary_to: to,
            currency: "RUR".to_string(),
            url: format!("https://hh.ru/vacancy/{}", title.len()),
        }
    }

    async fn employer_rows(executor: &QueryExecutor) -> Vec<(String, Option<String>)> {
        executor
            .fetch_all(&Statement::read(
                "SELECT employer, open_vacancies FROM employers ORDER BY employer",
            ))
            .await
            .unwrap()
            .iter()
            .map(|row| {
                let employer: String = row.try_get("employer").unwrap();
                let open_vacancies: Option<String> = row.try_get("open_vacancies").unwrap();
                (employer, open_vacancies)
            })
            .collect()
    }

    #[tokio::test]
    async fn duplicate_employers_are_skipped_without_update() {
        let (executor, _dir) = sqlite_executor().await;
        reset_schema(&executor).await;
        let engine = UpsertEngine::new(executor.clone());

        let first = engine
            .upsert_employers(&[Employer::with_open_vacancies("Acme", Some(3)), Employer::new("Globex")])
            .await
            .unwrap();
        assert_eq!((first.inserted, first.skipped), (2, 0));

        let second = engine
            .upsert_employers(&[Employer::with_open_vacancies("Acme", Some(99))])
            .await
            .unwrap();
        assert_eq!((second.inserted, second.skipped), (0, 1));

        assert_eq!(
            employer_rows(&executor).await,
            vec![
                ("Acme".to_string(), Some("3".to_string())),
                ("Globex".to_string(), Some("N/A".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn vacancy_for_unknown_employer_creates_employer_first() {
        let (executor, _dir) = sqlite_executor().await;
        reset_schema(&executor).await;
        let engine = UpsertEngine::new(executor.clone());

        let summary = engine
            .upsert_vacancies(&[vacancy("Dev", "Newcomer", 100, 200)])
            .await
            .unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.employers_created, 1);
        assert_eq!(
            employer_rows(&executor).await,
            vec![("Newcomer".to_string(), Some("N/A".to_string()))]
        );

        let manager = DbManager::new(executor.clone());
        assert_eq!(manager.orphaned_vacancy_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upserting_twice_leaves_tables_unchanged() {
        let (executor, _dir) = sqlite_executor().await;
        reset_schema(&executor).await;
        let engine = UpsertEngine::new(executor.clone());
        let manager = DbManager::new(executor.clone());

        let employers = vec![Employer::new("Acme")];
        let vacancies = vec![
            vacancy("Dev", "Acme", 100, 200),
            vacancy("QA", "Acme", 0, 0),
            vacancy("Dev", "Initech", 300, 400),
        ];

        engine.upsert_employers(&employers).await.unwrap();
        engine.upsert_vacancies(&vacancies).await.unwrap();
        let once = manager.all_vacancies().await.unwrap();
        let counts_once = manager.table_counts().await.unwrap();

        engine.upsert_employers(&employers).await.unwrap();
        let again = engine.upsert_vacancies(&vacancies).await.unwrap();
        assert_eq!((again.inserted, again.skipped, again.employers_created), (0, 3, 0));

        assert_eq!(manager.all_vacancies().await.unwrap(), once);
        assert_eq!(manager.table_counts().await.unwrap(), counts_once);
        assert_eq!(counts_once.vacancies, 3);
        assert_eq!(counts_once.employers, 2);
    }

    #[tokio::test]
    async fn failing_insert_aborts_remaining_batch() {
        let (executor, _dir) = sqlite_executor().await;
        reset_schema(&executor).await;
        let engine = UpsertEngine::new(executor.clone());

        let result = engine
            .upsert_vacancies(&[
                vacancy("Dev", "Acme", 100, 200),
                vacancy("Broken", "Acme", -1, 200),
                vacancy("Ops", "Acme", 100, 200),
            ])
            .await;
        assert!(result.is_err());

        let manager = DbManager::new(executor.clone());
        let titles: Vec<String> = manager
            .all_vacancies()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["Dev".to_string()]);
    }

    #[test]
    fn summary_reads_as_status_message() {
        let summary = UpsertSummary {
            table: VACANCIES_TABLE,
            inserted: 4,
            skipped: 1,
            employers_created: 2,
        };
        assert_eq!(
            summary.to_string(),
            "table 'vacancies': 4 inserted, 1 skipped as duplicates, 2 employers created"
        );
    }
}
