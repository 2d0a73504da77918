//! Core domain model, upstream posting shape and record validation for vacdb.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "vacdb-core";

/// Currency code postings must carry to be stored.
pub const ACCEPTED_CURRENCY: &str = "RUR";

/// Sentinel for values that are unknown or have no qualifying data.
pub const NOT_AVAILABLE: &str = "N/A";

/// Placeholder stored in `open_vacancies` when the count is unknown.
pub const UNKNOWN_OPEN_VACANCIES: &str = NOT_AVAILABLE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employer {
    pub employer: String,
    pub open_vacancies: String,
}

impl Employer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            employer: name.into(),
            open_vacancies: UNKNOWN_OPEN_VACANCIES.to_string(),
        }
    }

    pub fn with_open_vacancies(name: impl Into<String>, open_vacancies: Option<u64>) -> Self {
        Self {
            employer: name.into(),
            open_vacancies: open_vacancies
                .map(|n| n.to_string())
                .unwrap_or_else(|| UNKNOWN_OPEN_VACANCIES.to_string()),
        }
    }
}

/// A stored job posting, identified by `(name_vacancy, employer)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vacancy {
    pub name_vacancy: String,
    pub employer: String,
    pub location: String,
    pub salary_from: i64,
    pub salary_to: i64,
    pub currency: String,
    pub url: String,
}

impl Vacancy {
    /// Builds a storable vacancy from an upstream posting, or `None` when the
    /// posting does not pass [`validate_posting`].
    pub fn from_posting(posting: &RawPosting, accepted_currency: &str) -> Option<Self> {
        if !validate_posting(posting, accepted_currency) {
            return None;
        }
        let salary = posting.salary.as_ref()?;
        Some(Self {
            name_vacancy: present(posting.name.as_deref())?.to_string(),
            employer: present(posting.employer_name())?.to_string(),
            location: present(posting.location())?.to_string(),
            salary_from: salary.from.unwrap_or(0),
            salary_to: salary.to.unwrap_or(0),
            currency: present(salary.currency.as_deref())?.to_string(),
            url: present(posting.alternate_url.as_deref())?.to_string(),
        })
    }

    pub fn midpoint(&self) -> f64 {
        (self.salary_from + self.salary_to) as f64 / 2.0
    }

    pub fn salary_range(&self) -> String {
        format_salary_range(self.salary_from, self.salary_to, &self.currency)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawNamed {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawSalary {
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub currency: Option<String>,
}

/// Posting as returned by the upstream listing API, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawPosting {
    pub name: Option<String>,
    pub area: Option<RawNamed>,
    pub salary: Option<RawSalary>,
    pub alternate_url: Option<String>,
    pub employer: Option<RawNamed>,
}

impl RawPosting {
    pub fn location(&self) -> Option<&str> {
        self.area.as_ref().and_then(|a| a.name.as_deref())
    }

    pub fn employer_name(&self) -> Option<&str> {
        self.employer.as_ref().and_then(|e| e.name.as_deref())
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Returns true only for well-formed, in-scope postings: title, location,
/// salary block with the accepted currency, canonical url and employer name
/// all present, and no negative salary bound.
pub fn validate_posting(posting: &RawPosting, accepted_currency: &str) -> bool {
    let Some(salary) = posting.salary.as_ref() else {
        return false;
    };
    let currency_ok = present(salary.currency.as_deref()) == Some(accepted_currency);
    let bounds_ok = salary.from.unwrap_or(0) >= 0 && salary.to.unwrap_or(0) >= 0;

    present(posting.name.as_deref()).is_some()
        && present(posting.location()).is_some()
        && currency_ok
        && bounds_ok
        && present(posting.alternate_url.as_deref()).is_some()
        && present(posting.employer_name()).is_some()
}

pub fn format_salary_range(salary_from: i64, salary_to: i64, currency: &str) -> String {
    format!("{salary_from} - {salary_to} {currency}")
}

/// Report-ready row handed to presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacancyReport {
    pub company: String,
    pub title: String,
    pub salary: String,
    pub url: String,
}

impl From<&Vacancy> for VacancyReport {
    fn from(v: &Vacancy) -> Self {
        Self {
            company: v.employer.clone(),
            title: v.name_vacancy.clone(),
            salary: v.salary_range(),
            url: v.url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployerVacancyCount {
    pub employer: String,
    pub vacancies: i64,
}

/// Mean midpoint salary, `None` when no vacancy has both bounds set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct AverageSalary(pub Option<f64>);

impl AverageSalary {
    pub fn value(&self) -> Option<f64> {
        self.0
    }
}

impl fmt::Display for AverageSalary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(avg) => write!(f, "{avg:.2}"),
            None => f.write_str(NOT_AVAILABLE),
        }
    }
}
