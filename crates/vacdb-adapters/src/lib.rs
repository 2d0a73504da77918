//! Upstream listing sources: the HeadHunter HTTP API client and a fixture-backed
//! source for offline runs.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};
use vacdb_core::{Employer, RawPosting};

pub const CRATE_NAME: &str = "vacdb-adapters";

pub const HH_API_BASE: &str = "https://api.hh.ru";

/// Where employers and their postings come from.
///
/// Failures never cross this boundary: an unreachable or malformed upstream
/// yields `None` / an empty list and is logged.
#[async_trait]
pub trait ListingSource: Send + Sync {
    fn source_id(&self) -> &str;

    async fn employer(&self, employer_id: &str) -> Option<Employer>;

    async fn vacancies(&self, employer_id: &str) -> Vec<RawPosting>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("unexpected payload from {url}: {reason}")]
    Payload { url: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    /// Size of the single listing page requested per employer.
    pub per_page: u32,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: HH_API_BASE.to_string(),
            timeout: Duration::from_secs(20),
            user_agent: None,
            per_page: 20,
        }
    }
}

/// Employer entry from the public employer directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployerSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub open_vacancies: Option<u64>,
}

#[derive(Debug)]
pub struct HhClient {
    client: reqwest::Client,
    base_url: String,
    per_page: u32,
}

impl HhClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        // the API rejects requests without a User-Agent
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            per_page: config.per_page.max(1),
        })
    }

    pub fn employer_url(&self, employer_id: &str) -> String {
        format!("{}/employers/{}", self.base_url, employer_id)
    }

    pub fn vacancies_url(&self) -> String {
        format!("{}/vacancies", self.base_url)
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<JsonValue, FetchError> {
        let resp = self.client.get(url).query(query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }
        Ok(resp.json::<JsonValue>().await?)
    }

    pub async fn fetch_employer(&self, employer_id: &str) -> Result<EmployerSummary, FetchError> {
        let url = self.employer_url(employer_id);
        let value = self.get_json(&url, &[]).await?;
        serde_json::from_value(value).map_err(|err| FetchError::Payload {
            url,
            reason: err.to_string(),
        })
    }

    pub async fn fetch_vacancies(&self, employer_id: &str) -> Result<Vec<RawPosting>, FetchError> {
        let url = self.vacancies_url();
        let value = self
            .get_json(
                &url,
                &[
                    ("employer_id", employer_id.to_string()),
                    ("per_page", self.per_page.to_string()),
                ],
            )
            .await?;
        let items = value
            .get("items")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| FetchError::Payload {
                url,
                reason: "missing `items` array".to_string(),
            })?;
        Ok(parse_items(items))
    }

    /// First `limit` employers that currently have open vacancies.
    pub async fn top_employers(&self, limit: usize) -> Vec<EmployerSummary> {
        let url = format!("{}/employers", self.base_url);
        let result = self
            .get_json(
                &url,
                &[
                    ("only_with_vacancies", "true".to_string()),
                    ("per_page", limit.max(1).to_string()),
                ],
            )
            .await;
        match result {
            Ok(value) => value
                .get("items")
                .and_then(JsonValue::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| serde_json::from_value(item.clone()).ok())
                        .take(limit)
                        .collect()
                })
                .unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "employer directory fetch failed");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl ListingSource for HhClient {
    fn source_id(&self) -> &str {
        "hh-api"
    }

    async fn employer(&self, employer_id: &str) -> Option<Employer> {
        let span = info_span!("hh_employer", employer_id);
        match self.fetch_employer(employer_id).instrument(span).await {
            Ok(summary) => Some(Employer::with_open_vacancies(summary.name, summary.open_vacancies)),
            Err(err) => {
                warn!(employer_id, error = %err, "could not resolve employer name");
                None
            }
        }
    }

    async fn vacancies(&self, employer_id: &str) -> Vec<RawPosting> {
        let span = info_span!("hh_vacancies", employer_id);
        match self.fetch_vacancies(employer_id).instrument(span).await {
            Ok(postings) => postings,
            Err(err) => {
                warn!(employer_id, error = %err, "could not fetch vacancies");
                Vec::new()
            }
        }
    }
}

/// Deserialize listing items one by one; an item that does not fit the
/// posting shape is dropped without affecting its neighbours.
pub fn parse_items(items: &[JsonValue]) -> Vec<RawPosting> {
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<RawPosting>(item.clone()) {
            Ok(posting) => Some(posting),
            Err(err) => {
                debug!(error = %err, "skipping malformed listing item");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureEmployer {
    pub name: String,
    #[serde(default)]
    pub open_vacancies: Option<u64>,
}

/// Captured upstream responses keyed by employer id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureBundle {
    pub source_id: String,
    #[serde(default)]
    pub captured_from_url: Option<String>,
    #[serde(default)]
    pub employers: BTreeMap<String, FixtureEmployer>,
    #[serde(default)]
    pub vacancies: BTreeMap<String, Vec<JsonValue>>,
}

pub fn load_fixture_bundle(path: impl AsRef<Path>) -> Result<FixtureBundle> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Clone)]
pub struct FixtureListingSource {
    bundle: FixtureBundle,
}

impl FixtureListingSource {
    pub fn new(bundle: FixtureBundle) -> Self {
        Self { bundle }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        load_fixture_bundle(path).map(Self::new)
    }
}

#[async_trait]
impl ListingSource for FixtureListingSource {
    fn source_id(&self) -> &str {
        &self.bundle.source_id
    }

    async fn employer(&self, employer_id: &str) -> Option<Employer> {
        self.bundle
            .employers
            .get(employer_id)
            .map(|e| Employer::with_open_vacancies(e.name.clone(), e.open_vacancies))
    }

    async fn vacancies(&self, employer_id: &str) -> Vec<RawPosting> {
        self.bundle
            .vacancies
            .get(employer_id)
            .map(|items| parse_items(items))
            .unwrap_or_default()
    }
}
