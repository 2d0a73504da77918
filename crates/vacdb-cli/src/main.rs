use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vacdb_adapters::{FixtureListingSource, HhClient, ListingSource};
use vacdb_storage::{DbManager, QueryExecutor, SchemaManager, VacancyReports};
use vacdb_sync::{IngestConfig, IngestRunSummary};

#[derive(Debug, Parser)]
#[command(name = "vacdb-cli")]
#[command(about = "Load employers and vacancies into the database and query them")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch employers and their vacancies and load them.
    Ingest {
        /// Read listings from a captured fixture bundle instead of the live API.
        #[arg(long, env = "VACDB_FIXTURE")]
        fixture: Option<PathBuf>,
        /// Keep existing tables and rows.
        #[arg(long)]
        keep_schema: bool,
    },
    /// Create the database if needed and recreate both tables empty.
    Reset,
    /// Print the query-layer views as JSON lines.
    Report {
        #[arg(long)]
        keyword: Option<String>,
    },
    /// List employers that currently have open vacancies.
    TopEmployers {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn init_tracing() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber")
}

async fn executor(config: &IngestConfig) -> Result<QueryExecutor> {
    let pool = vacdb_storage::connect(&config.db_config())
        .await
        .context("connecting to database")?;
    Ok(QueryExecutor::new(pool))
}

fn report_line<T: serde::Serialize>(view: &str, value: &T) -> Result<String> {
    Ok(serde_json::to_string(&json!({ "view": view, "data": value }))?)
}

fn print_json<T: serde::Serialize>(view: &str, value: &T) -> Result<()> {
    println!("{}", report_line(view, value)?);
    Ok(())
}

fn print_summary(summary: &IngestRunSummary) {
    println!(
        "ingest complete: run_id={} source={} employers={}/{} postings={}/{} vacancies_inserted={} duplicates={} employers_created={}",
        summary.run_id,
        summary.source_id,
        summary.employers_resolved,
        summary.employers_requested,
        summary.postings_accepted,
        summary.postings_fetched,
        summary.vacancies.inserted,
        summary.vacancies.skipped,
        summary.vacancies.employers_created,
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Ingest {
        fixture: None,
        keep_schema: false,
    });

    match command {
        Commands::Ingest {
            fixture,
            keep_schema,
        } => {
            let mut config = IngestConfig::from_env()?;
            if keep_schema {
                config.reset_schema = false;
            }
            let source: Box<dyn ListingSource> = match fixture {
                Some(path) => Box::new(FixtureListingSource::from_path(path)?),
                None => Box::new(HhClient::new(config.http_config())?),
            };
            let summary = vacdb_sync::run_ingest_once(&config, source).await?;
            print_summary(&summary);
        }
        Commands::Reset => {
            let config = IngestConfig::from_env()?;
            if vacdb_storage::is_postgres_url(&config.database_url)
                && vacdb_storage::ensure_postgres_database(&config.database_url).await?
            {
                info!("database created");
            }
            for status in SchemaManager::new(executor(&config).await?).reset_all().await? {
                println!("{status}");
            }
        }
        Commands::Report { keyword } => {
            let config = IngestConfig::from_env()?;
            let manager = DbManager::new(executor(&config).await?);

            print_json("companies", &manager.companies_and_vacancy_counts().await?)?;
            print_json("vacancies", &manager.all_vacancies().await?)?;
            let average = manager.average_salary().await?;
            print_json("average_salary", &average.to_string())?;
            print_json("above_average", &manager.vacancies_above_average().await?)?;
            if let Some(keyword) = keyword {
                print_json("keyword", &manager.vacancies_by_keyword(&keyword).await?)?;
            }
        }
        Commands::TopEmployers { limit } => {
            let config = IngestConfig::from_env()?;
            let client = HhClient::new(config.http_config())?;
            for employer in client.top_employers(limit).await {
                println!("{}", serde_json::to_string(&employer)?);
            }
        }
    }

    Ok(())
}
