use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use uuid::Uuid;

mod config;
mod db;
mod error;
mod grading;
mod logging;
mod models;
mod report;
mod server;

use config::Settings;
use grading::Calculator;

#[derive(Parser)]
#[command(name = "assessment-hub")]
#[command(about = "Grade entry and pass/fail calculation for vocational final exams", long_about = None)]
struct Cli {
    /// SQLite database file (overrides ASSESSMENT_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Grading scheme JSON (overrides ASSESSMENT_SCHEME)
    #[arg(long, global = true)]
    scheme: Option<PathBuf>,
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample entries
    Seed,
    /// Import entries from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List stored entries
    List,
    /// Calculate grades for one entry, or for every complete entry
    Calculate {
        #[arg(long)]
        id: Option<Uuid>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Print the active grading scheme
    Scheme,
    /// Run the REST backend
    Serve {
        #[arg(long)]
        host: Option<IpAddr>,
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let mut settings = Settings::from_env()?;
    if let Some(db) = cli.db {
        settings.database_path = db;
    }
    if let Some(scheme) = cli.scheme {
        settings.scheme_path = Some(scheme);
    }

    let calculator = Calculator::new(settings.load_scheme()?).context("invalid grading scheme")?;

    match cli.command {
        Commands::InitDb => {
            open_db(&settings).await?;
            println!("Schema ready at {}.", settings.database_path.display());
        }
        Commands::Seed => {
            let pool = open_db(&settings).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = open_db(&settings).await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} entries from {}.", csv.display());
        }
        Commands::List => {
            let pool = open_db(&settings).await?;
            let entries = db::list_entries(&pool).await?;
            if entries.is_empty() {
                println!("No entries stored.");
                return Ok(());
            }
            for entry in &entries {
                let missing = entry.missing_fields();
                let readiness = if missing.is_empty() {
                    "complete".to_string()
                } else {
                    format!("missing {}", missing.join(", "))
                };
                println!("- {} {} ({})", entry.id, entry.name, readiness);
            }
        }
        Commands::Calculate { id } => {
            let pool = open_db(&settings).await?;
            let entries = match id {
                Some(id) => vec![db::fetch_entry(&pool, id)
                    .await?
                    .with_context(|| format!("no entry with id {id}"))?],
                None => db::list_entries(&pool)
                    .await?
                    .into_iter()
                    .filter(|entry| entry.is_complete())
                    .collect(),
            };

            if entries.is_empty() {
                println!("No complete entries to calculate.");
                return Ok(());
            }

            for entry in &entries {
                let result = calculator
                    .calculate(entry)
                    .with_context(|| format!("cannot calculate {}", entry.name))?;
                let verdict = if result.status.passed {
                    "passed".to_string()
                } else {
                    let codes: Vec<&str> = result.status.reasons.iter().map(|r| r.code()).collect();
                    format!("failed: {}", codes.join(", "))
                };
                println!(
                    "- {}: AP1 {} ({} P), AP2 {} ({} P), project work {} ({} P), overall {} ({} P), {}",
                    entry.name,
                    result.ap1.grade,
                    result.ap1.points,
                    result.ap2.overall.grade,
                    result.ap2.overall.points,
                    result.ap2.pw.overall.grade,
                    result.ap2.pw.overall.points,
                    result.overall.grade,
                    result.overall.points,
                    verdict
                );
            }
        }
        Commands::Report { out } => {
            let pool = open_db(&settings).await?;
            let entries = db::list_entries(&pool).await?;
            let report = report::build_report(&calculator, &entries, chrono::Utc::now());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Scheme => {
            println!("{}", serde_json::to_string_pretty(calculator.scheme())?);
        }
        Commands::Serve { host, port } => {
            let pool = open_db(&settings).await?;
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            let state = server::AppState::new(pool, calculator);
            server::serve(state, settings.bind_addr()).await?;
        }
    }

    Ok(())
}

async fn open_db(settings: &Settings) -> anyhow::Result<SqlitePool> {
    let pool = db::connect(&settings.database_path).await?;
    db::init_db(&pool).await.context("failed to apply migrations")?;
    Ok(pool)
}
