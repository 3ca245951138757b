use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

use attendance_ledger::config::Config;
use attendance_ledger::dashboard::{self, DashboardSummarizer, MAX_WINDOW_DAYS};
use attendance_ledger::db::{self, PgStore};
use attendance_ledger::{report, CheckInLedger, LedgerError, SessionAggregator};

#[derive(Parser)]
#[command(name = "attendance-ledger")]
#[command(about = "Lecture attendance check-in ledger and session history", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample users, courses and check-ins
    Seed,
    /// Import check-ins from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record a student's check-in to a session
    CheckIn {
        #[arg(long)]
        student: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        course: String,
        #[arg(long)]
        session: String,
    },
    /// Show head count (and optionally attendees) for a session
    Attendance {
        #[arg(long)]
        session: String,
        #[arg(long, default_value_t = false)]
        details: bool,
    },
    /// Session history for a lecturer, newest first
    History {
        #[arg(long)]
        lecturer: String,
    },
    /// Approved courses and distinct student count for a lecturer
    Courses {
        #[arg(long)]
        lecturer: String,
    },
    /// Aggregate statistics and daily check-in counts
    Dashboard {
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..=MAX_WINDOW_DAYS))]
        days: Option<i64>,
    },
    /// Generate a markdown report for a lecturer
    Report {
        #[arg(long)]
        lecturer: String,
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..=MAX_WINDOW_DAYS))]
        days: Option<i64>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Serialize)]
struct CheckInResponse {
    status: attendance_ledger::CheckInOutcome,
    message: &'static str,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let ledger = CheckInLedger::new(store.clone());
    let aggregator = SessionAggregator::new(ledger.clone(), store.clone());

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let summary = db::import_csv(&ledger, &csv).await?;
            println!(
                "Imported {} check-ins from {} ({} already recorded).",
                summary.created,
                csv.display(),
                summary.already_recorded
            );
        }
        Commands::CheckIn {
            student,
            name,
            course,
            session,
        } => match ledger
            .check_in(&student, name.as_deref(), &course, &session)
            .await
        {
            Ok(status) => print_json(&CheckInResponse {
                status,
                message: status.message(),
            })?,
            Err(LedgerError::Validation(message)) => {
                anyhow::bail!("invalid check-in: {message}")
            }
            Err(err) => return Err(err).context("check-in failed"),
        },
        Commands::Attendance { session, details } => {
            let attendance = ledger
                .session_attendance(&session, details, store.as_ref())
                .await?;
            print_json(&attendance)?;
        }
        Commands::History { lecturer } => {
            let history = aggregator.build_history(&lecturer).await?;
            print_json(&history)?;
        }
        Commands::Courses { lecturer } => {
            let overview = aggregator.course_overview(&lecturer).await?;
            print_json(&overview)?;
        }
        Commands::Dashboard { days } => {
            let summarizer = DashboardSummarizer::new(ledger, store.clone(), store.clone());
            let stats = summarizer
                .stats(Utc::now().date_naive(), days.unwrap_or(config.dashboard_days))
                .await?;
            print_json(&stats)?;
        }
        Commands::Report {
            lecturer,
            days,
            out,
        } => {
            let history = aggregator.build_history(&lecturer).await?;
            let chart = dashboard::daily_check_ins(
                &ledger,
                Utc::now().date_naive(),
                days.unwrap_or(config.dashboard_days),
            )
            .await?;
            let report = report::build_report(&lecturer, &history, &chart);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
