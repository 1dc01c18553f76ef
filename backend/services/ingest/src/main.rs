use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use intranet_common::error::{IntranetError, IntranetResult};
use intranet_config::{init_tracing, AppConfig};
use intranet_db::advbox::pg_repository::PgAdvboxRepository;
use intranet_db::sync::models::SyncStatus;
use intranet_db::sync::pg_repository::PgSyncJobRepository;
use intranet_db::sync::repositories::SyncJobRepository;
use intranet_sync::advbox::client::AdvboxClientConfig;
use intranet_sync::clock::TokioClock;
use intranet_sync::error::SyncError;
use intranet_sync::{run_job, run_until_settled, JobType, SyncContext, SyncSettings, SyncSummary};
use sqlx::PgPool;

#[derive(Parser)]
#[command(name = "intranet-ingest")]
#[command(version)]
#[command(about = "Mirror Advbox collections into the intranet database")]
#[command(after_long_help = r#"EXAMPLES
    Run one time-boxed invocation (what the cron job does):
        $ intranet-ingest sync customers

    Keep invoking until the collection is fully mirrored:
        $ intranet-ingest sync lawsuits --until-done --max-runs 20

    Show the latest job row:
        $ intranet-ingest status customers
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sync job and print its summary as JSON
    Sync {
        /// Collection to mirror (customers, lawsuits)
        job: JobType,
        /// Re-invoke while the previous invocation stopped partial
        #[arg(long)]
        until_done: bool,
        /// Upper bound on invocations with --until-done
        #[arg(long, default_value_t = 10)]
        max_runs: u32,
    },
    /// Print the latest job row as JSON
    Status {
        job: JobType,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing("info");
    let _ = dotenvy::dotenv();

    tracing::info!(service = "intranet-ingest", "starting");

    let cli = Cli::parse();
    match cli.command {
        Commands::Sync {
            job,
            until_done,
            max_runs,
        } => sync(job, until_done, max_runs).await,
        Commands::Status { job } => status(job).await,
    }
}

async fn sync(job: JobType, until_done: bool, max_runs: u32) -> ExitCode {
    // Configuration problems are reported before touching the database.
    let settings = match SyncSettings::from_env() {
        Ok(s) => s,
        Err(e) => return fail_fast(job, startup_error(e)),
    };
    let advbox = AdvboxClientConfig::from_env();
    if let Err(e) = &advbox {
        return fail_fast(job, SyncError::Configuration(e.to_string()));
    }

    let pool = match connect().await {
        Ok(pool) => pool,
        Err(e) => return fail_fast(job, startup_error(e)),
    };
    let ctx = context(pool, settings);

    let summaries = if until_done {
        run_until_settled(max_runs, || run_job(job, &advbox, &ctx)).await
    } else {
        vec![run_job(job, &advbox, &ctx).await]
    };

    for summary in &summaries {
        print_json(summary);
    }
    exit_code(&summaries)
}

async fn status(job: JobType) -> ExitCode {
    let pool = match connect().await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "cannot reach the database");
            return ExitCode::FAILURE;
        }
    };
    let repo = PgSyncJobRepository::new(pool);

    match repo.latest(job.as_str()).await {
        Ok(Some(row)) => {
            print_json(&row);
            ExitCode::SUCCESS
        }
        Ok(None) => {
            eprintln!("no {job} sync has run yet");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(job_type = %job, error = %e, "failed to read job status");
            ExitCode::FAILURE
        }
    }
}

async fn connect() -> IntranetResult<PgPool> {
    let config = AppConfig::from_env()?;
    let pool = intranet_db::create_pool(&config.database_url).await?;
    intranet_db::run_migrations(&pool).await?;
    Ok(pool)
}

fn context(pool: PgPool, settings: SyncSettings) -> SyncContext {
    let store = Arc::new(PgAdvboxRepository::new(pool.clone()));
    SyncContext {
        jobs: Arc::new(PgSyncJobRepository::new(pool)),
        customers: store.clone(),
        lawsuits: store,
        clock: Arc::new(TokioClock),
        settings,
    }
}

/// A missing or malformed variable is a configuration error; an unreachable
/// database or a failed migration is a state store failure.
fn startup_error(e: IntranetError) -> SyncError {
    match e {
        IntranetError::Config(message) => SyncError::Configuration(message),
        other => SyncError::Store(other),
    }
}

fn fail_fast(job: JobType, error: SyncError) -> ExitCode {
    tracing::error!(job_type = %job, error = %error, "sync could not start");
    let summary = SyncSummary::not_started(job.as_str(), &error);
    print_json(&summary);
    exit_code(std::slice::from_ref(&summary))
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::error!(error = %e, "failed to serialize output"),
    }
}

/// Non-zero only when the last invocation ended in `error`.
fn exit_code(summaries: &[SyncSummary]) -> ExitCode {
    if ended_in_error(summaries) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn ended_in_error(summaries: &[SyncSummary]) -> bool {
    summaries
        .last()
        .is_some_and(|s| s.status == SyncStatus::Error)
}
