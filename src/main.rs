use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use chrono::Utc;
use clap::Parser;
use reclaim::{
    config::GcConfig,
    db::DbPool,
    gc::GarbageCollectorService,
    jobs::{enqueue_sweep, ensure_default_job},
    models::PlannedOperation,
    observability,
    queue::{JobQueue, JobRunner, create_queue, start_gc_worker},
};

const DEFAULT_CONFIG_PATH: &str = "reclaim.toml";

/// CLI arguments for reclaim
#[derive(Parser, Debug)]
#[command(version, about = "Batched retention and garbage collection", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./reclaim.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Queue one garbage collection job per collector, due now
    Sweep {
        /// Run due jobs in this process instead of leaving them for a worker
        #[arg(long)]
        run: bool,
    },
    /// Queue the recurring sweep `seconds_between_jobs` from now, unless one is queued
    Schedule,
    /// Run the job worker until interrupted (default)
    Worker,
    /// Print the operations each collector would run, as JSON. Deletes nothing.
    Plan {
        /// Only plan for this collector
        #[arg(long)]
        collector: Option<String>,
    },
    /// Run database migrations and create the job queue table, then exit
    Migrate,
    /// Export the JSON schema for the configuration file
    Schema {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Everything a command needs once configuration is loaded.
struct Runtime {
    config: GcConfig,
    db: Arc<DbPool>,
    service: Arc<GarbageCollectorService>,
    queue: Arc<dyn JobQueue>,
}

fn load_config(explicit_config_path: Option<&str>) -> GcConfig {
    let path = PathBuf::from(explicit_config_path.unwrap_or(DEFAULT_CONFIG_PATH));
    let config = match GcConfig::from_file(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    tracing::debug!(config_file = %path.display(), "Configuration loaded");
    config
}

async fn init_runtime(explicit_config_path: Option<&str>) -> Runtime {
    let config = load_config(explicit_config_path);

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::error!(error = %e, "Failed to initialize metrics");
        std::process::exit(1);
    }

    if config.database.is_none() {
        tracing::error!("Database is not configured");
        std::process::exit(1);
    }
    let db = match DbPool::from_config(&config.database).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            std::process::exit(1);
        }
    };

    let queue = match create_queue(&config.jobs, Some(&db)).await {
        Ok(queue) => queue,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create job queue");
            std::process::exit(1);
        }
    };

    if !config.collectors.has_any_enabled() {
        tracing::warn!("No collectors are enabled; sweeps will do nothing");
    }
    let service = Arc::new(GarbageCollectorService::from_config(&config, &db));

    Runtime {
        config,
        db,
        service,
        queue,
    }
}

async fn run_sweep(explicit_config_path: Option<&str>, run: bool) {
    let rt = init_runtime(explicit_config_path).await;
    let now = Utc::now();

    match enqueue_sweep(
        rt.queue.as_ref(),
        &rt.service,
        rt.config.jobs.batch_size,
        now,
    )
    .await
    {
        Ok(ids) => tracing::info!(jobs = ids.len(), "Garbage collection sweep queued"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to queue sweep");
            std::process::exit(1);
        }
    }

    if run {
        let runner = JobRunner::new(rt.queue, rt.service, rt.config.jobs);
        match runner.run_pending(Utc::now()).await {
            Ok(ran) => tracing::info!(jobs = ran, "Garbage collection jobs processed"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to run queued jobs");
                std::process::exit(1);
            }
        }
    }
}

async fn run_schedule(explicit_config_path: Option<&str>) {
    let rt = init_runtime(explicit_config_path).await;
    let Some(run_at) = rt.config.jobs.next_sweep_at(Utc::now()) else {
        tracing::error!(
            seconds_between_jobs = rt.config.jobs.seconds_between_jobs,
            "Next sweep is out of range"
        );
        std::process::exit(1);
    };

    match ensure_default_job(rt.queue.as_ref(), run_at).await {
        Ok(Some(id)) => tracing::info!(job_id = %id, %run_at, "Recurring sweep scheduled"),
        Ok(None) => tracing::info!("Recurring sweep already queued"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to schedule recurring sweep");
            std::process::exit(1);
        }
    }
}

async fn run_worker(explicit_config_path: Option<&str>) {
    let rt = init_runtime(explicit_config_path).await;

    if let Err(e) = ensure_default_job(rt.queue.as_ref(), Utc::now()).await {
        tracing::error!(error = %e, "Failed to queue recurring sweep");
        std::process::exit(1);
    }

    let runner = JobRunner::new(rt.queue, rt.service, rt.config.jobs);
    tokio::select! {
        _ = start_gc_worker(runner) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::process::exit(1);
            }
            tracing::info!("Shutdown signal received, stopping worker");
        }
    }
}

async fn run_plan(explicit_config_path: Option<&str>, collector: Option<String>) {
    let rt = init_runtime(explicit_config_path).await;
    let now = Utc::now();

    let plans: BTreeMap<String, Vec<PlannedOperation>> = match collector {
        Some(name) => {
            let Some(collector) = rt.service.collector(&name) else {
                tracing::error!(collector = %name, "Unknown or disabled collector");
                std::process::exit(1);
            };
            match collector.collections(now).await {
                Ok(ops) => BTreeMap::from([(name, ops)]),
                Err(e) => {
                    tracing::error!(collector = %name, error = %e, "Discovery failed");
                    std::process::exit(1);
                }
            }
        }
        None => match rt.service.plan(now).await {
            Ok(plans) => plans.into_iter().collect(),
            Err(e) => {
                tracing::error!(error = %e, "Discovery failed");
                std::process::exit(1);
            }
        },
    };

    match serde_json::to_string_pretty(&plans) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize plan");
            std::process::exit(1);
        }
    }
}

async fn run_migrate(explicit_config_path: Option<&str>) {
    let rt = init_runtime(explicit_config_path).await;

    match rt.db.run_migrations().await {
        Ok(()) => {
            tracing::info!("Database migrations completed successfully");
        }
        Err(e) => {
            tracing::error!(error = %e, "Database migrations failed");
            std::process::exit(1);
        }
    }
}

fn run_schema_export(output: Option<String>) {
    #[cfg(feature = "json-schema")]
    {
        let content = match GcConfig::json_schema_string() {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error: Failed to serialize config schema: {e}");
                std::process::exit(1);
            }
        };

        match output {
            Some(path) => {
                if let Err(e) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write to {path}: {e}");
                    std::process::exit(1);
                }
                eprintln!("Config JSON schema written to {path}");
            }
            None => println!("{content}"),
        }
    }
    #[cfg(not(feature = "json-schema"))]
    {
        let _ = output;
        eprintln!("Error: JSON schema export requires the 'json-schema' feature");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = args.config.as_deref();

    match args.command {
        Some(Command::Sweep { run }) => run_sweep(config, run).await,
        Some(Command::Schedule) => run_schedule(config).await,
        Some(Command::Plan { collector }) => run_plan(config, collector).await,
        Some(Command::Migrate) => run_migrate(config).await,
        Some(Command::Schema { output }) => run_schema_export(output),
        Some(Command::Worker) | None => run_worker(config).await,
    }
}
