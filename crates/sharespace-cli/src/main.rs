//! sharespace: operator binary for the media pipeline.
//!
//! Reads its configuration from the environment (and `.env`). Commands that
//! need share/space data are not offered: this process has no access to it.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use sharespace_core::{Config, TenantId};
use sharespace_infra::{init_telemetry, shutdown_telemetry, LogFormat};
use sharespace_media::{Detached, MediaPipeline};
use sharespace_queue::{create_queue, MigrationQueue};
use sharespace_storage::create_object_store;
use sharespace_worker::{MigrationWorkerPool, ReconcileService, WorkerPoolConfig};
use std::sync::Arc;
use std::time::Duration;

/// How long `worker` waits for in-flight migrations after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "sharespace", about = "Sharespace media pipeline operations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume the migration queue until interrupted
    Worker {
        /// Process a single batch and exit
        #[arg(long)]
        once: bool,
    },
    /// Republish orphaned uploads and merge duplicate tenant containers
    Sweep,
    /// Get or create the container of a tenant
    Provision {
        /// Tenant (space) id
        tenant_id: i64,
    },
    /// Print a signed URL for every media object of a tenant
    List {
        /// Tenant (space) id
        tenant_id: i64,
    },
    /// Delete every container and staged upload of a tenant
    Teardown {
        /// Tenant (space) id
        tenant_id: i64,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    let log_format = config
        .log_format
        .parse::<LogFormat>()
        .map_err(|e| anyhow::anyhow!(e))?;
    init_telemetry("sharespace", &config.environment, log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    let store = create_object_store(&config)
        .await
        .context("Failed to create object store")?;
    let queue = create_queue(&config)
        .await
        .context("Failed to create migration queue")?;

    let pipeline = MediaPipeline::new(
        &config,
        store,
        queue.clone(),
        Arc::new(Detached),
        Arc::new(Detached),
    );

    let result = run(cli.command, &config, pipeline, queue).await;
    shutdown_telemetry().await;
    result
}

async fn run(
    command: Commands,
    config: &Config,
    pipeline: MediaPipeline,
    queue: Arc<dyn MigrationQueue>,
) -> anyhow::Result<()> {
    match command {
        Commands::Worker { once } => {
            pipeline
                .staging
                .ensure_container()
                .await
                .context("Failed to create staging container")?;

            let pool_config = WorkerPoolConfig::from_config(config);
            if once {
                let pool =
                    MigrationWorkerPool::new_no_worker(queue, pipeline.migrator.clone(), pool_config);
                let report = pool.run_once().await?;
                print_json(&json!({
                    "received": report.received,
                    "completed": report.completed,
                    "failed": report.failed,
                }))?;
                return Ok(());
            }

            let reconcile = Arc::new(ReconcileService::new(
                pipeline.reconciler.clone(),
                Duration::from_secs(config.worker.reconcile_interval_secs),
            ));
            let reconcile_handle = reconcile.start();
            let pool = MigrationWorkerPool::new(queue, pipeline.migrator.clone(), pool_config);

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;

            pool.shutdown().await;
            if let Some(handle) = reconcile_handle {
                handle.abort();
            }
            pool.drain(SHUTDOWN_GRACE).await;
        }
        Commands::Sweep => {
            let report = pipeline.reconciler.sweep().await?;
            print_json(&json!({
                "republished": report.republished,
                "containers_removed": report.containers_removed,
                "objects_moved": report.objects_moved,
            }))?;
        }
        Commands::Provision { tenant_id } => {
            let container = pipeline.provisioner.provision(TenantId(tenant_id)).await?;
            print_json(&json!({ "tenant_id": tenant_id, "container": container.name() }))?;
        }
        Commands::List { tenant_id } => {
            let urls = pipeline.access.list_all(TenantId(tenant_id)).await?;
            print_json(&json!({ "tenant_id": tenant_id, "urls": urls }))?;
        }
        Commands::Teardown { tenant_id, yes } => {
            if !yes {
                anyhow::bail!(
                    "Refusing to delete media of tenant {} without --yes",
                    tenant_id
                );
            }
            let report = pipeline.teardown.destroy(TenantId(tenant_id)).await?;
            print_json(&json!({
                "tenant_id": tenant_id,
                "containers_deleted": report.containers_deleted,
                "objects_deleted": report.objects_deleted,
                "staged_objects_deleted": report.staged_objects_deleted,
            }))?;
        }
    }

    Ok(())
}
