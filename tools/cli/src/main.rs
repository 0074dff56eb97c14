//! BudgetSync CLI - Command line interface for the sync engine.
//!
//! This tool syncs a local budget database with the hosted sync service,
//! shows sync status and keeps a long-running auto-sync session.

mod config;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use budgetsync_common::{EntityId, EntityKind, SyncableEntity};
use budgetsync_remote::{HttpTransport, ProbeConnectivityMonitor};
use budgetsync_storage::{LocalStore, SqliteStore};
use budgetsync_sync::{user_message, AutoSync, SyncEngine, SyncEvent, SyncResult};

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "budgetsync")]
#[command(about = "BudgetSync - Offline-first sync for your budget data")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the JSON config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync local changes with the service.
    Sync {
        /// Sync even if the last sync is recent.
        #[arg(short, long)]
        force: bool,
    },

    /// Show sync status and pending changes.
    Status,

    /// Forget the last sync time so the next sync is a full one.
    ClearCache,

    /// Keep running and sync whenever connectivity comes back.
    Watch,

    /// Add or update a local record.
    Add {
        /// Record kind: account, transaction, budget or goal.
        #[arg(short, long)]
        kind: EntityKind,

        /// Record id (generated when omitted).
        #[arg(short, long)]
        id: Option<String>,

        /// Record body as JSON.
        #[arg(short, long)]
        payload: String,
    },

    /// List local records.
    List {
        /// Only this kind.
        #[arg(short, long)]
        kind: Option<EntityKind>,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "budgetsync", &mut std::io::stdout());
        return Ok(());
    }

    let config = CliConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync { force } => cmd_sync(&config, force).await,
        Commands::Status => cmd_status(&config).await,
        Commands::ClearCache => cmd_clear_cache(&config).await,
        Commands::Watch => cmd_watch(&config).await,
        Commands::Add { kind, id, payload } => cmd_add(&config, kind, id, &payload).await,
        Commands::List { kind } => cmd_list(&config, kind).await,
        Commands::Completions { .. } => Ok(()),
    }
}

/// Open the local database, creating its directory if needed.
fn open_store(config: &CliConfig) -> Result<Arc<SqliteStore>> {
    let path = config.database_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = SqliteStore::open(&path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Engine wired to the local database, the service and a live probe.
struct Session {
    engine: Arc<SyncEngine>,
    store: Arc<SqliteStore>,
    probe_task: tokio::task::JoinHandle<()>,
}

impl Session {
    async fn open(config: &CliConfig) -> Result<Self> {
        let store = open_store(config)?;
        let transport = HttpTransport::new(config.endpoint()?, config.token.clone())
            .context("Failed to create sync transport")?;
        let (monitor, probe_task) = ProbeConnectivityMonitor::start(config.probe()).await;

        let engine = SyncEngine::new(
            store.clone(),
            Arc::new(transport),
            monitor,
            store.clone(),
            config.sync.clone(),
        )
        .await
        .context("Failed to create sync engine")?;

        Ok(Self {
            engine: Arc::new(engine),
            store,
            probe_task,
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.probe_task.abort();
    }
}

fn print_result(result: &SyncResult) {
    if result.success {
        println!("Sync completed: {} items", result.items_synced);
        if let Some(at) = result.completed_at {
            println!("  At: {}", at.with_timezone(&Local));
        }
    } else {
        println!(
            "Sync failed: {}",
            result.error_message.as_deref().unwrap_or("unknown error")
        );
    }
}

/// Run one sync.
async fn cmd_sync(config: &CliConfig, force: bool) -> Result<()> {
    let session = Session::open(config).await?;
    info!("Syncing with {}", config.endpoint()?);

    let result = match session.engine.sync(force).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{}", user_message(&e));
            SyncResult::from_error(&e)
        }
    };

    print_result(&result);
    if !result.success {
        anyhow::bail!("Sync did not complete");
    }
    Ok(())
}

/// Show status and pending record counts.
async fn cmd_status(config: &CliConfig) -> Result<()> {
    let session = Session::open(config).await?;
    let status = session.engine.status();
    let watermark = session.engine.last_sync_at();

    println!("Sync Status:");
    println!("  {}", status.status_text(Utc::now()));
    match watermark {
        Some(at) => println!("  Last sync: {}", at.with_timezone(&Local)),
        None => println!("  Last sync: never"),
    }
    println!(
        "  Connectivity: {}",
        if status.has_connectivity { "online" } else { "offline" }
    );

    println!("  Pending changes:");
    for kind in &session.engine.config().tracked_kinds {
        let pending = session
            .store
            .list_all(*kind)
            .await
            .with_context(|| format!("Failed to list {} records", kind))?
            .iter()
            .filter(|e| e.is_eligible(watermark))
            .count();
        println!("    {}: {}", kind, pending);
    }

    Ok(())
}

/// Forget the watermark.
async fn cmd_clear_cache(config: &CliConfig) -> Result<()> {
    let session = Session::open(config).await?;
    session
        .engine
        .clear_sync_cache()
        .await
        .context("Failed to clear sync cache")?;

    println!("Sync cache cleared. The next sync will be a full sync.");
    Ok(())
}

/// Sync now, then on every reconnect, until interrupted.
async fn cmd_watch(config: &CliConfig) -> Result<()> {
    let session = Session::open(config).await?;
    let mut events = session.engine.subscribe();
    let auto = AutoSync::spawn(session.engine.clone());

    match session.engine.sync(false).await {
        Ok(result) => print_result(&result),
        Err(e) => eprintln!("{}", user_message(&e)),
    }

    println!("Watching for connectivity changes. Press Ctrl-C to stop.");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SyncEvent::Started { started_at }) => {
                    println!("Sync started at {}", started_at.with_timezone(&Local));
                }
                Ok(SyncEvent::Completed { items_synced, .. }) => {
                    println!("Sync completed: {} items", items_synced);
                }
                Ok(SyncEvent::Failed { error }) => {
                    println!("Sync failed: {}", error);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} sync events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    auto.shutdown().await;
    println!("Stopped.");
    Ok(())
}

/// Insert or update a record, leaving it pending upload.
async fn cmd_add(
    config: &CliConfig,
    kind: EntityKind,
    id: Option<String>,
    payload: &str,
) -> Result<()> {
    let store = open_store(config)?;
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("Payload is not valid JSON")?;
    let id = match id {
        Some(id) => EntityId::new(id).context("Invalid record id")?,
        None => EntityId::generate(),
    };

    let existing = store
        .list_all(kind)
        .await
        .context("Failed to read records")?
        .into_iter()
        .find(|e| e.id == id);

    let entity = match existing {
        Some(mut entity) => {
            entity.touch(payload);
            entity
        }
        None => SyncableEntity::new(kind, id, payload),
    };

    let label = format!("{} {}", entity.kind, entity.id);
    store.upsert(entity).await.context("Failed to save record")?;
    println!("Saved {}", label);
    Ok(())
}

/// Print local records.
async fn cmd_list(config: &CliConfig, kind: Option<EntityKind>) -> Result<()> {
    let store = open_store(config)?;
    let kinds = match kind {
        Some(kind) => vec![kind],
        None => EntityKind::ALL.to_vec(),
    };

    for kind in kinds {
        let records = store
            .list_all(kind)
            .await
            .with_context(|| format!("Failed to list {} records", kind))?;
        if records.is_empty() {
            continue;
        }

        println!("{} ({}):", kind, records.len());
        for record in records {
            let marker = if !kind.tracks_sync_flag() {
                "always"
            } else if record.synced {
                "synced"
            } else {
                "pending"
            };
            println!(
                "  [{}] {} {} {}",
                marker,
                record.id,
                record.last_modified.with_timezone(&Local),
                record.payload
            );
        }
    }

    Ok(())
}
