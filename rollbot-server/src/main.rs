use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use rollbot_common::models::{CommandContext, ScopeId};
use rollbot_common::traits::ScopeStateRepository;
use rollbot_core::extensions::{Registry, ReloadCoordinator, ScopeActivationController};
use rollbot_core::manifest::load_manifest;
use rollbot_core::repositories::JsonScopeStateRepository;
use rollbot_core::services::{CommandRouter, ScopeStateService};
use rollbot_core::tasks::spawn_snapshot_flush_task;
use rollbot_core::{ActivationConfig, Database};

#[derive(Parser, Debug, Clone)]
#[command(name = "rollbot")]
#[command(author, version, about = "Rollbot - dice bot host with per-scope extension activation")]
struct Args {
    /// Extension manifest (JSON array of extensions).
    #[arg(long, default_value = "extensions.json")]
    manifest: PathBuf,

    /// Scope store: "json" or "postgres"
    #[arg(long, default_value = "json")]
    store: String,

    /// File used by the json store.
    #[arg(long, default_value = "data/scope_states.json")]
    state_path: PathBuf,

    /// Postgres connection URL. Falls back to DATABASE_URL.
    #[arg(long)]
    db_url: Option<String>,

    /// Postgres pool size.
    #[arg(long, default_value_t = rollbot_core::config::DEFAULT_DB_MAX_CONNECTIONS)]
    db_max_connections: u32,

    /// Seconds between flushes of changed scopes.
    #[arg(long, default_value_t = 5)]
    flush_interval_secs: u64,

    /// Maximum companion chain depth.
    #[arg(long, default_value_t = rollbot_core::config::DEFAULT_MAX_CHAIN_DEPTH)]
    max_chain_depth: usize,

    /// Read "<scope> <message>" lines from stdin and print replies.
    #[arg(long, default_value = "false")]
    console: bool,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("rollbot=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {e}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!(
        "Rollbot starting. store={}, manifest={:?}, console={}",
        args.store, args.manifest, args.console
    );

    if let Err(e) = run_server(args).await {
        error!("Server error: {:?}", e);
        return Err(e);
    }
    info!("Main finished. Goodbye!");
    Ok(())
}

async fn read_extensions(path: &Path) -> anyhow::Result<Vec<rollbot_common::models::Extension>> {
    if !tokio::fs::try_exists(path).await? {
        warn!("No extension manifest at {:?}; starting without extensions.", path);
        return Ok(Vec::new());
    }
    load_manifest(path)
        .await
        .with_context(|| format!("reading extension manifest {:?}", path))
}

async fn open_store(args: &Args) -> anyhow::Result<Arc<dyn ScopeStateRepository>> {
    match args.store.as_str() {
        "json" => {
            info!("Using JSON scope store at {:?}", args.state_path);
            Ok(Arc::new(JsonScopeStateRepository::new(&args.state_path)))
        }
        "postgres" => {
            let db_url = match &args.db_url {
                Some(url) => url.clone(),
                None => std::env::var("DATABASE_URL")
                    .context("--db-url not given and DATABASE_URL not set")?,
            };
            let db = Database::connect(&db_url, args.db_max_connections).await?;
            db.migrate().await?;
            Ok(Arc::new(db.scope_store()))
        }
        other => bail!("Invalid store '{}'. Use --store=json or --store=postgres.", other),
    }
}

async fn run_server(args: Args) -> anyhow::Result<()> {
    let config = ActivationConfig {
        max_chain_depth: args.max_chain_depth,
        flush_interval: Duration::from_secs(args.flush_interval_secs.max(1)),
    };

    // 1) Registry. A name collision is a packaging defect: refuse to start.
    let registry = Arc::new(Registry::new());
    let extensions = read_extensions(&args.manifest).await?;
    if let Err(e) = registry.register_all(extensions) {
        error!("Extension registration failed: {}", e);
        return Err(e.into());
    }

    // 2) Engine + store
    let repo = open_store(&args).await?;
    let controller = Arc::new(ScopeActivationController::new(Arc::clone(&registry), &config));
    let coordinator = Arc::new(ReloadCoordinator::new(Arc::clone(&controller)));
    let service = Arc::new(ScopeStateService::new(
        Arc::clone(&controller),
        coordinator,
        repo,
    ));
    service.restore_all().await?;

    let router = Arc::new(CommandRouter::new(Arc::clone(&controller)));

    // 3) Background flush + shutdown wiring
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let flush_handle =
        spawn_snapshot_flush_task(Arc::clone(&service), config.flush_interval, shutdown_rx.clone());

    {
        let tx = Arc::clone(&shutdown_tx);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {:?}", e);
                return;
            }
            info!("Ctrl-C detected, shutting down...");
            let _ = tx.send(true);
        });
    }

    if args.console {
        let tx = Arc::clone(&shutdown_tx);
        let service = Arc::clone(&service);
        let manifest = args.manifest.clone();
        tokio::spawn(async move {
            if let Err(e) = run_console(service, router, manifest).await {
                error!("Console error: {:?}", e);
            }
            let _ = tx.send(true);
        });
    }

    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }

    flush_handle.await.context("flush task panicked")?;
    Ok(())
}

async fn run_console(
    service: Arc<ScopeStateService>,
    router: Arc<CommandRouter>,
    manifest: PathBuf,
) -> anyhow::Result<()> {
    println!("Console ready. Type \"<scope> <message>\", \"reload\" or \"quit\".");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "reload" => {
                let extensions = match read_extensions(&manifest).await {
                    Ok(exts) => exts,
                    Err(e) => {
                        error!("Reload failed: {:?}", e);
                        continue;
                    }
                };
                match service.coordinator().reload_all(extensions) {
                    Ok(reports) => println!("Reloaded extensions in {} scopes.", reports.len()),
                    Err(e) => error!("Reload failed: {}", e),
                }
            }
            _ => {
                let Some((scope, text)) = line.split_once(char::is_whitespace) else {
                    println!("usage: <scope> <message>");
                    continue;
                };
                let scope = ScopeId::from(scope);
                if let Err(e) = service.open_scope(&scope).await {
                    error!("Could not open scope {}: {:?}", scope, e);
                    continue;
                }
                let ctx = CommandContext {
                    scope,
                    platform: "console".to_string(),
                    sender: "console".to_string(),
                };
                match router.route(&ctx, text.trim()) {
                    Some(outcome) => {
                        for reply in outcome.replies {
                            println!("{reply}");
                        }
                    }
                    None => println!("(no reply)"),
                }
            }
        }
    }
    Ok(())
}
