//! cragcache - drive the KRUX offline cache from the command line.
//!
//! Runs the same worker the application embeds against a persistent disk
//! store and the real network, so a cache generation can be installed,
//! inspected and exercised without a browser.

mod console;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cragcache_core::http::Method;
use cragcache_core::{
    ClientInfo, DiskStore, HttpNetwork, NamespaceStore, NotificationClick, Registration, Request,
    RequestMode, Worker, WorkerConfig,
};

use console::ConsoleHost;

// ============================================================================
// Constants
// ============================================================================

const LOG_FILE_PREFIX: &str = "cragcache.log";

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "cragcache")]
#[command(about = "Offline cache for the KRUX climbing guide")]
#[command(version)]
struct Args {
    /// Also write logs to a daily file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Cache directory (default: platform cache dir, or CRAGCACHE_CACHE_DIR)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// URL of an open page; repeat for several
    #[arg(long = "page", global = true)]
    pages: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install the configured version and activate it
    Install,

    /// Fetch a URL (or origin-relative path) through the worker
    Fetch {
        url: String,

        /// Issue the request as a page navigation
        #[arg(long)]
        navigate: bool,

        #[arg(long, default_value = "GET")]
        method: String,
    },

    /// Send a control message, e.g. '{"type":"CLEAR_CACHE"}'
    Message { json: String },

    /// Fire a background sync event
    Sync {
        /// Sync tag (default: the configured tag)
        tag: Option<String>,
    },

    /// Deliver a push message, optionally clicking the notification it shows
    Push {
        /// JSON payload; omit for an empty push
        json: Option<String>,

        #[arg(long)]
        click: bool,

        /// Action button to click instead of the body
        #[arg(long, requires = "click")]
        action: Option<String>,
    },

    /// List namespaces and their entries
    Ls,

    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        save: bool,
    },
}

// ============================================================================
// Setup
// ============================================================================

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g. RUST_LOG=cragcache_core=debug).
/// The returned guard must live until exit or buffered file logs are lost.
fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(filter)
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    Ok(Some(guard))
}

fn build_worker(args: &Args) -> Result<Worker> {
    let mut config = WorkerConfig::load().context("Failed to load config")?;
    if let Some(ref dir) = args.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    let cache_dir = config.cache_dir()?;
    info!(dir = %cache_dir.display(), "Using cache directory");

    let store = DiskStore::new(cache_dir).context("Failed to open cache directory")?;
    let network = HttpNetwork::new().context("Failed to build HTTP client")?;
    let pages = args
        .pages
        .iter()
        .enumerate()
        .map(|(i, url)| ClientInfo::window(&format!("page-{}", i + 1), url))
        .collect();
    let host = ConsoleHost::with_clients(pages);

    Ok(Worker::new(config, Arc::new(store), Arc::new(network), Arc::new(host))?)
}

// ============================================================================
// Commands
// ============================================================================

async fn install(worker: Worker) -> Result<()> {
    let registration = Registration::new(Arc::new(worker));
    let report = registration.register().await.context("Install failed")?;
    println!(
        "installed {}: {} shell entries, {} external",
        registration.worker().config().cache_version,
        report.required,
        report.external_cached
    );
    for url in report.external_failed {
        println!("  skipped {}", url);
    }
    Ok(())
}

async fn fetch(worker: &Worker, url: &str, navigate: bool, method: &str) -> Result<()> {
    let url = worker.config().resolve(url)?;
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .with_context(|| format!("Invalid method {}", method))?;
    let mut request = Request::from_url(url);
    request.method = method;
    if navigate {
        request = request.with_mode(RequestMode::Navigate);
    }

    eprintln!("route: {}", worker.route(&request));
    let mut served = worker.on_fetch(request).await?;
    eprintln!(
        "{} {} ({:?})",
        served.response.status, served.response.status_text, served.source
    );
    io::stdout().write_all(&served.response.body)?;
    // Let a background refresh land before the process exits
    served.settle().await;
    Ok(())
}

async fn list(worker: &Worker) -> Result<()> {
    let store = worker.namespaces().store();
    for name in store.names().await? {
        let ns = store.open(&name).await?;
        let keys = ns.keys().await?;
        println!("{} ({} entries)", name, keys.len());
        for key in keys {
            if let Some(entry) = ns.get(&key).await? {
                println!(
                    "  {:>3}  {:>9}  {:>8}  {}",
                    entry.response.status,
                    entry.age_display(),
                    entry.response.body.len(),
                    key
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let _guard = init_tracing(args.log_dir.as_deref())?;

    let worker = build_worker(&args)?;

    match args.command {
        Command::Install => install(worker).await?,
        Command::Fetch {
            ref url,
            navigate,
            ref method,
        } => fetch(&worker, url, navigate, method).await?,
        Command::Message { ref json } => {
            let data: serde_json::Value =
                serde_json::from_str(json).context("Message is not valid JSON")?;
            let registration = Registration::new(Arc::new(worker));
            match registration.on_message(data).await {
                Some(outcome) => println!("{:?}", outcome),
                None => println!("ignored"),
            }
        }
        Command::Sync { ref tag } => {
            let tag = tag.clone().unwrap_or_else(|| worker.config().sync_tag.clone());
            let reached = worker.on_sync(&tag).await;
            println!("notified {} page(s)", reached);
        }
        Command::Push {
            ref json,
            click,
            ref action,
        } => {
            let shown = worker.on_push(json.as_deref().map(str::as_bytes)).await?;
            match (shown, click) {
                (Some(notification), true) => {
                    let outcome = worker
                        .on_notification_click(NotificationClick {
                            notification,
                            action: action.clone(),
                        })
                        .await?;
                    println!("{:?}", outcome);
                }
                (None, _) => println!("nothing to show"),
                (Some(_), false) => {}
            }
        }
        Command::Ls => list(&worker).await?,
        Command::Config { save } => {
            println!("{}", serde_json::to_string_pretty(worker.config())?);
            if save {
                worker.config().save().context("Failed to save config")?;
            }
        }
    }

    Ok(())
}
