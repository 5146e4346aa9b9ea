//! Command-line driver for the Lantern offline agent.
//!
//! Runs the agent against a live origin with a persistent cache, so the
//! offline behaviour can be exercised from a terminal.
//!
//! ## Usage
//!
//! ```bash
//! # Precache the site and activate
//! lantern --config lantern.json install
//!
//! # Load a page the way a browser navigation would
//! lantern fetch /ch03.html --navigate
//!
//! # List cached generations and their entries
//! lantern inspect
//!
//! # Drop everything
//! lantern clear
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lantern_cache::CacheStore;
use lantern_common::{init_logging, AgentConfig, LogConfig, LogFormat, StorageBackend};
use lantern_net::{HttpFetcher, LoaderConfig, Request};
use lantern_sw::{MessageReply, OfflineWorker, WorkerEvent};
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Parser)]
#[command(name = "lantern")]
#[command(about = "Offline-caching agent for a static tutorial site")]
struct Cli {
    /// JSON config file; defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured origin
    #[arg(long, global = true)]
    origin: Option<url::Url>,

    /// Store generations under this directory instead of in memory
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "compact")]
    log_format: LogStyle,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogStyle {
    Pretty,
    Compact,
    Json,
}

impl From<LogStyle> for LogFormat {
    fn from(style: LogStyle) -> Self {
        match style {
            LogStyle::Pretty => LogFormat::Pretty,
            LogStyle::Compact => LogFormat::Compact,
            LogStyle::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Install and activate: precache the site and drop old generations
    Install,

    /// Fetch a path through the agent
    Fetch {
        /// Path or URL, resolved against the origin
        path: String,
        /// Treat the request as a page navigation
        #[arg(short, long)]
        navigate: bool,
        /// Print the response body
        #[arg(short, long)]
        body: bool,
    },

    /// Cache extra paths into the runtime generation
    CacheUrls {
        paths: Vec<String>,
    },

    /// List generations and their entries
    Inspect,

    /// Delete every generation
    Clear,

    /// Print the agent version
    Version,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::debug()
    } else {
        LogConfig::default()
    };
    init_logging(LogConfig {
        format: cli.log_format.into(),
        ..log_config
    });

    let config = load_config(&cli)?;
    let store = lantern_cache::open_store(&config.storage)
        .await
        .context("opening cache store")?;

    let fetcher =
        HttpFetcher::new(LoaderConfig::from(&config.network)).context("building HTTP client")?;
    let (worker, _events) = OfflineWorker::new(&config, store.clone(), Arc::new(fetcher))?;

    match cli.command {
        Commands::Inspect => inspect(store.as_ref()).await,
        command => run(&worker, &config, command).await,
    }
}

fn load_config(cli: &Cli) -> Result<AgentConfig> {
    let mut config = match &cli.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };
    if let Some(origin) = &cli.origin {
        config.origin = origin.clone();
    }
    if let Some(dir) = &cli.cache_dir {
        config.storage.backend = StorageBackend::Disk;
        config.storage.cache_dir = dir.clone();
    }
    config.validate()?;
    debug!(?config, "Configuration loaded");
    Ok(config)
}

async fn run(worker: &OfflineWorker, config: &AgentConfig, command: Commands) -> Result<()> {
    match command {
        Commands::Install => {
            let report = worker.start().await?;
            println!("Installed {}", worker.version());
            println!("  Cached: {}", report.cached.len());
            for (url, reason) in &report.failed {
                println!("  Failed: {url} ({reason})");
            }
            println!("  State:  {}", worker.state().await);
        }

        Commands::Fetch {
            path,
            navigate,
            body,
        } => {
            worker.start().await?;
            let url = config.resolve(&path)?;
            let request = if navigate {
                Request::navigate(url)
            } else {
                Request::get(url)
            };

            let Some(outcome) = worker.handle_fetch(&request).await? else {
                bail!("{} is not handled by the agent", request.url);
            };
            let response = &outcome.response;
            println!("{} {}", response.status, response.url);
            println!(
                "  Source:       {}",
                if response.from_cache() { "cache" } else { "network" }
            );
            println!(
                "  Content-Type: {}",
                response.content_type().unwrap_or("unknown")
            );
            println!("  Length:       {}", response.body.len());
            if body {
                println!();
                println!("{}", response.text()?);
            }

            if let Some(revalidation) = outcome.revalidation {
                let refreshed = revalidation.finished().await;
                println!("  Refreshed:    {refreshed}");
            }
        }

        Commands::CacheUrls { paths } => {
            worker.start().await?;
            let reply = message(worker, serde_json::json!({"type": "CACHE_URLS", "urls": paths}))
                .await?;
            println!("{}", serde_json::to_string(&reply)?);
        }

        Commands::Clear => {
            let reply = message(worker, serde_json::json!({"type": "CLEAR_CACHE"})).await?;
            println!("{}", serde_json::to_string(&reply)?);
        }

        Commands::Version => {
            let reply = message(worker, serde_json::json!({"type": "GET_VERSION"})).await?;
            println!("{}", serde_json::to_string(&reply)?);
        }

        Commands::Inspect => bail!("inspect does not go through the agent"),
    }
    Ok(())
}

async fn message(worker: &OfflineWorker, data: serde_json::Value) -> Result<MessageReply> {
    let (tx, rx) = oneshot::channel();
    worker
        .dispatch(WorkerEvent::Message {
            data,
            reply: Some(tx),
        })
        .await?;
    rx.await.context("agent did not reply")
}

async fn inspect(store: &dyn CacheStore) -> Result<()> {
    let names = store.keys().await?;
    if names.is_empty() {
        println!("No generations");
        return Ok(());
    }
    for name in names {
        let entries = store.entries(&name).await?;
        println!("{name} ({} entries)", entries.len());
        for key in entries {
            println!("  {key}");
        }
    }
    Ok(())
}
