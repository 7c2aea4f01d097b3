use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use mfe_container::config::Config;
use mfe_container::container::{Container, BUILTIN_MODULES};
use mfe_container::devstore::{Database, DevStore, DevStoreOptions};
use mfe_container::logging::init_tracing;
use mfe_container::repl::{execute, ReplCommand};
use mfe_container::service::ConsistencyMode;

/// Runtime container for independently loaded microfrontends
#[derive(Parser, Debug)]
#[command(name = "mfe-container", version)]
struct Cli {
    /// Config file (default: <config dir>/mfe-container/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the container and read commands from stdin
    Run {
        /// Override the backing store URL
        #[arg(long)]
        store_url: Option<String>,

        /// Override the consistency mode (refetch or optimistic)
        #[arg(long)]
        consistency: Option<ConsistencyMode>,
    },
    /// Serve the development backing store
    ServeStore {
        #[arg(long, default_value = "127.0.0.1:4000")]
        bind: String,

        /// JSON database file with "items" and "users" arrays
        #[arg(long)]
        db: Option<PathBuf>,

        /// Delay for unfiltered GET /items, in milliseconds
        #[arg(long, default_value = "0")]
        delay_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing("warn");

    match cli.command {
        Command::Run {
            store_url,
            consistency,
        } => {
            let mut config = match &cli.config {
                Some(path) => Config::load_from(path),
                None => Config::load(),
            }
            .context("loading configuration")?;
            if let Some(url) = store_url {
                config.store.base_url = url;
            }
            if let Some(mode) = consistency {
                config.service.consistency = mode;
            }
            run(config).await
        }
        Command::ServeStore { bind, db, delay_ms } => serve_store(&bind, db, delay_ms).await,
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let container = Container::connect(config)
        .await
        .context("starting container")?;

    println!("mfe-container: store {}", container.config().store.base_url);
    println!("type 'help' for commands");
    if let Err(e) = container.wait_mounted().await {
        eprintln!("warning: {}", e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let command = match ReplCommand::parse(&line) {
            None => continue,
            Some(Ok(command)) => command,
            Some(Err(e)) => {
                eprintln!("{}", e);
                continue;
            }
        };
        if command == ReplCommand::Quit {
            break;
        }
        match execute(&container, &command).await {
            Ok(output) => {
                for line in output {
                    println!("{}", line);
                }
            }
            Err(e) => eprintln!("{} failed: {}", command, e),
        }
    }

    container.shutdown().await;
    Ok(())
}

async fn serve_store(bind: &str, db: Option<PathBuf>, delay_ms: u64) -> anyhow::Result<()> {
    let database = match db {
        Some(path) => Database::load(&path)?,
        None => Database::default(),
    };
    let options = DevStoreOptions {
        items_delay: Duration::from_millis(delay_ms),
        remotes: BUILTIN_MODULES
            .iter()
            .filter_map(|m| m.split('/').next())
            .map(str::to_string)
            .collect(),
    };
    let store = DevStore::start(bind, database, options).await?;
    println!("dev store listening on {}", store.base_url());

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    store.shutdown();
    Ok(())
}
