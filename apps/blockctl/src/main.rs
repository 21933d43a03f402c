use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use block_store::BlockStore;
use clap::Parser;
use serde_json::Value;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod console;
mod render;

use config::load_settings;
use console::{Command, Console, ConsoleError};

#[derive(Parser, Debug)]
#[command(about = "Interactive console for the content block store")]
struct Args {
    /// Settings file; defaults to ./blockctl.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Read commands from a file instead of stdin.
    #[arg(long)]
    script: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(args.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let store: Arc<BlockStore<Value>> =
        Arc::new(BlockStore::with_event_capacity(settings.event_capacity));
    let mut console = Console::new(store, settings);
    spawn_event_log(console.store());

    match args.script {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("failed to open script '{}'", path.display()))?;
            run_lines(&mut console, BufReader::new(file)).await
        }
        None => run_lines(&mut console, BufReader::new(tokio::io::stdin())).await,
    }
}

fn spawn_event_log(store: &Arc<BlockStore<Value>>) {
    let mut events = store.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!(?event, "store event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn run_lines<R>(console: &mut Console, reader: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                report_error(&err);
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }

        match console.execute(command).await {
            Ok(output) => {
                for line in output {
                    println!("{line}");
                }
            }
            Err(err) => report_error(&err),
        }
    }
    Ok(())
}

/// Single sink for every error the console surfaces.
fn report_error(err: &ConsoleError) {
    let report = err.report();
    debug!(code = ?report.code, "command failed");
    eprintln!("error[{:?}]: {}", report.code, report.message);
}
