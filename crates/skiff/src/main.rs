//! Headless front-end for the skiff sync engine.
//!
//! Stands in for the terminal rendering layer: constructs the engine for one
//! repository, starts the daemon, and prints every update event from the bus
//! until Ctrl-C. The fetch callbacks re-read repository state with the
//! blocking call shape, exactly the way a widget cache would.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use skiff_git::{GitCommand, GitError, run_blocking};
use skiff_sync::{RefreshCategory, StateFetcher, SyncConfig, SyncEngine, UpdateEvent};
use tracing::{debug, error, info};

#[derive(Parser)]
#[command(name = "skiff", version, about = "Watch a repository and stream update events")]
struct Cli {
    /// Repository to watch
    #[arg(default_value = ".")]
    repo: PathBuf,

    /// Config file path (defaults to ~/.skiff/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit update events and logs as JSON lines
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    skiff_sync::init_logging(cli.json);
    info!(event = "skiff.start_started");

    let exit_code = match run(cli) {
        Ok(()) => {
            info!(event = "skiff.start_completed");
            0
        }
        Err(e) => {
            error!(event = "skiff.start_failed", error = %e);
            eprintln!("skiff: {}", e);
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => SyncConfig::load(path)?,
        None => match SyncConfig::user_config_path() {
            Some(path) => SyncConfig::load(&path)?,
            None => SyncConfig::default(),
        },
    };

    let repo_root = cli.repo.canonicalize()?;
    let json = cli.json;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let fetcher = Arc::new(CliFetcher {
            repo_root: repo_root.clone(),
        });
        let (engine, mut events) = SyncEngine::new(config, &repo_root, fetcher)?;

        engine.start();

        loop {
            tokio::select! {
                maybe = events.recv() => match maybe {
                    Some(event) => print_event(event, json),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!(event = "skiff.signal_received", signal = "SIGINT");
                    engine.stop();
                    break;
                }
            }
        }

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}

/// Rendering-layer stand-in: each category refresh re-reads authoritative
/// state through the blocking call shape and logs what it saw.
struct CliFetcher {
    repo_root: PathBuf,
}

impl StateFetcher for CliFetcher {
    fn fetch(&self, category: RefreshCategory) -> Result<(), GitError> {
        let command = match category {
            RefreshCategory::Files => GitCommand::status(&self.repo_root),
            RefreshCategory::Branches => GitCommand::branch_list(&self.repo_root),
            RefreshCategory::Stashes => GitCommand::stash_list(&self.repo_root),
        };
        let result = run_blocking(&command)?;
        debug!(
            event = "skiff.fetch_completed",
            category = category.as_str(),
            code = result.code,
            lines = result.output.lines().count()
        );
        Ok(())
    }
}

fn print_event(event: UpdateEvent, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(&event) {
            println!("{line}");
        }
    } else {
        println!("update: {event:?}");
    }
}
