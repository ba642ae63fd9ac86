//! Gather Binary Entry Point
//!
//! Command line front end for running and inspecting collectors.
//! Core functionality is provided by the `gather` library crate.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use gather::{
    AppConfig, CollectorInfo, DefinitionStore, Executor, IngressUploader, RunOptions,
    RunOrchestrator, RunStateCache, StateError, TarGzPackager,
    report::{self, OutputFormat, TimerRow},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Gather - collect host data and upload it
#[derive(Parser, Debug)]
#[command(name = "gather", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        default_value = "/etc/gather/config.yaml",
        env = "GATHER_CONFIG"
    )]
    config: PathBuf,

    /// Collector definitions directory (overrides config file)
    #[arg(long, global = true, env = "GATHER_DEFINITIONS_DIR")]
    definitions_dir: Option<PathBuf>,

    /// Run-state cache directory (overrides config file)
    #[arg(long, global = true, env = "GATHER_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Parent directory of output directories (overrides config file)
    #[arg(long, global = true, env = "GATHER_COLLECTIONS_DIR")]
    collections_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run collector
    Run {
        /// Collector id
        collector: String,

        /// Do not delete the data
        #[arg(long)]
        keep: bool,

        /// Do not upload the data
        #[arg(long)]
        no_upload: bool,
    },
    /// Display collector information
    Info {
        /// Collector id
        collector: String,
    },
    /// List collectors
    List,
    /// List collector timers
    Timers,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries reports only
    let default_filter = if cli.debug { "debug" } else { "warn,gather=info" };
    let filter = if cli.debug {
        tracing_subscriber::EnvFilter::new(default_filter)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| default_filter.into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing::debug!(path = %cli.config.display(), "Loading configuration");
    let mut config = AppConfig::load_or_default(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(dir) = cli.definitions_dir {
        config.paths.definitions_dir = dir;
    }
    if let Some(dir) = cli.cache_dir {
        config.paths.cache_dir = dir;
    }
    if let Some(dir) = cli.collections_dir {
        config.paths.collections_dir = dir;
    }
    config.validate()?;

    let store = DefinitionStore::from_config(&config.paths);
    let format = cli.format;

    match cli.command {
        Command::Run {
            collector,
            keep,
            no_upload,
        } => {
            let options = RunOptions {
                keep,
                upload: !no_upload,
            };
            do_run(&config, &store, &collector, options, format).await
        }
        Command::Info { collector } => {
            let definition = store.load_one(&collector)?;
            let info = CollectorInfo::from(&definition);
            print!("{}", with_newline(report::render_info(&info, format)?));
            Ok(ExitCode::SUCCESS)
        }
        Command::List => {
            let infos: Vec<CollectorInfo> =
                store.load_all()?.iter().map(CollectorInfo::from).collect();
            print!("{}", with_newline(report::render_list(&infos, format)?));
            Ok(ExitCode::SUCCESS)
        }
        Command::Timers => {
            let state = RunStateCache::from_config(&config.paths);
            let rows: Vec<TimerRow> = store
                .load_all()?
                .iter()
                .map(|definition| TimerRow::new(&definition.id, last_run(&state, &definition.id)))
                .collect();
            print!("{}", with_newline(report::render_timers(&rows, format)?));
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn do_run(
    config: &AppConfig,
    store: &DefinitionStore,
    collector: &str,
    options: RunOptions,
    format: OutputFormat,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let definition = store.load_one(collector)?;

    let uploader = if options.upload {
        IngressUploader::from_config(&config.ingress)?
    } else {
        // Never contacted; built without the client identity
        IngressUploader::new(reqwest::Client::new(), &config.ingress.url)
    };

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let executor = Executor::from_config(config).with_cancellation(cancel);
    let orchestrator = RunOrchestrator::new(executor, TarGzPackager::new(), uploader);
    let outcome = orchestrator.run(&definition, options).await;

    let rendered = report::render_run(&outcome.summary, format)?;
    let Some(error) = outcome.error() else {
        print!("{}", with_newline(rendered));
        return Ok(ExitCode::SUCCESS);
    };

    match format {
        OutputFormat::Json => println!("{}", rendered),
        OutputFormat::Human => eprint!("{}", rendered),
    }
    eprintln!("Error: {}", error);
    if let gather::RunError::Collect(e) = error {
        if let Some(stderr) = e.stderr().filter(|s| !s.trim().is_empty()) {
            eprintln!("{}", stderr.trim_end());
        }
    }
    Ok(ExitCode::FAILURE)
}

fn last_run(state: &RunStateCache, id: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    match state.last_run(id) {
        Ok(when) => Some(when),
        Err(StateError::NotFound(_)) => None,
        Err(e) => {
            tracing::warn!(collector = %id, error = %e, "Cannot read last run");
            None
        }
    }
}

fn with_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Cancel the running collection on Ctrl+C or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!("Cancelling collection...");
    cancel.cancel();
}
