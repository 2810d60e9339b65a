use ab_core::{EnvSettings, RepoConfig, RunConfig};
use ab_pipeline::{commands, init_logging, Orchestrator, RunReport, RunStatus};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
struct HumanDuration(Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total_seconds = 0u64;
        let mut current_number = String::new();
        let mut has_unit = false;

        for c in s.chars() {
            if c.is_ascii_digit() {
                current_number.push(c);
            } else if let Ok(num) = current_number.parse::<u64>() {
                let unit = match c {
                    's' => 1,
                    'm' => 60,
                    'h' => 3600,
                    'd' => 86400,
                    _ => return Err(format!("Invalid duration unit: {}", c)),
                };
                total_seconds = num
                    .checked_mul(unit)
                    .and_then(|secs| total_seconds.checked_add(secs))
                    .ok_or_else(|| "Duration is too long".to_string())?;
                current_number.clear();
                has_unit = true;
            } else if !c.is_whitespace() {
                return Err(format!("Invalid character in duration: {}", c));
            }
        }

        // A trailing bare number counts as seconds.
        if !current_number.is_empty() {
            let num = current_number
                .parse::<u64>()
                .map_err(|_| "Invalid number in duration".to_string())?;
            total_seconds = total_seconds
                .checked_add(num)
                .ok_or_else(|| "Duration is too long".to_string())?;
            has_unit = true;
        }

        if !has_unit {
            return Err("Duration must include a number".to_string());
        }
        if total_seconds == 0 {
            return Err("Interval must be longer than zero".to_string());
        }

        Ok(HumanDuration(Duration::from_secs(total_seconds)))
    }
}

#[derive(Parser, Debug)]
#[command(name = "autoblog", author, version, about = "Turns RSS feeds into AI-written Jekyll posts and publishes them", long_about = None)]
struct Cli {
    /// Settings file loaded before the environment is read (defaults to ./.env when present)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
    /// Debug logging, unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch feeds, generate posts, write them and publish
    Run {
        /// Keep running with this pause between runs (e.g. 6h, 30m, 1h15m)
        #[arg(long)]
        interval: Option<HumanDuration>,
        /// Use the offline generator and write into a scratch directory, leaving the site untouched
        #[arg(long)]
        dry_run: bool,
    },
    /// Commit and push whatever is in the site repository
    Push,
    /// Clone or initialise the site repository
    Setup,
}

fn load_env(env_file: Option<&Path>) -> anyhow::Result<()> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path).with_context(|| format!("cannot load settings from {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            }
            _ => {
                warn!("⚠️ Could not install signal handlers, Ctrl-C will kill the process");
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn run_pipeline(interval: Option<HumanDuration>, dry_run: bool) -> u8 {
    let config = if dry_run {
        RunConfig::from_settings_dry_run(&EnvSettings)
    } else {
        RunConfig::from_settings(&EnvSettings)
    };
    let orchestrator = match config {
        Ok(config) => Orchestrator::from_config(config, dry_run).await,
        Err(e) => Err(e),
    };
    let orchestrator = match orchestrator {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            let report = RunReport::init_failure(&e);
            error!("❌ {}", report);
            return report.exit_code() as u8;
        }
    };
    if dry_run {
        info!("Dry run: dummy generator, nothing is committed");
    }

    let shutdown: Arc<AtomicBool> = orchestrator.shutdown_handle();
    let flag = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        warn!("🛑 Shutdown requested, finishing the current stage");
        flag.store(true, Ordering::SeqCst);
    });

    let Some(interval) = interval else {
        return orchestrator.run().await.exit_code() as u8;
    };

    info!("Running in periodic mode with {}s interval", interval.0.as_secs());
    loop {
        info!("Starting run cycle");
        let report = orchestrator.run().await;
        if matches!(report.status, RunStatus::Aborted(_)) || shutdown.load(Ordering::SeqCst) {
            return report.exit_code() as u8;
        }

        info!("Waiting {}s before next run", interval.0.as_secs());
        let deadline = tokio::time::Instant::now() + interval.0;
        while tokio::time::Instant::now() < deadline {
            if shutdown.load(Ordering::SeqCst) {
                info!("Stopping periodic mode");
                return 0;
            }
            tokio::time::sleep_until(deadline.min(tokio::time::Instant::now() + Duration::from_secs(1))).await;
        }
    }
}

async fn execute(command: Commands) -> anyhow::Result<u8> {
    match command {
        Commands::Run { interval, dry_run } => Ok(run_pipeline(interval, dry_run).await),
        Commands::Push => {
            let repo = RepoConfig::from_settings(&EnvSettings)?;
            commands::push(repo).await?;
            Ok(0)
        }
        Commands::Setup => {
            commands::setup(&EnvSettings).await?;
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let env = load_env(cli.env_file.as_deref());
    init_logging(cli.verbose);
    if let Err(e) = env {
        error!("❌ {:#}", e);
        return ExitCode::from(2);
    }

    match execute(cli.command).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}
