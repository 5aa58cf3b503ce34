mod cli;
mod plan;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediamux_core::{
    load_config, BatchEvent, BatchRequest, ConcurrencyMode, Config, FfprobeProber, JobState,
    ProbeCache, ProcessRunner, Scheduler, ToolCheck, ToolsConfig,
};

use cli::{Cli, Command};
use plan::Planner;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let mode = concurrency_mode(&cli, &config);

    tokio::fs::create_dir_all(&cli.out_dir)
        .await
        .with_context(|| format!("failed to create output directory {}", cli.out_dir.display()))?;

    let cache = ProbeCache::new(FfprobeProber::new(&config.tools.ffprobe));
    let planner = Planner {
        tools: &config.tools,
        cache: &cache,
        out_dir: &cli.out_dir,
        overwrite: cli.overwrite,
    };

    let jobs = match &cli.command {
        Command::Fetch {
            urls,
            format,
            merge_format,
        } => planner.plan_fetch(urls, format, merge_format.as_deref()),
        Command::Remux { inputs, container } => planner.plan_remux(inputs, container).await?,
        Command::Demux {
            inputs,
            audio_format,
            video_format,
            force_reencode,
        } => {
            planner
                .plan_demux(inputs, audio_format, video_format, *force_reencode)
                .await?
        }
    };
    info!("planned {} job(s)", jobs.len());

    let mut runner = ProcessRunner::new(config.runner.clone());
    for check in tool_checks(&config.tools, &cli.command) {
        runner = runner.with_tool_check(check);
    }
    let scheduler = Scheduler::new(runner);

    let (events_tx, events_rx) = mpsc::channel(config.scheduler.event_buffer);
    let handle = scheduler
        .submit(BatchRequest::new(jobs, mode), events_tx)
        .await?;

    // First Ctrl-C cancels the batch; jobs get their grace period.
    let controller = handle.controller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling remaining jobs");
            controller.cancel_all();
        }
    });

    let render = tokio::spawn(render_events(events_rx));
    let summary = handle.wait().await?;
    let _ = render.await;

    if summary.errored > 0 {
        anyhow::bail!("{} of {} job(s) failed", summary.errored, summary.total);
    }
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let explicit = cli
        .config
        .clone()
        .or_else(|| std::env::var("MEDIAMUX_CONFIG").ok().map(PathBuf::from));

    match explicit {
        Some(path) => load_config(&path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            let default_path = PathBuf::from("mediamux.toml");
            if default_path.exists() {
                load_config(&default_path).context("failed to load mediamux.toml")
            } else {
                Ok(Config::default())
            }
        }
    }
}

fn concurrency_mode(cli: &Cli, config: &Config) -> ConcurrencyMode {
    let mut scheduler = config.scheduler.clone();
    if cli.parallel || cli.max_jobs.is_some_and(|n| n > 1) {
        scheduler.parallel = true;
    }
    if let Some(n) = cli.max_jobs {
        scheduler.max_parallel = n as usize;
    }
    scheduler.mode()
}

/// Only the tools the chosen subcommand actually shells out to.
fn tool_checks(tools: &ToolsConfig, command: &Command) -> Vec<ToolCheck> {
    match command {
        Command::Fetch { .. } => vec![
            ToolCheck::new(&tools.ytdlp, "--version"),
            ToolCheck::new(&tools.ffmpeg, "-version"),
        ],
        Command::Remux { .. } | Command::Demux { .. } => vec![
            ToolCheck::new(&tools.ffmpeg, "-version"),
            ToolCheck::new(&tools.ffprobe, "-version"),
        ],
    }
}

async fn render_events(mut rx: mpsc::Receiver<BatchEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            BatchEvent::JobStarted { label, .. } => info!("started: {label}"),
            BatchEvent::JobProgress { job_id, percent } => {
                debug!(job = %job_id, "{percent:.1}%");
            }
            BatchEvent::OverallProgress { percent } => info!("overall progress {percent:.1}%"),
            BatchEvent::GroupStatusChanged {
                group_id,
                status,
                completed,
                total,
            } => {
                debug!(group = %group_id, ?status, "{completed}/{total} complete");
            }
            BatchEvent::JobTerminal {
                job_id,
                state,
                detail,
                ..
            } => match state {
                JobState::Error => {
                    error!(job = %job_id, "failed: {}", detail.unwrap_or_default());
                }
                JobState::Cancelled => warn!(job = %job_id, "cancelled"),
                _ => info!(job = %job_id, "done"),
            },
            BatchEvent::BatchComplete { summary } => {
                info!(
                    done = summary.done,
                    errored = summary.errored,
                    cancelled = summary.cancelled,
                    "batch finished"
                );
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_mode_defaults_to_sequential() {
        let cli = Cli::parse_from(["mediamux", "remux", "a.mkv"]);
        let config = Config::default();
        assert_eq!(concurrency_mode(&cli, &config), ConcurrencyMode::Sequential);
    }

    #[test]
    fn test_parallel_flag_uses_configured_cap() {
        let cli = Cli::parse_from(["mediamux", "--parallel", "remux", "a.mkv"]);
        let config = Config::default();
        assert_eq!(
            concurrency_mode(&cli, &config),
            ConcurrencyMode::Parallel { max_parallel: 2 }
        );
    }

    #[test]
    fn test_max_jobs_implies_parallel() {
        let cli = Cli::parse_from(["mediamux", "--max-jobs", "6", "remux", "a.mkv"]);
        let config = Config::default();
        assert_eq!(
            concurrency_mode(&cli, &config),
            ConcurrencyMode::Parallel { max_parallel: 6 }
        );
    }

    #[test]
    fn test_fetch_does_not_require_ffprobe() {
        let tools = ToolsConfig::default();
        let cli = Cli::parse_from(["mediamux", "fetch", "url"]);
        let checks = tool_checks(&tools, &cli.command);
        assert!(checks.iter().all(|c| c.program != tools.ffprobe));
        assert!(checks.iter().any(|c| c.program == tools.ytdlp));
    }
}
