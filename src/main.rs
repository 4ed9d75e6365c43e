// src/main.rs

use clap::Parser;
use color_eyre::eyre::{bail, Result, WrapErr};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod app;
mod config;
mod core;
mod logging;
mod ui;

use app::{App, AppState};
use config::EngineConfig;
use crate::core::errors::EngineError;
use crate::core::models::{JobSnapshot, StageResult, SubmitOutcome, Target, TargetId};
use crate::core::scanner::ExternalTools;
use crate::core::scheduler::{Scheduler, SchedulerOptions};
use crate::core::store::{JsonlResultStore, ResultStore};
use crate::core::targets::normalize_target;

const RESULTS_FILE: &str = "results.jsonl";

#[derive(Debug, Parser)]
#[command(name = "hawks-rs", version, about = "Queue-driven recon scans chaining subfinder, chaos, httpx and nuclei.")]
struct Cli {
    /// Engine configuration file.
    #[arg(short, long, default_value = "hawks.toml")]
    config: PathBuf,

    /// Scan the given targets without the dashboard and print the results as JSON.
    #[arg(long)]
    headless: bool,

    /// File with one target per line. Blank lines and `#` comments are skipped.
    #[arg(short, long, value_name = "FILE")]
    targets: Option<PathBuf>,

    /// Targets to scan (domain names or IPv4 addresses).
    target: Vec<String>,
}

/// One entry of the headless report.
#[derive(Debug, Serialize)]
struct TargetReport {
    #[serde(flatten)]
    target: Target,
    job: JobSnapshot,
    results: Vec<StageResult>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    logging::initialize_logging(cli.headless)?;

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let config = EngineConfig::load(&cli.config)?;
    let targets = collect_targets(&cli)?;

    let store = Arc::new(JsonlResultStore::open(config.data_dir.join(RESULTS_FILE)).await?);
    info!(path = %store.path().display(), "Result journal opened.");

    let tools = ExternalTools::from_config(&config);
    info!(templates = %tools.templates_dir().display(), "Using scan templates.");

    let scheduler = Scheduler::new(SchedulerOptions::from_config(&config), Arc::new(tools), store.clone());
    info!(max_concurrent = scheduler.max_concurrent(), "Scheduler ready.");
    scheduler.start();

    let outcome = if cli.headless {
        run_headless(&scheduler, store.as_ref(), targets).await
    } else {
        run_dashboard(&scheduler, store.as_ref(), targets).await
    };

    scheduler.stop().await;
    outcome
}

fn collect_targets(cli: &Cli) -> Result<Vec<String>> {
    let mut targets = Vec::new();
    if let Some(path) = &cli.targets {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read target list {}", path.display()))?;
        targets.extend(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }
    targets.extend(cli.target.iter().cloned());
    Ok(dedupe_targets(targets))
}

/// Drops repeated targets, comparing their normalized form. Invalid entries
/// are kept as typed so submission can reject them with a reason.
fn dedupe_targets(targets: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let total = targets.len();
    let unique: Vec<String> = targets
        .into_iter()
        .filter(|raw| seen.insert(normalize_target(raw).unwrap_or_else(|_| raw.trim().to_string())))
        .collect();
    if unique.len() < total {
        info!(skipped = total - unique.len(), "Dropped duplicate targets.");
    }
    unique
}

fn describe_outcomes(outcomes: &[(TargetId, Result<SubmitOutcome, EngineError>)]) -> String {
    let (mut started, mut queued, mut duplicates) = (0, 0, 0);
    let mut rejected = Vec::new();
    for (_, outcome) in outcomes {
        match outcome {
            Ok(SubmitOutcome::Started) => started += 1,
            Ok(SubmitOutcome::Queued) => queued += 1,
            Ok(SubmitOutcome::AlreadyActive) => duplicates += 1,
            Err(e) => rejected.push(e.to_string()),
        }
    }

    let mut message = format!("{started} started, {queued} queued");
    if duplicates > 0 {
        message.push_str(&format!(", {duplicates} already active"));
    }
    if let Some(first) = rejected.first() {
        message.push_str(&format!(", {} rejected ({first})", rejected.len()));
    }
    message
}

// --- Headless ---

async fn run_headless(scheduler: &Scheduler, store: &dyn ResultStore, targets: Vec<String>) -> Result<()> {
    if targets.is_empty() {
        bail!("no targets given, pass them as arguments or with --targets");
    }

    let batch: Vec<(TargetId, String)> = targets
        .into_iter()
        .enumerate()
        .map(|(i, address)| (i as TargetId + 1, address))
        .collect();
    let outcomes = scheduler.submit_many(batch).await;
    for (target_id, outcome) in &outcomes {
        if let Err(e) = outcome {
            warn!(target_id = *target_id, error = %e, "Target rejected.");
        }
    }
    info!("{}", describe_outcomes(&outcomes));

    scheduler.wait_until_idle().await;

    let mut reports = Vec::new();
    for (target_id, outcome) in outcomes {
        if outcome.is_err() {
            continue;
        }
        let Some(job) = scheduler.job(target_id) else {
            continue;
        };
        let mut target = Target::new(target_id, job.address.clone());
        if let Some((status, at)) = store.target_status(target_id).await {
            target.status = status;
            target.last_scan = status.is_terminal().then_some(at);
        }
        let results = store.results_for(target_id).await;
        reports.push(TargetReport { target, job, results });
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

// --- Dashboard ---

async fn run_dashboard(scheduler: &Scheduler, store: &dyn ResultStore, targets: Vec<String>) -> Result<()> {
    // --- Setup ---
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableMouseCapture)?;
    enable_raw_mode()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut app = App::new();
    if !targets.is_empty() {
        submit_targets(&mut app, scheduler, targets).await;
    }

    let outcome = event_loop(&mut terminal, &mut app, scheduler, store).await;

    // --- Restore Terminal ---
    stdout().execute(LeaveAlternateScreen)?;
    stdout().execute(DisableMouseCapture)?;
    disable_raw_mode()?;
    outcome
}

async fn event_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    scheduler: &Scheduler,
    store: &dyn ResultStore,
) -> Result<()> {
    while !app.should_quit {
        app.refresh(scheduler.status());
        app.selected_results = match app.selected_target() {
            Some(target_id) => store.results_for(target_id).await,
            None => Vec::new(),
        };

        terminal.draw(|frame| ui::render(app, frame))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, scheduler, key.code).await;
                }
            }
        }

        app.on_tick();
    }
    Ok(())
}

async fn handle_key(app: &mut App, scheduler: &Scheduler, key_code: KeyCode) {
    match app.state {
        AppState::Disclaimer => match key_code {
            KeyCode::Enter => app.state = AppState::Editing,
            KeyCode::Char('q') | KeyCode::Esc => app.quit(),
            _ => {}
        },
        AppState::Editing => match key_code {
            KeyCode::Char(c) => app.input.push(c),
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::Enter => {
                let targets = app.take_targets();
                if !targets.is_empty() {
                    submit_targets(app, scheduler, targets).await;
                }
            }
            KeyCode::Tab | KeyCode::Esc => {
                app.message = None;
                app.state = AppState::Browsing;
            }
            _ => {}
        },
        AppState::Browsing => {
            app.message = None;
            match key_code {
                KeyCode::Char('q') => app.quit(),
                KeyCode::Up => app.select_previous(),
                KeyCode::Down => app.select_next(),
                KeyCode::Char('c') => {
                    if let Some(target_id) = app.selected_target() {
                        app.message = Some(if scheduler.cancel(target_id) {
                            format!("Stop requested for {}", crate::core::job::scan_id_for(target_id))
                        } else {
                            "Scan is not active.".to_string()
                        });
                    }
                }
                KeyCode::Char('l') => app.toggle_logs(),
                KeyCode::Left => app.scroll_logs_left(),
                KeyCode::Right => app.scroll_logs_right(),
                KeyCode::Tab => app.state = AppState::Editing,
                _ => {}
            }
        }
    }
}

async fn submit_targets(app: &mut App, scheduler: &Scheduler, targets: Vec<String>) {
    let batch: Vec<(TargetId, String)> = targets
        .into_iter()
        .map(|address| (app.allocate_target_id(), address))
        .collect();
    let outcomes = scheduler.submit_many(batch).await;
    app.message = Some(describe_outcomes(&outcomes));
}
