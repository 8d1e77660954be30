// Declare modules
pub mod cli;
pub mod config;
pub mod engine;
pub mod formatter;
pub mod logging;
pub mod models;
pub mod resolver;
pub mod runner;
pub mod scanner;

use anyhow::{bail, Result};
use clap::Parser;
use std::io;
use std::path::Path;
use std::process::ExitCode;

use self::cli::{Cli, Command};
use self::config::{default_config_path, Config};
use self::engine::Engine;
use self::formatter::OutputGenerator;
use self::models::Plan;
use self::resolver::resolve;
use self::runner::{install_interrupt_handler, Runner, TaskStatus};
use self::scanner::top_level_dirs;

/// Parses arguments, sets up logging and dispatches the subcommand.
pub fn run() -> Result<ExitCode> {
    // 1. Parse Args
    let args = Cli::parse();

    // 2. Set up logging
    logging::init(args.verbose, args.quiet, args.log.as_deref())?;

    // 3. Locate the config file
    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    log::debug!("Using config {}", config_path.display());

    // 4. Dispatch
    match args.command {
        Command::Init => init(&config_path),
        Command::Status { json } => status(&config_path, json),
        Command::Start { dry_run } => start(&config_path, dry_run, args.verbose > 0),
    }
}

fn init(config_path: &Path) -> Result<ExitCode> {
    let mut config = if config_path.exists() {
        log::warn!("Config file already exists, importing it...");
        Config::load(config_path)?
    } else {
        Config::default()
    };

    config.prompt_roots(&mut io::stdin().lock(), &mut io::stdout())?;
    config.save(config_path)?;
    log::info!("✅ Wrote {}", config_path.display());

    let engine = Engine::from_config(&config.engine);
    if engine.probe() {
        log::info!("Found {} at {}", engine.kind, engine.program().display());
    } else {
        log::warn!(
            "⚠️ {} was not found: {}",
            engine.program().display(),
            engine.kind.install_hint()
        );
    }

    Ok(ExitCode::SUCCESS)
}

/// Discovers top-level folders and resolves the whole config.
fn build_plan(config: &Config) -> Result<Plan> {
    let top_level = top_level_dirs(&config.default_src)?;
    log::debug!("Top-level folders: {:?}", top_level);

    resolve(config, &top_level).map_err(|failed| {
        for err in &failed.0 {
            log::error!("{}", err);
        }
        anyhow::Error::from(failed)
    })
}

fn status(config_path: &Path, json: bool) -> Result<ExitCode> {
    let config = Config::load(config_path)?;
    let plan = build_plan(&config)?;

    let output = if json {
        OutputGenerator::json(&plan)?
    } else {
        OutputGenerator::status(&plan)
    };
    println!("{}", output);

    Ok(ExitCode::SUCCESS)
}

fn start(config_path: &Path, dry_run: bool, verbose: bool) -> Result<ExitCode> {
    let config = Config::load(config_path)?;
    let plan = build_plan(&config)?;

    if plan.tasks.is_empty() {
        log::warn!("⚠️ No directories to sync.");
        return Ok(ExitCode::SUCCESS);
    }

    let interrupt = if dry_run {
        None
    } else {
        Some(install_interrupt_handler()?)
    };

    let engine = Engine::from_config(&config.engine);
    if !dry_run && !engine.probe() {
        bail!(
            "{} was not found: {}",
            engine.program().display(),
            engine.kind.install_hint()
        );
    }

    log::info!("Starting synchronization of {} folder(s)...", plan.tasks.len());
    let mut runner = Runner::new(&engine, &config.exclude, dry_run, verbose);
    if let Some(interrupt) = interrupt {
        runner = runner.with_interrupt(interrupt);
    }
    let report = runner.run(&plan.tasks, &mut io::stdout().lock())?;

    let failed = report.failed();
    if report.interrupted {
        log::warn!("Stopped synchronization");
    } else if failed > 0 {
        log::error!("{} of {} folder(s) failed:", failed, report.outcomes.len());
        for outcome in &report.outcomes {
            if let TaskStatus::Failed(reason) = &outcome.status {
                log::error!(
                    "    {} -> {} ({})",
                    outcome.source.display(),
                    outcome.destination.display(),
                    reason
                );
            }
        }
    } else if !dry_run {
        log::info!("✅ All {} folder(s) synchronized", report.outcomes.len());
    }

    Ok(ExitCode::from(report.exit_code()))
}
