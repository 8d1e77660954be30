use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::app::engine::{CommandLine, Engine};
use crate::app::models::ResolvedTask;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Dry run: the command was printed, not executed.
    Planned,
    Succeeded,
    Failed(String),
    /// Not attempted because the run was interrupted.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub status: TaskStatus,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<TaskOutcome>,
    pub interrupted: bool,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, TaskStatus::Failed(_)))
            .count()
    }

    /// 0 on full success, 1 if any task failed, 130 when interrupted.
    pub fn exit_code(&self) -> u8 {
        if self.interrupted {
            130
        } else if self.failed() > 0 {
            1
        } else {
            0
        }
    }
}

/// Runs the copy tool once per task, one task at a time.
pub struct Runner<'a> {
    engine: &'a Engine,
    exclude: &'a [String],
    dry_run: bool,
    verbose: bool,
    /// Set from the Ctrl+C handler.
    interrupt: Arc<AtomicBool>,
}

impl<'a> Runner<'a> {
    pub fn new(engine: &'a Engine, exclude: &'a [String], dry_run: bool, verbose: bool) -> Self {
        Self {
            engine,
            exclude,
            dry_run,
            verbose,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// A failing task never stops the ones after it; an interrupt does.
    /// Dry-run command lines go to `out`.
    pub fn run<W: Write>(&self, tasks: &[ResolvedTask], out: &mut W) -> Result<RunReport> {
        let mut report = RunReport::default();

        for task in tasks {
            if self.interrupt.load(Ordering::SeqCst) && !report.interrupted {
                log::warn!("Interrupted, skipping the remaining folders");
                report.interrupted = true;
            }

            let status = if report.interrupted {
                TaskStatus::Skipped
            } else {
                let line = self.engine.command(task, self.exclude, self.verbose);
                if self.dry_run {
                    writeln!(out, "{}", line).context("Failed to write dry-run output")?;
                    TaskStatus::Planned
                } else {
                    self.execute(task, &line, &mut report)
                }
            };

            report.outcomes.push(TaskOutcome {
                source: task.source.clone(),
                destination: task.destination.clone(),
                status,
            });
        }

        Ok(report)
    }

    fn execute(&self, task: &ResolvedTask, line: &CommandLine, report: &mut RunReport) -> TaskStatus {
        log::info!(
            "Syncing {} -> {}",
            task.source.display(),
            task.destination.display()
        );
        log::debug!("Running {}", line);

        match self.spawn(task, line) {
            Ok(status) if was_interrupted(&status) || self.interrupt.load(Ordering::SeqCst) => {
                log::warn!("Interrupted, skipping the remaining folders");
                report.interrupted = true;
                TaskStatus::Failed("interrupted".to_string())
            }
            Ok(status) => match status.code() {
                Some(code) if self.engine.kind.is_success(code) => {
                    log::info!("✅ Synchronized {}", task.source.display());
                    TaskStatus::Succeeded
                }
                Some(code) => {
                    let reason = format!("{} exited with code {}", self.engine.kind, code);
                    log::error!("Synchronization of {} failed: {}", task.source.display(), reason);
                    TaskStatus::Failed(reason)
                }
                None => {
                    let reason = format!("{} was terminated by a signal", self.engine.kind);
                    log::error!("Synchronization of {} failed: {}", task.source.display(), reason);
                    TaskStatus::Failed(reason)
                }
            },
            Err(err) => {
                log::error!("Synchronization of {} failed: {:#}", task.source.display(), err);
                TaskStatus::Failed(format!("{:#}", err))
            }
        }
    }

    fn spawn(&self, task: &ResolvedTask, line: &CommandLine) -> Result<ExitStatus> {
        fs::create_dir_all(&task.destination)
            .with_context(|| format!("Failed to create {}", task.destination.display()))?;

        line.to_command()
            .status()
            .with_context(|| format!("Failed to run {}", line.program.display()))
    }
}

/// Keeps Ctrl+C from killing wsync itself. The terminal delivers it to the
/// whole foreground process group, so the running tool still receives it;
/// the flag tells the runner to stop after that tool exits.
pub fn install_interrupt_handler() -> Result<Arc<AtomicBool>> {
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupt);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("Failed to install the Ctrl+C handler")?;
    Ok(interrupt)
}

#[cfg(unix)]
fn was_interrupted(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    const SIGINT: i32 = 2;
    status.signal() == Some(SIGINT)
}

#[cfg(not(unix))]
fn was_interrupted(_status: &ExitStatus) -> bool {
    false
}
