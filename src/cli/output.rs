//! Output formatting and progress indicators
//!
//! This module turns [`EngineEvent`]s into terminal output: a progress bar
//! over the queued steps, step output routed to stdout and stderr, and
//! diagnostics with status prefixes.

use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::core::events::EngineEvent;
use crate::core::task::{OutputFormat, Severity};

/// Process-wide output settings derived from the global CLI flags
#[derive(Debug, Clone, Copy)]
pub struct OutputConfig {
    quiet: bool,
    verbose: u8,
}

static QUIET: AtomicBool = AtomicBool::new(false);

impl OutputConfig {
    pub fn new(quiet: bool, verbose: u8) -> Self {
        Self { quiet, verbose }
    }

    /// Tracing level implied by the verbosity flags
    pub fn tracing_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            _ => tracing::Level::DEBUG,
        }
    }

    /// Apply this configuration globally
    pub fn apply_global(&self) {
        QUIET.store(self.quiet, Ordering::Relaxed);
    }
}

/// Whether `--quiet` is in effect
pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Display an error and its cause chain
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{} {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}

/// Create a progress bar for build steps
pub fn create_build_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} steps ({msg})")
            .expect("Invalid progress bar template")
            .progress_chars("█▓▒░"),
    );
    pb
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

/// Diagnostics tally for one batch
#[derive(Debug, Default, Clone, Copy)]
pub struct EventSummary {
    pub errors: usize,
    pub warnings: usize,
}

/// Render one engine event
///
/// Output text and diagnostics print above the bar; progress events move
/// the bar. Returns true once the queue reports completion.
pub fn render_event(event: EngineEvent, progress: &ProgressBar, summary: &mut EventSummary) -> bool {
    match event {
        EngineEvent::Output(out) => match out.format {
            OutputFormat::Stdout | OutputFormat::NormalMessage => {
                if !is_quiet() {
                    progress.suspend(|| println!("{}", out.text));
                }
            }
            OutputFormat::Stderr | OutputFormat::ErrorMessage => {
                progress.suspend(|| eprintln!("{}", out.text));
            }
        },
        EngineEvent::Task(task) => match task.severity {
            Severity::Error => {
                summary.errors += 1;
                progress.suspend(|| eprintln!("{} {task}", status::ERROR));
            }
            Severity::Warning => {
                summary.warnings += 1;
                if !is_quiet() {
                    progress.suspend(|| eprintln!("{} {task}", status::WARNING));
                }
            }
        },
        EngineEvent::StepStarted { name, .. } => progress.set_message(name),
        EngineEvent::Progress {
            finished, total, ..
        } => {
            progress.set_length(total as u64);
            progress.set_position(finished as u64);
        }
        EngineEvent::QueueFinished { .. } => return true,
        EngineEvent::StepInserted { .. }
        | EngineEvent::StepRemoved { .. }
        | EngineEvent::StepMoved { .. }
        | EngineEvent::EnvironmentChanged { .. }
        | EngineEvent::BuildStateChanged { .. } => {}
    }
    false
}

/// Forward engine events to the terminal until the queue reports completion
pub async fn pump_events(
    rx: &mut UnboundedReceiver<EngineEvent>,
    progress: &ProgressBar,
    summary: &mut EventSummary,
) {
    while let Some(event) = rx.recv().await {
        if render_event(event, progress, summary) {
            break;
        }
    }
}

/// Drain already-queued events without waiting for more
pub fn flush_events(rx: &mut UnboundedReceiver<EngineEvent>, summary: &mut EventSummary) {
    let progress = ProgressBar::hidden();
    while let Ok(event) = rx.try_recv() {
        render_event(event, &progress, summary);
    }
}
