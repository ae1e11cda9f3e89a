//! Terminal progress for `plancell run`, driven by the checklist feed.
//!
//! The bar position follows the latest checklist snapshot; notable events
//! (skips, failures, auto-fix attempts) are printed above the bar.

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::cli::output::truncate;
use crate::domain::models::{format_operations, ChecklistSnapshot, PlanEvent};
use crate::services::PlanEventEnvelope;

const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}";
const PROGRESS_CHARS: &str = "█▓▒░ ";

/// Progress bar plus the tasks feeding it.
pub struct RunProgress {
    bar: ProgressBar,
    tasks: Vec<JoinHandle<()>>,
}

impl RunProgress {
    /// Visible bar on stderr; hidden when `quiet` (JSON output).
    pub fn new(total: usize, quiet: bool) -> Self {
        let bar = ProgressBar::new(total as u64);
        if quiet {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        } else {
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(PROGRESS_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars(PROGRESS_CHARS),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
        }
        Self {
            bar,
            tasks: Vec::new(),
        }
    }

    /// Track checklist snapshots until the sender goes away.
    pub fn follow_checklist(&mut self, mut rx: watch::Receiver<ChecklistSnapshot>) {
        let bar = self.bar.clone();
        self.tasks.push(tokio::spawn(async move {
            apply_snapshot(&bar, &rx.borrow_and_update());
            while rx.changed().await.is_ok() {
                apply_snapshot(&bar, &rx.borrow_and_update());
            }
        }));
    }

    /// Print notable events above the bar.
    pub fn follow_events(&mut self, mut rx: broadcast::Receiver<PlanEventEnvelope>) {
        let bar = self.bar.clone();
        self.tasks.push(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if let Some(line) = describe_event(&envelope.event) {
                            bar.println(line);
                        }
                        if matches!(envelope.event, PlanEvent::PlanFinished(_)) {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Stop the feeders and clear the bar.
    pub fn finish(self) {
        for task in self.tasks {
            task.abort();
        }
        self.bar.finish_and_clear();
    }
}

fn apply_snapshot(bar: &ProgressBar, snapshot: &ChecklistSnapshot) {
    bar.set_length(snapshot.total_count as u64);
    bar.set_position((snapshot.total_count - snapshot.pending_count()) as u64);
    bar.set_message(truncate(&snapshot.status_line, 60));
}

/// One-line rendering of the events worth surfacing; `None` for the rest.
pub fn describe_event(event: &PlanEvent) -> Option<String> {
    match event {
        PlanEvent::StepSkipped {
            index, kind, reason, ..
        } => Some(format!(
            "{} step {} ({}): {reason}",
            style("skip").cyan(),
            index + 1,
            kind.as_str()
        )),
        PlanEvent::StepCompleted {
            index,
            new_operations,
            ..
        } => Some(format!(
            "{} step {} [{}]",
            style("done").green(),
            index + 1,
            format_operations(new_operations)
        )),
        PlanEvent::StepFailed { index, error, .. } => Some(format!(
            "{} step {}: {}",
            style("fail").red().bold(),
            index + 1,
            truncate(error.lines().last().unwrap_or_default(), 100)
        )),
        PlanEvent::AutoFixStarted { attempt, .. } => Some(format!(
            "{} auto-fix attempt {attempt}",
            style("retry").yellow()
        )),
        PlanEvent::GenerationFailed {
            used_partial_code: true,
            ..
        } => Some(format!(
            "{} generation failed, using partial code",
            style("warn").yellow()
        )),
        PlanEvent::CoverageReached { .. } => {
            Some(format!("{} analysis fully covered", style("info").blue()))
        }
        PlanEvent::RunCancelled { at_index } => Some(format!(
            "{} cancelled at step {}",
            style("stop").red(),
            at_index + 1
        )),
        _ => None,
    }
}
