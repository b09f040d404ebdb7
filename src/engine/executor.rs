//! Terminal integration for the wave executor

use anyhow::Result;
use colored::Colorize;
use declarative::{ApplyResult, ConfirmCallback, ExecuteSummary, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

use crate::ui;

/// Progress bar over every change in the set
pub struct UiProgress {
    bar: ProgressBar,
    verbose: bool,
}

impl UiProgress {
    pub fn new(total: usize, verbose: bool) -> Result<Self> {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")?
                .progress_chars("=>-"),
        );
        Ok(Self { bar, verbose })
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for UiProgress {
    fn on_wave_start(&mut self, wave: usize, count: usize) {
        log::info!("Wave {}: {} resource(s)", wave + 1, count);
        if self.verbose {
            self.bar
                .println(format!("  {} wave {} ({count})", "→".cyan(), wave + 1));
        }
    }

    fn on_resource_start(&mut self, id: &str, description: &str) {
        self.bar
            .set_message(format!("{} {}", description, ui::truncate_left(id, 30)));
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        let symbol = match result {
            ApplyResult::NoChange | ApplyResult::Retained => "○",
            ApplyResult::Created | ApplyResult::Modified | ApplyResult::Removed => "✓",
            ApplyResult::Failed { .. } => "✗",
            ApplyResult::Skipped { .. } => "⊘",
        };

        match result {
            ApplyResult::Failed { error } => {
                self.bar
                    .println(format!("    {} {}: {}", symbol.red(), id, error));
            }
            ApplyResult::Skipped { reason } => {
                self.bar
                    .println(format!("    {} {}: {}", symbol.yellow(), id, reason.dimmed()));
            }
            _ if self.verbose => {
                self.bar
                    .println(format!("    {} {}", symbol.green(), id));
            }
            _ => {}
        }

        self.bar.set_message(format!("{symbol} {id}"));
        self.bar.inc(1);
    }

    fn on_wave_complete(&mut self) {}
}

/// Interactive confirmation, skipped with `--yes`
pub struct DialoguerConfirm {
    pub yes: bool,
}

impl ConfirmCallback for DialoguerConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.yes {
            return Ok(true);
        }

        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary, action: &str) {
    println!();
    if summary.is_success() {
        println!("  {} Stack {} successfully!", "✓".green().bold(), action);
    } else {
        println!("  {} Stack {} with errors", "⚠".yellow().bold(), action);
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.retained > 0 {
        println!("    • {} resources retained", summary.retained);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
