//! Terminal rendering for the CLI.
//!
//! Turns plans, execution results and revert reports into colored
//! terminal output and builds the progress bars the subcommands share.
//! All styling lives here so the command handlers stay plain.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

use crate::executor::{ActionStatus, ExecutionResult};
use crate::plan::{OrganizePlan, PlannedAction};
use crate::undo::RevertReport;

pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success line in green with a checkmark.
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error line in red to stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning line in yellow.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an informational line in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Creates the progress bar shared by scanning and execution. The
    /// message slot carries the current phase label.
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} {msg:<14} [{wide_bar:.cyan/blue}] {pos}/{len}")
                .expect("Invalid progress bar template")
                .progress_chars("█▓░"),
        );
        pb
    }

    /// Renders a plan action by action: moves with their destinations,
    /// renames with the chosen name, skips with the reason. Warnings and
    /// the per-category totals follow.
    pub fn plan_preview(plan: &OrganizePlan) {
        println!(
            "\n{}",
            format!(
                "Plan for {} ({} files)",
                plan.scan_root.display(),
                plan.summary.total_files
            )
            .bold()
        );

        for action in &plan.actions {
            match action {
                PlannedAction::Move {
                    source,
                    destination,
                } => {
                    println!(
                        "  {} {} -> {}",
                        "move".green(),
                        source.display(),
                        destination.display()
                    );
                }
                PlannedAction::RenameAndMove {
                    source,
                    destination,
                    new_name,
                } => {
                    println!(
                        "  {} {} -> {} (as {})",
                        "rename".cyan(),
                        source.display(),
                        destination.display(),
                        new_name
                    );
                }
                PlannedAction::Overwrite {
                    source,
                    destination,
                    ..
                } => {
                    println!(
                        "  {} {} -> {}",
                        "overwrite".yellow(),
                        source.display(),
                        destination.display()
                    );
                }
                PlannedAction::Skip { source, reason } => {
                    println!("  {} {} ({})", "skip".dimmed(), source.display(), reason);
                }
            }
        }

        for warning in &plan.warnings {
            Self::warning(&warning.to_string());
        }
        Self::category_table(plan);
    }

    /// Planned placements per top-level category directory, in name order.
    fn category_counts(plan: &OrganizePlan) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for action in &plan.actions {
            if let Some(destination) = action.destination()
                && let Ok(relative) = destination.strip_prefix(&plan.organized_root)
                && let Some(first) = relative.components().next()
            {
                let name = first.as_os_str().to_string_lossy().into_owned();
                *counts.entry(name).or_insert(0) += 1;
            }
        }
        counts
    }

    fn category_table(plan: &OrganizePlan) {
        let counts = Self::category_counts(plan);
        if counts.is_empty() {
            return;
        }

        let width = counts.keys().map(String::len).max().unwrap_or(0).max(8);
        println!("\n{}", "Placements".bold());
        for (category, count) in &counts {
            let file_word = if *count == 1 { "file" } else { "files" };
            println!(
                "  {:<width$}  {} {}",
                category,
                count.to_string().green(),
                file_word
            );
        }

        let s = &plan.summary;
        println!(
            "  {} moves, {} renames, {} overwrites, {} skips ({} duplicates)",
            s.moves, s.renames, s.overwrites, s.skips, s.duplicate_skips
        );
    }

    /// Prints the outcome of an executed plan, detailing every failure.
    pub fn execution_report(plan: &OrganizePlan, result: &ExecutionResult) {
        Self::success(&format!(
            "Moved {} files ({} skipped)",
            result.moved, result.skipped
        ));

        for outcome in result.failures() {
            if let ActionStatus::Failed { kind, reason } = &outcome.status {
                Self::error(&format!("{} [{}]: {}", outcome.action, kind, reason));
            }
        }
        if result.failed > 0 {
            eprintln!("\nSome files could not be organized; review the errors above.");
        }
        if result.not_attempted > 0 {
            Self::warning(&format!(
                "{} actions were not attempted",
                result.not_attempted
            ));
        }

        if result.moved > 0 {
            println!(
                "Receipt saved. Run 'tidyplan undo {}' to revert.",
                plan.organized_root.display()
            );
        }
    }

    /// Prints the outcome of an undo run.
    pub fn revert_report(report: &RevertReport) {
        Self::success(&format!("Restored {} files", report.restored));

        for (path, reason) in &report.skipped {
            Self::warning(&format!("Skipped {}: {}", path.display(), reason));
        }
        if !report.failed.is_empty() {
            Self::error(&format!(
                "Failed to restore {} files",
                report.failed.len()
            ));
            for (path, reason) in &report.failed {
                eprintln!("    - {}: {}", path.display(), reason);
            }
            eprintln!("\nThe receipt was kept; fix the issues and run undo again.");
        }
    }

    /// Prints the scan-mode reminder that nothing was touched.
    pub fn preview_notice() {
        println!("{}", "[PREVIEW] No files were modified.".yellow());
    }
}
