//! Plan execution.
//!
//! Applies a plan's actions strictly in order. Before every placing
//! action the executor re-checks that the filesystem still matches what
//! the plan recorded; a mismatch fails that one action as stale and
//! execution continues with the next. Moves are plain renames where
//! possible and copy-verify-delete across volumes, so the original is
//! only ever removed once the copy is proven complete.
//!
//! Execution is infallible at the top level: it always returns an
//! [`ExecutionResult`] with a status for every action, even when the run
//! was cancelled partway.

use std::fs;
use std::io;
use std::path::Path;

use crate::duplicates::{fingerprint_file, fingerprint_hex};
use crate::plan::{OrganizePlan, PlannedAction};
use crate::progress::{CancelToken, Phase, ProgressReporter};

/// Why one action failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The filesystem no longer matches what the plan recorded.
    PlanStale,
    PermissionDenied,
    /// Any other I/O failure, such as a full disk or a vanished device.
    Io,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::PlanStale => write!(f, "plan stale"),
            FailureKind::PermissionDenied => write!(f, "permission denied"),
            FailureKind::Io => write!(f, "I/O failure"),
        }
    }
}

/// Outcome of a single action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionStatus {
    Succeeded,
    Failed { kind: FailureKind, reason: String },
    /// Execution was cancelled before this action's turn.
    NotAttempted,
}

/// One action paired with what happened to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub action: PlannedAction,
    pub status: ActionStatus,
}

/// Report for one execution run; one outcome per plan action, in plan
/// order.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub outcomes: Vec<ActionOutcome>,
    /// Placements actually performed (moves, renames and overwrites).
    pub moved: usize,
    /// Skip actions acknowledged.
    pub skipped: usize,
    pub failed: usize,
    pub not_attempted: usize,
}

impl ExecutionResult {
    /// True when every action ran and none failed.
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0 && self.not_attempted == 0
    }

    /// The failed actions with their reasons, in plan order.
    pub fn failures(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ActionStatus::Failed { .. }))
    }
}

struct Failure {
    kind: FailureKind,
    reason: String,
}

fn stale(reason: &str) -> Failure {
    Failure {
        kind: FailureKind::PlanStale,
        reason: reason.to_string(),
    }
}

fn io_failure(context: &str, error: &io::Error) -> Failure {
    let kind = if error.kind() == io::ErrorKind::PermissionDenied {
        FailureKind::PermissionDenied
    } else {
        FailureKind::Io
    };
    Failure {
        kind,
        reason: format!("{}: {}", context, error),
    }
}

/// Applies every action of `plan` in order.
///
/// A failed action is recorded and execution moves on; nothing is rolled
/// back. When `cancel` fires, the current action still completes and all
/// remaining actions are reported as [`ActionStatus::NotAttempted`].
///
/// # Examples
///
/// ```no_run
/// use tidyplan::executor::execute;
/// use tidyplan::plan::OrganizePlan;
/// use tidyplan::progress::ProgressReporter;
/// use std::path::Path;
///
/// let plan = OrganizePlan::load(Path::new("plan.json")).unwrap();
/// let result = execute(&plan, &ProgressReporter::new(None), None);
/// println!("{} files moved, {} failed", result.moved, result.failed);
/// ```
pub fn execute(
    plan: &OrganizePlan,
    reporter: &ProgressReporter<'_>,
    cancel: Option<&CancelToken>,
) -> ExecutionResult {
    let total = plan.actions.len() as u64;
    let mut result = ExecutionResult {
        outcomes: Vec::with_capacity(plan.actions.len()),
        ..Default::default()
    };

    for (index, action) in plan.actions.iter().enumerate() {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            for remaining in &plan.actions[index..] {
                result.outcomes.push(ActionOutcome {
                    action: remaining.clone(),
                    status: ActionStatus::NotAttempted,
                });
                result.not_attempted += 1;
            }
            break;
        }

        let status = apply_action(action);
        match (&status, action) {
            (ActionStatus::Succeeded, PlannedAction::Skip { .. }) => result.skipped += 1,
            (ActionStatus::Succeeded, _) => result.moved += 1,
            (ActionStatus::Failed { .. }, _) => result.failed += 1,
            (ActionStatus::NotAttempted, _) => result.not_attempted += 1,
        }
        reporter.report(Phase::Execute, index as u64 + 1, total, action.source());
        result.outcomes.push(ActionOutcome {
            action: action.clone(),
            status,
        });
    }

    reporter.complete(Phase::Execute, result.outcomes.len() as u64, total);
    result
}

fn apply_action(action: &PlannedAction) -> ActionStatus {
    let applied = match action {
        PlannedAction::Skip { .. } => Ok(()),
        PlannedAction::Move {
            source,
            destination,
        }
        | PlannedAction::RenameAndMove {
            source,
            destination,
            ..
        } => place(source, destination),
        PlannedAction::Overwrite {
            source,
            destination,
            existing_size,
            existing_fingerprint,
        } => replace(source, destination, *existing_size, existing_fingerprint),
    };
    match applied {
        Ok(()) => ActionStatus::Succeeded,
        Err(failure) => ActionStatus::Failed {
            kind: failure.kind,
            reason: failure.reason,
        },
    }
}

/// Move onto a destination the plan recorded as free.
fn place(source: &Path, destination: &Path) -> Result<(), Failure> {
    if fs::symlink_metadata(source).is_err() {
        return Err(stale("source file is gone"));
    }
    if fs::symlink_metadata(destination).is_ok() {
        return Err(stale("destination is no longer free"));
    }
    prepare_parent(destination)?;
    move_file(source, destination).map_err(|e| io_failure("move failed", &e))
}

/// Replace a destination occupant the plan fingerprinted. The occupant
/// must still match the recorded size and fingerprint exactly.
fn replace(
    source: &Path,
    destination: &Path,
    existing_size: u64,
    existing_fingerprint: &str,
) -> Result<(), Failure> {
    if fs::symlink_metadata(source).is_err() {
        return Err(stale("source file is gone"));
    }
    let meta = match fs::symlink_metadata(destination) {
        Ok(meta) => meta,
        Err(_) => return Err(stale("destination occupant is gone")),
    };
    if !meta.is_file() || meta.len() != existing_size {
        return Err(stale("destination changed since planning"));
    }
    let occupant =
        fingerprint_file(destination).map_err(|e| io_failure("cannot verify destination", &e))?;
    if fingerprint_hex(&occupant) != existing_fingerprint {
        return Err(stale("destination changed since planning"));
    }

    fs::remove_file(destination).map_err(|e| io_failure("cannot replace destination", &e))?;
    move_file(source, destination).map_err(|e| io_failure("move failed", &e))
}

fn prepare_parent(destination: &Path) -> Result<(), Failure> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| io_failure("cannot create category directory", &e))?;
    }
    Ok(())
}

/// Rename where possible, copy-verify-delete across volumes.
pub(crate) fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            copy_verify_delete(source, destination)
        }
        Err(e) => Err(e),
    }
}

/// Cross-volume move. The source is deleted only after the copy's size
/// and fingerprint both check out, so an interrupted copy never costs
/// the original.
fn copy_verify_delete(source: &Path, destination: &Path) -> io::Result<()> {
    let source_meta = fs::metadata(source)?;
    let modified = source_meta.modified().ok();

    fs::copy(source, destination)?;

    let copied = fs::metadata(destination)?;
    let matches = copied.len() == source_meta.len()
        && fingerprint_file(destination)? == fingerprint_file(source)?;
    if !matches {
        let _ = fs::remove_file(destination);
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "copy verification failed",
        ));
    }

    // Restoring the timestamp never fails the move.
    if let Some(modified) = modified
        && let Ok(file) = fs::File::options().write(true).open(destination)
    {
        let _ = file.set_modified(modified);
    }

    fs::remove_file(source)?;
    Ok(())
}
