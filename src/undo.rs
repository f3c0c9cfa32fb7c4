//! Receipts and undo.
//!
//! Every execution that moves files can be recorded as an
//! [`ExecutionReceipt`] stored inside the organized root. Undo replays
//! the receipt in reverse, moving files back where they came from.
//! Overwrites are deliberately not recorded: the replaced content is
//! gone, so there is nothing coherent to restore.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::executor::{ActionStatus, ExecutionResult, move_file};
use crate::plan::PlannedAction;

/// File name of the receipt, stored directly under the organized root.
/// The scanner never picks it up.
pub const RECEIPT_FILE_NAME: &str = ".tidyplan_receipt.json";

/// One completed placement, kept so it can be reversed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedMove {
    /// Where the file lived before execution.
    pub from: PathBuf,
    /// Where execution put it.
    pub to: PathBuf,
}

/// Record of the placements one execution actually performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    /// RFC 3339 timestamp of the execution.
    pub executed_at: String,
    /// Root the category directories live under.
    pub organized_root: PathBuf,
    /// Successful moves and renames, in execution order.
    pub moves: Vec<CompletedMove>,
}

impl ExecutionReceipt {
    /// Collects the successful moves and renames out of an execution
    /// result. Skips, failures and overwrites are left out.
    pub fn from_result(organized_root: &Path, result: &ExecutionResult) -> Self {
        let moves = result
            .outcomes
            .iter()
            .filter(|outcome| outcome.status == ActionStatus::Succeeded)
            .filter_map(|outcome| match &outcome.action {
                PlannedAction::Move {
                    source,
                    destination,
                }
                | PlannedAction::RenameAndMove {
                    source,
                    destination,
                    ..
                } => Some(CompletedMove {
                    from: source.clone(),
                    to: destination.clone(),
                }),
                _ => None,
            })
            .collect();
        Self {
            executed_at: chrono::Utc::now().to_rfc3339(),
            organized_root: organized_root.to_path_buf(),
            moves,
        }
    }

    /// True when the execution moved nothing; such a receipt is not
    /// worth writing.
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// The receipt location for an organized root.
    pub fn path_for(organized_root: &Path) -> PathBuf {
        organized_root.join(RECEIPT_FILE_NAME)
    }

    /// Writes the receipt under the organized root as JSON.
    pub fn save(&self, organized_root: &Path) -> Result<(), UndoError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| UndoError::ReceiptFormat {
            reason: e.to_string(),
        })?;
        fs::write(Self::path_for(organized_root), json)
            .map_err(|e| UndoError::ReceiptWrite { source: e })
    }

    /// Loads the receipt for an organized root, `None` when no execution
    /// has been recorded there.
    pub fn load(organized_root: &Path) -> Result<Option<Self>, UndoError> {
        let path = Self::path_for(organized_root);
        if !path.exists() {
            return Ok(None);
        }
        let json =
            fs::read_to_string(&path).map_err(|e| UndoError::ReceiptRead { source: e })?;
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| UndoError::ReceiptFormat {
                reason: e.to_string(),
            })
    }

    /// Removes the receipt file if present.
    pub fn delete(organized_root: &Path) -> Result<(), UndoError> {
        let path = Self::path_for(organized_root);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| UndoError::ReceiptWrite { source: e })?;
        }
        Ok(())
    }
}

/// Errors that fail an undo as a whole.
#[derive(Debug)]
pub enum UndoError {
    /// The organized root does not exist.
    InvalidRoot { path: PathBuf, source: io::Error },
    /// No receipt is stored under the organized root.
    NoReceipt(PathBuf),
    /// Failed to read the receipt file.
    ReceiptRead { source: io::Error },
    /// Failed to write or delete the receipt file.
    ReceiptWrite { source: io::Error },
    /// The receipt file is not valid receipt JSON.
    ReceiptFormat { reason: String },
}

impl std::fmt::Display for UndoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UndoError::InvalidRoot { path, source } => {
                write!(f, "Invalid organized root {}: {}", path.display(), source)
            }
            UndoError::NoReceipt(path) => {
                write!(f, "No execution receipt found under {}", path.display())
            }
            UndoError::ReceiptRead { source } => {
                write!(f, "Failed to read receipt: {}", source)
            }
            UndoError::ReceiptWrite { source } => {
                write!(f, "Failed to write receipt: {}", source)
            }
            UndoError::ReceiptFormat { reason } => {
                write!(f, "Invalid receipt format: {}", reason)
            }
        }
    }
}

impl std::error::Error for UndoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UndoError::InvalidRoot { source, .. }
            | UndoError::ReceiptRead { source }
            | UndoError::ReceiptWrite { source } => Some(source),
            _ => None,
        }
    }
}

/// What happened while reverting a receipt.
#[derive(Debug)]
pub struct RevertReport {
    /// Files moved back to their original paths.
    pub restored: usize,
    /// Files that could not be restored, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Files no longer at their organized location, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

impl RevertReport {
    fn new() -> Self {
        Self {
            restored: 0,
            failed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Total receipt entries processed.
    pub fn total_processed(&self) -> usize {
        self.restored + self.failed.len() + self.skipped.len()
    }

    /// True when every recorded move was reverted.
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

enum Restore {
    Restored,
    Skipped(String),
    Failed(String),
}

/// Reverts the receipt stored under `organized_root`.
///
/// Moves are undone in reverse execution order. A file already sitting
/// at an original path is backed up with a timestamp suffix before the
/// organized copy moves back. The receipt is deleted only when every
/// entry was restored, so a partial undo can be retried.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use tidyplan::undo::undo;
///
/// match undo(Path::new("/data/inbox")) {
///     Ok(report) => println!("Restored {} files", report.restored),
///     Err(e) => eprintln!("Undo failed: {}", e),
/// }
/// ```
pub fn undo(organized_root: &Path) -> Result<RevertReport, UndoError> {
    if !organized_root.exists() {
        return Err(UndoError::InvalidRoot {
            path: organized_root.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "organized root does not exist"),
        });
    }

    let receipt = ExecutionReceipt::load(organized_root)?
        .ok_or_else(|| UndoError::NoReceipt(organized_root.to_path_buf()))?;

    let mut report = RevertReport::new();
    for entry in receipt.moves.iter().rev() {
        match restore_move(entry) {
            Restore::Restored => report.restored += 1,
            Restore::Skipped(reason) => report.skipped.push((entry.to.clone(), reason)),
            Restore::Failed(reason) => report.failed.push((entry.to.clone(), reason)),
        }
    }

    if report.is_complete_success()
        && let Err(e) = ExecutionReceipt::delete(organized_root)
    {
        eprintln!("Warning: could not delete receipt file: {}", e);
    }

    Ok(report)
}

/// Moves one receipt entry back, backing up any conflicting occupant.
fn restore_move(entry: &CompletedMove) -> Restore {
    if fs::symlink_metadata(&entry.to).is_err() {
        return Restore::Skipped("file not found at its organized location".to_string());
    }

    if fs::symlink_metadata(&entry.from).is_ok() {
        let backup = backup_path(&entry.from);
        if let Err(e) = fs::rename(&entry.from, &backup) {
            return Restore::Failed(format!("could not back up conflicting file: {}", e));
        }
    }

    match move_file(&entry.to, &entry.from) {
        Ok(()) => Restore::Restored,
        Err(e) => Restore::Failed(format!("could not restore file: {}", e)),
    }
}

/// Backup name for a conflicting file: `name.bak.20260823-143052`.
fn backup_path(original: &Path) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let name = original
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let backup = format!("{}.bak.{}", name, timestamp);
    match original.parent() {
        Some(parent) => parent.join(backup),
        None => PathBuf::from(backup),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicates::{DuplicateOptions, find_duplicates};
    use crate::executor::execute;
    use crate::metadata;
    use crate::plan::{DuplicatePolicy, build_plan};
    use crate::progress::ProgressReporter;
    use crate::ruleset::RuleSet;
    use tempfile::TempDir;

    fn organize(root: &Path, paths: &[PathBuf], policy: DuplicatePolicy) -> ExecutionReceipt {
        let records: Vec<_> = paths
            .iter()
            .map(|p| metadata::extract(p).unwrap().record)
            .collect();
        let duplicates = find_duplicates(
            &records,
            &DuplicateOptions::default(),
            &ProgressReporter::new(None),
            None,
        );
        let plan = build_plan(
            &records,
            &duplicates,
            &RuleSet::standard(),
            policy,
            root,
            root,
        );
        let result = execute(&plan, &ProgressReporter::new(None), None);
        assert!(result.is_complete_success());
        ExecutionReceipt::from_result(root, &result)
    }

    #[test]
    fn undo_without_receipt_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            undo(dir.path()),
            Err(UndoError::NoReceipt(_))
        ));
    }

    #[test]
    fn undo_restores_a_moved_file() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("letter.txt");
        fs::write(&original, "dear reader").unwrap();

        let receipt = organize(dir.path(), &[original.clone()], DuplicatePolicy::Keep);
        receipt.save(dir.path()).unwrap();
        let moved = dir.path().join("documents").join("letter.txt");
        assert!(!original.exists());
        assert!(moved.exists());

        let report = undo(dir.path()).unwrap();

        assert_eq!(report.restored, 1);
        assert!(report.is_complete_success());
        assert!(original.exists());
        assert!(!moved.exists());
        assert!(!ExecutionReceipt::path_for(dir.path()).exists());
    }

    #[test]
    fn undo_restores_every_recorded_move() {
        let dir = TempDir::new().unwrap();
        let letter = dir.path().join("letter.txt");
        let memo = dir.path().join("memo.txt");
        fs::write(&letter, "first document").unwrap();
        fs::write(&memo, "second one").unwrap();

        let receipt = organize(
            dir.path(),
            &[letter.clone(), memo.clone()],
            DuplicatePolicy::Keep,
        );
        receipt.save(dir.path()).unwrap();

        let report = undo(dir.path()).unwrap();

        assert_eq!(report.restored, 2);
        assert!(letter.exists());
        assert!(memo.exists());
    }

    #[test]
    fn conflicting_file_is_backed_up_before_restore() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("letter.txt");
        fs::write(&original, "original content").unwrap();

        let receipt = organize(dir.path(), &[original.clone()], DuplicatePolicy::Keep);
        receipt.save(dir.path()).unwrap();

        // A new file shows up at the original path before the undo.
        fs::write(&original, "newcomer").unwrap();
        let report = undo(dir.path()).unwrap();

        assert_eq!(report.restored, 1);
        assert!(report.failed.is_empty());
        assert_eq!(fs::read_to_string(&original).unwrap(), "original content");

        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".bak."))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(
            fs::read_to_string(backups[0].path()).unwrap(),
            "newcomer"
        );
    }

    #[test]
    fn missing_moved_file_is_skipped_and_receipt_kept() {
        let dir = TempDir::new().unwrap();
        let receipt = ExecutionReceipt {
            executed_at: chrono::Utc::now().to_rfc3339(),
            organized_root: dir.path().to_path_buf(),
            moves: vec![CompletedMove {
                from: dir.path().join("ghost.txt"),
                to: dir.path().join("documents").join("ghost.txt"),
            }],
        };
        receipt.save(dir.path()).unwrap();

        let report = undo(dir.path()).unwrap();

        assert_eq!(report.restored, 0);
        assert_eq!(report.skipped.len(), 1);
        assert!(
            ExecutionReceipt::path_for(dir.path()).exists(),
            "a partial undo must keep the receipt for retry"
        );
    }

    #[test]
    fn overwrites_are_not_recorded_in_the_receipt() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("notes.txt");
        fs::write(&source, "the new content").unwrap();
        let occupant_dir = dir.path().join("documents");
        fs::create_dir_all(&occupant_dir).unwrap();
        fs::write(occupant_dir.join("notes.txt"), "old").unwrap();

        let receipt = organize(dir.path(), &[source], DuplicatePolicy::Overwrite);

        assert!(receipt.is_empty());
    }

    #[test]
    fn receipts_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let receipt = ExecutionReceipt {
            executed_at: chrono::Utc::now().to_rfc3339(),
            organized_root: dir.path().to_path_buf(),
            moves: vec![CompletedMove {
                from: dir.path().join("a.txt"),
                to: dir.path().join("documents").join("a.txt"),
            }],
        };
        receipt.save(dir.path()).unwrap();

        let loaded = ExecutionReceipt::load(dir.path()).unwrap().unwrap();
        assert_eq!(receipt, loaded);
    }
}
