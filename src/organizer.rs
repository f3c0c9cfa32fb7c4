//! End-to-end orchestration.
//!
//! [`scan`] chains traversal, metadata extraction, duplicate detection
//! and planning into a single call that produces an [`OrganizePlan`]
//! without touching any file. [`execute_plan`] applies a plan and stores
//! an undo receipt for whatever actually moved. Both take an optional
//! progress callback and cancel token; everything in between runs on one
//! bounded worker pool.

use std::fs;
use std::path::{Path, PathBuf};

use crate::duplicates::{DuplicateOptions, KeepRule, find_duplicates};
use crate::executor::{self, ExecutionResult};
use crate::plan::{DuplicatePolicy, OrganizePlan, build_plan};
use crate::progress::{CancelToken, ProgressFn, ProgressReporter};
use crate::ruleset::RuleSet;
use crate::scanner::{ScanError, ScanOptions, ScanOutcome, build_pool, collect_records};
use crate::undo::ExecutionReceipt;

/// Everything one organization run needs to know.
#[derive(Debug, Clone)]
pub struct OrganizeConfig {
    /// Where category directories are created. `None` organizes in place
    /// under the scan root.
    pub organized_root: Option<PathBuf>,
    /// Classification rules, applied first match wins.
    pub ruleset: RuleSet,
    /// Conflict handling for occupied destinations.
    pub duplicate_policy: DuplicatePolicy,
    /// Which member of a duplicate group is kept.
    pub keep_rule: KeepRule,
    /// Treat zero-byte files as duplicates of each other.
    pub match_empty_files: bool,
    /// Traversal and extraction options.
    pub scan: ScanOptions,
}

impl Default for OrganizeConfig {
    fn default() -> Self {
        Self {
            organized_root: None,
            ruleset: RuleSet::standard(),
            duplicate_policy: DuplicatePolicy::default(),
            keep_rule: KeepRule::default(),
            match_empty_files: false,
            scan: ScanOptions::default(),
        }
    }
}

/// Scans `root` and produces the full move plan.
///
/// This is the read-only half of an organization run: traversal,
/// metadata extraction, duplicate detection and planning, reported
/// through `progress` phase by phase. The returned plan can be
/// previewed, saved, or handed to [`execute_plan`] unchanged.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use tidyplan::organizer::{OrganizeConfig, scan};
///
/// let plan = scan(Path::new("/data/inbox"), &OrganizeConfig::default(), None, None)?;
/// print!("{}", plan.preview());
/// # Ok::<(), tidyplan::scanner::ScanError>(())
/// ```
pub fn scan(
    root: &Path,
    config: &OrganizeConfig,
    progress: Option<ProgressFn<'_>>,
    cancel: Option<&CancelToken>,
) -> Result<OrganizePlan, ScanError> {
    let reporter = ProgressReporter::new(progress);
    let pool = build_pool(config.scan.worker_threads)?;
    pool.install(|| scan_on_pool(root, config, &reporter, cancel))
}

fn scan_on_pool(
    root: &Path,
    config: &OrganizeConfig,
    reporter: &ProgressReporter<'_>,
    cancel: Option<&CancelToken>,
) -> Result<OrganizePlan, ScanError> {
    let ScanOutcome {
        root: scan_root,
        records,
        warnings: mut prior,
    } = collect_records(root, &config.scan, reporter, cancel)?;

    let options = DuplicateOptions {
        keep_rule: config.keep_rule,
        match_empty_files: config.match_empty_files,
    };
    let mut duplicates = find_duplicates(&records, &options, reporter, cancel);
    if cancel.is_some_and(|c| c.is_cancelled()) {
        return Err(ScanError::Cancelled);
    }
    prior.append(&mut duplicates.warnings);

    let organized_root = resolve_organized_root(config, &scan_root);
    let mut plan = build_plan(
        &records,
        &duplicates,
        &config.ruleset,
        config.duplicate_policy,
        &scan_root,
        &organized_root,
    );
    prior.append(&mut plan.warnings);
    plan.warnings = prior;

    if let Some(limit) = config.scan.max_warnings
        && plan.warnings.len() > limit
    {
        return Err(ScanError::TooManyWarnings {
            count: plan.warnings.len(),
            limit,
        });
    }
    Ok(plan)
}

/// The organized root in the same canonical form as the record paths,
/// so in-place files compare equal to their destinations.
fn resolve_organized_root(config: &OrganizeConfig, scan_root: &Path) -> PathBuf {
    match &config.organized_root {
        Some(root) => fs::canonicalize(root).unwrap_or_else(|_| root.clone()),
        None => scan_root.to_path_buf(),
    }
}

/// Executes a plan and stores an undo receipt under the organized root
/// when anything moved.
///
/// Receipt trouble never fails the run; by the time the receipt is
/// written the files have already moved, so the result is returned
/// as-is and the problem goes to stderr.
pub fn execute_plan(
    plan: &OrganizePlan,
    progress: Option<ProgressFn<'_>>,
    cancel: Option<&CancelToken>,
) -> ExecutionResult {
    let reporter = ProgressReporter::new(progress);
    let result = executor::execute(plan, &reporter, cancel);

    let receipt = ExecutionReceipt::from_result(&plan.organized_root, &result);
    if !receipt.is_empty()
        && let Err(e) = receipt.save(&plan.organized_root)
    {
        eprintln!("Warning: could not write undo receipt: {}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlannedAction;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn scan_plans_moves_for_a_messy_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "plain words in here").unwrap();
        fs::write(dir.path().join("data.bin"), [0u8, 1, 2, 3]).unwrap();

        let plan = scan(dir.path(), &OrganizeConfig::default(), None, None).unwrap();

        assert_eq!(plan.summary.total_files, 2);
        assert_eq!(plan.summary.moves, 2);
        let destinations: Vec<_> = plan
            .actions
            .iter()
            .filter_map(|a| a.destination())
            .map(|d| d.strip_prefix(&plan.organized_root).unwrap().to_path_buf())
            .collect();
        assert!(destinations.contains(&PathBuf::from("other/data.bin")));
        assert!(destinations.contains(&PathBuf::from("documents/notes.txt")));
    }

    #[test]
    fn executing_a_scan_twice_settles_into_a_noop() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "these words move once").unwrap();

        let first = scan(dir.path(), &OrganizeConfig::default(), None, None).unwrap();
        let result = execute_plan(&first, None, None);
        assert!(result.is_complete_success());
        assert_eq!(result.moved, 1);

        let second = scan(dir.path(), &OrganizeConfig::default(), None, None).unwrap();
        assert!(second.is_noop(), "re-scan after execution must plan no moves");
        assert!(matches!(
            second.actions[0],
            PlannedAction::Skip { .. }
        ));
    }

    #[test]
    fn execute_plan_records_a_receipt_for_undo() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "receipt material").unwrap();

        let plan = scan(dir.path(), &OrganizeConfig::default(), None, None).unwrap();
        execute_plan(&plan, None, None);

        let receipt = ExecutionReceipt::load(&plan.organized_root).unwrap().unwrap();
        assert_eq!(receipt.moves.len(), 1);
        assert!(receipt.moves[0].to.ends_with("documents/notes.txt"));
    }

    #[test]
    fn noop_execution_writes_no_receipt() {
        let dir = TempDir::new().unwrap();
        let settled = dir.path().join("documents");
        fs::create_dir_all(&settled).unwrap();
        fs::write(settled.join("done.txt"), "already sorted").unwrap();

        let plan = scan(dir.path(), &OrganizeConfig::default(), None, None).unwrap();
        assert!(plan.is_noop());
        execute_plan(&plan, None, None);

        assert!(ExecutionReceipt::load(&plan.organized_root).unwrap().is_none());
    }

    #[test]
    fn organized_root_can_differ_from_the_scan_root() {
        let dir = TempDir::new().unwrap();
        let inbox = dir.path().join("inbox");
        let sorted = dir.path().join("sorted");
        fs::create_dir_all(&inbox).unwrap();
        fs::create_dir_all(&sorted).unwrap();
        fs::write(inbox.join("notes.txt"), "crossing roots").unwrap();

        let config = OrganizeConfig {
            organized_root: Some(sorted.clone()),
            ..Default::default()
        };
        let plan = scan(&inbox, &config, None, None).unwrap();
        let result = execute_plan(&plan, None, None);

        assert!(result.is_complete_success());
        assert!(sorted.join("documents").join("notes.txt").exists());
        assert!(!inbox.join("notes.txt").exists());
    }

    #[test]
    fn pre_cancelled_scan_surfaces_cancellation() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "never read").unwrap();

        let token = CancelToken::new();
        token.cancel();
        let result = scan(dir.path(), &OrganizeConfig::default(), None, Some(&token));

        assert!(matches!(result, Err(ScanError::Cancelled)));
    }
}
