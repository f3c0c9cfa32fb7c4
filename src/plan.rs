//! Move planning.
//!
//! Turns scanned records, classification rules and duplicate groups into
//! an [`OrganizePlan`]: an ordered list of actions plus a summary.
//! Planning never modifies the filesystem. It probes destination state
//! read-only and records what it saw inside the actions, so the executor
//! can re-verify that nothing changed before it acts. Built twice over
//! an unchanged tree, a plan serializes to identical bytes.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::duplicates::{DuplicateOutcome, Fingerprint, fingerprint_file, fingerprint_hex};
use crate::metadata::{FileRecord, ScanWarning, WarningKind};
use crate::ruleset::RuleSet;

/// What to do when a destination is already occupied by different content.
///
/// Identical content at the destination is always a skip, regardless of
/// policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Leave the source file where it is.
    #[default]
    Keep,
    /// Replace the occupant with the source file.
    Overwrite,
    /// Move the source under a numbered name that is still free.
    Rename,
}

/// Why a file is left where it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The file's content is carried by another member of its duplicate
    /// group. `destination` is where that member will live after the
    /// plan runs.
    Duplicate {
        representative: PathBuf,
        destination: PathBuf,
    },
    /// The file already sits at its classified destination.
    AlreadyOrganized,
    /// A byte-identical copy already exists at the destination.
    IdenticalAtDestination { destination: PathBuf },
    /// The destination holds different content and the policy keeps it.
    KeepExisting { destination: PathBuf },
    /// The destination is occupied by something that could not be
    /// examined; the planner refuses to touch it.
    UnverifiedDestination { destination: PathBuf },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Duplicate { representative, .. } => {
                write!(f, "duplicate of {}", representative.display())
            }
            SkipReason::AlreadyOrganized => write!(f, "already in place"),
            SkipReason::IdenticalAtDestination { destination } => {
                write!(f, "identical content at {}", destination.display())
            }
            SkipReason::KeepExisting { destination } => {
                write!(f, "destination {} is taken", destination.display())
            }
            SkipReason::UnverifiedDestination { destination } => {
                write!(f, "destination {} could not be verified", destination.display())
            }
        }
    }
}

/// One planned step. Only `Move`, `RenameAndMove` and `Overwrite` place a
/// file; within one plan no two placing actions share a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    /// Move the source to a free destination.
    Move { source: PathBuf, destination: PathBuf },
    /// Leave the source in place.
    Skip { source: PathBuf, reason: SkipReason },
    /// Move the source under a new name because its natural destination
    /// is taken.
    RenameAndMove {
        source: PathBuf,
        destination: PathBuf,
        new_name: String,
    },
    /// Replace the destination's current content. The occupant's size and
    /// fingerprint at planning time are recorded so execution can detect
    /// that the file changed in between.
    Overwrite {
        source: PathBuf,
        destination: PathBuf,
        existing_size: u64,
        existing_fingerprint: String,
    },
}

impl PlannedAction {
    pub fn source(&self) -> &Path {
        match self {
            PlannedAction::Move { source, .. }
            | PlannedAction::Skip { source, .. }
            | PlannedAction::RenameAndMove { source, .. }
            | PlannedAction::Overwrite { source, .. } => source,
        }
    }

    /// The path this action places a file at. `None` for skips.
    pub fn destination(&self) -> Option<&Path> {
        match self {
            PlannedAction::Move { destination, .. }
            | PlannedAction::RenameAndMove { destination, .. }
            | PlannedAction::Overwrite { destination, .. } => Some(destination),
            PlannedAction::Skip { .. } => None,
        }
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlannedAction::Move {
                source,
                destination,
            } => write!(f, "move {} -> {}", source.display(), destination.display()),
            PlannedAction::Skip { source, reason } => {
                write!(f, "skip {} ({})", source.display(), reason)
            }
            PlannedAction::RenameAndMove {
                source,
                destination,
                ..
            } => write!(f, "rename {} -> {}", source.display(), destination.display()),
            PlannedAction::Overwrite {
                source,
                destination,
                ..
            } => write!(
                f,
                "overwrite {} -> {}",
                source.display(),
                destination.display()
            ),
        }
    }
}

/// Aggregate counts over a plan's actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Number of scanned files the plan covers (one action each).
    pub total_files: usize,
    pub moves: usize,
    pub renames: usize,
    pub overwrites: usize,
    pub skips: usize,
    /// How many of the skips are duplicate losers.
    pub duplicate_skips: usize,
    /// Total size of the files that will change location.
    pub bytes_to_move: u64,
}

/// An ordered, immutable description of one organization run.
///
/// The plan is the hand-off artifact between planning and execution: it
/// can be rendered with [`preview`](OrganizePlan::preview), saved to disk
/// and loaded back, and executed as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizePlan {
    /// Root that was scanned.
    pub scan_root: PathBuf,
    /// Root the category directories live under.
    pub organized_root: PathBuf,
    /// Actions in execution order.
    pub actions: Vec<PlannedAction>,
    pub summary: PlanSummary,
    /// Problems observed while scanning and planning.
    pub warnings: Vec<ScanWarning>,
}

/// Errors from persisting or restoring a plan.
#[derive(Debug)]
pub enum PlanIoError {
    /// Failed to write the plan file.
    Write { path: PathBuf, source: io::Error },
    /// Failed to read the plan file.
    Read { path: PathBuf, source: io::Error },
    /// The plan file or value is not valid plan JSON.
    Format { reason: String },
}

impl std::fmt::Display for PlanIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanIoError::Write { path, source } => {
                write!(f, "Failed to write plan {}: {}", path.display(), source)
            }
            PlanIoError::Read { path, source } => {
                write!(f, "Failed to read plan {}: {}", path.display(), source)
            }
            PlanIoError::Format { reason } => write!(f, "Invalid plan format: {}", reason),
        }
    }
}

impl std::error::Error for PlanIoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlanIoError::Write { source, .. } | PlanIoError::Read { source, .. } => Some(source),
            PlanIoError::Format { .. } => None,
        }
    }
}

impl OrganizePlan {
    /// True when executing the plan would not change the filesystem.
    pub fn is_noop(&self) -> bool {
        self.summary.moves + self.summary.renames + self.summary.overwrites == 0
    }

    /// Serializes the plan as pretty JSON. Identical plans yield
    /// identical bytes.
    pub fn to_json(&self) -> Result<String, PlanIoError> {
        serde_json::to_string_pretty(self).map_err(|e| PlanIoError::Format {
            reason: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, PlanIoError> {
        serde_json::from_str(json).map_err(|e| PlanIoError::Format {
            reason: e.to_string(),
        })
    }

    /// Writes the plan to a file as JSON.
    pub fn save(&self, path: &Path) -> Result<(), PlanIoError> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| PlanIoError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Reads a plan previously written with [`save`](OrganizePlan::save).
    pub fn load(path: &Path) -> Result<Self, PlanIoError> {
        let json = fs::read_to_string(path).map_err(|e| PlanIoError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&json)
    }

    /// Renders the plan as plain text, one line per action.
    ///
    /// The preview lists exactly the actions that execution will apply,
    /// in the same order. Paths are shown relative to the scan root and
    /// organized root where possible.
    pub fn preview(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Plan for {}\n", self.scan_root.display()));
        out.push_str(&format!(
            "Organized under {}\n\n",
            self.organized_root.display()
        ));

        for action in &self.actions {
            let line = match action {
                PlannedAction::Move {
                    source,
                    destination,
                } => format!(
                    "  {:<10} {} -> {}",
                    "move",
                    self.relative_source(source),
                    self.relative_destination(destination)
                ),
                PlannedAction::RenameAndMove {
                    source,
                    destination,
                    ..
                } => format!(
                    "  {:<10} {} -> {}",
                    "rename",
                    self.relative_source(source),
                    self.relative_destination(destination)
                ),
                PlannedAction::Overwrite {
                    source,
                    destination,
                    existing_size,
                    ..
                } => format!(
                    "  {:<10} {} -> {} (replaces {} bytes)",
                    "overwrite",
                    self.relative_source(source),
                    self.relative_destination(destination),
                    existing_size
                ),
                PlannedAction::Skip { source, reason } => {
                    format!("  {:<10} {} ({})", "skip", self.relative_source(source), reason)
                }
            };
            out.push_str(&line);
            out.push('\n');
        }

        let s = &self.summary;
        out.push_str(&format!(
            "\nSummary: {} moves, {} renames, {} overwrites, {} skips ({} duplicates), {} bytes to move\n",
            s.moves, s.renames, s.overwrites, s.skips, s.duplicate_skips, s.bytes_to_move
        ));
        if !self.warnings.is_empty() {
            out.push_str(&format!("Warnings: {}\n", self.warnings.len()));
        }
        out
    }

    fn relative_source(&self, path: &Path) -> String {
        path.strip_prefix(&self.scan_root)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    fn relative_destination(&self, path: &Path) -> String {
        path.strip_prefix(&self.organized_root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Builds the move plan for one scan.
///
/// Every record yields exactly one action. Files that are not duplicate
/// losers are planned in record order: classification picks a category,
/// the destination is `organized_root/category/filename`, and occupied
/// destinations are resolved per `policy`. Duplicate losers follow as
/// skips pointing at their group's kept member.
///
/// When a destination is claimed by an earlier action in the same plan,
/// the later file is never allowed to overwrite it; `Keep` skips it and
/// the other policies pick a numbered name. A destination that cannot be
/// examined is never touched either; the file is skipped with a warning.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use tidyplan::duplicates::DuplicateOutcome;
/// use tidyplan::plan::{DuplicatePolicy, build_plan};
/// use tidyplan::ruleset::RuleSet;
///
/// let records = Vec::new(); // from scanner::collect_records
/// let plan = build_plan(
///     &records,
///     &DuplicateOutcome::default(),
///     &RuleSet::standard(),
///     DuplicatePolicy::Keep,
///     Path::new("/data/inbox"),
///     Path::new("/data/inbox"),
/// );
/// println!("{}", plan.preview());
/// ```
pub fn build_plan(
    records: &[FileRecord],
    duplicates: &DuplicateOutcome,
    ruleset: &RuleSet,
    policy: DuplicatePolicy,
    scan_root: &Path,
    organized_root: &Path,
) -> OrganizePlan {
    let by_path: HashMap<&Path, &FileRecord> =
        records.iter().map(|r| (r.path.as_path(), r)).collect();

    // Resolve each group to its effective representative. A member that
    // already sits at its classified destination wins over the configured
    // keep rule, so re-running over an organized tree plans no moves.
    let mut group_rep: Vec<PathBuf> = Vec::with_capacity(duplicates.groups.len());
    let mut loser_group: HashMap<&Path, usize> = HashMap::new();
    for (index, group) in duplicates.groups.iter().enumerate() {
        let rep = group
            .paths
            .iter()
            .find(|path| {
                by_path
                    .get(path.as_path())
                    .and_then(|record| classified_destination(record, ruleset, organized_root))
                    .is_some_and(|dest| dest == **path)
            })
            .unwrap_or(&group.representative)
            .clone();
        for path in &group.paths {
            if *path != rep {
                loser_group.insert(path.as_path(), index);
            }
        }
        group_rep.push(rep);
    }

    let mut actions: Vec<PlannedAction> = Vec::with_capacity(records.len());
    let mut warnings: Vec<ScanWarning> = Vec::new();
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut final_location: HashMap<&Path, PathBuf> = HashMap::new();
    let mut fingerprints = duplicates.fingerprints.clone();

    for record in records {
        if loser_group.contains_key(record.path.as_path()) {
            continue;
        }
        let action = plan_record(
            record,
            policy,
            ruleset,
            organized_root,
            &mut claimed,
            &mut fingerprints,
            &mut warnings,
        );
        let location = action
            .destination()
            .unwrap_or_else(|| action.source())
            .to_path_buf();
        final_location.insert(record.path.as_path(), location);
        actions.push(action);
    }

    for record in records {
        let Some(&index) = loser_group.get(record.path.as_path()) else {
            continue;
        };
        let representative = group_rep[index].clone();
        let destination = final_location
            .get(representative.as_path())
            .cloned()
            .unwrap_or_else(|| representative.clone());
        actions.push(PlannedAction::Skip {
            source: record.path.clone(),
            reason: SkipReason::Duplicate {
                representative,
                destination,
            },
        });
    }

    let summary = tally(&actions, &by_path);
    OrganizePlan {
        scan_root: scan_root.to_path_buf(),
        organized_root: organized_root.to_path_buf(),
        actions,
        summary,
        warnings,
    }
}

/// `organized_root/category/filename` for a record, or `None` when the
/// path has no final component.
fn classified_destination(
    record: &FileRecord,
    ruleset: &RuleSet,
    organized_root: &Path,
) -> Option<PathBuf> {
    let name = record.path.file_name()?;
    let category = ruleset.classify(record);
    Some(organized_root.join(category.relative_path()).join(name))
}

fn plan_record(
    record: &FileRecord,
    policy: DuplicatePolicy,
    ruleset: &RuleSet,
    organized_root: &Path,
    claimed: &mut HashSet<PathBuf>,
    fingerprints: &mut HashMap<PathBuf, Fingerprint>,
    warnings: &mut Vec<ScanWarning>,
) -> PlannedAction {
    let source = record.path.clone();
    let Some(destination) = classified_destination(record, ruleset, organized_root) else {
        // Scanner output always carries a file name.
        return PlannedAction::Skip {
            source,
            reason: SkipReason::AlreadyOrganized,
        };
    };

    if destination == record.path {
        return PlannedAction::Skip {
            source,
            reason: SkipReason::AlreadyOrganized,
        };
    }

    if claimed.contains(&destination) {
        // An earlier action in this plan places a file here. Overwriting
        // it would clobber this plan's own output, so only Keep and a
        // fresh name are on the table.
        return match policy {
            DuplicatePolicy::Keep => PlannedAction::Skip {
                source,
                reason: SkipReason::KeepExisting { destination },
            },
            DuplicatePolicy::Overwrite | DuplicatePolicy::Rename => {
                rename_action(record, &destination, claimed)
            }
        };
    }

    match probe_destination(record, &destination, fingerprints) {
        Ok(DestinationState::Free) => {
            claimed.insert(destination.clone());
            PlannedAction::Move {
                source,
                destination,
            }
        }
        Ok(DestinationState::Identical) => PlannedAction::Skip {
            source,
            reason: SkipReason::IdenticalAtDestination { destination },
        },
        Ok(DestinationState::Differing { size, fingerprint }) => match policy {
            DuplicatePolicy::Keep => PlannedAction::Skip {
                source,
                reason: SkipReason::KeepExisting { destination },
            },
            DuplicatePolicy::Overwrite => {
                claimed.insert(destination.clone());
                PlannedAction::Overwrite {
                    source,
                    destination,
                    existing_size: size,
                    existing_fingerprint: fingerprint,
                }
            }
            DuplicatePolicy::Rename => rename_action(record, &destination, claimed),
        },
        Err(detail) => {
            warnings.push(ScanWarning {
                path: destination.clone(),
                kind: WarningKind::Destination,
                detail,
            });
            PlannedAction::Skip {
                source,
                reason: SkipReason::UnverifiedDestination { destination },
            }
        }
    }
}

enum DestinationState {
    Free,
    Identical,
    Differing { size: u64, fingerprint: String },
}

/// Read-only look at a destination path. `Err` carries a description of
/// why the occupant could not be examined.
fn probe_destination(
    record: &FileRecord,
    destination: &Path,
    fingerprints: &mut HashMap<PathBuf, Fingerprint>,
) -> Result<DestinationState, String> {
    let meta = match fs::symlink_metadata(destination) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DestinationState::Free),
        Err(e) => return Err(format!("cannot examine destination: {}", e)),
    };
    if !meta.is_file() {
        return Err("destination exists but is not a regular file".to_string());
    }

    let occupant = cached_fingerprint(destination, fingerprints)
        .map_err(|e| format!("cannot fingerprint destination: {}", e))?;
    if meta.len() == record.size {
        let own = cached_fingerprint(&record.path, fingerprints)
            .map_err(|e| format!("cannot fingerprint source: {}", e))?;
        if own == occupant {
            return Ok(DestinationState::Identical);
        }
    }
    Ok(DestinationState::Differing {
        size: meta.len(),
        fingerprint: fingerprint_hex(&occupant),
    })
}

fn cached_fingerprint(
    path: &Path,
    fingerprints: &mut HashMap<PathBuf, Fingerprint>,
) -> io::Result<Fingerprint> {
    if let Some(print) = fingerprints.get(path) {
        return Ok(*print);
    }
    let print = fingerprint_file(path)?;
    fingerprints.insert(path.to_path_buf(), print);
    Ok(print)
}

fn rename_action(
    record: &FileRecord,
    destination: &Path,
    claimed: &mut HashSet<PathBuf>,
) -> PlannedAction {
    let (candidate, new_name) = next_free_name(destination, claimed);
    claimed.insert(candidate.clone());
    PlannedAction::RenameAndMove {
        source: record.path.clone(),
        destination: candidate,
        new_name,
    }
}

/// First `stem_copyN.ext` name that is neither on disk nor claimed by an
/// earlier action in this plan.
fn next_free_name(destination: &Path, claimed: &HashSet<PathBuf>) -> (PathBuf, String) {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = destination
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = destination.parent().unwrap_or_else(|| Path::new(""));

    let mut counter = 1u32;
    loop {
        let name = format!("{}_copy{}{}", stem, counter, extension);
        let candidate = parent.join(&name);
        if !claimed.contains(&candidate) && fs::symlink_metadata(&candidate).is_err() {
            return (candidate, name);
        }
        counter += 1;
    }
}

fn tally(actions: &[PlannedAction], by_path: &HashMap<&Path, &FileRecord>) -> PlanSummary {
    let mut summary = PlanSummary {
        total_files: actions.len(),
        ..Default::default()
    };
    for action in actions {
        match action {
            PlannedAction::Move { .. } => summary.moves += 1,
            PlannedAction::RenameAndMove { .. } => summary.renames += 1,
            PlannedAction::Overwrite { .. } => summary.overwrites += 1,
            PlannedAction::Skip { reason, .. } => {
                summary.skips += 1;
                if matches!(reason, SkipReason::Duplicate { .. }) {
                    summary.duplicate_skips += 1;
                }
            }
        }
        if action.destination().is_some()
            && let Some(record) = by_path.get(action.source())
        {
            summary.bytes_to_move += record.size;
        }
    }
    summary
}
