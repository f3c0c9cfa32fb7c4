//! Directory traversal and record collection.
//!
//! The scanner walks a root directory in deterministic name-sorted order,
//! applies the compiled filter rules, and extracts a [`FileRecord`] for
//! every kept file. Extraction fans out over the current rayon pool;
//! results are realigned with the traversal order afterwards, so the
//! returned records do not depend on thread scheduling.
//!
//! Per-file problems (unreadable files, failed traversal of a
//! subdirectory) become warnings in the outcome. Only root-level problems,
//! invalid filter rules, cancellation and a crossed warning threshold fail
//! the scan as a whole.

use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use walkdir::WalkDir;

use crate::filter::{FilterError, FilterRules};
use crate::metadata::{self, ExtractError, FileRecord, ScanWarning, WarningKind};
use crate::progress::{CancelToken, Phase, ProgressReporter};
use crate::undo::RECEIPT_FILE_NAME;

/// Options controlling traversal and extraction.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Descend into subdirectories. When false, only the root's immediate
    /// files are considered.
    pub recursive: bool,
    /// Cap on traversal depth when recursive (1 = the root's own entries).
    pub max_depth: Option<usize>,
    /// Follow symbolic links during traversal. Off by default, so links
    /// cannot pull files from outside the tree into the scan.
    pub follow_symlinks: bool,
    /// Worker threads for extraction and fingerprinting. 0 selects the
    /// default of twice the core count.
    pub worker_threads: usize,
    /// Which files the scan considers at all.
    pub filter: FilterRules,
    /// Fail the scan once more than this many warnings accumulate.
    /// `None` collects warnings without limit.
    pub max_warnings: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            max_depth: None,
            follow_symlinks: false,
            worker_threads: 0,
            filter: FilterRules::default(),
            max_warnings: None,
        }
    }
}

/// Errors that fail a scan as a whole.
#[derive(Debug)]
pub enum ScanError {
    /// The scan root does not exist.
    RootNotFound(PathBuf),
    /// The scan root is not a directory.
    NotADirectory(PathBuf),
    /// The scan root exists but cannot be read.
    RootUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The filter rules contain an invalid pattern.
    Filter(FilterError),
    /// The worker pool could not be created.
    WorkerPool(String),
    /// More warnings accumulated than `max_warnings` allows.
    TooManyWarnings { count: usize, limit: usize },
    /// The cancel token fired before the scan finished.
    Cancelled,
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::RootNotFound(path) => {
                write!(f, "Scan root not found: {}", path.display())
            }
            ScanError::NotADirectory(path) => {
                write!(f, "Scan root is not a directory: {}", path.display())
            }
            ScanError::RootUnreadable { path, source } => {
                write!(f, "Cannot read scan root {}: {}", path.display(), source)
            }
            ScanError::Filter(e) => write!(f, "{}", e),
            ScanError::WorkerPool(reason) => {
                write!(f, "Failed to create worker pool: {}", reason)
            }
            ScanError::TooManyWarnings { count, limit } => {
                write!(f, "Scan produced {} warnings (limit {})", count, limit)
            }
            ScanError::Cancelled => write!(f, "Scan cancelled"),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::RootUnreadable { source, .. } => Some(source),
            ScanError::Filter(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FilterError> for ScanError {
    fn from(e: FilterError) -> Self {
        ScanError::Filter(e)
    }
}

/// Records and warnings from one traversal.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// The scan root after canonicalization; record paths live under it.
    pub root: PathBuf,
    /// Records in deterministic traversal order (entries name-sorted per
    /// directory, depth first).
    pub records: Vec<FileRecord>,
    pub warnings: Vec<ScanWarning>,
}

/// Worker count used when `ScanOptions::worker_threads` is 0. Extraction
/// and hashing are I/O bound, so this exceeds the core count.
pub fn default_worker_threads() -> usize {
    num_cpus::get() * 2
}

/// Builds the scoped worker pool for a scan. A local pool keeps
/// concurrent scans independent of each other and of the global pool.
pub(crate) fn build_pool(worker_threads: usize) -> Result<rayon::ThreadPool, ScanError> {
    let threads = if worker_threads == 0 {
        default_worker_threads()
    } else {
        worker_threads
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| ScanError::WorkerPool(e.to_string()))
}

/// Walks the root and extracts a record per kept file.
///
/// The root is canonicalized first, so all record paths are absolute.
/// Runs extraction on the current rayon pool; callers wanting a bounded
/// pool wrap this in [`build_pool`]`.install`.
pub fn collect_records(
    root: &Path,
    options: &ScanOptions,
    reporter: &ProgressReporter<'_>,
    cancel: Option<&CancelToken>,
) -> Result<ScanOutcome, ScanError> {
    let root = validate_root(root)?;
    let compiled = options.filter.compile()?;

    let depth = if options.recursive {
        options.max_depth.unwrap_or(usize::MAX)
    } else {
        1
    };

    let mut candidates: Vec<PathBuf> = Vec::new();
    let mut warnings: Vec<ScanWarning> = Vec::new();

    for entry in WalkDir::new(&root)
        .max_depth(depth)
        .follow_links(options.follow_symlinks)
        .sort_by_file_name()
    {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(ScanError::Cancelled);
        }
        match entry {
            Ok(entry) => {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.into_path();
                if path
                    .file_name()
                    .is_some_and(|name| name == RECEIPT_FILE_NAME)
                {
                    continue;
                }
                let keep = compiled.should_include(path.strip_prefix(&root).unwrap_or(&path));
                if keep {
                    reporter.report(Phase::Discover, candidates.len() as u64 + 1, 0, &path);
                    candidates.push(path);
                }
            }
            Err(e) => {
                warnings.push(ScanWarning {
                    path: e.path().map(Path::to_path_buf).unwrap_or_default(),
                    kind: WarningKind::Traversal,
                    detail: e.to_string(),
                });
            }
        }
    }
    let total = candidates.len() as u64;
    reporter.complete(Phase::Discover, total, total);

    let processed = AtomicU64::new(0);
    let extracted: Vec<Option<Result<metadata::ExtractOutcome, ExtractError>>> = candidates
        .par_iter()
        .map(|path| {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                return None;
            }
            let result = metadata::extract(path);
            let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.report(Phase::Extract, done, total, path);
            Some(result)
        })
        .collect();

    if cancel.is_some_and(|c| c.is_cancelled()) {
        return Err(ScanError::Cancelled);
    }

    let mut records = Vec::with_capacity(candidates.len());
    for (path, outcome) in candidates.iter().zip(extracted) {
        match outcome {
            Some(Ok(outcome)) => {
                records.push(outcome.record);
                if let Some(warning) = outcome.warning {
                    warnings.push(warning);
                }
            }
            Some(Err(e)) => warnings.push(exclusion_warning(path, e)),
            None => {}
        }
    }

    if let Some(limit) = options.max_warnings
        && warnings.len() > limit
    {
        return Err(ScanError::TooManyWarnings {
            count: warnings.len(),
            limit,
        });
    }

    reporter.complete(Phase::Extract, records.len() as u64, total);
    Ok(ScanOutcome {
        root,
        records,
        warnings,
    })
}

fn validate_root(root: &Path) -> Result<PathBuf, ScanError> {
    let canonical = fs::canonicalize(root).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ScanError::RootNotFound(root.to_path_buf())
        } else {
            ScanError::RootUnreadable {
                path: root.to_path_buf(),
                source: e,
            }
        }
    })?;
    if !canonical.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    // Probe readability up front so an unreadable root is a scan error,
    // not a silent empty result.
    fs::read_dir(&canonical).map_err(|e| ScanError::RootUnreadable {
        path: canonical.clone(),
        source: e,
    })?;
    Ok(canonical)
}

/// A file the scan had to leave out entirely.
fn exclusion_warning(path: &Path, error: ExtractError) -> ScanWarning {
    let kind = match &error {
        ExtractError::NotAFile(_) => WarningKind::Traversal,
        ExtractError::PermissionDenied(_) => WarningKind::AccessDenied,
        ExtractError::Io { .. } => WarningKind::AccessDenied,
    };
    ScanWarning {
        path: path.to_path_buf(),
        kind,
        detail: error.to_string(),
    }
}
