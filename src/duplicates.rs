//! Duplicate detection over scanned records.
//!
//! Detection runs in two stages: records are partitioned by exact size,
//! then every partition with at least two members is content-hashed and
//! grouped by fingerprint. Files with unique sizes are never read. Hashing
//! within a partition runs on the current rayon pool; each partition is a
//! complete unit, so its groups are final before they are reported.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::metadata::{FileRecord, ScanWarning, WarningKind};
use crate::progress::{CancelToken, Phase, ProgressReporter};

/// Content fingerprint: a BLAKE3 hash of the whole file.
pub type Fingerprint = [u8; 32];

/// Lowercase hex rendering of a fingerprint.
pub fn fingerprint_hex(fingerprint: &Fingerprint) -> String {
    fingerprint.iter().map(|b| format!("{b:02x}")).collect()
}

/// Hashes a file with a fixed-size streaming buffer.
pub fn fingerprint_file(path: &Path) -> std::io::Result<Fingerprint> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();

    let mut buf = [0u8; 128 * 1024];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(*hasher.finalize().as_bytes())
}

/// Which member of a duplicate group is kept in place of the others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepRule {
    /// The lexically smallest path.
    #[default]
    LexicalFirst,
    /// The member that appeared first in the scanned record order.
    FirstSeen,
    /// The member with the newest modification time; ties fall back to
    /// lexical order.
    NewestModified,
}

/// Files with identical size and fingerprint.
///
/// `paths` is sorted lexically and always has at least two entries;
/// `representative` is the member chosen by the keep rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub size: u64,
    pub fingerprint: Fingerprint,
    pub paths: Vec<PathBuf>,
    pub representative: PathBuf,
}

impl DuplicateGroup {
    /// The members that are not the representative.
    pub fn redundant_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter().filter(|p| **p != self.representative)
    }
}

/// Options for duplicate detection.
#[derive(Debug, Clone)]
pub struct DuplicateOptions {
    pub keep_rule: KeepRule,
    /// Zero-byte files are all bytewise identical; by default they are
    /// not reported as duplicates.
    pub match_empty_files: bool,
}

impl Default for DuplicateOptions {
    fn default() -> Self {
        Self {
            keep_rule: KeepRule::default(),
            match_empty_files: false,
        }
    }
}

/// Result of duplicate detection.
#[derive(Debug, Default)]
pub struct DuplicateOutcome {
    /// Groups ordered by their first member path.
    pub groups: Vec<DuplicateGroup>,
    /// Every fingerprint computed during detection, duplicate or not,
    /// so later stages can reuse them instead of re-hashing.
    pub fingerprints: HashMap<PathBuf, Fingerprint>,
    /// Files that could not be hashed; they are treated as unique.
    pub warnings: Vec<ScanWarning>,
}

/// Finds groups of identical files among the records.
///
/// Output is deterministic for a given record order: group order, member
/// order and representatives do not depend on hashing concurrency. When
/// the cancel token fires, remaining partitions are skipped and the
/// outcome covers only completed partitions.
pub fn find_duplicates(
    records: &[FileRecord],
    options: &DuplicateOptions,
    reporter: &ProgressReporter<'_>,
    cancel: Option<&CancelToken>,
) -> DuplicateOutcome {
    let mut by_size: HashMap<u64, Vec<&FileRecord>> = HashMap::new();
    for record in records {
        if record.size == 0 && !options.match_empty_files {
            continue;
        }
        by_size.entry(record.size).or_default().push(record);
    }

    let mut partitions: Vec<(u64, Vec<&FileRecord>)> = by_size
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .collect();
    partitions.sort_by_key(|(size, _)| *size);

    let total: u64 = partitions.iter().map(|(_, m)| m.len() as u64).sum();
    let processed = AtomicU64::new(0);

    let results: Vec<(Vec<DuplicateGroup>, Vec<(PathBuf, Fingerprint)>, Vec<ScanWarning>)> =
        partitions
            .par_iter()
            .map(|(size, members)| hash_partition(*size, members, options, reporter, cancel, &processed, total))
            .collect();

    let mut outcome = DuplicateOutcome::default();
    for (groups, pairs, warnings) in results {
        outcome.groups.extend(groups);
        outcome.fingerprints.extend(pairs);
        outcome.warnings.extend(warnings);
    }
    outcome
        .groups
        .sort_by(|a, b| a.paths.first().cmp(&b.paths.first()));

    reporter.complete(Phase::Fingerprint, processed.load(Ordering::Relaxed), total);
    outcome
}

type PartitionResult = (
    Vec<DuplicateGroup>,
    Vec<(PathBuf, Fingerprint)>,
    Vec<ScanWarning>,
);

fn hash_partition(
    size: u64,
    members: &[&FileRecord],
    options: &DuplicateOptions,
    reporter: &ProgressReporter<'_>,
    cancel: Option<&CancelToken>,
    processed: &AtomicU64,
    total: u64,
) -> PartitionResult {
    // Hash in parallel but keep results aligned with member order, so the
    // grouping below stays deterministic.
    let hashed: Vec<Option<Result<Fingerprint, std::io::Error>>> = members
        .par_iter()
        .map(|record| {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                return None;
            }
            let result = fingerprint_file(&record.path);
            let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.report(Phase::Fingerprint, done, total, &record.path);
            Some(result)
        })
        .collect();

    let mut pairs = Vec::new();
    let mut warnings = Vec::new();
    let mut by_fingerprint: HashMap<Fingerprint, Vec<&FileRecord>> = HashMap::new();

    for (record, outcome) in members.iter().zip(hashed) {
        match outcome {
            Some(Ok(fingerprint)) => {
                pairs.push((record.path.clone(), fingerprint));
                by_fingerprint.entry(fingerprint).or_default().push(record);
            }
            Some(Err(e)) => {
                warnings.push(ScanWarning {
                    path: record.path.clone(),
                    kind: WarningKind::Fingerprint,
                    detail: format!("could not fingerprint: {e}"),
                });
            }
            None => {} // cancelled before this file was hashed
        }
    }

    let mut groups = Vec::new();
    for (fingerprint, matched) in by_fingerprint {
        if matched.len() < 2 {
            continue;
        }
        let Some(representative) = choose_representative(&matched, options.keep_rule) else {
            continue;
        };
        let mut paths: Vec<PathBuf> = matched.iter().map(|r| r.path.clone()).collect();
        paths.sort();
        groups.push(DuplicateGroup {
            size,
            fingerprint,
            paths,
            representative,
        });
    }
    // HashMap iteration order is arbitrary; pin it down.
    groups.sort_by(|a, b| a.paths.first().cmp(&b.paths.first()));

    (groups, pairs, warnings)
}

/// Applies the keep rule to a group's members, given in record order.
fn choose_representative(members: &[&FileRecord], keep_rule: KeepRule) -> Option<PathBuf> {
    match keep_rule {
        KeepRule::LexicalFirst => members.iter().map(|r| r.path.clone()).min(),
        KeepRule::FirstSeen => members.first().map(|r| r.path.clone()),
        KeepRule::NewestModified => {
            let newest = members.iter().map(|r| r.modified).max()?;
            members
                .iter()
                .filter(|r| r.modified == newest)
                .map(|r| r.path.clone())
                .min()
        }
    }
}
