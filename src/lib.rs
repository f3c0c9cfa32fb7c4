//! tidyplan - scan directories, classify files and plan safe moves.
//!
//! This library turns a messy directory into an explicit, reviewable
//! plan: it walks the tree, extracts per-file metadata (image
//! dimensions, audio and video duration, word counts), classifies every
//! file through an ordered ruleset, detects byte-identical duplicates,
//! and emits an ordered move plan that can be previewed, saved, executed
//! and undone. Planning never touches a file; execution re-verifies the
//! filesystem action by action.

pub mod cli;
pub mod duplicates;
pub mod executor;
pub mod filter;
pub mod media;
pub mod metadata;
pub mod organizer;
pub mod output;
pub mod plan;
pub mod progress;
pub mod ruleset;
pub mod scanner;
pub mod undo;

pub use duplicates::{DuplicateGroup, DuplicateOptions, KeepRule};
pub use executor::{ActionStatus, ExecutionResult, FailureKind};
pub use filter::FilterRules;
pub use metadata::{FileMetadata, FileRecord, MetadataKind, ScanWarning};
pub use organizer::{OrganizeConfig, execute_plan, scan};
pub use plan::{DuplicatePolicy, OrganizePlan, PlannedAction, SkipReason, build_plan};
pub use progress::{CancelToken, Phase, Progress};
pub use ruleset::{Category, Rule, RulePredicate, RuleSet};
pub use scanner::{ScanError, ScanOptions};
pub use undo::{ExecutionReceipt, RevertReport};
