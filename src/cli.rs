//! Command-line interface.
//!
//! Three subcommands: `scan` previews the move plan for a directory
//! without touching anything, `organize` executes a plan (freshly
//! scanned or loaded from a saved plan file), and `undo` reverts the
//! last executed run from its receipt. Classification rules and scan
//! filters come from an optional TOML file; everything else is flags.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::duplicates::KeepRule;
use crate::executor::ExecutionResult;
use crate::filter::FilterRules;
use crate::organizer::{self, OrganizeConfig};
use crate::output::OutputFormatter;
use crate::plan::{DuplicatePolicy, OrganizePlan};
use crate::progress::Progress;
use crate::ruleset::{Category, Rule, RuleSet};
use crate::undo;

/// Scan directories, classify files and plan safe category moves.
#[derive(Debug, Parser)]
#[command(name = "tidyplan", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan a directory and preview the move plan without touching files.
    Scan(ScanArgs),
    /// Scan a directory (or load a saved plan) and execute the moves.
    Organize(OrganizeArgs),
    /// Revert the last executed run using its receipt.
    Undo(UndoArgs),
}

/// Options shared by `scan` and `organize`.
#[derive(Debug, Args)]
pub struct ScanFlags {
    /// Descend into subdirectories.
    #[arg(short, long)]
    pub recursive: bool,

    /// Traversal depth cap when recursive (1 = the root's own entries).
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Scan hidden files and directories too.
    #[arg(long)]
    pub include_hidden: bool,

    /// TOML file with classification rules and scan filters.
    #[arg(long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// What to do when a destination holds different content.
    #[arg(long, value_enum, default_value_t = PolicyArg::Keep)]
    pub policy: PolicyArg,

    /// Which member of a duplicate group is kept.
    #[arg(long, value_enum, default_value_t = KeepArg::Lexical)]
    pub keep: KeepArg,

    /// Treat zero-byte files as duplicates of each other.
    #[arg(long)]
    pub match_empty: bool,

    /// Worker threads for extraction and hashing (0 = automatic).
    #[arg(long, default_value_t = 0, value_name = "N")]
    pub threads: usize,

    /// Create category directories under this root instead of in place.
    #[arg(long, value_name = "DIR")]
    pub into: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directory to scan.
    pub root: PathBuf,

    #[command(flatten)]
    pub flags: ScanFlags,

    /// Print the plan as JSON instead of the preview.
    #[arg(long)]
    pub json: bool,

    /// Write the plan to a file for later `organize --plan`.
    #[arg(long, value_name = "FILE")]
    pub save_plan: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct OrganizeArgs {
    /// Directory to scan and organize.
    #[arg(required_unless_present = "plan")]
    pub root: Option<PathBuf>,

    #[command(flatten)]
    pub flags: ScanFlags,

    /// Execute a previously saved plan instead of scanning.
    #[arg(long, value_name = "FILE")]
    pub plan: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct UndoArgs {
    /// The organized root holding the receipt.
    pub root: PathBuf,
}

/// CLI-level duplicate policy values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Keep,
    Overwrite,
    Rename,
}

impl From<PolicyArg> for DuplicatePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Keep => DuplicatePolicy::Keep,
            PolicyArg::Overwrite => DuplicatePolicy::Overwrite,
            PolicyArg::Rename => DuplicatePolicy::Rename,
        }
    }
}

/// CLI-level keep rule values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeepArg {
    /// Keep the lexically first path.
    Lexical,
    /// Keep the first file the scan encountered.
    FirstSeen,
    /// Keep the most recently modified file.
    Newest,
}

impl From<KeepArg> for KeepRule {
    fn from(arg: KeepArg) -> Self {
        match arg {
            KeepArg::Lexical => KeepRule::LexicalFirst,
            KeepArg::FirstSeen => KeepRule::FirstSeen,
            KeepArg::Newest => KeepRule::NewestModified,
        }
    }
}

/// On-disk TOML layout for rules and filters.
///
/// ```toml
/// default_category = "misc"
///
/// [[rules]]
/// category = "wallpapers"
/// [rules.predicate]
/// when = "image_at_least"
/// min_width = 1920
/// min_height = 1080
///
/// [filter]
/// include_hidden = false
/// [filter.exclude]
/// extensions = ["tmp", "part"]
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RulesFile {
    pub default_category: Option<Category>,
    pub rules: Vec<Rule>,
    pub filter: FilterRules,
}

impl RulesFile {
    /// Reads and parses a rules file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Error reading rules file {}: {}", path.display(), e))?;
        toml::from_str(&text)
            .map_err(|e| format!("Error parsing rules file {}: {}", path.display(), e))
    }

    /// Turns the file into a config, falling back to the standard
    /// ruleset when the file defines no rules of its own.
    fn into_config(self) -> OrganizeConfig {
        let mut config = OrganizeConfig::default();
        if self.default_category.is_some() || !self.rules.is_empty() {
            let default_category = self
                .default_category
                .unwrap_or_else(|| RuleSet::standard().default_category().clone());
            config.ruleset = RuleSet::new(self.rules, default_category);
        }
        config.scan.filter = self.filter;
        config
    }
}

/// Parses the command line and runs the selected subcommand.
///
/// # Examples
///
/// ```no_run
/// if let Err(e) = tidyplan::cli::run() {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run() -> Result<(), String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Scan(args) => run_scan(args),
        Command::Organize(args) => run_organize(args),
        Command::Undo(args) => run_undo(args),
    }
}

fn build_config(flags: &ScanFlags) -> Result<OrganizeConfig, String> {
    let rules = match &flags.rules {
        Some(path) => RulesFile::load(path)?,
        None => RulesFile::default(),
    };
    let mut config = rules.into_config();
    config.duplicate_policy = flags.policy.into();
    config.keep_rule = flags.keep.into();
    config.match_empty_files = flags.match_empty;
    config.organized_root = flags.into.clone();
    config.scan.recursive = flags.recursive;
    config.scan.max_depth = flags.max_depth;
    config.scan.worker_threads = flags.threads;
    if flags.include_hidden {
        config.scan.filter.include_hidden = true;
    }
    Ok(config)
}

fn run_scan(args: ScanArgs) -> Result<(), String> {
    let config = build_config(&args.flags)?;
    OutputFormatter::info(&format!("Scanning {}", args.root.display()));
    let plan = scan_with_progress(&args.root, &config)?;

    if let Some(path) = &args.save_plan {
        plan.save(path).map_err(|e| e.to_string())?;
        OutputFormatter::success(&format!("Plan saved to {}", path.display()));
    }

    if args.json {
        let json = plan.to_json().map_err(|e| e.to_string())?;
        println!("{}", json);
        return Ok(());
    }

    OutputFormatter::plan_preview(&plan);
    OutputFormatter::preview_notice();
    Ok(())
}

fn run_organize(args: OrganizeArgs) -> Result<(), String> {
    let plan = match (&args.plan, &args.root) {
        (Some(plan_path), _) => {
            OutputFormatter::info(&format!("Loading plan from {}", plan_path.display()));
            OrganizePlan::load(plan_path).map_err(|e| e.to_string())?
        }
        (None, Some(root)) => {
            let config = build_config(&args.flags)?;
            OutputFormatter::info(&format!("Scanning {}", root.display()));
            scan_with_progress(root, &config)?
        }
        (None, None) => return Err("A directory or --plan file is required".to_string()),
    };

    OutputFormatter::plan_preview(&plan);
    if plan.is_noop() {
        OutputFormatter::success("Nothing to do.");
        return Ok(());
    }

    let result = execute_with_progress(&plan);
    OutputFormatter::execution_report(&plan, &result);
    Ok(())
}

fn run_undo(args: UndoArgs) -> Result<(), String> {
    OutputFormatter::info(&format!(
        "Reverting the last run under {}",
        args.root.display()
    ));

    let report = undo::undo(&args.root).map_err(|e| e.to_string())?;
    OutputFormatter::revert_report(&report);
    Ok(())
}

fn scan_with_progress(root: &Path, config: &OrganizeConfig) -> Result<OrganizePlan, String> {
    let bar = OutputFormatter::create_progress_bar(0);
    let callback = |progress: &Progress<'_>| {
        bar.set_length(progress.total.max(progress.processed));
        bar.set_position(progress.processed);
        bar.set_message(progress.phase.label());
    };
    let plan = organizer::scan(root, config, Some(&callback), None).map_err(|e| e.to_string())?;
    bar.finish_and_clear();
    Ok(plan)
}

fn execute_with_progress(plan: &OrganizePlan) -> ExecutionResult {
    let bar = OutputFormatter::create_progress_bar(plan.actions.len() as u64);
    let callback = |progress: &Progress<'_>| {
        bar.set_position(progress.processed);
        bar.set_message(progress.phase.label());
    };
    let result = organizer::execute_plan(plan, Some(&callback), None);
    bar.finish_and_clear();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn scan_parses_with_flags() {
        let cli = Cli::try_parse_from([
            "tidyplan",
            "scan",
            "/data/inbox",
            "--recursive",
            "--policy",
            "rename",
            "--keep",
            "newest",
            "--threads",
            "4",
            "--json",
        ])
        .unwrap();

        let Command::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(args.root, PathBuf::from("/data/inbox"));
        assert!(args.flags.recursive);
        assert_eq!(args.flags.policy, PolicyArg::Rename);
        assert_eq!(args.flags.keep, KeepArg::Newest);
        assert_eq!(args.flags.threads, 4);
        assert!(args.json);
    }

    #[test]
    fn organize_requires_a_root_or_a_plan() {
        assert!(Cli::try_parse_from(["tidyplan", "organize"]).is_err());
        assert!(Cli::try_parse_from(["tidyplan", "organize", "/data/inbox"]).is_ok());
        assert!(Cli::try_parse_from(["tidyplan", "organize", "--plan", "plan.json"]).is_ok());
    }

    #[test]
    fn policy_and_keep_arguments_map_to_core_types() {
        assert_eq!(
            DuplicatePolicy::from(PolicyArg::Overwrite),
            DuplicatePolicy::Overwrite
        );
        assert_eq!(KeepRule::from(KeepArg::FirstSeen), KeepRule::FirstSeen);
        assert_eq!(KeepRule::from(KeepArg::Lexical), KeepRule::LexicalFirst);
    }

    #[test]
    fn rules_file_parses_rules_and_filters() {
        let toml = r#"
            default_category = "misc"

            [[rules]]
            category = "wallpapers"
            [rules.predicate]
            when = "image_at_least"
            min_width = 1920
            min_height = 1080

            [filter]
            include_hidden = true
            [filter.exclude]
            extensions = ["tmp"]
        "#;

        let file: RulesFile = toml::from_str(toml).unwrap();
        assert_eq!(file.rules.len(), 1);
        assert!(file.filter.include_hidden);

        let config = file.into_config();
        assert_eq!(config.ruleset.default_category().as_str(), "misc");
        assert_eq!(config.ruleset.rules().len(), 1);
        assert_eq!(config.scan.filter.exclude.extensions, vec!["tmp"]);
    }

    #[test]
    fn empty_rules_file_falls_back_to_the_standard_ruleset() {
        let file: RulesFile = toml::from_str("").unwrap();
        let config = file.into_config();
        assert_eq!(config.ruleset, RuleSet::standard());
    }
}
