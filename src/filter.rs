//! Scan filtering rules.
//!
//! Filter rules decide which files a scan considers at all. They are plain
//! data (deserializable from the CLI rules file, or built directly by
//! embedding callers) and are compiled once per scan into matcher structures
//! so that per-file checks never reparse patterns.
//!
//! Supported strategies:
//! - Exact filename matching
//! - Glob pattern matching against the root-relative path
//! - File extension matching (case-insensitive)
//! - Regex matching against the filename
//! - Include (whitelist) globs that override every exclusion
//!
//! All path matching is performed on the path *relative to the scan root*,
//! so a rule like `node_modules/**` behaves the same wherever the root
//! lives.

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Errors from compiling filter rules.
#[derive(Debug, Clone)]
pub enum FilterError {
    /// Invalid glob pattern provided.
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    InvalidRegexPattern {
        /// The regex pattern that failed to compile.
        pattern: String,
        /// The reason why the pattern is invalid.
        reason: String,
    },
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterError::InvalidGlobPattern(pattern) => {
                write!(f, "Invalid glob pattern '{}'", pattern)
            }
            FilterError::InvalidRegexPattern { pattern, reason } => {
                write!(f, "Invalid regex pattern '{}': {}", pattern, reason)
            }
        }
    }
}

impl std::error::Error for FilterError {}

/// Root-level filter rules.
///
/// The defaults exclude hidden files and nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRules {
    /// Whether to include hidden files and directories (names starting
    /// with "."). Defaults to false.
    pub include_hidden: bool,

    /// Rules for excluding files.
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    pub include: IncludeRules,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            include_hidden: false,
            exclude: ExcludeRules::default(),
            include: IncludeRules::default(),
        }
    }
}

/// Rules for excluding files from a scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., ".DS_Store", "Thumbs.db").
    pub filenames: Vec<String>,

    /// Glob patterns matched against the root-relative path
    /// (e.g., "*.tmp", "node_modules/**").
    pub patterns: Vec<String>,

    /// File extensions to exclude (e.g., "bak", "tmp", "log").
    pub extensions: Vec<String>,

    /// Regex patterns matched against the filename.
    pub regex: Vec<String>,
}

/// Whitelist rules that override exclusions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules and the hidden-file
    /// filter.
    pub patterns: Vec<String>,
}

impl FilterRules {
    /// Compiles the rules into matcher structures.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex pattern is invalid, so a bad
    /// ruleset fails the scan up front instead of mid-traversal.
    pub fn compile(&self) -> Result<CompiledFilter, FilterError> {
        CompiledFilter::new(self)
    }
}

/// Pre-compiled filter matchers for efficient per-file checks.
pub struct CompiledFilter {
    include_hidden: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, FilterError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|_| FilterError::InvalidGlobPattern(pattern.clone()))
        })
        .collect()
}

impl CompiledFilter {
    fn new(rules: &FilterRules) -> Result<Self, FilterError> {
        let exclude_patterns = compile_globs(&rules.exclude.patterns)?;
        let include_patterns = compile_globs(&rules.include.patterns)?;

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| FilterError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            include_hidden: rules.include_hidden,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            exclude_patterns,
            exclude_regexes,
            include_patterns,
        })
    }

    /// Checks whether a file should be part of the scan.
    ///
    /// `relative` is the file's path relative to the scan root. Checks run
    /// in this order, with early termination:
    /// 1. Include patterns (whitelist) - if matched, always include
    /// 2. Hidden check - any dot-prefixed path component excludes
    /// 3. Exact filename match - if matched, exclude
    /// 4. File extension match - if matched, exclude
    /// 5. Glob pattern match - if matched, exclude
    /// 6. Regex pattern match on the filename - if matched, exclude
    /// 7. Default: include
    pub fn should_include(&self, relative: &Path) -> bool {
        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.matches_include_patterns(relative) {
            return true;
        }

        if !self.include_hidden && has_hidden_component(relative) {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = relative.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(relative))
        {
            return false;
        }

        if self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
        {
            return false;
        }

        true
    }

    fn matches_include_patterns(&self, relative: &Path) -> bool {
        self.include_patterns
            .iter()
            .any(|pattern| pattern.matches_path(relative))
    }
}

/// True when any component of the path starts with a dot, so files inside
/// hidden directories count as hidden too.
fn has_hidden_component(relative: &Path) -> bool {
    relative.components().any(|component| {
        component
            .as_os_str()
            .to_string_lossy()
            .starts_with('.')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules_with_exclude(exclude: ExcludeRules) -> FilterRules {
        FilterRules {
            include_hidden: true,
            exclude,
            include: IncludeRules::default(),
        }
    }

    #[test]
    fn default_rules_compile_and_hide_hidden_files() {
        let compiled = FilterRules::default().compile().unwrap();

        assert!(!compiled.should_include(Path::new(".DS_Store")));
        assert!(!compiled.should_include(Path::new(".gitignore")));
        assert!(compiled.should_include(Path::new("image.jpg")));
    }

    #[test]
    fn files_inside_hidden_directories_are_hidden() {
        let compiled = FilterRules::default().compile().unwrap();

        assert!(!compiled.should_include(Path::new(".git/config")));
        assert!(!compiled.should_include(Path::new("sub/.cache/data.bin")));
        assert!(compiled.should_include(Path::new("sub/dir/data.bin")));
    }

    #[test]
    fn hidden_files_included_when_enabled() {
        let rules = FilterRules {
            include_hidden: true,
            ..FilterRules::default()
        };
        let compiled = rules.compile().unwrap();

        assert!(compiled.should_include(Path::new(".DS_Store")));
    }

    #[test]
    fn exclude_exact_filename() {
        let rules = rules_with_exclude(ExcludeRules {
            filenames: vec!["Thumbs.db".to_string()],
            ..Default::default()
        });
        let compiled = rules.compile().unwrap();

        assert!(!compiled.should_include(Path::new("Thumbs.db")));
        assert!(!compiled.should_include(Path::new("sub/Thumbs.db")));
        assert!(compiled.should_include(Path::new("image.jpg")));
    }

    #[test]
    fn exclude_extensions_is_case_insensitive() {
        let rules = rules_with_exclude(ExcludeRules {
            extensions: vec!["bak".to_string(), "tmp".to_string()],
            ..Default::default()
        });
        let compiled = rules.compile().unwrap();

        assert!(!compiled.should_include(Path::new("file.bak")));
        assert!(!compiled.should_include(Path::new("file.BAK")));
        assert!(!compiled.should_include(Path::new("file.tmp")));
        assert!(compiled.should_include(Path::new("file.txt")));
    }

    #[test]
    fn exclude_globs_respect_directory_boundaries() {
        let rules = rules_with_exclude(ExcludeRules {
            patterns: vec!["**/logs/**".to_string(), "*.cache".to_string()],
            ..Default::default()
        });
        let compiled = rules.compile().unwrap();

        assert!(!compiled.should_include(Path::new("logs/app.log")));
        assert!(!compiled.should_include(Path::new("app/logs/debug.log")));
        assert!(!compiled.should_include(Path::new("file.cache")));

        assert!(compiled.should_include(Path::new("my_logs/file.txt")));
        assert!(compiled.should_include(Path::new("data/app.log")));
    }

    #[test]
    fn exclude_regex_matches_filename_only() {
        let rules = rules_with_exclude(ExcludeRules {
            regex: vec![r"^test_.*\.txt$".to_string()],
            ..Default::default()
        });
        let compiled = rules.compile().unwrap();

        assert!(!compiled.should_include(Path::new("test_file.txt")));
        assert!(!compiled.should_include(Path::new("sub/test_another.txt")));
        assert!(compiled.should_include(Path::new("file.txt")));
    }

    #[test]
    fn include_overrides_exclude_and_hidden() {
        let rules = FilterRules {
            include_hidden: false,
            exclude: ExcludeRules {
                extensions: vec!["tmp".to_string()],
                ..Default::default()
            },
            include: IncludeRules {
                patterns: vec![".important".to_string(), "keep/**".to_string()],
            },
        };
        let compiled = rules.compile().unwrap();

        assert!(compiled.should_include(Path::new(".important")));
        assert!(compiled.should_include(Path::new("keep/scratch.tmp")));
        assert!(!compiled.should_include(Path::new(".other")));
        assert!(!compiled.should_include(Path::new("scratch.tmp")));
    }

    #[test]
    fn invalid_glob_is_rejected_at_compile_time() {
        let rules = rules_with_exclude(ExcludeRules {
            patterns: vec!["[invalid".to_string()],
            ..Default::default()
        });
        assert!(rules.compile().is_err());
    }

    #[test]
    fn invalid_regex_is_rejected_at_compile_time() {
        let rules = rules_with_exclude(ExcludeRules {
            regex: vec!["[invalid(".to_string()],
            ..Default::default()
        });
        let err = rules.compile().err().unwrap();
        match err {
            FilterError::InvalidRegexPattern { pattern, .. } => {
                assert_eq!(pattern, "[invalid(");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rules_deserialize_from_partial_toml() {
        let rules: FilterRules = toml::from_str(
            r#"
            [exclude]
            extensions = ["log"]
            "#,
        )
        .unwrap();

        assert!(!rules.include_hidden);
        assert_eq!(rules.exclude.extensions, vec!["log".to_string()]);
        assert!(rules.include.patterns.is_empty());
    }
}
