//! Classification rules mapping file records to category labels.
//!
//! A [`RuleSet`] is an ordered list of predicate rules plus a default
//! category; the first matching rule wins. Rulesets are plain data, so
//! callers can build them in code or deserialize them from a rules file,
//! and classification itself never touches the filesystem: the same record
//! always lands in the same category.
//!
//! # Examples
//!
//! ```
//! use tidyplan::metadata::{FileMetadata, FileRecord};
//! use tidyplan::ruleset::{Category, Rule, RulePredicate, RuleSet};
//! use std::time::SystemTime;
//!
//! let rules = RuleSet::new(
//!     vec![Rule::new(
//!         RulePredicate::ImageAtLeast { min_width: 1920, min_height: 1080 },
//!         Category::new("images/large").unwrap(),
//!     )],
//!     Category::new("other").unwrap(),
//! );
//!
//! let record = FileRecord {
//!     path: "wallpaper.png".into(),
//!     size: 2_000_000,
//!     modified: SystemTime::UNIX_EPOCH,
//!     mime_type: Some("image/png".into()),
//!     extension: Some("png".into()),
//!     metadata: FileMetadata::Image { width: 2560, height: 1440 },
//! };
//! assert_eq!(rules.classify(&record).as_str(), "images/large");
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

use crate::metadata::{FileMetadata, FileRecord, MetadataKind};

/// Errors from validating a category label.
#[derive(Debug, Clone)]
pub enum CategoryError {
    /// The label is empty.
    Empty,
    /// The label is an absolute path.
    Absolute(String),
    /// The label escapes the organized root (".." or similar).
    Traverses(String),
}

impl std::fmt::Display for CategoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CategoryError::Empty => write!(f, "Category label must not be empty"),
            CategoryError::Absolute(label) => {
                write!(f, "Category label must be relative: '{}'", label)
            }
            CategoryError::Traverses(label) => {
                write!(f, "Category label must stay inside the organized root: '{}'", label)
            }
        }
    }
}

impl std::error::Error for CategoryError {}

/// A validated category label.
///
/// Labels double as directory paths under the organized root, so nested
/// labels like `images/large` are legal while absolute paths and `..`
/// components are rejected at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Category(String);

impl Category {
    /// Validates and wraps a label.
    ///
    /// # Errors
    ///
    /// Rejects empty labels, absolute paths and any label containing `.`
    /// or `..` components.
    pub fn new(label: impl Into<String>) -> Result<Self, CategoryError> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(CategoryError::Empty);
        }
        let path = Path::new(&label);
        if path.is_absolute() {
            return Err(CategoryError::Absolute(label));
        }
        if !path
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(CategoryError::Traverses(label));
        }
        Ok(Category(label))
    }

    /// Constructor for labels known valid at compile time.
    fn builtin(label: &str) -> Self {
        Category(label.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The label as a relative directory path under the organized root.
    pub fn relative_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Category {
    type Error = CategoryError;

    fn try_from(label: String) -> Result<Self, Self::Error> {
        Category::new(label)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> String {
        category.0
    }
}

/// Condition a rule tests against a file record.
///
/// Predicates that inspect rich metadata (dimensions, durations, word
/// counts) only match records carrying that metadata variant, so an
/// audio-duration rule can never capture an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum RulePredicate {
    /// Matches records of a broad metadata kind.
    Kind { kind: MetadataKind },
    /// Matches when the file extension is in the list (case-insensitive).
    Extension { extensions: Vec<String> },
    /// Matches when the detected MIME type starts with the prefix.
    MimePrefix { prefix: String },
    /// Matches files strictly larger than the given size.
    LargerThan { bytes: u64 },
    /// Matches images with at least the given dimensions.
    ImageAtLeast { min_width: u32, min_height: u32 },
    /// Matches audio with at least the given duration.
    AudioLongerThan { min_secs: f64 },
    /// Matches video with at least the given duration.
    VideoLongerThan { min_secs: f64 },
    /// Matches documents with at least the given word count.
    WordsAtLeast { min_words: u64 },
    /// Matches every record.
    Always,
}

impl RulePredicate {
    pub fn matches(&self, record: &FileRecord) -> bool {
        match self {
            RulePredicate::Kind { kind } => record.metadata.kind() == *kind,
            RulePredicate::Extension { extensions } => record
                .extension
                .as_deref()
                .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))),
            RulePredicate::MimePrefix { prefix } => record
                .mime_type
                .as_deref()
                .is_some_and(|mime| mime.starts_with(prefix.as_str())),
            RulePredicate::LargerThan { bytes } => record.size > *bytes,
            RulePredicate::ImageAtLeast {
                min_width,
                min_height,
            } => matches!(
                record.metadata,
                FileMetadata::Image { width, height }
                    if width >= *min_width && height >= *min_height
            ),
            RulePredicate::AudioLongerThan { min_secs } => matches!(
                record.metadata,
                FileMetadata::Audio { duration_secs, .. } if duration_secs >= *min_secs
            ),
            RulePredicate::VideoLongerThan { min_secs } => matches!(
                record.metadata,
                FileMetadata::Video { duration_secs, .. } if duration_secs >= *min_secs
            ),
            RulePredicate::WordsAtLeast { min_words } => matches!(
                record.metadata,
                FileMetadata::Document { word_count, .. } if word_count >= *min_words
            ),
            RulePredicate::Always => true,
        }
    }
}

/// One classification rule: a predicate and the category it assigns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub predicate: RulePredicate,
    pub category: Category,
}

impl Rule {
    pub fn new(predicate: RulePredicate, category: Category) -> Self {
        Self {
            predicate,
            category,
        }
    }
}

/// Ordered, first-match-wins classification rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    rules: Vec<Rule>,
    default_category: Category,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>, default_category: Category) -> Self {
        Self {
            rules,
            default_category,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn default_category(&self) -> &Category {
        &self.default_category
    }

    /// Returns the category of the first matching rule, or the default.
    pub fn classify(&self, record: &FileRecord) -> &Category {
        self.rules
            .iter()
            .find(|rule| rule.predicate.matches(record))
            .map(|rule| &rule.category)
            .unwrap_or(&self.default_category)
    }

    /// The built-in ruleset: metadata-kind rules first, then content-type
    /// and extension fallbacks, with `other` as the default.
    pub fn standard() -> Self {
        fn kind(kind: MetadataKind, label: &str) -> Rule {
            Rule::new(RulePredicate::Kind { kind }, Category::builtin(label))
        }
        fn exts(extensions: &[&str], label: &str) -> Rule {
            Rule::new(
                RulePredicate::Extension {
                    extensions: extensions.iter().map(|e| e.to_string()).collect(),
                },
                Category::builtin(label),
            )
        }
        fn mime(prefix: &str, label: &str) -> Rule {
            Rule::new(
                RulePredicate::MimePrefix {
                    prefix: prefix.to_string(),
                },
                Category::builtin(label),
            )
        }

        let rules = vec![
            kind(MetadataKind::Image, "images"),
            kind(MetadataKind::Audio, "audio"),
            kind(MetadataKind::Video, "videos"),
            kind(MetadataKind::Document, "documents"),
            // Content-detected types with no extension to vouch for them.
            mime("application/zip", "archives"),
            mime("application/x-tar", "archives"),
            mime("application/gzip", "archives"),
            mime("application/x-7z-compressed", "archives"),
            mime("application/vnd.rar", "archives"),
            mime("application/font", "fonts"),
            mime("text/x-shellscript", "code"),
            mime("text/xml", "code"),
            exts(
                &["pdf", "txt", "doc", "docx", "html", "htm", "md", "rtf", "odt", "epub"],
                "documents",
            ),
            exts(&["zip", "rar", "7z", "tar", "gz", "bz2", "xz"], "archives"),
            exts(
                &[
                    "py", "java", "c", "cpp", "h", "hpp", "js", "ts", "rs", "go", "sh", "bash",
                    "json", "xml", "yaml", "yml", "toml",
                ],
                "code",
            ),
            exts(&["csv", "tsv", "xls", "xlsx", "ods"], "spreadsheets"),
            exts(&["ppt", "pptx", "odp"], "presentations"),
            exts(&["ttf", "otf", "woff", "woff2"], "fonts"),
            exts(
                &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "tiff", "ico", "heic"],
                "images",
            ),
            exts(&["mp3", "wav", "ogg", "flac", "aac", "m4a", "wma"], "audio"),
            exts(
                &["mp4", "mkv", "avi", "mov", "flv", "wmv", "webm", "3gp"],
                "videos",
            ),
        ];

        Self::new(rules, Category::builtin("other"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn record(name: &str, metadata: FileMetadata) -> FileRecord {
        let path = PathBuf::from(name);
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        FileRecord {
            path,
            size: 1000,
            modified: SystemTime::UNIX_EPOCH,
            mime_type: None,
            extension,
            metadata,
        }
    }

    #[test]
    fn category_accepts_plain_and_nested_labels() {
        assert!(Category::new("images").is_ok());
        assert!(Category::new("images/large").is_ok());
        assert_eq!(Category::new("a/b/c").unwrap().as_str(), "a/b/c");
    }

    #[test]
    fn category_rejects_unsafe_labels() {
        assert!(matches!(Category::new(""), Err(CategoryError::Empty)));
        assert!(matches!(Category::new("   "), Err(CategoryError::Empty)));
        assert!(matches!(
            Category::new("/etc"),
            Err(CategoryError::Absolute(_))
        ));
        assert!(matches!(
            Category::new(".."),
            Err(CategoryError::Traverses(_))
        ));
        assert!(matches!(
            Category::new("a/../b"),
            Err(CategoryError::Traverses(_))
        ));
        assert!(matches!(
            Category::new("./a"),
            Err(CategoryError::Traverses(_))
        ));
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = RuleSet::new(
            vec![
                Rule::new(
                    RulePredicate::ImageAtLeast {
                        min_width: 1000,
                        min_height: 1000,
                    },
                    Category::new("images/large").unwrap(),
                ),
                Rule::new(
                    RulePredicate::Kind {
                        kind: MetadataKind::Image,
                    },
                    Category::new("images").unwrap(),
                ),
            ],
            Category::new("other").unwrap(),
        );

        let big = record(
            "big.png",
            FileMetadata::Image {
                width: 2000,
                height: 1500,
            },
        );
        let small = record(
            "small.png",
            FileMetadata::Image {
                width: 640,
                height: 480,
            },
        );

        assert_eq!(rules.classify(&big).as_str(), "images/large");
        assert_eq!(rules.classify(&small).as_str(), "images");
    }

    #[test]
    fn unmatched_records_get_the_default() {
        let rules = RuleSet::new(vec![], Category::new("misc").unwrap());
        let rec = record("data.bin", FileMetadata::Generic);
        assert_eq!(rules.classify(&rec).as_str(), "misc");
    }

    #[test]
    fn duration_and_word_predicates_respect_their_kind() {
        let podcast = RulePredicate::AudioLongerThan { min_secs: 1200.0 };
        let long_audio = record(
            "show.mp3",
            FileMetadata::Audio {
                duration_secs: 3600.0,
                bitrate_kbps: 128,
            },
        );
        let short_audio = record(
            "jingle.mp3",
            FileMetadata::Audio {
                duration_secs: 15.0,
                bitrate_kbps: 128,
            },
        );
        let long_video = record(
            "film.mp4",
            FileMetadata::Video {
                duration_secs: 3600.0,
                width: 1920,
                height: 1080,
            },
        );

        assert!(podcast.matches(&long_audio));
        assert!(!podcast.matches(&short_audio));
        assert!(!podcast.matches(&long_video));

        let wordy = RulePredicate::WordsAtLeast { min_words: 100 };
        let essay = record(
            "essay.txt",
            FileMetadata::Document {
                word_count: 5000,
                page_count: None,
            },
        );
        assert!(wordy.matches(&essay));
        assert!(!wordy.matches(&long_audio));
    }

    #[test]
    fn extension_predicate_is_case_insensitive() {
        let rule = RulePredicate::Extension {
            extensions: vec!["pdf".to_string()],
        };
        let rec = record("Paper.PDF", FileMetadata::Generic);
        assert!(rule.matches(&rec));
    }

    #[test]
    fn size_predicate_is_strict() {
        let rule = RulePredicate::LargerThan { bytes: 1000 };
        let mut rec = record("blob.bin", FileMetadata::Generic);
        assert!(!rule.matches(&rec));
        rec.size = 1001;
        assert!(rule.matches(&rec));
    }

    #[test]
    fn standard_ruleset_covers_common_types() {
        let rules = RuleSet::standard();

        let image = record(
            "photo.jpg",
            FileMetadata::Image {
                width: 800,
                height: 600,
            },
        );
        assert_eq!(rules.classify(&image).as_str(), "images");

        let text = record(
            "notes.txt",
            FileMetadata::Document {
                word_count: 12,
                page_count: None,
            },
        );
        assert_eq!(rules.classify(&text).as_str(), "documents");

        let archive = record("backup.zip", FileMetadata::Generic);
        assert_eq!(rules.classify(&archive).as_str(), "archives");

        let source = record("main.rs", FileMetadata::Generic);
        assert_eq!(rules.classify(&source).as_str(), "code");

        let sheet = record("numbers.csv", FileMetadata::Generic);
        assert_eq!(rules.classify(&sheet).as_str(), "spreadsheets");

        let unknown = record("mystery", FileMetadata::Generic);
        assert_eq!(rules.classify(&unknown).as_str(), "other");
    }

    #[test]
    fn standard_ruleset_catches_renamed_archives_by_mime() {
        let mut rec = record("archive.dat", FileMetadata::Generic);
        rec.mime_type = Some("application/zip".to_string());
        assert_eq!(RuleSet::standard().classify(&rec).as_str(), "archives");
    }

    #[test]
    fn ruleset_deserializes_from_toml() {
        let toml_src = r#"
            default_category = "other"

            [[rules]]
            category = "images/large"
            [rules.predicate]
            when = "image_at_least"
            min_width = 1920
            min_height = 1080

            [[rules]]
            category = "documents"
            [rules.predicate]
            when = "kind"
            kind = "document"
        "#;
        let rules: RuleSet = toml::from_str(toml_src).unwrap();
        assert_eq!(rules.rules().len(), 2);
        assert_eq!(rules.default_category().as_str(), "other");

        let big = record(
            "shot.png",
            FileMetadata::Image {
                width: 3840,
                height: 2160,
            },
        );
        assert_eq!(rules.classify(&big).as_str(), "images/large");
    }

    #[test]
    fn invalid_category_fails_deserialization() {
        let toml_src = r#"
            default_category = "../outside"
        "#;
        assert!(toml::from_str::<RuleSet>(toml_src).is_err());
    }
}
