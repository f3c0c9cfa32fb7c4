//! File records and metadata extraction.
//!
//! Extraction turns a path into a [`FileRecord`]: basic filesystem facts
//! plus a tagged metadata variant for the content kinds the engine
//! understands. Type detection reads a bounded prefix of the file and
//! trusts content signatures over extensions; the extension only breaks
//! ties when the signature is inconclusive.
//!
//! Extraction failures come in two shapes. Paths that are not readable
//! regular files are rejected with [`ExtractError`]. Files that read fine
//! but whose rich metadata cannot be parsed degrade to
//! [`FileMetadata::Generic`] and carry a [`ScanWarning`], so one corrupt
//! header never aborts a scan.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::media;

/// How many leading bytes are read for content-signature detection.
const SNIFF_LEN: u64 = 8192;

/// Non-fatal problem recorded while scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub kind: WarningKind,
    pub detail: String,
}

/// What went wrong for a [`ScanWarning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The file's type suggested rich metadata but it could not be parsed;
    /// the record was downgraded to Generic.
    UnreadableMetadata,
    /// The file exists but could not be read; it is excluded from the
    /// scan entirely.
    AccessDenied,
    /// A directory entry could not be visited during traversal.
    Traversal,
    /// The file could not be hashed for duplicate detection and was
    /// treated as unique.
    Fingerprint,
    /// A planned destination could not be examined, so the planner
    /// skipped the file rather than risk clobbering unknown content.
    Destination,
}

impl std::fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.detail)
    }
}

/// Broad content kind, used by classification rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataKind {
    Image,
    Audio,
    Document,
    Video,
    Generic,
}

/// Tagged metadata for one file.
///
/// Unknown or unparseable types carry the `Generic` variant, which holds
/// no fields beyond what [`FileRecord`] already records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FileMetadata {
    Image {
        width: u32,
        height: u32,
    },
    Audio {
        duration_secs: f64,
        bitrate_kbps: u32,
    },
    Document {
        word_count: u64,
        /// Populated only when a reader reports pages; plain text has
        /// none.
        page_count: Option<u32>,
    },
    Video {
        duration_secs: f64,
        width: u32,
        height: u32,
    },
    Generic,
}

impl FileMetadata {
    pub fn kind(&self) -> MetadataKind {
        match self {
            FileMetadata::Image { .. } => MetadataKind::Image,
            FileMetadata::Audio { .. } => MetadataKind::Audio,
            FileMetadata::Document { .. } => MetadataKind::Document,
            FileMetadata::Video { .. } => MetadataKind::Video,
            FileMetadata::Generic => MetadataKind::Generic,
        }
    }
}

/// Everything the engine knows about one scanned file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Modification time as reported by the filesystem.
    pub modified: SystemTime,
    /// MIME type from content-signature detection, when recognised.
    pub mime_type: Option<String>,
    /// Lowercased file extension, when present.
    pub extension: Option<String>,
    /// Parsed metadata variant.
    pub metadata: FileMetadata,
}

/// Errors that reject a path from extraction outright.
#[derive(Debug)]
pub enum ExtractError {
    /// The path is a directory, symlink or other non-regular file.
    NotAFile(PathBuf),
    /// The file exists but cannot be read.
    PermissionDenied(PathBuf),
    /// Any other I/O failure while reading the file.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::NotAFile(path) => {
                write!(f, "Not a regular file: {}", path.display())
            }
            ExtractError::PermissionDenied(path) => {
                write!(f, "Permission denied: {}", path.display())
            }
            ExtractError::Io { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A successfully extracted record, plus the downgrade warning if rich
/// metadata could not be parsed.
#[derive(Debug, Clone)]
pub struct ExtractOutcome {
    pub record: FileRecord,
    pub warning: Option<ScanWarning>,
}

fn io_error(path: &Path, source: std::io::Error) -> ExtractError {
    if source.kind() == std::io::ErrorKind::PermissionDenied {
        ExtractError::PermissionDenied(path.to_path_buf())
    } else {
        ExtractError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Builds the [`FileRecord`] for a path.
///
/// # Errors
///
/// Returns `NotAFile` for anything but a regular file, `PermissionDenied`
/// or `Io` when the file cannot be read at all. Metadata parse failures
/// are not errors; they downgrade the record and surface in
/// [`ExtractOutcome::warning`].
pub fn extract(path: &Path) -> Result<ExtractOutcome, ExtractError> {
    let stat = fs::symlink_metadata(path).map_err(|e| io_error(path, e))?;
    if !stat.is_file() {
        return Err(ExtractError::NotAFile(path.to_path_buf()));
    }
    let size = stat.len();
    let modified = stat.modified().map_err(|e| io_error(path, e))?;

    let mime_type = sniff_mime(path).map_err(|e| io_error(path, e))?;
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase());

    let (metadata, warning) = read_rich_metadata(path, mime_type.as_deref(), extension.as_deref());

    Ok(ExtractOutcome {
        record: FileRecord {
            path: path.to_path_buf(),
            size,
            modified,
            mime_type,
            extension,
            metadata,
        },
        warning,
    })
}

/// Content-signature detection over a bounded prefix.
fn sniff_mime(path: &Path) -> std::io::Result<Option<String>> {
    let file = fs::File::open(path)?;
    let mut buf = Vec::with_capacity(SNIFF_LEN as usize);
    file.take(SNIFF_LEN).read_to_end(&mut buf)?;
    Ok(infer::get(&buf).map(|t| t.mime_type().to_string()))
}

/// What the detected type says we should try to parse.
enum Probe {
    Image,
    Wav,
    Flac,
    Mp3,
    Mp4,
    Text,
    /// Rich type we recognise but have no reader for; downgrades with a
    /// warning naming the type.
    Opaque(&'static str),
    None,
}

const TEXT_EXTENSIONS: [&str; 5] = ["txt", "md", "markdown", "rst", "log"];
const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff"];

fn probe_for(mime: Option<&str>, extension: Option<&str>) -> Probe {
    if let Some(mime) = mime {
        return match mime {
            "audio/x-wav" | "audio/wav" | "audio/vnd.wave" => Probe::Wav,
            "audio/x-flac" | "audio/flac" => Probe::Flac,
            "audio/mpeg" | "audio/mp3" => Probe::Mp3,
            "video/mp4" | "video/quicktime" | "video/x-m4v" => Probe::Mp4,
            "application/pdf" | "application/epub+zip" | "application/msword" => {
                Probe::Opaque("document")
            }
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Probe::Opaque("document")
            }
            // Markup like XML or shell scripts is left Generic so
            // classification can treat it as code rather than prose.
            "text/html" => Probe::Text,
            _ if mime.starts_with("image/") => Probe::Image,
            _ if mime.starts_with("audio/") => Probe::Opaque("audio"),
            _ if mime.starts_with("video/") => Probe::Opaque("video"),
            _ => Probe::None,
        };
    }

    // Signature was inconclusive; let the extension break the tie.
    match extension {
        Some(ext) if TEXT_EXTENSIONS.contains(&ext) => Probe::Text,
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => Probe::Image,
        Some("wav") => Probe::Wav,
        Some("flac") => Probe::Flac,
        Some("mp3") => Probe::Mp3,
        Some("mp4" | "mov" | "m4v") => Probe::Mp4,
        _ => Probe::None,
    }
}

fn downgraded(path: &Path, detail: String) -> (FileMetadata, Option<ScanWarning>) {
    (
        FileMetadata::Generic,
        Some(ScanWarning {
            path: path.to_path_buf(),
            kind: WarningKind::UnreadableMetadata,
            detail,
        }),
    )
}

fn read_rich_metadata(
    path: &Path,
    mime: Option<&str>,
    extension: Option<&str>,
) -> (FileMetadata, Option<ScanWarning>) {
    match probe_for(mime, extension) {
        Probe::Image => match media::image_dimensions(path) {
            Ok((width, height)) => (FileMetadata::Image { width, height }, None),
            Err(e) => downgraded(path, e.to_string()),
        },
        Probe::Wav => audio_metadata(path, media::wav_properties(path)),
        Probe::Flac => audio_metadata(path, media::flac_properties(path)),
        Probe::Mp3 => audio_metadata(path, media::mp3_properties(path)),
        Probe::Mp4 => match media::mp4_properties(path) {
            Ok(props) => (
                FileMetadata::Video {
                    duration_secs: props.duration_secs,
                    width: props.width,
                    height: props.height,
                },
                None,
            ),
            Err(e) => downgraded(path, e.to_string()),
        },
        Probe::Text => match media::count_words(path) {
            Ok(word_count) => (
                FileMetadata::Document {
                    word_count,
                    page_count: None,
                },
                None,
            ),
            Err(e) => downgraded(path, e.to_string()),
        },
        Probe::Opaque(what) => downgraded(path, format!("no metadata reader for this {what} type")),
        Probe::None => (FileMetadata::Generic, None),
    }
}

fn audio_metadata(
    path: &Path,
    result: Result<media::AudioProperties, media::MediaError>,
) -> (FileMetadata, Option<ScanWarning>) {
    match result {
        Ok(props) => (
            FileMetadata::Audio {
                duration_secs: props.duration_secs,
                bitrate_kbps: props.bitrate_kbps,
            },
            None,
        ),
        Err(e) => downgraded(path, e.to_string()),
    }
}
