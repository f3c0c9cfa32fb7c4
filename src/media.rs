//! Bounded readers for media and document properties.
//!
//! Every reader here works from file headers or a streamed pass with a
//! fixed-size buffer, so memory use stays constant regardless of file size.
//! Results feed the metadata extractor; callers treat any error as "this
//! file gets no rich metadata" rather than a fatal condition.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Errors from reading media properties.
#[derive(Debug)]
pub enum MediaError {
    /// I/O failure while reading the file.
    Io(std::io::Error),
    /// The file does not follow the format it was detected as.
    Malformed(String),
}

impl MediaError {
    fn malformed(reason: impl Into<String>) -> Self {
        MediaError::Malformed(reason.into())
    }
}

impl std::fmt::Display for MediaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaError::Io(e) => write!(f, "I/O error: {}", e),
            MediaError::Malformed(reason) => write!(f, "malformed media file: {}", reason),
        }
    }
}

impl std::error::Error for MediaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MediaError::Io(e) => Some(e),
            MediaError::Malformed(_) => None,
        }
    }
}

impl From<std::io::Error> for MediaError {
    fn from(e: std::io::Error) -> Self {
        MediaError::Io(e)
    }
}

/// Duration and bitrate of an audio stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioProperties {
    pub duration_secs: f64,
    pub bitrate_kbps: u32,
}

/// Duration and frame size of a video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProperties {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
}

/// Reads image dimensions from the file header without decoding pixels.
///
/// The format is guessed from the file content, not the extension, so a
/// PNG saved as `photo.jpg` still reports its real dimensions.
pub fn image_dimensions(path: &Path) -> Result<(u32, u32), MediaError> {
    let reader = image::io::Reader::open(path)?.with_guessed_format()?;
    reader
        .into_dimensions()
        .map_err(|e| MediaError::malformed(e.to_string()))
}

// Chunk scans stop after this many chunks so a damaged file cannot send
// the reader on an endless walk.
const MAX_RIFF_CHUNKS: usize = 64;

/// Reads duration and bitrate from a RIFF/WAVE file.
///
/// Walks the chunk list for `fmt ` and `data`; duration is the data length
/// divided by the byte rate. Chunk contents are never read.
pub fn wav_properties(path: &Path) -> Result<AudioProperties, MediaError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut riff = [0u8; 12];
    reader.read_exact(&mut riff)?;
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        return Err(MediaError::malformed("missing RIFF/WAVE header"));
    }

    let mut byte_rate: Option<u32> = None;
    let mut data_len: Option<u64> = None;

    for _ in 0..MAX_RIFF_CHUNKS {
        let mut header = [0u8; 8];
        if reader.read_exact(&mut header).is_err() {
            break;
        }
        let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;
        // Chunks are word-aligned; odd sizes carry one pad byte.
        let padded = size + (size & 1);

        match &header[0..4] {
            b"fmt " => {
                if size < 16 {
                    return Err(MediaError::malformed("truncated fmt chunk"));
                }
                let mut fmt = [0u8; 16];
                reader.read_exact(&mut fmt)?;
                byte_rate = Some(u32::from_le_bytes([fmt[8], fmt[9], fmt[10], fmt[11]]));
                reader.seek_relative((padded - 16) as i64)?;
            }
            b"data" => {
                data_len = Some(size);
                reader.seek_relative(padded as i64)?;
            }
            _ => {
                reader.seek_relative(padded as i64)?;
            }
        }

        if byte_rate.is_some() && data_len.is_some() {
            break;
        }
    }

    let byte_rate = byte_rate.ok_or_else(|| MediaError::malformed("missing fmt chunk"))?;
    let data_len = data_len.ok_or_else(|| MediaError::malformed("missing data chunk"))?;
    if byte_rate == 0 {
        return Err(MediaError::malformed("zero byte rate"));
    }

    Ok(AudioProperties {
        duration_secs: data_len as f64 / byte_rate as f64,
        bitrate_kbps: byte_rate * 8 / 1000,
    })
}

/// Reads duration and bitrate from a FLAC STREAMINFO block.
pub fn flac_properties(path: &Path) -> Result<AudioProperties, MediaError> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != b"fLaC" {
        return Err(MediaError::malformed("missing fLaC marker"));
    }

    // The first metadata block is required to be STREAMINFO.
    let mut block_header = [0u8; 4];
    reader.read_exact(&mut block_header)?;
    if block_header[0] & 0x7F != 0 {
        return Err(MediaError::malformed("first block is not STREAMINFO"));
    }
    let block_len =
        u32::from_be_bytes([0, block_header[1], block_header[2], block_header[3]]) as usize;
    if block_len < 34 {
        return Err(MediaError::malformed("truncated STREAMINFO block"));
    }

    let mut info = [0u8; 34];
    reader.read_exact(&mut info)?;

    // Bytes 10..18 pack sample rate (20 bits), channels (3), bits per
    // sample (5) and total samples (36).
    let packed = u64::from_be_bytes([
        info[10], info[11], info[12], info[13], info[14], info[15], info[16], info[17],
    ]);
    let sample_rate = (packed >> 44) as u32;
    let total_samples = packed & ((1u64 << 36) - 1);

    if sample_rate == 0 || total_samples == 0 {
        return Err(MediaError::malformed("STREAMINFO reports no audio"));
    }

    let duration_secs = total_samples as f64 / sample_rate as f64;
    let bitrate_kbps = ((file_len as f64 * 8.0) / duration_secs / 1000.0) as u32;

    Ok(AudioProperties {
        duration_secs,
        bitrate_kbps,
    })
}

// Bitrate tables for MPEG Layer III, in kbps.
const MP3_BITRATES_V1: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];
const MP3_BITRATES_V2: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

// How far into the audio stream to look for the first frame sync word.
const MP3_SYNC_WINDOW: usize = 64 * 1024;

/// Estimates duration and bitrate of an MP3 from its first frame header.
///
/// Skips a leading ID3v2 tag, finds the first Layer III frame sync and
/// assumes the whole stream runs at that frame's bitrate. Variable-bitrate
/// files get an approximation.
pub fn mp3_properties(path: &Path) -> Result<AudioProperties, MediaError> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut audio_start: u64 = 0;
    let mut probe = [0u8; 10];
    if reader.read_exact(&mut probe).is_ok() && &probe[0..3] == b"ID3" {
        let tag_len = (u64::from(probe[6] & 0x7F) << 21)
            | (u64::from(probe[7] & 0x7F) << 14)
            | (u64::from(probe[8] & 0x7F) << 7)
            | u64::from(probe[9] & 0x7F);
        audio_start = 10 + tag_len;
    }
    reader.seek(SeekFrom::Start(audio_start))?;

    let mut window = vec![0u8; MP3_SYNC_WINDOW];
    let mut filled = 0;
    while filled < window.len() {
        let read = reader.read(&mut window[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    let window = &window[..filled];

    for i in 0..window.len().saturating_sub(3) {
        if window[i] != 0xFF || window[i + 1] & 0xE0 != 0xE0 {
            continue;
        }
        let version = (window[i + 1] >> 3) & 0x03;
        let layer = (window[i + 1] >> 1) & 0x03;
        let bitrate_index = (window[i + 2] >> 4) as usize;
        let samplerate_index = (window[i + 2] >> 2) & 0x03;

        // Only Layer III frames with a defined bitrate and sample rate.
        if layer != 0b01 || version == 0b01 || samplerate_index == 3 {
            continue;
        }
        if bitrate_index == 0 || bitrate_index >= 15 {
            continue;
        }

        let bitrate_kbps = if version == 0b11 {
            MP3_BITRATES_V1[bitrate_index]
        } else {
            MP3_BITRATES_V2[bitrate_index]
        };

        let audio_bytes = file_len.saturating_sub(audio_start + i as u64);
        let duration_secs = audio_bytes as f64 * 8.0 / (bitrate_kbps as f64 * 1000.0);

        return Ok(AudioProperties {
            duration_secs,
            bitrate_kbps,
        });
    }

    Err(MediaError::malformed("no MPEG frame sync found"))
}

struct BoxSpan {
    kind: [u8; 4],
    payload: u64,
    end: u64,
}

/// Reads the ISO base-media box header at `offset`. On success the reader
/// is left positioned at the start of the box payload.
fn read_box_at(
    reader: &mut BufReader<File>,
    offset: u64,
    limit: u64,
) -> Result<Option<BoxSpan>, MediaError> {
    if offset.checked_add(8).is_none_or(|header_end| header_end > limit) {
        return Ok(None);
    }
    reader.seek(SeekFrom::Start(offset))?;
    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;
    let compact_size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let kind = [header[4], header[5], header[6], header[7]];

    let (size, payload) = match compact_size {
        // Size 0 means the box runs to the end of its enclosing space.
        0 => (limit - offset, offset + 8),
        1 => {
            let mut wide = [0u8; 8];
            reader.read_exact(&mut wide)?;
            (u64::from_be_bytes(wide), offset + 16)
        }
        n => (u64::from(n), offset + 8),
    };

    // The declared size comes straight from the file; it must cover its
    // own header and stay inside the enclosing space without wrapping.
    let end = offset
        .checked_add(size)
        .filter(|end| *end <= limit && size >= payload - offset)
        .ok_or_else(|| MediaError::malformed("box size out of bounds"))?;

    Ok(Some(BoxSpan { kind, payload, end }))
}

/// Finds the first box of the given kind between `start` and `limit`.
fn find_box(
    reader: &mut BufReader<File>,
    start: u64,
    limit: u64,
    kind: [u8; 4],
) -> Result<Option<BoxSpan>, MediaError> {
    let mut cursor = start;
    while let Some(span) = read_box_at(reader, cursor, limit)? {
        if span.kind == kind {
            return Ok(Some(span));
        }
        cursor = span.end;
    }
    Ok(None)
}

fn parse_mvhd(reader: &mut BufReader<File>) -> Result<f64, MediaError> {
    let mut version_flags = [0u8; 4];
    reader.read_exact(&mut version_flags)?;

    // An all-ones duration is the "undefined" sentinel, not a length.
    let (timescale, duration, undefined) = match version_flags[0] {
        0 => {
            let mut body = [0u8; 16];
            reader.read_exact(&mut body)?;
            let timescale = u32::from_be_bytes([body[8], body[9], body[10], body[11]]);
            let duration = u32::from_be_bytes([body[12], body[13], body[14], body[15]]);
            (timescale, u64::from(duration), duration == u32::MAX)
        }
        1 => {
            let mut body = [0u8; 28];
            reader.read_exact(&mut body)?;
            let timescale = u32::from_be_bytes([body[16], body[17], body[18], body[19]]);
            let duration = u64::from_be_bytes([
                body[20], body[21], body[22], body[23], body[24], body[25], body[26], body[27],
            ]);
            (timescale, duration, duration == u64::MAX)
        }
        v => {
            return Err(MediaError::Malformed(format!("unknown mvhd version {v}")));
        }
    };

    if timescale == 0 {
        return Err(MediaError::malformed("zero movie timescale"));
    }
    if undefined {
        return Err(MediaError::malformed("undefined movie duration"));
    }
    Ok(duration as f64 / f64::from(timescale))
}

/// Returns the track dimensions from a tkhd box, or None for non-visual
/// tracks (width and height are zero for audio tracks).
fn parse_tkhd(reader: &mut BufReader<File>) -> Result<Option<(u32, u32)>, MediaError> {
    let mut version_flags = [0u8; 4];
    reader.read_exact(&mut version_flags)?;

    // Skip everything up to the 16.16 fixed-point width/height fields.
    let lead = match version_flags[0] {
        0 => 72,
        1 => 84,
        v => {
            return Err(MediaError::Malformed(format!("unknown tkhd version {v}")));
        }
    };
    let mut skip = [0u8; 84];
    reader.read_exact(&mut skip[..lead])?;

    let mut dims = [0u8; 8];
    reader.read_exact(&mut dims)?;
    let width = u32::from_be_bytes([dims[0], dims[1], dims[2], dims[3]]) >> 16;
    let height = u32::from_be_bytes([dims[4], dims[5], dims[6], dims[7]]) >> 16;

    if width == 0 || height == 0 {
        return Ok(None);
    }
    Ok(Some((width, height)))
}

/// Reads duration and frame size from an MP4/QuickTime container.
///
/// Walks the top-level boxes for `moov`, takes the duration from `mvhd`
/// and the dimensions from the first track whose `tkhd` reports a
/// non-zero frame size. Sample data (`mdat`) is never read.
pub fn mp4_properties(path: &Path) -> Result<VideoProperties, MediaError> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let moov = find_box(&mut reader, 0, file_len, *b"moov")?
        .ok_or_else(|| MediaError::malformed("missing moov box"))?;

    let mut duration_secs: Option<f64> = None;
    let mut dimensions: Option<(u32, u32)> = None;

    let mut cursor = moov.payload;
    while let Some(child) = read_box_at(&mut reader, cursor, moov.end)? {
        match &child.kind {
            b"mvhd" => {
                duration_secs = Some(parse_mvhd(&mut reader)?);
            }
            b"trak" if dimensions.is_none() => {
                // find_box leaves the reader at the tkhd payload.
                if find_box(&mut reader, child.payload, child.end, *b"tkhd")?.is_some() {
                    dimensions = parse_tkhd(&mut reader)?;
                }
            }
            _ => {}
        }
        cursor = child.end;
    }

    let duration_secs =
        duration_secs.ok_or_else(|| MediaError::malformed("missing mvhd box"))?;
    let (width, height) =
        dimensions.ok_or_else(|| MediaError::malformed("no visual track found"))?;

    Ok(VideoProperties {
        duration_secs,
        width,
        height,
    })
}

/// Counts whitespace-separated words with a streamed fixed-size buffer.
///
/// Word boundaries are ASCII whitespace, which is stable across UTF-8
/// because continuation bytes never collide with ASCII.
pub fn count_words(path: &Path) -> std::io::Result<u64> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut buf = [0u8; 64 * 1024];
    let mut words = 0u64;
    let mut in_word = false;

    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        for &byte in &buf[..read] {
            if byte.is_ascii_whitespace() {
                in_word = false;
            } else if !in_word {
                in_word = true;
                words += 1;
            }
        }
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    /// Uncompressed 24-bit BMP; only the headers matter for dimension
    /// probing but the pixel data is included so the file is complete.
    fn tiny_bmp(width: u32, height: u32) -> Vec<u8> {
        let row = (width * 3).div_ceil(4) * 4;
        let data_len = row * height;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"BM");
        bytes.extend_from_slice(&(54 + data_len).to_le_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(&54u32.to_le_bytes());
        bytes.extend_from_slice(&40u32.to_le_bytes());
        bytes.extend_from_slice(&(width as i32).to_le_bytes());
        bytes.extend_from_slice(&(height as i32).to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&24u16.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.extend_from_slice(&2835u32.to_le_bytes());
        bytes.extend_from_slice(&2835u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.resize(54 + data_len as usize, 0);
        bytes
    }

    fn tiny_wav(sample_rate: u32, seconds: u32) -> Vec<u8> {
        let byte_rate = sample_rate * 2; // mono, 16-bit
        let data_len = byte_rate * seconds;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(44 + data_len as usize, 0);
        bytes
    }

    fn tiny_flac(sample_rate: u32, total_samples: u64) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"fLaC");
        bytes.extend_from_slice(&[0x80, 0x00, 0x00, 0x22]); // last block, STREAMINFO, 34 bytes
        let mut info = [0u8; 34];
        let packed: u64 = (u64::from(sample_rate) << 44) | (1u64 << 41) | (15u64 << 36)
            | (total_samples & ((1 << 36) - 1));
        info[10..18].copy_from_slice(&packed.to_be_bytes());
        bytes.extend_from_slice(&info);
        bytes
    }

    fn tiny_mp4(timescale: u32, duration: u32, width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        // ftyp
        bytes.extend_from_slice(&16u32.to_be_bytes());
        bytes.extend_from_slice(b"ftypisom");
        bytes.extend_from_slice(&0u32.to_be_bytes());

        // mvhd: version/flags + creation + modification + timescale + duration
        let mut mvhd = Vec::new();
        mvhd.extend_from_slice(&28u32.to_be_bytes());
        mvhd.extend_from_slice(b"mvhd");
        mvhd.extend_from_slice(&[0u8; 4]);
        mvhd.extend_from_slice(&0u32.to_be_bytes());
        mvhd.extend_from_slice(&0u32.to_be_bytes());
        mvhd.extend_from_slice(&timescale.to_be_bytes());
        mvhd.extend_from_slice(&duration.to_be_bytes());

        // trak > tkhd with 16.16 fixed-point dimensions
        let mut tkhd = Vec::new();
        tkhd.extend_from_slice(&92u32.to_be_bytes());
        tkhd.extend_from_slice(b"tkhd");
        tkhd.extend_from_slice(&[0u8; 4]);
        tkhd.extend_from_slice(&[0u8; 72]);
        tkhd.extend_from_slice(&(width << 16).to_be_bytes());
        tkhd.extend_from_slice(&(height << 16).to_be_bytes());

        let mut trak = Vec::new();
        trak.extend_from_slice(&(8 + tkhd.len() as u32).to_be_bytes());
        trak.extend_from_slice(b"trak");
        trak.extend_from_slice(&tkhd);

        bytes.extend_from_slice(&((8 + mvhd.len() + trak.len()) as u32).to_be_bytes());
        bytes.extend_from_slice(b"moov");
        bytes.extend_from_slice(&mvhd);
        bytes.extend_from_slice(&trak);
        bytes
    }

    #[test]
    fn bmp_dimensions_read_from_header() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "pic.bmp", &tiny_bmp(2, 3));

        let (w, h) = image_dimensions(&path).unwrap();
        assert_eq!((w, h), (2, 3));
    }

    #[test]
    fn image_dimensions_rejects_non_image() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "note.txt", b"plain text, not pixels");

        assert!(image_dimensions(&path).is_err());
    }

    #[test]
    fn wav_duration_and_bitrate() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "tone.wav", &tiny_wav(8000, 2));

        let props = wav_properties(&path).unwrap();
        assert!((props.duration_secs - 2.0).abs() < 1e-9);
        assert_eq!(props.bitrate_kbps, 128);
    }

    #[test]
    fn wav_without_data_chunk_is_malformed() {
        let dir = TempDir::new().unwrap();
        let mut bytes = tiny_wav(8000, 1);
        bytes.truncate(36); // cut off before the data chunk
        bytes[4..8].copy_from_slice(&28u32.to_le_bytes());
        let path = write_file(&dir, "broken.wav", &bytes);

        assert!(matches!(
            wav_properties(&path),
            Err(MediaError::Malformed(_))
        ));
    }

    #[test]
    fn flac_duration_from_streaminfo() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "song.flac", &tiny_flac(44100, 441_000));

        let props = flac_properties(&path).unwrap();
        assert!((props.duration_secs - 10.0).abs() < 1e-9);
    }

    #[test]
    fn mp3_constant_bitrate_estimate() {
        let dir = TempDir::new().unwrap();
        // 0xFF 0xFB: MPEG-1 Layer III; 0x90: 128 kbps, 44.1 kHz.
        let mut bytes = vec![0xFF, 0xFB, 0x90, 0x00];
        bytes.resize(16_004, 0);
        let path = write_file(&dir, "clip.mp3", &bytes);

        let props = mp3_properties(&path).unwrap();
        assert_eq!(props.bitrate_kbps, 128);
        assert!((props.duration_secs - 1.0).abs() < 0.01);
    }

    #[test]
    fn mp3_skips_id3v2_tag() {
        let dir = TempDir::new().unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"ID3");
        bytes.extend_from_slice(&[0x04, 0x00, 0x00]); // version + flags
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x64]); // syncsafe 100
        bytes.resize(110, 0);
        bytes.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        bytes.resize(bytes.len() + 16_000, 0);
        let path = write_file(&dir, "tagged.mp3", &bytes);

        let props = mp3_properties(&path).unwrap();
        assert_eq!(props.bitrate_kbps, 128);
    }

    #[test]
    fn mp3_without_frame_sync_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "silence.mp3", &vec![0u8; 4096]);

        assert!(mp3_properties(&path).is_err());
    }

    #[test]
    fn mp4_duration_and_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "movie.mp4", &tiny_mp4(1000, 90_000, 1920, 1080));

        let props = mp4_properties(&path).unwrap();
        assert!((props.duration_secs - 90.0).abs() < 1e-9);
        assert_eq!((props.width, props.height), (1920, 1080));
    }

    #[test]
    fn mp4_without_moov_is_malformed() {
        let dir = TempDir::new().unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&16u32.to_be_bytes());
        bytes.extend_from_slice(b"ftypisom");
        bytes.extend_from_slice(&0u32.to_be_bytes());
        let path = write_file(&dir, "headless.mp4", &bytes);

        assert!(mp4_properties(&path).is_err());
    }

    #[test]
    fn mp4_with_wrapping_box_size_is_malformed() {
        let dir = TempDir::new().unwrap();
        // A valid ftyp followed by a box whose 64-bit size is u64::MAX,
        // which would wrap the end offset past the start of the box.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&16u32.to_be_bytes());
        bytes.extend_from_slice(b"ftypisom");
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(b"moov");
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());
        let path = write_file(&dir, "wrap.mp4", &bytes);

        assert!(matches!(
            mp4_properties(&path),
            Err(MediaError::Malformed(_))
        ));
    }

    #[test]
    fn mp4_undefined_duration_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "endless.mp4", &tiny_mp4(1000, u32::MAX, 640, 480));

        assert!(matches!(
            mp4_properties(&path),
            Err(MediaError::Malformed(_))
        ));
    }

    #[test]
    fn word_count_over_chunk_boundaries() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "essay.txt", b"one two\tthree\nfour  five ");
        assert_eq!(count_words(&path).unwrap(), 5);

        let empty = write_file(&dir, "empty.txt", b"");
        assert_eq!(count_words(&empty).unwrap(), 0);

        let unicode = write_file(&dir, "unicode.txt", "héllo wörld".as_bytes());
        assert_eq!(count_words(&unicode).unwrap(), 2);
    }
}
