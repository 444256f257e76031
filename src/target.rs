//! The file under analysis.
//!
//! An [`AnalysisTarget`] is built once at the start of a run: the file is
//! stat'ed, its type is sniffed from magic bytes (falling back to the
//! extension), and its SHA-256 is computed in a single streaming pass.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::{Result, TriageError};

/// Number of leading bytes handed to the magic-byte sniffer.
const SNIFF_LEN: usize = 8192;

const READ_CHUNK: usize = 64 * 1024;

/// Coarse file families used to decide which tools apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Png,
    Jpeg,
    Bmp,
    Gif,
    Tiff,
    Webp,
    Pnm,
    Wav,
    Au,
    Audio,
    Pdf,
    Archive,
    Executable,
    Text,
    Unknown,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Png => "png",
            FileKind::Jpeg => "jpeg",
            FileKind::Bmp => "bmp",
            FileKind::Gif => "gif",
            FileKind::Tiff => "tiff",
            FileKind::Webp => "webp",
            FileKind::Pnm => "pnm",
            FileKind::Wav => "wav",
            FileKind::Au => "au",
            FileKind::Audio => "audio",
            FileKind::Pdf => "pdf",
            FileKind::Archive => "archive",
            FileKind::Executable => "executable",
            FileKind::Text => "text",
            FileKind::Unknown => "unknown",
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(
            self,
            FileKind::Png
                | FileKind::Jpeg
                | FileKind::Bmp
                | FileKind::Gif
                | FileKind::Tiff
                | FileKind::Webp
                | FileKind::Pnm
        )
    }

    /// Map a file extension (without the dot) to a kind.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "png" => FileKind::Png,
            "jpg" | "jpeg" | "jpe" | "jfif" => FileKind::Jpeg,
            "bmp" | "dib" => FileKind::Bmp,
            "gif" => FileKind::Gif,
            "tif" | "tiff" => FileKind::Tiff,
            "webp" => FileKind::Webp,
            "pnm" | "ppm" | "pgm" | "pbm" => FileKind::Pnm,
            "wav" | "wave" => FileKind::Wav,
            "au" | "snd" => FileKind::Au,
            "mp3" | "flac" | "ogg" | "m4a" | "aiff" => FileKind::Audio,
            "pdf" => FileKind::Pdf,
            "zip" | "rar" | "7z" | "gz" | "tgz" | "tar" | "bz2" | "xz" | "zst" => FileKind::Archive,
            "exe" | "dll" | "elf" | "so" | "bin" => FileKind::Executable,
            "txt" | "md" | "csv" | "log" => FileKind::Text,
            _ => FileKind::Unknown,
        }
    }

    fn from_sniffed(kind: &infer::Type) -> Self {
        // infer files PDF under archives, so the extension decides first.
        match FileKind::from_extension(kind.extension()) {
            FileKind::Unknown => match kind.matcher_type() {
                infer::MatcherType::Archive => FileKind::Archive,
                infer::MatcherType::App => FileKind::Executable,
                infer::MatcherType::Audio => FileKind::Audio,
                _ => FileKind::Unknown,
            },
            known => known,
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable description of the file being triaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTarget {
    pub path: PathBuf,
    pub size: u64,
    /// MIME type implied by the file name, if any.
    pub declared_mime: Option<String>,
    /// MIME type detected from magic bytes, if recognized.
    pub sniffed_mime: Option<String>,
    pub kind: FileKind,
    /// Lowercase hex SHA-256 of the content.
    pub sha256: String,
}

impl AnalysisTarget {
    /// Stat, sniff and hash the file at `path`.
    ///
    /// The stored path is absolute so tools started in another working
    /// directory still find the file. Any I/O failure is reported as [`TriageError::TargetUnreadable`].
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let unreadable = |source: std::io::Error| TriageError::TargetUnreadable {
            path: path.to_path_buf(),
            source,
        };

        let metadata = std::fs::metadata(path).map_err(unreadable)?;
        if !metadata.is_file() {
            return Err(unreadable(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        let absolute = std::path::absolute(path).map_err(unreadable)?;
        let file = File::open(&absolute).map_err(unreadable)?;
        let (sha256, size, header) = digest_reader(file, SNIFF_LEN).map_err(unreadable)?;

        let declared_mime = mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string());
        let sniffed = infer::get(&header);
        let sniffed_mime = sniffed.as_ref().map(|t| t.mime_type().to_string());

        let kind = match &sniffed {
            Some(t) => FileKind::from_sniffed(t),
            None => {
                let by_ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(FileKind::from_extension)
                    .unwrap_or(FileKind::Unknown);
                if by_ext == FileKind::Unknown && looks_like_text(&header) {
                    FileKind::Text
                } else {
                    by_ext
                }
            }
        };

        Ok(Self {
            path: absolute,
            size,
            declared_mime,
            sniffed_mime,
            kind,
            sha256,
        })
    }

    /// The type reported to callers: sniffed MIME first, then declared.
    pub fn file_type(&self) -> &str {
        self.sniffed_mime
            .as_deref()
            .or(self.declared_mime.as_deref())
            .unwrap_or("application/octet-stream")
    }
}

/// Compute the SHA-256 and size of a file.
pub fn hash_file(path: &Path) -> std::io::Result<(String, u64)> {
    let file = File::open(path)?;
    let (digest, size, _) = digest_reader(file, 0)?;
    Ok((digest, size))
}

/// Stream `reader` through SHA-256, keeping the first `keep` bytes.
fn digest_reader<R: Read>(reader: R, keep: usize) -> std::io::Result<(String, u64, Vec<u8>)> {
    let mut reader = BufReader::with_capacity(READ_CHUNK, reader);
    let mut hasher = Sha256::new();
    let mut header = Vec::with_capacity(keep);
    let mut buf = vec![0u8; READ_CHUNK];
    let mut size = 0u64;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        if header.len() < keep {
            let take = (keep - header.len()).min(n);
            header.extend_from_slice(&buf[..take]);
        }
        size += n as u64;
    }

    Ok((format!("{:x}", hasher.finalize()), size, header))
}

fn looks_like_text(header: &[u8]) -> bool {
    if header.is_empty() {
        return false;
    }
    let printable = header
        .iter()
        .filter(|&&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..0x7f).contains(&b))
        .count();
    printable * 100 / header.len() >= 95
}
