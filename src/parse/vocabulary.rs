//! Fixed lookup tables mapping tool vocabulary onto categories and confidences.

use lazy_static::lazy_static;
use phf::phf_map;
use regex::Regex;

use crate::finding::{Category, Confidence};

/// Classification of a metadata tag name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Location,
    Comment,
    Warning,
    Software,
}

/// Metadata tags worth reporting, keyed by tag name with spaces removed.
pub static METADATA_TAGS: phf::Map<&'static str, TagClass> = phf_map! {
    "GPSLatitude" => TagClass::Location,
    "GPSLongitude" => TagClass::Location,
    "GPSPosition" => TagClass::Location,
    "GPSAltitude" => TagClass::Location,
    "GPSCoordinates" => TagClass::Location,
    "Comment" => TagClass::Comment,
    "UserComment" => TagClass::Comment,
    "XPComment" => TagClass::Comment,
    "Warning" => TagClass::Warning,
    "Software" => TagClass::Software,
    "CreatorTool" => TagClass::Software,
};

/// One entry of a line-oriented vocabulary.
///
/// A rule without a classification marks matching lines as known-benign.
pub struct LineRule {
    pub regex: Regex,
    pub class: Option<(Category, Confidence)>,
    pub label: &'static str,
}

impl LineRule {
    fn new(pattern: &str, class: Option<(Category, Confidence)>, label: &'static str) -> Self {
        Self {
            regex: Regex::new(pattern).unwrap(),
            class,
            label,
        }
    }
}

lazy_static! {
    /// Flag-shaped tokens such as `CTF{...}`.
    pub static ref FLAG: Regex = Regex::new(r"\b[A-Za-z0-9_]{2,24}\{[^{}\s]{3,}\}").unwrap();

    /// Tools known to embed data, as they name themselves in `Software` tags.
    pub static ref STEGO_SOFTWARE: Regex = Regex::new(
        r"(?i)\b(steghide|outguess|openstego|silenteye|stegano|jphide|jsteg|invisible\s+secrets|steganos)\b"
    ).unwrap();

    /// Warnings about data after the end of the image stream.
    pub static ref TRAILER_WARNING: Regex = Regex::new(r"(?i)trail(er|ing)|after\s+(the\s+)?end").unwrap();

    static ref ZSTEG_RULES: Vec<LineRule> = vec![
        LineRule::new(
            r#"\.\.\s+text:\s*".*\b[A-Za-z0-9_]{2,24}\{[^{}\s]{3,}\}"#,
            Some((Category::HiddenPayload, Confidence::High)),
            "flag-shaped text in bit plane",
        ),
        LineRule::new(
            r#"\.\.\s+text:\s*"[^"]{8,}"#,
            Some((Category::HiddenPayload, Confidence::Medium)),
            "readable text in bit plane",
        ),
        LineRule::new(
            r"(?i)\.\.\s+file:\s*(zip|7-zip|rar|gzip|bzip2|xz|posix tar|pdf|png|jpeg|gif|pc bitmap|elf|pe32|openssl)",
            Some((Category::HiddenPayload, Confidence::High)),
            "embedded file signature in bit plane",
        ),
        LineRule::new(
            r"\.\.\s+file:",
            Some((Category::HiddenPayload, Confidence::Low)),
            "weak file signature in bit plane",
        ),
        // zsteg prints a line for every channel combination it tries
        LineRule::new(r".*", None, "bit plane noise"),
    ];

    static ref STRINGS_RULES: Vec<LineRule> = vec![
        LineRule::new(
            r"\b[A-Za-z0-9_]{2,24}\{[^{}\s]{3,}\}",
            Some((Category::HiddenPayload, Confidence::Medium)),
            "flag-shaped string",
        ),
        LineRule::new(
            r"-----BEGIN [A-Z ]*PRIVATE KEY-----",
            Some((Category::HiddenPayload, Confidence::Medium)),
            "embedded private key",
        ),
        LineRule::new(
            r"^\s*[A-Za-z0-9+/]{40,}={0,2}\s*$",
            Some((Category::Unclassified, Confidence::Low)),
            "long base64-like string",
        ),
        LineRule::new(
            r"(?i)\b(password|passphrase|secret)\s*[:=]",
            Some((Category::Unclassified, Confidence::Low)),
            "credential-like string",
        ),
        // any printable run in a binary; only the rules above carry signal
        LineRule::new(r".*", None, "printable string"),
    ];

    // Progress chatter; results come from the extracted files instead.
    static ref EXTRACTOR_RULES: Vec<LineRule> = vec![LineRule::new(r".*", None, "progress")];

    static ref GENERIC_RULES: Vec<LineRule> = vec![LineRule::new(
        r"\b[A-Za-z0-9_]{2,24}\{[^{}\s]{3,}\}",
        Some((Category::HiddenPayload, Confidence::Medium)),
        "flag-shaped output",
    )];

    /// Signature descriptions of embedded archives.
    pub static ref ARCHIVE_SIGNATURE: Regex = Regex::new(
        r"(?i)^(zip archive|7-zip archive|rar archive|gzip compressed|bzip2 compressed|xz compressed|lzma compressed|posix tar|openssl encryption)"
    ).unwrap();

    /// Signature descriptions of embedded documents, images and programs.
    pub static ref FILE_SIGNATURE: Regex = Regex::new(
        r"(?i)^(png image|jpeg image|gif image|pc bitmap|elf|microsoft executable|pdf document|sqlite)"
    ).unwrap();

    /// Signature descriptions that show up in ordinary files.
    pub static ref NOISE_SIGNATURE: Regex = Regex::new(
        r"(?i)^(zlib compressed data|tiff image data|unix path|copyright string|xml document|html document|mysql|jpeg image data, exif standard)"
    ).unwrap();
}

/// The builtin line vocabulary for a tool, if it has one.
pub fn builtin_line_rules(tool: &str) -> Option<&'static [LineRule]> {
    match tool {
        "zsteg" => Some(ZSTEG_RULES.as_slice()),
        "strings" => Some(STRINGS_RULES.as_slice()),
        "steghide" | "outguess" | "foremost" => Some(EXTRACTOR_RULES.as_slice()),
        _ => None,
    }
}

/// Rules applied to every line-oriented tool after its own vocabulary.
pub fn generic_line_rules() -> &'static [LineRule] {
    GENERIC_RULES.as_slice()
}

/// Classify a signature-table description.
///
/// `None` means the signature is common in clean files and not worth reporting.
pub fn classify_signature(description: &str) -> Option<(Category, Confidence)> {
    let description = description.trim();
    if NOISE_SIGNATURE.is_match(description) {
        None
    } else if ARCHIVE_SIGNATURE.is_match(description) {
        Some((Category::CarvedFile, Confidence::High))
    } else if FILE_SIGNATURE.is_match(description) {
        Some((Category::CarvedFile, Confidence::Medium))
    } else {
        Some((Category::Unclassified, Confidence::Low))
    }
}

/// Classify a metadata tag and its value.
pub fn classify_tag(name: &str, value: &str) -> Option<(Category, Confidence, String)> {
    let key: String = name.chars().filter(|c| !c.is_whitespace()).collect();
    let class = METADATA_TAGS.get(key.as_str())?;
    let value = value.trim();
    match class {
        TagClass::Location => Some((
            Category::MetadataAnomaly,
            Confidence::High,
            format!("GPS tag {} present: {}", key, clip(value, 80)),
        )),
        TagClass::Comment if value.is_empty() => None,
        TagClass::Comment => {
            let confidence = if FLAG.is_match(value) {
                Confidence::High
            } else {
                Confidence::Medium
            };
            Some((
                Category::MetadataAnomaly,
                confidence,
                format!("{} tag present: {}", key, clip(value, 80)),
            ))
        }
        TagClass::Warning if TRAILER_WARNING.is_match(value) => Some((
            Category::HiddenPayload,
            Confidence::Medium,
            format!("data after end of stream: {}", clip(value, 120)),
        )),
        TagClass::Warning => Some((
            Category::MetadataAnomaly,
            Confidence::Low,
            format!("metadata warning: {}", clip(value, 120)),
        )),
        TagClass::Software if STEGO_SOFTWARE.is_match(value) => Some((
            Category::HiddenPayload,
            Confidence::Medium,
            format!("written by steganography software: {}", clip(value, 80)),
        )),
        TagClass::Software => None,
    }
}

/// Shorten `s` to at most `max` characters, marking the cut.
pub fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}
