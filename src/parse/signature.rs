//! Signature tables: `DECIMAL  HEXADECIMAL  DESCRIPTION` rows.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

use super::vocabulary::{classify_signature, clip};
use super::{parse_error, Outcome};
use crate::finding::{ArtifactRef, Category, Confidence, Finding};

lazy_static! {
    static ref ROW: Regex = Regex::new(r"^\s*(\d+)\s+0x([0-9A-Fa-f]+)\s+(.+?)\s*$").unwrap();
    static ref HEADER: Regex = Regex::new(r"(?i)^\s*DECIMAL\s+HEXADECIMAL\s+DESCRIPTION").unwrap();
    static ref RULE: Regex = Regex::new(r"^\s*-{8,}\s*$").unwrap();
}

/// Parse a signature table.
///
/// The signature at offset zero is the container itself and is skipped.
/// Rows are linked to an extracted artifact whose file stem is the row's
/// hexadecimal offset.
pub fn parse_signatures(tool: &str, text: &str, artifacts: &[ArtifactRef]) -> Outcome {
    let mut findings = Vec::new();
    let mut saw_table = false;
    let mut stray: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() || RULE.is_match(line) {
            continue;
        }
        if HEADER.is_match(line) {
            saw_table = true;
            continue;
        }
        let Some(caps) = ROW.captures(line) else {
            // binwalk prints scan banners between tables
            if !line.trim_start().starts_with("Scan Time")
                && !line.trim_start().starts_with("Target File")
                && !line.trim_start().starts_with("MD5 Checksum")
                && !line.trim_start().starts_with("Signatures")
            {
                stray.push(line.trim());
            }
            continue;
        };
        saw_table = true;

        let decimal: u64 = match caps[1].parse() {
            Ok(v) => v,
            Err(_) => {
                findings.push(row_error(tool, line));
                continue;
            }
        };
        match u64::from_str_radix(&caps[2], 16) {
            Ok(hex) if hex == decimal => {}
            _ => {
                findings.push(row_error(tool, line));
                continue;
            }
        }
        if decimal == 0 {
            continue;
        }

        let description = &caps[3];
        let Some((category, confidence)) = classify_signature(description) else {
            continue;
        };

        let mut finding = Finding::new(
            tool,
            category,
            confidence,
            format!("{} at offset 0x{:X}", clip(description, 120), decimal),
        );
        if let Some(artifact) = artifact_at_offset(artifacts, decimal) {
            finding = finding.with_artifact(artifact.clone());
        }
        findings.push(finding);
    }

    if !saw_table && !stray.is_empty() {
        return Err(parse_error(
            tool,
            format!("no signature table found, first line: {}", clip(stray[0], 80)),
        ));
    }
    Ok(findings)
}

fn row_error(tool: &str, line: &str) -> Finding {
    Finding::new(
        tool,
        Category::ParseError,
        Confidence::Low,
        format!("inconsistent signature row: {}", clip(line.trim(), 120)),
    )
}

fn artifact_at_offset(artifacts: &[ArtifactRef], offset: u64) -> Option<&ArtifactRef> {
    artifacts.iter().find(|a| {
        Path::new(&a.path)
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| u64::from_str_radix(s, 16).ok())
            == Some(offset)
    })
}
