//! Line-oriented output matched against vocabulary tables.

use regex::Regex;
use tracing::warn;

use super::vocabulary::{builtin_line_rules, clip, generic_line_rules};
use super::Outcome;
use crate::finding::{Category, Confidence, Finding};
use crate::tools::{PatternRule, ToolDescriptor};

/// A descriptor pattern compiled for matching.
struct CustomRule<'a> {
    regex: Regex,
    rule: &'a PatternRule,
}

/// Match each line of `texts` against the tool's vocabulary.
///
/// Descriptor patterns are consulted first, then the builtin table for the
/// tool, then the generic rules. Tools with no vocabulary of their own get one
/// summary finding for any unrecognized output.
pub fn parse_lines(descriptor: &ToolDescriptor, texts: &[&str]) -> Outcome {
    let tool = descriptor.name.as_str();

    let custom: Vec<CustomRule<'_>> = descriptor
        .patterns
        .iter()
        .filter_map(|rule| match Regex::new(&rule.regex) {
            Ok(regex) => Some(CustomRule { regex, rule }),
            Err(e) => {
                warn!(tool, pattern = %rule.regex, error = %e, "skipping invalid pattern");
                None
            }
        })
        .collect();
    let builtin = builtin_line_rules(tool);
    let has_vocabulary = builtin.is_some() || !custom.is_empty();

    let mut findings = Vec::new();
    let mut unrecognized: Vec<&str> = Vec::new();

    for line in texts.iter().flat_map(|t| t.lines()) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(c) = custom.iter().find(|c| c.regex.is_match(line)) {
            let description = match &c.rule.description {
                Some(template) => template.replace("{line}", line),
                None => clip(line, 160),
            };
            findings.push(Finding::new(tool, c.rule.category, c.rule.confidence, description));
            continue;
        }

        let matched = builtin
            .unwrap_or_default()
            .iter()
            .chain(generic_line_rules())
            .find(|r| r.regex.is_match(line));

        match matched {
            Some(rule) => {
                if let Some((category, confidence)) = rule.class {
                    findings.push(Finding::new(
                        tool,
                        category,
                        confidence,
                        format!("{}: {}", rule.label, clip(line, 160)),
                    ));
                }
            }
            None => unrecognized.push(line),
        }
    }

    if !has_vocabulary && !unrecognized.is_empty() {
        findings.push(Finding::new(
            tool,
            Category::Unclassified,
            Confidence::Low,
            format!(
                "{} unrecognized output line(s), first: {}",
                unrecognized.len(),
                clip(unrecognized[0], 120)
            ),
        ));
    }

    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::OutputFormat;

    fn lines_tool(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, &["{target}"], OutputFormat::Lines)
    }

    #[test]
    fn test_zsteg_output() {
        let out = "imagedata           .. text: \"\\n\\x01\"\n\
                   b1,rgb,lsb,xy       .. text: \"flag{lsb_is_fun}\"\n\
                   b1,r,msb,xy         .. file: Zip archive data, at least v1.0 to extract\n\
                   b2,g,lsb,xy         .. \n";
        let findings = parse_lines(&lines_tool("zsteg"), &[out]).unwrap();
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.confidence == Confidence::High));
        assert!(findings.iter().all(|f| f.category == Category::HiddenPayload));
    }

    #[test]
    fn test_strings_output() {
        let out = "IHDR\nlibpng version 1.6\nCTF{strings_are_easy}\nSGVsbG8gd29ybGQgdGhpcyBpcyBhIGxvbmcgYmFzZTY0IHN0cmluZw==\n";
        let findings = parse_lines(&lines_tool("strings"), &[out]).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].confidence, Confidence::Medium);
        assert_eq!(findings[1].category, Category::Unclassified);
    }

    #[test]
    fn test_builtin_noise_has_no_summary() {
        let zsteg = "b1,rgb,lsb,xy       .. \nb2,bgr,msb,yx       .. text: \"\\x03\"\n";
        assert!(parse_lines(&lines_tool("zsteg"), &[zsteg]).unwrap().is_empty());

        let strings = "IHDR\nIDATx\nIEND\n";
        assert!(parse_lines(&lines_tool("strings"), &[strings]).unwrap().is_empty());
    }

    #[test]
    fn test_extractor_chatter_is_benign() {
        let err = "wrote extracted data to \"steghide.out\".\n";
        let findings = parse_lines(&lines_tool("steghide"), &["", err]).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn test_custom_tool_patterns_and_summary() {
        let mut tool = lines_tool("stegseek");
        tool.patterns.push(PatternRule {
            regex: r"Found passphrase: ".to_string(),
            category: Category::HiddenPayload,
            confidence: Confidence::High,
            description: Some("cracked: {line}".to_string()),
        });
        let out = "[i] Found passphrase: \"abc\"\n[i] Original filename: \"secret.txt\"\n";
        let findings = parse_lines(&tool, &[out]).unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].description.starts_with("cracked: "));

        let bare = lines_tool("mystery");
        let findings = parse_lines(&bare, &["alpha\nbeta\n"]).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, Category::Unclassified);
        assert_eq!(findings[0].confidence, Confidence::Low);
        assert!(findings[0].description.starts_with("2 unrecognized"));
    }
}
