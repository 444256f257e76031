//! Core types for normalized findings.

use serde::{Deserialize, Serialize};

/// How sure a finding is.
///
/// Variants are declared in ascending order so `Ord` ranks `High` above `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            _ => Err(format!("unknown confidence: {}", s)),
        }
    }
}

/// Shared vocabulary every tool's output is mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "hidden-payload")]
    HiddenPayload,
    #[serde(rename = "metadata-anomaly")]
    MetadataAnomaly,
    #[serde(rename = "carved-file")]
    CarvedFile,
    #[serde(rename = "parse-error")]
    ParseError,
    #[serde(rename = "unclassified")]
    Unclassified,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::HiddenPayload => "hidden-payload",
            Category::MetadataAnomaly => "metadata-anomaly",
            Category::CarvedFile => "carved-file",
            Category::ParseError => "parse-error",
            Category::Unclassified => "unclassified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hidden-payload" => Some(Category::HiddenPayload),
            "metadata-anomaly" => Some(Category::MetadataAnomaly),
            "carved-file" => Some(Category::CarvedFile),
            "parse-error" => Some(Category::ParseError),
            "unclassified" => Some(Category::Unclassified),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A file a tool extracted into its scratch directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Path relative to the run's scratch root, e.g. `foremost/carved/zip/00000042.zip`.
    pub path: String,
    /// Lowercase hex SHA-256 of the artifact content.
    pub sha256: String,
    pub size: u64,
}

/// One normalized observation from a parsed tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub tool: String,
    pub category: Category,
    pub confidence: Confidence,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
    /// Other tools whose findings were merged into this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty", rename = "corroboratedBy")]
    pub corroborated_by: Vec<String>,
}

impl Finding {
    pub fn new(
        tool: impl Into<String>,
        category: Category,
        confidence: Confidence,
        description: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            category,
            confidence,
            description: description.into(),
            artifact: None,
            corroborated_by: Vec::new(),
        }
    }

    pub fn with_artifact(mut self, artifact: ArtifactRef) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Identity used when collapsing findings from different tools.
    ///
    /// Findings that carry an artifact are keyed by content hash so that two
    /// carvers extracting the same bytes collapse together.
    pub fn dedup_key(&self) -> String {
        match &self.artifact {
            Some(a) => format!("{}|artifact|{}", self.category, a.sha256),
            None => format!("{}|{}|{}", self.category, self.tool, self.description),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
        assert_eq!("HIGH".parse::<Confidence>(), Ok(Confidence::High));
        assert!("extreme".parse::<Confidence>().is_err());
    }

    #[test]
    fn test_category_names() {
        for c in [
            Category::HiddenPayload,
            Category::MetadataAnomaly,
            Category::CarvedFile,
            Category::ParseError,
            Category::Unclassified,
        ] {
            assert_eq!(Category::parse(c.as_str()), Some(c));
            assert_eq!(
                serde_json::to_string(&c).unwrap(),
                format!("\"{}\"", c.as_str())
            );
        }
        assert_eq!(Category::parse("lsb"), None);
    }

    #[test]
    fn test_dedup_key_uses_artifact_hash() {
        let artifact = ArtifactRef {
            path: "foremost/carved/zip/00000042.zip".into(),
            sha256: "ab".repeat(32),
            size: 10,
        };
        let a = Finding::new("foremost", Category::CarvedFile, Confidence::High, "zip")
            .with_artifact(artifact.clone());
        let mut b = Finding::new("binwalk", Category::CarvedFile, Confidence::Medium, "Zip archive");
        b.artifact = Some(ArtifactRef {
            path: "binwalk/_x.extracted/2A.zip".into(),
            ..artifact
        });
        assert_eq!(a.dedup_key(), b.dedup_key());

        let c = Finding::new("strings", Category::HiddenPayload, Confidence::Medium, "flag");
        let d = Finding::new("zsteg", Category::HiddenPayload, Confidence::Medium, "flag");
        assert_ne!(c.dedup_key(), d.dedup_key());
    }
}
