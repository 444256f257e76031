//! Deduplication, ordering and the verdict decision.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::finding::{Category, Confidence, Finding};
use crate::report::{ToolStatus, Verdict};

/// Rules turning a finding set and tool statuses into a verdict.
///
/// Rules are checked from most to least alarming; the first that applies wins:
///
/// 1. `positive`: a finding in `positive_categories` at `positive_confidence` or above.
/// 2. `suspicious`: any finding at `suspicious_confidence` or above, or every
///    considered tool unavailable (when `all_unavailable_is_suspicious`).
/// 3. `inconclusive`: any remaining finding, a failed or timed-out tool (when
///    `failures_are_inconclusive`), or no tool considered at all.
/// 4. `clean`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictPolicy {
    pub positive_categories: Vec<Category>,
    pub positive_confidence: Confidence,
    pub suspicious_confidence: Confidence,
    pub all_unavailable_is_suspicious: bool,
    pub failures_are_inconclusive: bool,
}

impl Default for VerdictPolicy {
    fn default() -> Self {
        Self {
            positive_categories: vec![Category::HiddenPayload, Category::CarvedFile],
            positive_confidence: Confidence::High,
            suspicious_confidence: Confidence::Medium,
            all_unavailable_is_suspicious: true,
            failures_are_inconclusive: true,
        }
    }
}

impl VerdictPolicy {
    /// Decide the verdict for an aggregated run.
    pub fn decide(&self, findings: &[Finding], statuses: &BTreeMap<String, ToolStatus>) -> Verdict {
        if findings.iter().any(|f| {
            self.positive_categories.contains(&f.category) && f.confidence >= self.positive_confidence
        }) {
            return Verdict::Positive;
        }

        let considered: Vec<ToolStatus> = statuses
            .values()
            .copied()
            .filter(|s| *s != ToolStatus::Skipped)
            .collect();
        let all_unavailable =
            !considered.is_empty() && considered.iter().all(|s| *s == ToolStatus::Unavailable);

        if findings.iter().any(|f| f.confidence >= self.suspicious_confidence)
            || (self.all_unavailable_is_suspicious && all_unavailable)
        {
            return Verdict::Suspicious;
        }

        let any_failure = considered
            .iter()
            .any(|s| matches!(s, ToolStatus::Failed | ToolStatus::TimedOut));
        let none_ran = !considered.iter().any(|s| *s == ToolStatus::RanOk);

        if !findings.is_empty() || (self.failures_are_inconclusive && any_failure) || none_ran {
            return Verdict::Inconclusive;
        }

        Verdict::Clean
    }
}

/// Collapses duplicate findings, orders them and decides the verdict.
#[derive(Debug, Clone, Default)]
pub struct ReportAggregator {
    policy: VerdictPolicy,
}

impl ReportAggregator {
    pub fn new(policy: VerdictPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &VerdictPolicy {
        &self.policy
    }

    /// Deduplicate and sort `findings`, then decide the verdict.
    pub fn aggregate(
        &self,
        findings: Vec<Finding>,
        statuses: &BTreeMap<String, ToolStatus>,
    ) -> (Vec<Finding>, Verdict) {
        let mut findings = dedup(findings);
        sort_findings(&mut findings);
        let verdict = self.policy.decide(&findings, statuses);
        (findings, verdict)
    }
}

/// Merge findings that share a [`Finding::dedup_key`].
///
/// The survivor is the most confident finding (ties go to the tool name that
/// sorts first). Distinct descriptions are joined with `"; "` and the other
/// tools are listed in `corroborated_by`.
pub fn dedup(findings: Vec<Finding>) -> Vec<Finding> {
    let mut groups: HashMap<String, Vec<Finding>> = HashMap::new();
    for finding in findings {
        groups.entry(finding.dedup_key()).or_default().push(finding);
    }

    groups
        .into_values()
        .filter_map(|mut group| {
            group.sort_by(|a, b| {
                b.confidence
                    .cmp(&a.confidence)
                    .then_with(|| a.tool.cmp(&b.tool))
                    .then_with(|| a.description.cmp(&b.description))
            });
            let mut iter = group.into_iter();
            let mut merged = iter.next()?;
            for other in iter {
                if !merged.description.split("; ").any(|d| d == other.description) {
                    merged.description.push_str("; ");
                    merged.description.push_str(&other.description);
                }
                if other.tool != merged.tool && !merged.corroborated_by.contains(&other.tool) {
                    merged.corroborated_by.push(other.tool);
                }
            }
            merged.corroborated_by.sort();
            Some(merged)
        })
        .collect()
}

/// Order findings by confidence (highest first), then tool name, then the
/// remaining fields so the order never depends on completion order.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(compare_findings);
}

pub fn compare_findings(a: &Finding, b: &Finding) -> Ordering {
    b.confidence
        .cmp(&a.confidence)
        .then_with(|| a.tool.cmp(&b.tool))
        .then_with(|| a.category.cmp(&b.category))
        .then_with(|| a.description.cmp(&b.description))
        .then_with(|| {
            let pa = a.artifact.as_ref().map(|x| x.path.as_str());
            let pb = b.artifact.as_ref().map(|x| x.path.as_str());
            pa.cmp(&pb)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::ArtifactRef;

    fn statuses(pairs: &[(&str, ToolStatus)]) -> BTreeMap<String, ToolStatus> {
        pairs.iter().map(|(n, s)| (n.to_string(), *s)).collect()
    }

    fn carved(tool: &str, confidence: Confidence, sha: &str) -> Finding {
        Finding::new(tool, Category::CarvedFile, confidence, format!("{} carved zip", tool)).with_artifact(
            ArtifactRef {
                path: format!("{}/x.zip", tool),
                sha256: sha.repeat(64),
                size: 10,
            },
        )
    }

    #[test]
    fn test_dedup_same_artifact_across_tools() {
        let merged = dedup(vec![
            carved("foremost", Confidence::High, "a"),
            carved("binwalk", Confidence::Medium, "a"),
            carved("binwalk", Confidence::High, "b"),
        ]);
        assert_eq!(merged.len(), 2);
        let a = merged
            .iter()
            .find(|f| f.artifact.as_ref().unwrap().sha256.starts_with('a'))
            .unwrap();
        assert_eq!(a.tool, "foremost");
        assert_eq!(a.confidence, Confidence::High);
        assert_eq!(a.corroborated_by, vec!["binwalk".to_string()]);
        assert_eq!(a.description, "foremost carved zip; binwalk carved zip");
    }

    #[test]
    fn test_dedup_tie_prefers_first_tool_name() {
        let merged = dedup(vec![
            carved("zeta", Confidence::High, "c"),
            carved("alpha", Confidence::High, "c"),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].tool, "alpha");
        assert_eq!(merged[0].corroborated_by, vec!["zeta".to_string()]);
    }

    #[test]
    fn test_sort_order() {
        let mut findings = vec![
            Finding::new("zsteg", Category::HiddenPayload, Confidence::Medium, "m"),
            Finding::new("exiftool", Category::MetadataAnomaly, Confidence::Low, "l"),
            Finding::new("binwalk", Category::CarvedFile, Confidence::High, "h"),
            Finding::new("alpha", Category::Unclassified, Confidence::Medium, "m"),
        ];
        sort_findings(&mut findings);
        let order: Vec<_> = findings.iter().map(|f| f.tool.as_str()).collect();
        assert_eq!(order, vec!["binwalk", "alpha", "zsteg", "exiftool"]);
    }

    #[test]
    fn test_aggregate_sorted_for_random_sets() {
        // seeded LCG so failures are reproducible
        let mut state = 0x5eed_u64;
        let mut next = move |bound: u64| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) % bound
        };
        let tools = ["binwalk", "exiftool", "foremost", "strings", "zsteg"];
        let categories = [
            Category::HiddenPayload,
            Category::MetadataAnomaly,
            Category::CarvedFile,
            Category::ParseError,
            Category::Unclassified,
        ];
        let confidences = [Confidence::Low, Confidence::Medium, Confidence::High];
        let aggregator = ReportAggregator::default();
        let ran = statuses(&[("zsteg", ToolStatus::RanOk)]);

        for _ in 0..200 {
            let count = next(12) as usize;
            let findings: Vec<Finding> = (0..count)
                .map(|_| {
                    Finding::new(
                        tools[next(5) as usize],
                        categories[next(5) as usize],
                        confidences[next(3) as usize],
                        format!("observation {}", next(4)),
                    )
                })
                .collect();

            let mut reversed = findings.clone();
            reversed.reverse();
            let (sorted, verdict) = aggregator.aggregate(findings, &ran);
            let (again, verdict_again) = aggregator.aggregate(reversed, &ran);

            assert_eq!(sorted, again);
            assert_eq!(verdict, verdict_again);
            for pair in sorted.windows(2) {
                assert!(
                    pair[0].confidence > pair[1].confidence
                        || (pair[0].confidence == pair[1].confidence && pair[0].tool <= pair[1].tool),
                    "{:?} before {:?}",
                    pair[0],
                    pair[1]
                );
            }
        }
    }

    #[test]
    fn test_verdict_table() {
        let policy = VerdictPolicy::default();
        let ran = statuses(&[("exiftool", ToolStatus::RanOk), ("zsteg", ToolStatus::RanOk)]);

        assert_eq!(policy.decide(&[], &ran), Verdict::Clean);

        let meta_low = Finding::new("exiftool", Category::MetadataAnomaly, Confidence::Low, "w");
        assert_eq!(policy.decide(&[meta_low.clone()], &ran), Verdict::Inconclusive);

        let parse = Finding::new("binwalk", Category::ParseError, Confidence::Low, "bad");
        assert_eq!(policy.decide(&[parse], &ran), Verdict::Inconclusive);

        let medium = Finding::new("strings", Category::HiddenPayload, Confidence::Medium, "f");
        assert_eq!(policy.decide(&[medium, meta_low], &ran), Verdict::Suspicious);

        let payload = Finding::new("zsteg", Category::HiddenPayload, Confidence::High, "t");
        assert_eq!(policy.decide(&[payload], &ran), Verdict::Positive);

        // high metadata anomaly is not in the positive table
        let gps = Finding::new("exiftool", Category::MetadataAnomaly, Confidence::High, "gps");
        assert_eq!(policy.decide(&[gps], &ran), Verdict::Suspicious);
    }

    #[test]
    fn test_verdict_statuses() {
        let policy = VerdictPolicy::default();

        let all_missing = statuses(&[("zsteg", ToolStatus::Unavailable), ("exiftool", ToolStatus::Unavailable)]);
        assert_eq!(policy.decide(&[], &all_missing), Verdict::Suspicious);

        let failed = statuses(&[("zsteg", ToolStatus::RanOk), ("binwalk", ToolStatus::TimedOut)]);
        assert_eq!(policy.decide(&[], &failed), Verdict::Inconclusive);

        let partly = statuses(&[("zsteg", ToolStatus::RanOk), ("binwalk", ToolStatus::Unavailable)]);
        assert_eq!(policy.decide(&[], &partly), Verdict::Clean);

        let nothing = statuses(&[("zsteg", ToolStatus::Skipped)]);
        assert_eq!(policy.decide(&[], &nothing), Verdict::Inconclusive);
        assert_eq!(policy.decide(&[], &BTreeMap::new()), Verdict::Inconclusive);

        let lenient = VerdictPolicy {
            all_unavailable_is_suspicious: false,
            failures_are_inconclusive: false,
            ..VerdictPolicy::default()
        };
        assert_eq!(lenient.decide(&[], &all_missing), Verdict::Inconclusive);
        assert_eq!(lenient.decide(&[], &failed), Verdict::Clean);
    }
}
