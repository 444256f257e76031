//! Builtin analyzers.

use super::{Capability, OutputFormat, ToolDescriptor};
use crate::finding::{Category, Confidence};
use crate::target::FileKind;

/// The analyzers known out of the box, in report order.
pub fn builtin_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new("zsteg", &["-a", "{target}"], OutputFormat::Lines)
            .kinds(&[FileKind::Png, FileKind::Bmp]),
        ToolDescriptor::new(
            "steghide",
            &[
                "extract",
                "-sf",
                "{target}",
                "-xf",
                "{scratch}/steghide.out",
                "-p",
                "{password}",
                "-f",
            ],
            OutputFormat::Lines,
        )
        .kinds(&[FileKind::Jpeg, FileKind::Bmp, FileKind::Wav, FileKind::Au])
        .caps(&[Capability::AcceptsPassword, Capability::ExtractsFiles])
        // exits 1 when nothing can be extracted with the passphrase
        .ok_codes(&[0, 1])
        .extracted(Category::HiddenPayload, Confidence::High, &[]),
        ToolDescriptor::new(
            "outguess",
            &["-r", "{target}", "{scratch}/outguess.out"],
            OutputFormat::Lines,
        )
        .kinds(&[FileKind::Jpeg, FileKind::Pnm])
        .caps(&[Capability::ExtractsFiles])
        .ok_codes(&[0, 1])
        .probe(&[&["-h"]], &[0, 1])
        .extracted(Category::HiddenPayload, Confidence::Medium, &[]),
        ToolDescriptor::new("exiftool", &["-j", "{target}"], OutputFormat::Json)
            .ok_codes(&[0, 1])
            .probe(&[&["-ver"]], &[0]),
        ToolDescriptor::new(
            "binwalk",
            &["-e", "-C", "{scratch}", "{target}"],
            OutputFormat::Signature,
        )
        .caps(&[Capability::ExtractsFiles])
        .probe(&[&["--help"], &["-h"]], &[0]),
        ToolDescriptor::new(
            "foremost",
            &["-i", "{target}", "-o", "{scratch}/carved"],
            OutputFormat::Lines,
        )
        .caps(&[Capability::ExtractsFiles])
        .probe(&[&["-V"], &["-h"]], &[0])
        // foremost always recovers the container itself at offset zero
        .extracted(
            Category::CarvedFile,
            Confidence::High,
            &["**/audit.txt", "**/00000000.*"],
        ),
        ToolDescriptor::new("strings", &["-n", "6", "{target}"], OutputFormat::Lines),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_unique() {
        let tools = builtin_tools();
        let mut names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(total, 7);
    }

    #[test]
    fn test_extracting_tools_use_scratch() {
        for tool in builtin_tools() {
            let uses_scratch = tool.args.iter().any(|a| a.contains("{scratch}"));
            assert_eq!(
                uses_scratch,
                tool.extracts_files(),
                "{} scratch usage does not match its capability",
                tool.name
            );
            assert!(tool.args.iter().any(|a| a.contains("{target}")));
        }
    }

    #[test]
    fn test_steghide_takes_optional_password() {
        let tools = builtin_tools();
        let steghide = tools.iter().find(|t| t.name == "steghide").unwrap();
        assert!(steghide.has_capability(Capability::AcceptsPassword));
        assert!(!steghide.has_capability(Capability::RequiresPassword));
        assert!(steghide.applies_to(FileKind::Jpeg));
        assert!(!steghide.applies_to(FileKind::Png));
    }
}
