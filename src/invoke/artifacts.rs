//! Inventory of files a tool left in its scratch directory.

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::finding::ArtifactRef;
use crate::target::hash_file;

/// List and hash every non-empty file under `tool_dir`.
///
/// Paths in the result are relative to `scratch_root` and use `/` separators,
/// so they read the same in reports on every platform. Results are sorted by
/// path.
pub fn collect_artifacts(scratch_root: &Path, tool_dir: &Path) -> Vec<ArtifactRef> {
    let files: Vec<PathBuf> = WalkDir::new(tool_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                warn!(error = %e, "skipping unreadable scratch entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();

    let mut artifacts: Vec<ArtifactRef> = files
        .par_iter()
        .filter_map(|path| {
            let (sha256, size) = match hash_file(path) {
                Ok(v) => v,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot hash artifact");
                    return None;
                }
            };
            if size == 0 {
                return None;
            }
            Some(ArtifactRef {
                path: relative_display(scratch_root, path),
                sha256,
                size,
            })
        })
        .collect();

    artifacts.sort_by(|a, b| a.path.cmp(&b.path));
    artifacts
}

fn relative_display(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_artifacts() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let tool_dir = root.join("foremost");
        std::fs::create_dir_all(tool_dir.join("carved/zip")).unwrap();
        std::fs::write(tool_dir.join("carved/audit.txt"), "Foremost audit").unwrap();
        std::fs::write(tool_dir.join("carved/zip/00000042.zip"), b"PK\x03\x04data").unwrap();
        std::fs::write(tool_dir.join("carved/empty.bin"), b"").unwrap();

        let artifacts = collect_artifacts(root, &tool_dir);
        let paths: Vec<_> = artifacts.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["foremost/carved/audit.txt", "foremost/carved/zip/00000042.zip"]
        );
        assert_eq!(artifacts[1].size, 8);
        assert_eq!(artifacts[1].sha256.len(), 64);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let artifacts = collect_artifacts(temp.path(), &temp.path().join("nothing"));
        assert!(artifacts.is_empty());
    }
}
