use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::analysis::resolution::ResolutionDecision;
use crate::detector::FileKey;
use crate::error::{FileIssue, IssueKind, Result};
use crate::progress::ProgressReporter;
use crate::storage::HashStore;

/// What an execute pass actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub deleted: Vec<FileKey>,
    pub bytes_freed: u64,
    pub failures: Vec<FileIssue>,
}

impl ExecutionResult {
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }
}

/// Deletes every `delete` member of each decision.
///
/// Individual failures are collected and never stop the batch. A group whose
/// kept copy has disappeared is skipped entirely, so the last copy of a file
/// is never removed. A target naming the kept path is refused. Store rows
/// of deleted files are dropped afterwards.
pub fn execute_decisions(
    store: &HashStore,
    decisions: &[ResolutionDecision],
    reporter: &dyn ProgressReporter,
) -> Result<ExecutionResult> {
    let total: usize = decisions.iter().map(|d| d.delete.len()).sum();
    reporter.on_delete_start(total);

    let mut result = ExecutionResult::default();
    let mut done = 0;

    for decision in decisions {
        if !Path::new(&decision.keep.path).exists() {
            warn!(
                "Kept copy {} no longer exists, leaving its {} duplicates alone",
                decision.keep.path,
                decision.delete.len()
            );
            for target in &decision.delete {
                result.failures.push(FileIssue::new(
                    &target.path,
                    IssueKind::Delete,
                    format!("kept copy {} is missing", decision.keep.path),
                ));
            }
            done += decision.delete.len();
            reporter.on_delete_progress(done, total);
            continue;
        }

        for target in &decision.delete {
            if target.path == decision.keep.path {
                warn!("Refusing to delete {}: it is the kept copy", target.path);
                result.failures.push(FileIssue::new(
                    &target.path,
                    IssueKind::Delete,
                    "target is the kept copy",
                ));
                done += 1;
                reporter.on_delete_progress(done, total);
                continue;
            }
            match delete_file(Path::new(&target.path)) {
                Ok(size) => {
                    debug!("Deleted {} ({} bytes)", target.path, size);
                    result.bytes_freed += size;
                    result.deleted.push(target.clone());
                }
                Err(reason) => {
                    warn!("Failed to delete {}: {}", target.path, reason);
                    result
                        .failures
                        .push(FileIssue::new(&target.path, IssueKind::Delete, reason));
                }
            }
            done += 1;
            reporter.on_delete_progress(done, total);
        }
    }

    let keys: Vec<(String, String)> = result
        .deleted
        .iter()
        .map(|k| (k.path.clone(), k.folder_label.clone()))
        .collect();
    store.remove_many(&keys)?;

    reporter.on_delete_complete(result.deleted_count(), result.failed_count());
    info!(
        "Deletion complete: {} deleted, {} failed, {} bytes freed",
        result.deleted_count(),
        result.failed_count(),
        result.bytes_freed
    );
    Ok(result)
}

fn delete_file(path: &Path) -> std::result::Result<u64, String> {
    let size = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == ErrorKind::NotFound => return Err("file missing".to_string()),
        Err(e) => return Err(format!("cannot stat: {}", e)),
    };
    match fs::remove_file(path) {
        Ok(()) => Ok(size),
        Err(e) if e.kind() == ErrorKind::NotFound => Err("file missing".to_string()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err("permission denied".to_string()),
        Err(e) => Err(format!("error: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::resolution::ResolutionReason;
    use crate::progress::SilentReporter;
    use crate::storage::CachedFileRecord;

    fn decision(keep: &Path, delete: &[&Path]) -> ResolutionDecision {
        let key = |p: &Path| FileKey::new(p.to_string_lossy(), "input");
        ResolutionDecision {
            keep: key(keep),
            delete: delete.iter().map(|p| key(*p)).collect(),
            reason: ResolutionReason::InputOrder,
        }
    }

    #[test]
    fn test_deletes_and_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("keep.bin");
        let dup = dir.path().join("dup.bin");
        let gone = dir.path().join("gone.bin");
        fs::write(&keep, b"0123456789").unwrap();
        fs::write(&dup, b"0123456789").unwrap();

        let store = HashStore::open_in_memory().unwrap();
        store
            .put(&CachedFileRecord::unhashed(dup.to_string_lossy(), "input", 10, 1.0))
            .unwrap();

        let result = execute_decisions(&store, &[decision(&keep, &[gone.as_path(), dup.as_path()])], &SilentReporter).unwrap();

        assert_eq!(result.deleted_count(), 1);
        assert_eq!(result.bytes_freed, 10);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].reason, "file missing");
        assert!(keep.exists());
        assert!(!dup.exists());
        assert!(store.get(&dup.to_string_lossy(), "input").unwrap().is_none());
    }

    #[test]
    fn test_target_equal_to_keep_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let only = dir.path().join("only.bin");
        fs::write(&only, b"unique").unwrap();

        let store = HashStore::open_in_memory().unwrap();
        let result = execute_decisions(&store, &[decision(&only, &[only.as_path()])], &SilentReporter).unwrap();

        assert_eq!(result.deleted_count(), 0);
        assert_eq!(result.failed_count(), 1);
        assert_eq!(result.failures[0].reason, "target is the kept copy");
        assert!(only.exists());
    }

    #[test]
    fn test_missing_keep_protects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("vanished.bin");
        let dup = dir.path().join("dup.bin");
        fs::write(&dup, b"data").unwrap();

        let store = HashStore::open_in_memory().unwrap();
        let result = execute_decisions(&store, &[decision(&keep, &[dup.as_path()])], &SilentReporter).unwrap();

        assert_eq!(result.deleted_count(), 0);
        assert_eq!(result.failed_count(), 1);
        assert!(dup.exists());
    }
}
