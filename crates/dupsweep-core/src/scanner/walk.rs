use glob::Pattern;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{error, trace, warn};
use walkdir::WalkDir;

use crate::error::{Error, FileIssue, IssueKind, Result};
use crate::progress::ProgressReporter;

const PROGRESS_EVERY: usize = 1000;

/// A regular file found by the walk. Never persisted directly.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: f64,
}

/// Exclusion rules applied during the walk.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    skip_extensions: Vec<String>,
    ignore_patterns: Vec<Pattern>,
    min_file_size: u64,
}

impl ScanFilter {
    pub fn new(skip_extensions: &[String], ignore_globs: &[String], min_file_size: u64) -> Self {
        let ignore_patterns = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();
        Self {
            skip_extensions: skip_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            ignore_patterns,
            min_file_size,
        }
    }

    pub fn is_skipped_type(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => {
                let ext = ext.to_lowercase();
                self.skip_extensions.iter().any(|s| *s == ext)
            }
            None => false,
        }
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns.iter().any(|p| p.matches_path(path))
    }

    /// Empty files are never candidates, whatever the minimum.
    pub fn is_too_small(&self, size: u64) -> bool {
        size == 0 || size < self.min_file_size
    }
}

#[derive(Debug, Default)]
pub struct WalkOutcome {
    /// In walk order (file names sorted within each directory).
    pub files: Vec<FileDescriptor>,
    pub total_seen: usize,
    /// Files matched by an ignore pattern. Files inside ignored directories
    /// are never visited and not counted.
    pub skipped_by_pattern: usize,
    pub skipped_by_type: usize,
    pub skipped_by_size: usize,
    pub issues: Vec<FileIssue>,
}

pub fn modified_secs(metadata: &fs::Metadata) -> io::Result<f64> {
    let modified = metadata.modified()?;
    let since_epoch = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    Ok(since_epoch.as_secs_f64())
}

/// Sequential, deterministic traversal of `root`. Symlinks are not followed.
///
/// Failing to enumerate the root itself is fatal; anything below it is
/// recorded as a [`FileIssue`] and skipped.
pub fn walk_tree(
    root: &Path,
    filter: &ScanFilter,
    reporter: &dyn ProgressReporter,
) -> Result<WalkOutcome> {
    if !root.is_dir() {
        return Err(Error::InvalidRoot(root.to_path_buf()));
    }
    if let Err(source) = fs::read_dir(root) {
        return Err(Error::RootUnreadable {
            path: root.to_path_buf(),
            source,
        });
    }

    let mut outcome = WalkOutcome::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !(entry.file_type().is_dir() && filter.is_ignored(entry.path()))
        });

    for entry_result in walker {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                if err.depth() == 0 {
                    return Err(Error::RootUnreadable {
                        path,
                        source: err
                            .into_io_error()
                            .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk failed")),
                    });
                }
                warn!("Skipping unreadable entry {}: {}", path.display(), err);
                outcome.issues.push(FileIssue::new(path, IssueKind::Scan, err));
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        outcome.total_seen += 1;
        if outcome.total_seen % PROGRESS_EVERY == 0 {
            reporter.on_scan_progress(outcome.total_seen);
        }

        let path = entry.path();
        // The store keys rows by UTF-8 path text; a lossy conversion could
        // fold two real files into one key.
        if path.to_str().is_none() {
            warn!("Skipping non-UTF-8 path {}", path.display());
            outcome
                .issues
                .push(FileIssue::new(path, IssueKind::Scan, "path is not valid UTF-8"));
            continue;
        }
        if filter.is_ignored(path) {
            outcome.skipped_by_pattern += 1;
            continue;
        }
        if filter.is_skipped_type(path) {
            outcome.skipped_by_type += 1;
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("Cannot stat {}: {}", path.display(), err);
                outcome.issues.push(FileIssue::new(path, IssueKind::Stat, err));
                continue;
            }
        };

        let size = metadata.len();
        if filter.is_too_small(size) {
            outcome.skipped_by_size += 1;
            continue;
        }

        let mtime = match modified_secs(&metadata) {
            Ok(mtime) => mtime,
            Err(err) => {
                warn!("Cannot read modification time of {}: {}", path.display(), err);
                outcome.issues.push(FileIssue::new(path, IssueKind::Stat, err));
                continue;
            }
        };

        trace!("Scanned {} ({} bytes)", path.display(), size);
        outcome.files.push(FileDescriptor {
            path: path.to_path_buf(),
            size,
            mtime,
        });
    }

    Ok(outcome)
}
