//! Duplicates that span two labeled trees.
//!
//! The first tree's records are taken from the store when a previous pass
//! left them there; the second tree is always scanned. Only sizes present
//! on both sides are hashed, and only groups with members from both labels
//! are reported.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::roots_overlap;
use crate::detector::{
    build_groups, canonical_root, DetectionStats, Detector, DuplicateGroup, FileKey, HashCandidate,
};
use crate::error::{Error, FileIssue, IssueKind, Result};
use crate::scanner::modified_secs;
use crate::storage::{CachedFileRecord, HashStore};

#[derive(Debug)]
pub struct CrossFolderReport {
    pub first_root: PathBuf,
    pub second_root: PathBuf,
    pub first_label: String,
    pub second_label: String,
    /// True when the first tree came from the store instead of a fresh scan.
    pub reused_first: bool,
    pub groups: Vec<DuplicateGroup>,
    pub stats: DetectionStats,
    pub issues: Vec<FileIssue>,
    /// Current store state of both trees' files.
    pub records: Vec<CachedFileRecord>,
    pub scan_duration: Duration,
    pub hash_duration: Duration,
}

pub struct CrossFolderMatcher<'a> {
    detector: &'a Detector<'a>,
    store: &'a HashStore,
    first_label: String,
    second_label: String,
}

impl<'a> CrossFolderMatcher<'a> {
    pub fn new(detector: &'a Detector<'a>, store: &'a HashStore, first_label: &str, second_label: &str) -> Self {
        Self {
            detector,
            store,
            first_label: first_label.to_string(),
            second_label: second_label.to_string(),
        }
    }

    pub fn run(&self, first_root: &Path, second_root: &Path) -> Result<CrossFolderReport> {
        let first_root = canonical_root(first_root)?;
        let second_root = canonical_root(second_root)?;
        if roots_overlap(&first_root, &second_root) {
            return Err(Error::InvalidConfig(format!(
                "folders overlap: {} and {}",
                first_root.display(),
                second_root.display()
            )));
        }

        let mut stats = DetectionStats::default();
        let mut issues = Vec::new();

        let scan_start = Instant::now();
        let (first_records, reused_first) = self.first_side(&first_root, &mut stats, &mut issues)?;
        let second = self.detector.scan(&second_root, &self.second_label)?;
        let scan_duration = scan_start.elapsed();
        absorb_walk_counts(&mut stats, &second.stats);
        issues.extend(second.issues);
        let second_records = second.records;

        let hash_start = Instant::now();
        let first_sizes: HashSet<u64> = first_records.iter().map(|r| r.size).collect();
        let second_sizes: HashSet<u64> = second_records.iter().map(|r| r.size).collect();
        let shared: HashSet<u64> = first_sizes.intersection(&second_sizes).copied().collect();
        debug!(
            "{} sizes on the first side, {} on the second, {} shared",
            first_sizes.len(),
            second_sizes.len(),
            shared.len()
        );

        let mut candidates = Vec::new();
        let mut records = Vec::with_capacity(first_records.len() + second_records.len());
        for record in first_records {
            if !shared.contains(&record.size) {
                stats.unique_sizes += 1;
                records.push(record);
                continue;
            }
            match self.current_identity(&record, reused_first, &mut issues)? {
                Some((size, mtime)) => {
                    candidates.push(candidate_from(record.clone(), size, mtime));
                    records.push(record);
                }
                None => continue,
            }
        }
        for record in second_records {
            if shared.contains(&record.size) {
                candidates.push(candidate_from(record.clone(), record.size, record.mtime));
            } else {
                stats.unique_sizes += 1;
            }
            records.push(record);
        }
        stats.collision_files = candidates.len();

        let resolved = self
            .detector
            .hash_candidates(&candidates, &mut stats, &mut issues)?;

        let positions: HashMap<FileKey, usize> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (FileKey::new(r.path.as_str(), r.folder_label.as_str()), i))
            .collect();
        let mut entries = Vec::new();
        for (candidate, resolved) in candidates.iter().zip(resolved) {
            let Some(resolved) = resolved else { continue };
            let hash = resolved.record.hash.clone();
            if let Some(&i) = positions.get(&candidate.key) {
                records[i] = resolved.record;
            }
            if let Some(hash) = hash {
                entries.push((candidate.size, hash, candidate.key.clone()));
            }
        }

        let groups: Vec<DuplicateGroup> = build_groups(entries)
            .into_iter()
            .filter(|group| self.spans_both(group))
            .collect();
        stats.record_groups(&groups);
        let hash_duration = hash_start.elapsed();

        info!(
            "Cross-folder: {} groups spanning '{}' and '{}', {} bytes reclaimable",
            groups.len(),
            self.first_label,
            self.second_label,
            stats.bytes_reclaimable
        );

        Ok(CrossFolderReport {
            first_root,
            second_root,
            first_label: self.first_label.clone(),
            second_label: self.second_label.clone(),
            reused_first,
            groups,
            stats,
            issues,
            records,
            scan_duration,
            hash_duration,
        })
    }

    /// Records for the first tree: the stored ones under `root` if any,
    /// otherwise a fresh scan.
    fn first_side(
        &self,
        root: &Path,
        stats: &mut DetectionStats,
        issues: &mut Vec<FileIssue>,
    ) -> Result<(Vec<CachedFileRecord>, bool)> {
        let stored: Vec<CachedFileRecord> = self
            .store
            .all_for_label(&self.first_label)?
            .into_iter()
            .filter(|record| Path::new(&record.path).starts_with(root))
            .collect();

        if !stored.is_empty() {
            info!(
                "Reusing {} stored records for '{}' under {}",
                stored.len(),
                self.first_label,
                root.display()
            );
            stats.total_scanned += stored.len();
            return Ok((stored, true));
        }

        debug!("No stored records for '{}', scanning {}", self.first_label, root.display());
        let report = self.detector.scan(root, &self.first_label)?;
        absorb_walk_counts(stats, &report.stats);
        issues.extend(report.issues);
        Ok((report.records, false))
    }

    /// Size and mtime as the file is now. Stored records can be stale or
    /// point at files deleted since they were written; those rows are dropped.
    fn current_identity(
        &self,
        record: &CachedFileRecord,
        from_store: bool,
        issues: &mut Vec<FileIssue>,
    ) -> Result<Option<(u64, f64)>> {
        if !from_store {
            return Ok(Some((record.size, record.mtime)));
        }
        let metadata = match fs::metadata(&record.path) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Stored file {} is gone: {}", record.path, e);
                self.store.remove(&record.path, &record.folder_label)?;
                issues.push(FileIssue::new(&record.path, IssueKind::Stat, e));
                return Ok(None);
            }
        };
        match modified_secs(&metadata) {
            Ok(mtime) => Ok(Some((metadata.len(), mtime))),
            Err(e) => {
                issues.push(FileIssue::new(&record.path, IssueKind::Stat, e));
                Ok(None)
            }
        }
    }

    fn spans_both(&self, group: &DuplicateGroup) -> bool {
        let has = |label: &str| group.members.iter().any(|m| m.folder_label == label);
        has(&self.first_label) && has(&self.second_label)
    }
}

fn candidate_from(record: CachedFileRecord, size: u64, mtime: f64) -> HashCandidate {
    HashCandidate {
        key: FileKey::new(record.path.as_str(), record.folder_label.as_str()),
        size,
        mtime,
        previous: Some(record),
    }
}

fn absorb_walk_counts(stats: &mut DetectionStats, scan: &DetectionStats) {
    stats.total_scanned += scan.total_scanned;
    stats.skipped_by_type += scan.skipped_by_type;
    stats.skipped_by_size += scan.skipped_by_size;
    stats.skipped_by_pattern += scan.skipped_by_pattern;
    stats.files_hashed += scan.files_hashed;
    stats.sampled_files += scan.sampled_files;
    stats.moved_files += scan.moved_files;
}
