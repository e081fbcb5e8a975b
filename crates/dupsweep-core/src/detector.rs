//! Metadata-first duplicate detection within one labeled tree.
//!
//! Every scanned file is recorded in the store, but only files that share
//! their exact size with another file are ever hashed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{Error, FileIssue, IssueKind, Result};
use crate::hasher::{compute_all, valid_cached_hash, HashRequest, Sampler};
use crate::progress::ProgressReporter;
use crate::scanner::{walk_tree, FileDescriptor, ScanFilter};
use crate::storage::{CachedFileRecord, HashKind, HashStore};

/// A file as the store knows it: absolute path plus folder label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey {
    pub path: String,
    pub folder_label: String,
}

impl FileKey {
    pub fn new(path: impl Into<String>, folder_label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            folder_label: folder_label.into(),
        }
    }
}

/// Two or more files sharing both size and hash. Members keep the order in
/// which they were enumerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub hash: String,
    pub size: u64,
    pub members: Vec<FileKey>,
}

impl DuplicateGroup {
    /// Bytes freed by keeping a single copy.
    pub fn reclaimable_bytes(&self) -> u64 {
        self.size * (self.members.len() as u64).saturating_sub(1)
    }
}

/// Counters for one detection pass. Durations are reported separately so
/// that two passes over unchanged trees compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionStats {
    pub total_scanned: usize,
    pub skipped_by_type: usize,
    pub skipped_by_size: usize,
    pub skipped_by_pattern: usize,
    /// Files whose size no other file has; never hashed.
    pub unique_sizes: usize,
    /// Files in size-collision groups.
    pub collision_files: usize,
    pub files_hashed: usize,
    pub cache_hits: usize,
    pub sampled_files: usize,
    pub hash_failures: usize,
    pub moved_files: usize,
    pub duplicate_groups: usize,
    pub duplicate_files: usize,
    pub bytes_reclaimable: u64,
}

impl DetectionStats {
    pub(crate) fn record_groups(&mut self, groups: &[DuplicateGroup]) {
        self.duplicate_groups = groups.len();
        self.duplicate_files = groups.iter().map(|g| g.members.len()).sum();
        self.bytes_reclaimable = groups.iter().map(DuplicateGroup::reclaimable_bytes).sum();
    }
}

/// Result of scanning one tree.
#[derive(Debug)]
pub struct ScanReport {
    pub root: PathBuf,
    pub label: String,
    pub groups: Vec<DuplicateGroup>,
    pub stats: DetectionStats,
    pub issues: Vec<FileIssue>,
    /// Store state of every file that passed the filters, in walk order.
    pub records: Vec<CachedFileRecord>,
    pub scan_duration: Duration,
    pub hash_duration: Duration,
}

/// A file that needs a hash, with what the store held for it before this run.
#[derive(Debug, Clone)]
pub struct HashCandidate {
    pub key: FileKey,
    pub size: u64,
    pub mtime: f64,
    pub previous: Option<CachedFileRecord>,
}

pub struct Detector<'a> {
    store: &'a HashStore,
    filter: ScanFilter,
    sampler: Sampler,
    hash_threads: usize,
    detect_moves: bool,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> Detector<'a> {
    pub fn new(store: &'a HashStore, config: &AppConfig, reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            store,
            filter: ScanFilter::new(
                &config.skip_extensions,
                &config.ignore_patterns,
                config.min_file_size,
            ),
            sampler: Sampler::new(config.sample_threshold, config.adaptive_sampling),
            hash_threads: config.hash_threads,
            detect_moves: config.detect_moves,
            reporter,
        }
    }

    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// Scans `root` under `label` and returns its duplicate groups.
    pub fn scan(&self, root: &Path, label: &str) -> Result<ScanReport> {
        let root = canonical_root(root)?;
        info!("Scanning {} as '{}'", root.display(), label);
        self.reporter.on_scan_start(label);

        let scan_start = Instant::now();
        let walk = walk_tree(&root, &self.filter, self.reporter)?;
        let scan_duration = scan_start.elapsed();
        self.reporter
            .on_scan_complete(walk.files.len(), scan_duration.as_secs_f64());

        let mut stats = DetectionStats {
            total_scanned: walk.total_seen,
            skipped_by_type: walk.skipped_by_type,
            skipped_by_size: walk.skipped_by_size,
            skipped_by_pattern: walk.skipped_by_pattern,
            ..DetectionStats::default()
        };
        let mut issues = walk.issues;
        let files = walk.files;
        debug!(
            "Walk completed in {:.2}s: {} candidates of {} files",
            scan_duration.as_secs_f64(),
            files.len(),
            stats.total_scanned
        );

        let paths: Vec<String> = files.iter().map(path_string).collect();
        let mut previous = self.store.get_many(&paths, label)?;

        // Record every candidate so later passes see full size coverage.
        // Changed files lose their stale hash here.
        let mut current: Vec<CachedFileRecord> = Vec::with_capacity(files.len());
        let mut fresh = Vec::new();
        for (file, path) in files.iter().zip(&paths) {
            match previous.get(path) {
                Some(record) if record.matches_identity(file.size, file.mtime) => {
                    current.push(record.clone());
                }
                _ => {
                    let record = CachedFileRecord::unhashed(path.as_str(), label, file.size, file.mtime);
                    fresh.push(record.clone());
                    current.push(record);
                }
            }
        }
        let recorded = self.store.put_many(&fresh)?;
        debug!("Recorded {} new or changed files", recorded);

        let hash_start = Instant::now();
        let by_size = group_indices_by_size(&files);
        let mut candidate_indices = Vec::new();
        for indices in by_size.values() {
            if indices.len() == 1 {
                stats.unique_sizes += 1;
            } else {
                stats.collision_files += indices.len();
                candidate_indices.extend_from_slice(indices);
            }
        }
        debug!(
            "{} unique sizes skipped, {} files in size collisions",
            stats.unique_sizes, stats.collision_files
        );

        let candidates: Vec<HashCandidate> = candidate_indices
            .iter()
            .map(|&i| HashCandidate {
                key: FileKey::new(paths[i].as_str(), label),
                size: files[i].size,
                mtime: files[i].mtime,
                previous: previous.remove(&paths[i]),
            })
            .collect();
        let hashes = self.hash_candidates(&candidates, &mut stats, &mut issues)?;

        let mut hashed_entries = Vec::new();
        for (&i, (candidate, resolved)) in candidate_indices.iter().zip(candidates.iter().zip(hashes)) {
            if let Some(resolved) = resolved {
                let hash = resolved.record.hash.clone().unwrap_or_default();
                current[i] = resolved.record;
                hashed_entries.push((candidate.size, hash, candidate.key.clone()));
            }
        }
        let groups = build_groups(hashed_entries);
        stats.record_groups(&groups);
        let hash_duration = hash_start.elapsed();
        self.reporter
            .on_hash_complete(groups.len(), hash_duration.as_secs_f64());

        info!(
            "'{}': {} duplicate groups, {} files, {} bytes reclaimable ({} hashed, {} cache hits)",
            label,
            stats.duplicate_groups,
            stats.duplicate_files,
            stats.bytes_reclaimable,
            stats.files_hashed,
            stats.cache_hits
        );

        Ok(ScanReport {
            root,
            label: label.to_string(),
            groups,
            stats,
            issues,
            records: current,
            scan_duration,
            hash_duration,
        })
    }

    /// Cache-or-compute for each candidate, in order. `None` marks a file
    /// that could not be hashed; it is counted and recorded as an issue.
    ///
    /// Computed hashes are written back in one transaction from this thread.
    pub fn hash_candidates(
        &self,
        candidates: &[HashCandidate],
        stats: &mut DetectionStats,
        issues: &mut Vec<FileIssue>,
    ) -> Result<Vec<Option<ResolvedHash>>> {
        let mut resolved: Vec<Option<ResolvedHash>> = Vec::with_capacity(candidates.len());
        let mut pending = Vec::new();

        for (i, candidate) in candidates.iter().enumerate() {
            match valid_cached_hash(candidate.previous.as_ref(), candidate.size, candidate.mtime, &self.sampler) {
                Some(_) => {
                    stats.cache_hits += 1;
                    resolved.push(candidate.previous.clone().map(|record| ResolvedHash {
                        record,
                        computed: false,
                    }));
                }
                None => {
                    resolved.push(None);
                    pending.push(i);
                }
            }
        }

        if pending.is_empty() {
            return Ok(resolved);
        }

        let requests: Vec<HashRequest> = pending
            .iter()
            .map(|&i| HashRequest {
                path: candidates[i].key.path.clone(),
                size: candidates[i].size,
                mtime: candidates[i].mtime,
            })
            .collect();
        self.reporter.on_hash_start(requests.len());
        let results = compute_all(&requests, &self.sampler, self.hash_threads, self.reporter);

        let mut to_write = Vec::with_capacity(pending.len());
        for (&i, result) in pending.iter().zip(results) {
            let candidate = &candidates[i];
            match result {
                Ok(computed) => {
                    stats.files_hashed += 1;
                    if computed.kind == HashKind::Sampled {
                        stats.sampled_files += 1;
                    }
                    let record = CachedFileRecord::unhashed(
                        candidate.key.path.as_str(),
                        candidate.key.folder_label.as_str(),
                        candidate.size,
                        candidate.mtime,
                    )
                    .with_hash(computed.hash, computed.kind, computed.sampled_bytes);
                    to_write.push(record.clone());
                    resolved[i] = Some(ResolvedHash {
                        record,
                        computed: true,
                    });
                }
                Err(e) => {
                    stats.hash_failures += 1;
                    issues.push(FileIssue::new(&candidate.key.path, IssueKind::Hash, e));
                }
            }
        }
        self.store.put_many(&to_write)?;

        if self.detect_moves {
            for (candidate, resolved) in candidates.iter().zip(&resolved) {
                let is_new_path = candidate.previous.is_none();
                if let (true, Some(resolved)) = (is_new_path, resolved) {
                    if resolved.computed {
                        stats.moved_files += self.forget_old_locations(&resolved.record)?;
                    }
                }
            }
        }

        Ok(resolved)
    }

    /// Drops rows that describe this file's content at a path that no
    /// longer exists, i.e. where it lived before being moved.
    fn forget_old_locations(&self, record: &CachedFileRecord) -> Result<usize> {
        let hash = match record.hash.as_deref() {
            Some(hash) => hash,
            None => return Ok(0),
        };
        let mut forgotten = 0;
        for (path, label) in self.store.find_by_identity(record.size, record.mtime, hash)? {
            if label != record.folder_label || path == record.path || Path::new(&path).exists() {
                continue;
            }
            info!("Detected move: {} -> {}", path, record.path);
            if self.store.remove(&path, &label)? {
                forgotten += 1;
            }
        }
        Ok(forgotten)
    }
}

/// A hashed record for a candidate and whether it was computed in this pass.
#[derive(Debug, Clone)]
pub struct ResolvedHash {
    pub record: CachedFileRecord,
    pub computed: bool,
}

pub(crate) fn canonical_root(root: &Path) -> Result<PathBuf> {
    if !root.is_dir() {
        return Err(Error::InvalidRoot(root.to_path_buf()));
    }
    root.canonicalize().map_err(|source| Error::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })
}

pub(crate) fn path_string(file: &FileDescriptor) -> String {
    file.path.to_string_lossy().into_owned()
}

fn group_indices_by_size(files: &[FileDescriptor]) -> BTreeMap<u64, Vec<usize>> {
    let mut by_size: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    for (i, file) in files.iter().enumerate() {
        by_size.entry(file.size).or_default().push(i);
    }
    by_size
}

/// Groups `(size, hash, key)` entries into duplicate groups. Groups come out
/// by ascending size, then by first appearance of the hash; members keep
/// input order. A key seen twice counts once, so every group holds at least
/// two distinct files. Singletons are dropped.
pub(crate) fn build_groups(entries: impl IntoIterator<Item = (u64, String, FileKey)>) -> Vec<DuplicateGroup> {
    let mut by_size: BTreeMap<u64, Vec<DuplicateGroup>> = BTreeMap::new();
    let mut slots: HashMap<(u64, String), usize> = HashMap::new();
    let mut seen: HashSet<FileKey> = HashSet::new();

    for (size, hash, key) in entries {
        if !seen.insert(key.clone()) {
            warn!("{} listed twice, ignoring the repeat", key.path);
            continue;
        }
        let groups = by_size.entry(size).or_default();
        match slots.get(&(size, hash.clone())) {
            Some(&slot) => groups[slot].members.push(key),
            None => {
                slots.insert((size, hash.clone()), groups.len());
                groups.push(DuplicateGroup {
                    hash,
                    size,
                    members: vec![key],
                });
            }
        }
    }

    let groups: Vec<DuplicateGroup> = by_size
        .into_values()
        .flatten()
        .filter(|group| group.members.len() >= 2)
        .collect();
    if groups.is_empty() {
        debug!("No duplicate groups found");
    }
    groups
}
