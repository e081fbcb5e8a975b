use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

use dupsweep_core::hasher::Sampler;
use dupsweep_core::{AppConfig, Detector, HashStore, IssueKind, ProgressReporter, SilentReporter};

fn test_config() -> AppConfig {
    AppConfig {
        min_file_size: 1,
        ..AppConfig::default()
    }
}

fn write(path: &Path, data: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, data).unwrap();
}

/// Layout:
///   a.bin  100 bytes, unique size
///   b.bin  200 bytes of 0x01
///   c.bin  200 bytes of 0x01      <- duplicate of b.bin
///   e.bin  200 bytes of 0x02      <- same size, different content
///   d.bin  300 bytes, unique size
fn create_tree(root: &Path) {
    write(&root.join("a.bin"), &[0u8; 100]);
    write(&root.join("b.bin"), &[1u8; 200]);
    write(&root.join("sub/c.bin"), &[1u8; 200]);
    write(&root.join("e.bin"), &[2u8; 200]);
    write(&root.join("d.bin"), &[3u8; 300]);
}

#[test]
fn test_unique_sizes_are_never_hashed() {
    let tmp = tempdir().unwrap();
    create_tree(tmp.path());
    let store = HashStore::open_in_memory().unwrap();
    let config = test_config();
    let detector = Detector::new(&store, &config, &SilentReporter);

    let report = detector.scan(tmp.path(), "input").unwrap();

    assert_eq!(report.stats.total_scanned, 5);
    assert_eq!(report.stats.unique_sizes, 2);
    assert_eq!(report.stats.collision_files, 3);
    assert_eq!(report.stats.files_hashed, 3);
    assert_eq!(report.stats.cache_hits, 0);
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.stats.bytes_reclaimable, 200);

    let group = &report.groups[0];
    assert_eq!(group.size, 200);
    let members: Vec<&str> = group.members.iter().map(|m| m.path.as_str()).collect();
    assert!(members[0].ends_with("b.bin"));
    assert!(members[1].ends_with("sub/c.bin"));

    // Every candidate is in the store; unique sizes stay unhashed.
    let a = report.root.join("a.bin");
    let stored = store.get(&a.to_string_lossy(), "input").unwrap().unwrap();
    assert_eq!(stored.size, 100);
    assert!(stored.hash.is_none());
    let stats = store.stats().unwrap();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.hashed, 3);
}

#[test]
fn test_second_scan_is_all_cache_hits() {
    let tmp = tempdir().unwrap();
    create_tree(tmp.path());
    let store = HashStore::open_in_memory().unwrap();
    let config = test_config();
    let detector = Detector::new(&store, &config, &SilentReporter);

    let first = detector.scan(tmp.path(), "input").unwrap();
    let second = detector.scan(tmp.path(), "input").unwrap();

    assert_eq!(second.stats.files_hashed, 0);
    assert_eq!(second.stats.cache_hits, 3);
    assert_eq!(first.groups, second.groups);
}

#[test]
fn test_mtime_change_forces_rehash() {
    let tmp = tempdir().unwrap();
    create_tree(tmp.path());
    let store = HashStore::open_in_memory().unwrap();
    let config = test_config();
    let detector = Detector::new(&store, &config, &SilentReporter);
    detector.scan(tmp.path(), "input").unwrap();

    set_file_mtime(tmp.path().join("e.bin"), FileTime::from_unix_time(1_000_000_000, 0)).unwrap();
    let report = detector.scan(tmp.path(), "input").unwrap();

    assert_eq!(report.stats.files_hashed, 1);
    assert_eq!(report.stats.cache_hits, 2);
    let e = report.root.join("e.bin");
    let stored = store.get(&e.to_string_lossy(), "input").unwrap().unwrap();
    assert_eq!(stored.mtime, 1_000_000_000.0);
    assert!(stored.hash.is_some());
}

#[test]
fn test_content_change_with_same_size_is_detected() {
    let tmp = tempdir().unwrap();
    create_tree(tmp.path());
    let store = HashStore::open_in_memory().unwrap();
    let config = test_config();
    let detector = Detector::new(&store, &config, &SilentReporter);
    assert_eq!(detector.scan(tmp.path(), "input").unwrap().groups.len(), 1);

    // e.bin becomes a copy of b.bin; a new mtime marks the change.
    write(&tmp.path().join("e.bin"), &[1u8; 200]);
    set_file_mtime(tmp.path().join("e.bin"), FileTime::from_unix_time(1_500_000_000, 0)).unwrap();
    let report = detector.scan(tmp.path(), "input").unwrap();

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].members.len(), 3);
}

#[test]
fn test_filters_apply_before_hashing() {
    let tmp = tempdir().unwrap();
    write(&tmp.path().join("x.jpg"), &[5u8; 200]);
    write(&tmp.path().join("y.JPG"), &[5u8; 200]);
    write(&tmp.path().join("small1.txt"), &[6u8; 5]);
    write(&tmp.path().join("small2.txt"), &[6u8; 5]);
    let store = HashStore::open_in_memory().unwrap();
    let config = AppConfig {
        min_file_size: 10,
        ..AppConfig::default()
    };
    let detector = Detector::new(&store, &config, &SilentReporter);

    let report = detector.scan(tmp.path(), "input").unwrap();

    assert_eq!(report.stats.skipped_by_type, 2);
    assert_eq!(report.stats.skipped_by_size, 2);
    assert!(report.groups.is_empty());
    assert_eq!(store.stats().unwrap().total, 0);
}

#[test]
fn test_large_files_are_sampled() {
    let tmp = tempdir().unwrap();
    let mut first = vec![b'h'; 5000];
    first[2000..3000].fill(b'x');
    let mut second = vec![b'h'; 5000];
    second[2000..3000].fill(b'y');
    write(&tmp.path().join("one.bin"), &first);
    write(&tmp.path().join("two.bin"), &second);

    let store = HashStore::open_in_memory().unwrap();
    let config = test_config();
    let detector = Detector::new(&store, &config, &SilentReporter)
        .with_sampler(Sampler::new(1000, true).with_base_sizes(100, 100));

    let report = detector.scan(tmp.path(), "input").unwrap();

    // Only head and tail are compared: differing middles still match.
    assert_eq!(report.stats.sampled_files, 2);
    assert_eq!(report.groups.len(), 1);
}

#[test]
fn test_moved_file_drops_old_row() {
    let tmp = tempdir().unwrap();
    create_tree(tmp.path());
    let store = HashStore::open_in_memory().unwrap();
    let config = test_config();
    let detector = Detector::new(&store, &config, &SilentReporter);
    let first = detector.scan(tmp.path(), "input").unwrap();

    let old = first.root.join("sub/c.bin");
    let new = first.root.join("moved.bin");
    fs::rename(&old, &new).unwrap();

    let report = detector.scan(tmp.path(), "input").unwrap();

    assert_eq!(report.stats.moved_files, 1);
    assert!(store.get(&old.to_string_lossy(), "input").unwrap().is_none());
    assert!(store.get(&new.to_string_lossy(), "input").unwrap().is_some());
    assert_eq!(report.groups.len(), 1);
}

#[test]
fn test_moves_are_ignored_when_disabled() {
    let tmp = tempdir().unwrap();
    create_tree(tmp.path());
    let store = HashStore::open_in_memory().unwrap();
    let config = AppConfig {
        detect_moves: false,
        ..test_config()
    };
    let detector = Detector::new(&store, &config, &SilentReporter);
    let first = detector.scan(tmp.path(), "input").unwrap();

    let old = first.root.join("sub/c.bin");
    fs::rename(&old, first.root.join("moved.bin")).unwrap();
    let report = detector.scan(tmp.path(), "input").unwrap();

    assert_eq!(report.stats.moved_files, 0);
    assert!(store.get(&old.to_string_lossy(), "input").unwrap().is_some());
}

#[test]
fn test_parallel_hashing_matches_sequential() {
    let tmp = tempdir().unwrap();
    create_tree(tmp.path());

    let sequential_store = HashStore::open_in_memory().unwrap();
    let sequential_config = test_config();
    let sequential = Detector::new(&sequential_store, &sequential_config, &SilentReporter)
        .scan(tmp.path(), "input")
        .unwrap();

    let parallel_store = HashStore::open_in_memory().unwrap();
    let parallel_config = AppConfig {
        hash_threads: 4,
        ..test_config()
    };
    let parallel = Detector::new(&parallel_store, &parallel_config, &SilentReporter)
        .scan(tmp.path(), "input")
        .unwrap();

    assert_eq!(sequential.groups, parallel.groups);
    assert_eq!(sequential.stats, parallel.stats);
}

/// Deletes a file the moment hashing starts, after the walk has listed it.
struct VanishOnHash {
    victim: PathBuf,
}

impl ProgressReporter for VanishOnHash {
    fn on_hash_start(&self, _total_files: usize) {
        let _ = fs::remove_file(&self.victim);
    }
}

#[test]
fn test_file_vanishing_before_hash_is_skipped_and_counted() {
    let tmp = tempdir().unwrap();
    create_tree(tmp.path());
    let victim = tmp.path().canonicalize().unwrap().join("e.bin");
    let reporter = VanishOnHash {
        victim: victim.clone(),
    };
    let store = HashStore::open_in_memory().unwrap();
    let config = test_config();
    let detector = Detector::new(&store, &config, &reporter);

    let report = detector.scan(tmp.path(), "input").unwrap();

    assert_eq!(report.stats.collision_files, 3);
    assert_eq!(report.stats.files_hashed, 2);
    assert_eq!(report.stats.hash_failures, 1);
    let hash_issues: Vec<_> = report
        .issues
        .iter()
        .filter(|issue| issue.kind == IssueKind::Hash)
        .collect();
    assert_eq!(hash_issues.len(), 1);
    assert_eq!(hash_issues[0].path, victim);

    // The surviving pair is still grouped.
    assert_eq!(report.groups.len(), 1);
    let members: Vec<&str> = report.groups[0].members.iter().map(|m| m.path.as_str()).collect();
    assert!(members[0].ends_with("b.bin"));
    assert!(members[1].ends_with("sub/c.bin"));

    // Known to the store, but never given a hash.
    let stored = store.get(&victim.to_string_lossy(), "input").unwrap().unwrap();
    assert!(stored.hash.is_none());
}

#[test]
fn test_missing_root_is_fatal() {
    let tmp = tempdir().unwrap();
    let store = HashStore::open_in_memory().unwrap();
    let config = test_config();
    let detector = Detector::new(&store, &config, &SilentReporter);

    let result = detector.scan(&tmp.path().join("absent"), "input");
    assert!(matches!(result, Err(dupsweep_core::Error::InvalidRoot(_))));
}
