//! The cache-or-compute rule shared by intra- and cross-folder detection.
//!
//! A stored hash is reused only when the record's identity (size, mtime)
//! still matches the file and the hash was produced the way the current
//! sampler would produce it. Everything else is recomputed.

use super::sampler::Sampler;
use super::xxhash::{compute_hash, ComputedHash};
use crate::progress::ProgressReporter;
use crate::storage::CachedFileRecord;
use rayon::prelude::*;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{trace, warn};

/// A file whose hash must be computed, with the identity observed at scan time.
#[derive(Debug, Clone, PartialEq)]
pub struct HashRequest {
    pub path: String,
    pub size: u64,
    pub mtime: f64,
}

/// Returns the trusted cached hash for a file, if there is one.
pub fn valid_cached_hash<'a>(
    record: Option<&'a CachedFileRecord>,
    size: u64,
    mtime: f64,
    sampler: &Sampler,
) -> Option<&'a str> {
    let record = record?;
    let hash = record.hash.as_deref()?;
    if !record.matches_identity(size, mtime) {
        trace!("Stale cache entry for {}", record.path);
        return None;
    }
    let plan = sampler.plan(size);
    if record.hash_kind != Some(plan.kind) || record.sampled_bytes != plan.sampled_bytes {
        trace!("Cache entry for {} was hashed under other sampling settings", record.path);
        return None;
    }
    Some(hash)
}

/// Computes hashes for `requests`, returning results in request order.
///
/// `threads == 1` hashes on the calling thread. Any other value runs the
/// reads on a rayon pool (`0` = one worker per core). Either way the caller
/// receives every result and remains the only writer to the store.
pub fn compute_all(
    requests: &[HashRequest],
    sampler: &Sampler,
    threads: usize,
    reporter: &dyn ProgressReporter,
) -> Vec<io::Result<ComputedHash>> {
    let total = requests.len();
    let done = AtomicUsize::new(0);
    let hash_one = |request: &HashRequest| {
        let result = compute_hash(Path::new(&request.path), request.size, sampler);
        if let Err(e) = &result {
            warn!("Failed to hash {}: {}", request.path, e);
        }
        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        reporter.on_hash_progress(finished, total);
        result
    };

    if threads == 1 || total < 2 {
        return requests.iter().map(hash_one).collect();
    }

    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(|| requests.par_iter().map(hash_one).collect()),
        Err(e) => {
            warn!("Could not start hashing pool ({}), hashing sequentially", e);
            requests.iter().map(hash_one).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;
    use crate::storage::HashKind;
    use std::io::Write;

    fn hashed_record(size: u64, mtime: f64, kind: HashKind, sampled: Option<u64>) -> CachedFileRecord {
        CachedFileRecord::unhashed("/f", "input", size, mtime).with_hash("abc".to_string(), kind, sampled)
    }

    #[test]
    fn test_valid_cached_hash_requires_identity_match() {
        let sampler = Sampler::default();
        let record = hashed_record(100, 10.0, HashKind::Full, None);
        assert_eq!(valid_cached_hash(Some(&record), 100, 10.0, &sampler), Some("abc"));
        assert_eq!(valid_cached_hash(Some(&record), 100, 11.0, &sampler), None);
        assert_eq!(valid_cached_hash(Some(&record), 101, 10.0, &sampler), None);
        assert_eq!(valid_cached_hash(None, 100, 10.0, &sampler), None);
    }

    #[test]
    fn test_unhashed_record_is_never_a_hit() {
        let record = CachedFileRecord::unhashed("/f", "input", 100, 10.0);
        assert_eq!(valid_cached_hash(Some(&record), 100, 10.0, &Sampler::default()), None);
    }

    #[test]
    fn test_sampling_settings_change_invalidates() {
        // Hashed in full, but the current sampler would sample a file this size.
        let record = hashed_record(5000, 10.0, HashKind::Full, None);
        let sampler = Sampler::new(1000, true).with_base_sizes(100, 100);
        assert_eq!(valid_cached_hash(Some(&record), 5000, 10.0, &sampler), None);

        let sampled = hashed_record(5000, 10.0, HashKind::Sampled, Some(200));
        assert_eq!(valid_cached_hash(Some(&sampled), 5000, 10.0, &sampler), Some("abc"));
    }

    #[test]
    fn test_compute_all_preserves_order_in_parallel() {
        let dir = tempfile::tempdir().unwrap();
        let mut requests = Vec::new();
        for i in 0..8u8 {
            let path = dir.path().join(format!("f{}", i));
            std::fs::File::create(&path).unwrap().write_all(&[i; 64]).unwrap();
            requests.push(HashRequest {
                path: path.to_string_lossy().into_owned(),
                size: 64,
                mtime: 0.0,
            });
        }
        requests.push(HashRequest {
            path: dir.path().join("gone").to_string_lossy().into_owned(),
            size: 64,
            mtime: 0.0,
        });

        let sampler = Sampler::default();
        let sequential = compute_all(&requests, &sampler, 1, &SilentReporter);
        let parallel = compute_all(&requests, &sampler, 4, &SilentReporter);

        assert_eq!(sequential.len(), 9);
        assert!(sequential[8].is_err());
        assert!(parallel[8].is_err());
        for (a, b) in sequential.iter().zip(parallel.iter()).take(8) {
            assert_eq!(a.as_ref().unwrap(), b.as_ref().unwrap());
        }
    }
}
