//! Head+tail sampling for large files.
//!
//! Files at or above the threshold are identified by their first and last
//! few megabytes instead of their full content. Two unrelated files of the
//! same size with identical head and tail regions will hash equal; that is
//! an accepted approximation, traded for reading 20-100 MiB instead of
//! several gigabytes.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, warn};

use crate::storage::HashKind;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

pub const DEFAULT_THRESHOLD: u64 = 20 * MIB;
pub const DEFAULT_HEAD_SIZE: u64 = 10 * MIB;
pub const DEFAULT_TAIL_SIZE: u64 = 10 * MIB;

/// What hashing a file of a given size produces: the kind of hash and, for
/// sampled hashes, how many bytes feed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPlan {
    pub kind: HashKind,
    pub sampled_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Sampler {
    threshold: u64,
    head_size: u64,
    tail_size: u64,
    adaptive: bool,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, true)
    }
}

impl Sampler {
    pub fn new(threshold: u64, adaptive: bool) -> Self {
        Self {
            threshold,
            head_size: DEFAULT_HEAD_SIZE,
            tail_size: DEFAULT_TAIL_SIZE,
            adaptive,
        }
    }

    /// Override the base head/tail sizes used below 1 GiB.
    pub fn with_base_sizes(mut self, head_size: u64, tail_size: u64) -> Self {
        self.head_size = head_size;
        self.tail_size = tail_size;
        self
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn should_sample(&self, size: u64) -> bool {
        size >= self.threshold
    }

    /// (head, tail) byte counts to read for a file of `size` bytes.
    pub fn sample_sizes(&self, size: u64) -> (u64, u64) {
        if !self.adaptive || size < GIB {
            (self.head_size, self.tail_size)
        } else if size < 5 * GIB {
            (20 * MIB, 20 * MIB)
        } else {
            (50 * MIB, 50 * MIB)
        }
    }

    /// Byte ranges actually read: head from 0, tail starting no earlier than
    /// the end of the head so the two never overlap.
    fn sample_ranges(&self, size: u64) -> ((u64, u64), (u64, u64)) {
        let (head_size, tail_size) = self.sample_sizes(size);
        let head_len = head_size.min(size);
        let tail_start = head_len.max(size.saturating_sub(tail_size));
        ((0, head_len), (tail_start, size - tail_start))
    }

    pub fn plan(&self, size: u64) -> HashPlan {
        if self.should_sample(size) {
            let ((_, head_len), (_, tail_len)) = self.sample_ranges(size);
            HashPlan {
                kind: HashKind::Sampled,
                sampled_bytes: Some(head_len + tail_len),
            }
        } else {
            HashPlan {
                kind: HashKind::Full,
                sampled_bytes: None,
            }
        }
    }

    /// Reads the head and tail regions. `None` on any I/O failure or if the
    /// file turned out to be below the threshold.
    pub fn read_samples(&self, path: &Path) -> Option<(Vec<u8>, Vec<u8>)> {
        match self.try_read_samples(path) {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Failed to read samples from {}: {}", path.display(), e);
                None
            }
        }
    }

    fn try_read_samples(&self, path: &Path) -> io::Result<Option<(Vec<u8>, Vec<u8>)>> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();
        if !self.should_sample(size) {
            return Ok(None);
        }

        let ((_, head_len), (tail_start, tail_len)) = self.sample_ranges(size);

        let mut head = vec![0u8; head_len as usize];
        file.read_exact(&mut head)?;

        let mut tail = vec![0u8; tail_len as usize];
        if tail_len > 0 {
            file.seek(SeekFrom::Start(tail_start))?;
            file.read_exact(&mut tail)?;
        }

        debug!(
            "Sampled {}: head={} bytes, tail={} bytes (total file: {} bytes)",
            path.display(),
            head.len(),
            tail.len(),
            size
        );
        Ok(Some((head, tail)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_should_sample_threshold() {
        let sampler = Sampler::default();
        assert!(!sampler.should_sample(20 * MIB - 1));
        assert!(sampler.should_sample(20 * MIB));
    }

    #[test]
    fn test_adaptive_sample_sizes() {
        let sampler = Sampler::default();
        assert_eq!(sampler.sample_sizes(500 * MIB), (10 * MIB, 10 * MIB));
        assert_eq!(sampler.sample_sizes(GIB), (20 * MIB, 20 * MIB));
        assert_eq!(sampler.sample_sizes(5 * GIB - 1), (20 * MIB, 20 * MIB));
        assert_eq!(sampler.sample_sizes(5 * GIB), (50 * MIB, 50 * MIB));
    }

    #[test]
    fn test_non_adaptive_keeps_base_sizes() {
        let sampler = Sampler::new(DEFAULT_THRESHOLD, false);
        assert_eq!(sampler.sample_sizes(10 * GIB), (10 * MIB, 10 * MIB));
    }

    #[test]
    fn test_tail_does_not_overlap_head() {
        // Just over threshold: 21 MiB with 10 MiB head leaves 11 MiB, tail takes 10.
        let sampler = Sampler::default();
        let ((_, head), (tail_start, tail)) = sampler.sample_ranges(21 * MIB);
        assert_eq!(head, 10 * MIB);
        assert_eq!(tail_start, 11 * MIB);
        assert_eq!(tail, 10 * MIB);

        // Threshold below head size: the head swallows the file, no tail.
        let small = Sampler::new(100, true);
        let ((_, head), (tail_start, tail)) = small.sample_ranges(150);
        assert_eq!(head, 150);
        assert_eq!(tail_start, 150);
        assert_eq!(tail, 0);
    }

    #[test]
    fn test_plan() {
        let sampler = Sampler::new(1000, true).with_base_sizes(100, 100);
        assert_eq!(
            sampler.plan(999),
            HashPlan {
                kind: HashKind::Full,
                sampled_bytes: None
            }
        );
        assert_eq!(
            sampler.plan(5000),
            HashPlan {
                kind: HashKind::Sampled,
                sampled_bytes: Some(200)
            }
        );
    }

    #[test]
    fn test_read_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let mut data = vec![b'm'; 5000];
        data[..100].fill(b'h');
        data[4900..].fill(b't');
        std::fs::File::create(&path).unwrap().write_all(&data).unwrap();

        let sampler = Sampler::new(1000, true).with_base_sizes(100, 100);
        let (head, tail) = sampler.read_samples(&path).unwrap();
        assert_eq!(head, vec![b'h'; 100]);
        assert_eq!(tail, vec![b't'; 100]);

        // Below threshold: nothing to sample.
        let big_threshold = Sampler::new(10_000, true);
        assert!(big_threshold.read_samples(&path).is_none());

        // Missing file is reported as None, not a panic.
        assert!(sampler.read_samples(&dir.path().join("missing")).is_none());
    }
}
