use super::sampler::Sampler;
use crate::storage::HashKind;
use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;
use twox_hash::XxHash64;

const READ_CHUNK: usize = 64 * 1024;

/// A freshly computed content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedHash {
    pub hash: String,
    pub kind: HashKind,
    pub sampled_bytes: Option<u64>,
}

/// Hashes a file of known `size`: full content below the sampling
/// threshold, head+tail above it.
pub fn compute_hash(path: &Path, size: u64, sampler: &Sampler) -> io::Result<ComputedHash> {
    if sampler.should_sample(size) {
        let (head, tail) = sampler.read_samples(path).ok_or_else(|| {
            io::Error::new(
                ErrorKind::Other,
                format!("could not read samples from {}", path.display()),
            )
        })?;
        Ok(ComputedHash {
            hash: hash_samples(&head, &tail),
            kind: HashKind::Sampled,
            sampled_bytes: Some((head.len() + tail.len()) as u64),
        })
    } else {
        Ok(ComputedHash {
            hash: hash_full_file(path)?,
            kind: HashKind::Full,
            sampled_bytes: None,
        })
    }
}

/// Streams the whole file through the hasher.
pub fn hash_full_file(file: &Path) -> io::Result<String> {
    let mut reader = BufReader::with_capacity(READ_CHUNK, File::open(file)?);
    let mut hasher = XxHash64::with_seed(0);
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.write(&buffer[..read]);
    }
    Ok(format_digest(hasher.finish()))
}

pub fn hash_samples(head: &[u8], tail: &[u8]) -> String {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(head);
    hasher.write(tail);
    format_digest(hasher.finish())
}

pub fn hash_data(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}

pub fn format_digest(digest: u64) -> String {
    format!("{:016x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_full_hash_matches_in_memory_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        // Larger than one read chunk so streaming spans several writes.
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        File::create(&path).unwrap().write_all(&data).unwrap();

        let streamed = hash_full_file(&path).unwrap();
        assert_eq!(streamed, format_digest(hash_data(&data)));
        assert_eq!(streamed.len(), 16);
    }

    #[test]
    fn test_compute_hash_picks_kind_by_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        File::create(&path).unwrap().write_all(&[7u8; 3000]).unwrap();

        let full = compute_hash(&path, 3000, &Sampler::default()).unwrap();
        assert_eq!(full.kind, HashKind::Full);
        assert_eq!(full.sampled_bytes, None);

        let sampler = Sampler::new(1000, true).with_base_sizes(100, 100);
        let sampled = compute_hash(&path, 3000, &sampler).unwrap();
        assert_eq!(sampled.kind, HashKind::Sampled);
        assert_eq!(sampled.sampled_bytes, Some(200));
        assert_ne!(sampled.hash, full.hash);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(hash_full_file(&dir.path().join("nope")).is_err());
    }
}
