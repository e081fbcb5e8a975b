use std::fmt;
use std::str::FromStr;

/// Mtime tolerance, in seconds, absorbing filesystem timestamp rounding.
pub const MTIME_TOLERANCE: f64 = 0.001;

/// How a stored hash was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    Full,
    Sampled,
}

impl HashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Full => "full",
            HashKind::Sampled => "sampled",
        }
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(HashKind::Full),
            "sampled" => Ok(HashKind::Sampled),
            other => Err(format!("unknown hash kind '{}'", other)),
        }
    }
}

/// One row of the hash store, keyed by (path, folder_label).
///
/// `hash == None` means the file is known but was never hashed (its size
/// was unique when last scanned); `hash_kind` and `sampled_bytes` are then
/// `None` as well.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedFileRecord {
    pub path: String,
    pub folder_label: String,
    pub size: u64,
    pub mtime: f64,
    pub hash: Option<String>,
    pub hash_kind: Option<HashKind>,
    pub sampled_bytes: Option<u64>,
    pub last_checked: f64,
}

impl CachedFileRecord {
    /// A record for a file that has been seen but not hashed.
    pub fn unhashed(path: impl Into<String>, folder_label: impl Into<String>, size: u64, mtime: f64) -> Self {
        Self {
            path: path.into(),
            folder_label: folder_label.into(),
            size,
            mtime,
            hash: None,
            hash_kind: None,
            sampled_bytes: None,
            last_checked: 0.0,
        }
    }

    pub fn with_hash(mut self, hash: String, kind: HashKind, sampled_bytes: Option<u64>) -> Self {
        self.hash = Some(hash);
        self.hash_kind = Some(kind);
        self.sampled_bytes = sampled_bytes;
        self
    }

    /// Cache identity check: exact size, mtime within [`MTIME_TOLERANCE`].
    pub fn matches_identity(&self, size: u64, mtime: f64) -> bool {
        self.size == size && (self.mtime - mtime).abs() <= MTIME_TOLERANCE
    }

    pub fn is_hashed(&self) -> bool {
        self.hash.is_some()
    }
}

/// Summary of the store contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total: u64,
    pub hashed: u64,
    pub unhashed: u64,
    /// Distinct size values across all rows.
    pub unique_sizes: u64,
    /// Size values held by two or more rows.
    pub collision_groups: u64,
    pub store_size_bytes: u64,
}
