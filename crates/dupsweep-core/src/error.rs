use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors. Anything that can go wrong with a single file is a
/// [`FileIssue`] instead and never aborts a run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Hash store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Cannot read root directory {}: {source}", path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a directory: {}", .0.display())]
    InvalidRoot(PathBuf),

    #[error("Cross-folder deduplication requires a second folder")]
    MissingSecondFolder,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    /// Directory entry could not be read during the walk.
    Scan,
    /// Metadata could not be read (vanished, permission denied).
    Stat,
    /// Read failure while hashing.
    Hash,
    /// Removal failed in execute mode.
    Delete,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IssueKind::Scan => "scan",
            IssueKind::Stat => "stat",
            IssueKind::Hash => "hash",
            IssueKind::Delete => "delete",
        };
        f.write_str(label)
    }
}

/// A non-fatal, per-file problem recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIssue {
    pub path: PathBuf,
    pub kind: IssueKind,
    pub reason: String,
}

impl FileIssue {
    pub fn new(path: impl Into<PathBuf>, kind: IssueKind, reason: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            kind,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for FileIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.path.display(), self.reason)
    }
}
