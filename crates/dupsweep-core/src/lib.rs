pub mod analysis;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod progress;
pub mod scanner;
pub mod storage;

pub use analysis::{ExecutionResult, ResolutionDecision, ResolutionPolicy, ResolutionReason};
pub use config::AppConfig;
pub use detector::{DetectionStats, Detector, DuplicateGroup, FileKey, ScanReport};
pub use engine::{GroupReport, Phase, PhaseOutcome, PhasePlan, PhaseStats, RunMode, RunStatus, Session};
pub use error::{Error, FileIssue, IssueKind, Result};
pub use progress::{ProgressReporter, SilentReporter};
pub use storage::{HashStore, StoreStats};
