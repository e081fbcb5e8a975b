use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::analysis::{
    execute_decisions, CrossFolderMatcher, ExecutionResult, ResolutionDecision, ResolutionPolicy,
};
use crate::config::AppConfig;
use crate::detector::{DetectionStats, Detector, DuplicateGroup, FileKey};
use crate::error::{Error, FileIssue, Result};
use crate::progress::ProgressReporter;
use crate::storage::{CachedFileRecord, HashStore, StoreStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    DryRun,
    Execute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every planned deletion was attempted (or nothing was to be deleted).
    Completed,
    /// The confirmation callback declined; nothing was touched.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Duplicates within one tree.
    Intra,
    /// Duplicates between two trees.
    Cross,
}

/// One duplicate group with its resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    pub hash: String,
    pub size: u64,
    pub decision: ResolutionDecision,
}

impl GroupReport {
    pub fn bytes_saved(&self) -> u64 {
        self.size * self.decision.delete.len() as u64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseStats {
    pub detection: DetectionStats,
    pub files_marked_for_deletion: usize,
    pub files_with_errors: usize,
}

/// Everything a phase found, before any file is touched.
#[derive(Debug)]
pub struct PhasePlan {
    pub phase: Phase,
    pub roots: Vec<PathBuf>,
    pub labels: Vec<String>,
    /// Phase B only: the first tree's records came from the store.
    pub reused_first: bool,
    pub groups: Vec<GroupReport>,
    pub stats: PhaseStats,
    pub issues: Vec<FileIssue>,
    pub scan_duration: Duration,
    pub hash_duration: Duration,
}

impl PhasePlan {
    pub fn decisions(&self) -> Vec<ResolutionDecision> {
        self.groups.iter().map(|g| g.decision.clone()).collect()
    }

    pub fn has_deletions(&self) -> bool {
        self.stats.files_marked_for_deletion > 0
    }
}

#[derive(Debug)]
pub struct PhaseOutcome {
    pub status: RunStatus,
    pub mode: RunMode,
    pub plan: PhasePlan,
    /// Present when deletions were carried out.
    pub execution: Option<ExecutionResult>,
}

/// Owns the hash store for the duration of a run. The store is closed when
/// the session is dropped, on success and error paths alike.
pub struct Session<'r> {
    config: AppConfig,
    store: HashStore,
    policy: ResolutionPolicy,
    reporter: &'r dyn ProgressReporter,
}

impl<'r> Session<'r> {
    /// Validates `config` and opens the store it points at.
    pub fn open(config: AppConfig, reporter: &'r dyn ProgressReporter) -> Result<Self> {
        config.validate()?;
        let store_path = config.resolved_store_path();
        let store = HashStore::open(&store_path)?;
        info!("Hash store: {}", store_path.display());
        Ok(Self::with_store(config, store, reporter))
    }

    pub fn with_store(config: AppConfig, store: HashStore, reporter: &'r dyn ProgressReporter) -> Self {
        let policy = ResolutionPolicy::new(&config.keep_keyword);
        Self {
            config,
            store,
            policy,
            reporter,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &HashStore {
        &self.store
    }

    pub fn store_stats(&self) -> Result<StoreStats> {
        Ok(self.store.stats()?)
    }

    pub fn clear_store(&self) -> Result<usize> {
        Ok(self.store.clear()?)
    }

    pub fn close(self) -> Result<()> {
        self.store.close()?;
        debug!("Session closed");
        Ok(())
    }

    fn detector(&self) -> Detector<'_> {
        Detector::new(&self.store, &self.config, self.reporter)
    }

    /// Phase A: duplicates inside `root`, scanned under `label`.
    pub fn plan_intra(&self, root: &Path, label: &str) -> Result<PhasePlan> {
        info!("Phase A: deduplicating {}", root.display());
        let start = Instant::now();
        let report = self.detector().scan(root, label)?;
        let groups = self.resolve_groups(&report.groups, &report.records);

        let plan = PhasePlan {
            phase: Phase::Intra,
            roots: vec![report.root],
            labels: vec![report.label],
            reused_first: false,
            stats: phase_stats(report.stats, &groups, &report.issues),
            groups,
            issues: report.issues,
            scan_duration: report.scan_duration,
            hash_duration: report.hash_duration,
        };
        debug!("Phase A planned in {:.2}s", start.elapsed().as_secs_f64());
        Ok(plan)
    }

    /// Phase B: duplicates spanning `first_root` and `second_root`.
    /// Rejected before any scanning when the second folder is missing.
    pub fn plan_cross(&self, first_root: &Path, second_root: Option<&Path>) -> Result<PhasePlan> {
        let second_root = second_root.ok_or(Error::MissingSecondFolder)?;
        info!(
            "Phase B: matching {} against {}",
            first_root.display(),
            second_root.display()
        );
        let start = Instant::now();
        let detector = self.detector();
        let matcher = CrossFolderMatcher::new(
            &detector,
            &self.store,
            &self.config.first_label,
            &self.config.second_label,
        );
        let report = matcher.run(first_root, second_root)?;
        self.reporter
            .on_hash_complete(report.groups.len(), report.hash_duration.as_secs_f64());
        let groups = self.resolve_groups(&report.groups, &report.records);

        let plan = PhasePlan {
            phase: Phase::Cross,
            roots: vec![report.first_root, report.second_root],
            labels: vec![report.first_label, report.second_label],
            reused_first: report.reused_first,
            stats: phase_stats(report.stats, &groups, &report.issues),
            groups,
            issues: report.issues,
            scan_duration: report.scan_duration,
            hash_duration: report.hash_duration,
        };
        debug!("Phase B planned in {:.2}s", start.elapsed().as_secs_f64());
        Ok(plan)
    }

    /// Deletes everything `plan` marked for deletion.
    pub fn execute(&self, plan: &PhasePlan) -> Result<ExecutionResult> {
        info!(
            "Deleting {} files ({} groups)",
            plan.stats.files_marked_for_deletion,
            plan.groups.len()
        );
        execute_decisions(&self.store, &plan.decisions(), self.reporter)
    }

    pub fn run_intra(
        &self,
        root: &Path,
        label: &str,
        mode: RunMode,
        confirm: impl FnOnce(&PhasePlan) -> bool,
    ) -> Result<PhaseOutcome> {
        let plan = self.plan_intra(root, label)?;
        self.finish(plan, mode, confirm)
    }

    pub fn run_cross(
        &self,
        first_root: &Path,
        second_root: Option<&Path>,
        mode: RunMode,
        confirm: impl FnOnce(&PhasePlan) -> bool,
    ) -> Result<PhaseOutcome> {
        let plan = self.plan_cross(first_root, second_root)?;
        self.finish(plan, mode, confirm)
    }

    fn finish(
        &self,
        plan: PhasePlan,
        mode: RunMode,
        confirm: impl FnOnce(&PhasePlan) -> bool,
    ) -> Result<PhaseOutcome> {
        if mode == RunMode::DryRun {
            return Ok(PhaseOutcome {
                status: RunStatus::Completed,
                mode,
                plan,
                execution: None,
            });
        }
        if plan.has_deletions() && !confirm(&plan) {
            info!("Deletion declined, nothing removed");
            return Ok(PhaseOutcome {
                status: RunStatus::Cancelled,
                mode,
                plan,
                execution: None,
            });
        }
        let execution = self.execute(&plan)?;
        Ok(PhaseOutcome {
            status: RunStatus::Completed,
            mode,
            plan,
            execution: Some(execution),
        })
    }

    fn resolve_groups(&self, groups: &[DuplicateGroup], records: &[CachedFileRecord]) -> Vec<GroupReport> {
        let mtimes: HashMap<FileKey, f64> = records
            .iter()
            .map(|r| (FileKey::new(r.path.as_str(), r.folder_label.as_str()), r.mtime))
            .collect();
        groups
            .iter()
            .filter_map(|group| {
                let members = self
                    .policy
                    .group_attributes(group, |key| mtimes.get(key).copied().unwrap_or(0.0));
                self.policy.resolve(&members).map(|decision| GroupReport {
                    hash: group.hash.clone(),
                    size: group.size,
                    decision,
                })
            })
            .collect()
    }
}

fn phase_stats(detection: DetectionStats, groups: &[GroupReport], issues: &[FileIssue]) -> PhaseStats {
    PhaseStats {
        detection,
        files_marked_for_deletion: groups.iter().map(|g| g.decision.delete.len()).sum(),
        files_with_errors: issues.len(),
    }
}
