/// Trait for reporting session progress.
///
/// CLI implements with indicatif. Hash progress may be reported from worker
/// threads when parallel hashing is enabled, hence `Send + Sync`.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self, _label: &str) {}
    fn on_scan_progress(&self, _files_found: usize) {}
    fn on_scan_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_hash_start(&self, _total_files: usize) {}
    fn on_hash_progress(&self, _files_done: usize, _total_files: usize) {}
    fn on_hash_complete(&self, _duplicate_groups: usize, _duration_secs: f64) {}
    fn on_delete_start(&self, _total_files: usize) {}
    fn on_delete_progress(&self, _files_done: usize, _total_files: usize) {}
    fn on_delete_complete(&self, _deleted: usize, _failed: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
