pub mod cross_folder;
pub mod deletion_plan;
pub mod resolution;

pub use cross_folder::{CrossFolderMatcher, CrossFolderReport};
pub use deletion_plan::{execute_decisions, ExecutionResult};
pub use resolution::{FileAttributes, ResolutionDecision, ResolutionPolicy, ResolutionReason};
