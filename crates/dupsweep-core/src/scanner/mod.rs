pub mod walk;

pub use walk::{modified_secs, walk_tree, FileDescriptor, ScanFilter, WalkOutcome};
