pub mod cache;
pub mod sampler;
pub mod xxhash;

pub use cache::{compute_all, valid_cached_hash, HashRequest};
pub use sampler::{HashPlan, Sampler};
pub use xxhash::{compute_hash, ComputedHash};
