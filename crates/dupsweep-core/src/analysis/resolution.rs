//! Picks the one copy of a duplicate group that survives.
//!
//! Tiers, strongest first:
//! 1. keep keyword anywhere in the path
//! 2. keyword in a directory name rather than only in the file name
//! 3. keyword directory closer to the root
//! 4. deeper path
//! 5. newer modification time
//! 6. first in input order
//!
//! Each tier only narrows the candidates the previous tier left tied.

use std::fmt;
use std::path::{Component, Path};
use tracing::debug;

use crate::detector::{DuplicateGroup, FileKey};
use crate::storage::MTIME_TOLERANCE;

/// Everything the policy looks at for one file. Built once per member by
/// the caller, from cached metadata where possible.
#[derive(Debug, Clone, PartialEq)]
pub struct FileAttributes {
    pub key: FileKey,
    pub has_keep_keyword: bool,
    /// Index among the path's directories (root side first) of the first
    /// one whose name contains the keyword.
    pub keep_ancestor_index: Option<usize>,
    pub path_depth: usize,
    pub mtime: f64,
}

impl FileAttributes {
    pub fn keep_in_ancestor_folder(&self) -> bool {
        self.keep_ancestor_index.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionReason {
    KeepKeyword,
    KeepInFolder,
    KeepFolderCloserToRoot,
    DeeperPath,
    NewerModification,
    InputOrder,
}

impl fmt::Display for ResolutionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ResolutionReason::KeepKeyword => "keep keyword in path",
            ResolutionReason::KeepInFolder => "keep keyword in folder name",
            ResolutionReason::KeepFolderCloserToRoot => "keep folder closer to root",
            ResolutionReason::DeeperPath => "deepest path",
            ResolutionReason::NewerModification => "newest modification time",
            ResolutionReason::InputOrder => "first in group",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionDecision {
    pub keep: FileKey,
    pub delete: Vec<FileKey>,
    pub reason: ResolutionReason,
}

#[derive(Debug, Clone)]
pub struct ResolutionPolicy {
    keyword: String,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self::new("keep")
    }
}

impl ResolutionPolicy {
    /// Keyword matching is case-insensitive.
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn attributes(&self, key: FileKey, mtime: f64) -> FileAttributes {
        let path = Path::new(&key.path);
        let has_keep_keyword = key.path.to_lowercase().contains(&self.keyword);
        let keep_ancestor_index = if has_keep_keyword {
            self.first_keep_directory(path)
        } else {
            None
        };
        FileAttributes {
            path_depth: path.components().count(),
            has_keep_keyword,
            keep_ancestor_index,
            mtime,
            key,
        }
    }

    fn first_keep_directory(&self, path: &Path) -> Option<usize> {
        let names: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().to_lowercase()),
                _ => None,
            })
            .collect();
        let directories = names.len().saturating_sub(1);
        names[..directories]
            .iter()
            .position(|name| name.contains(&self.keyword))
    }

    /// Builds attributes for every member of `group`, taking mtimes from
    /// `mtime_of` (typically the store's records).
    pub fn group_attributes(
        &self,
        group: &DuplicateGroup,
        mtime_of: impl Fn(&FileKey) -> f64,
    ) -> Vec<FileAttributes> {
        group
            .members
            .iter()
            .map(|key| self.attributes(key.clone(), mtime_of(key)))
            .collect()
    }

    /// Chooses the survivor. Pure; `None` only for an empty slice.
    pub fn resolve(&self, members: &[FileAttributes]) -> Option<ResolutionDecision> {
        if members.is_empty() {
            return None;
        }

        let mut candidates: Vec<usize> = (0..members.len()).collect();
        let mut reason = ResolutionReason::InputOrder;

        let tiers: [(ResolutionReason, fn(&[FileAttributes], &[usize]) -> Vec<usize>); 5] = [
            (ResolutionReason::KeepKeyword, keep_keyword_tier),
            (ResolutionReason::KeepInFolder, keep_folder_tier),
            (ResolutionReason::KeepFolderCloserToRoot, closest_folder_tier),
            (ResolutionReason::DeeperPath, depth_tier),
            (ResolutionReason::NewerModification, mtime_tier),
        ];
        for (tier_reason, narrow) in tiers.iter() {
            if candidates.len() == 1 {
                break;
            }
            candidates = narrow(members, &candidates);
            if candidates.len() == 1 {
                reason = *tier_reason;
            }
        }

        let winner = candidates[0];
        let keep = members[winner].key.clone();
        let delete = members
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != winner)
            .map(|(_, attrs)| attrs.key.clone())
            .collect();
        debug!("Keeping {} ({})", keep.path, reason);

        Some(ResolutionDecision { keep, delete, reason })
    }
}

/// Keeps the candidates holding the best value of `score`, in order.
/// Leaves the set untouched when no candidate scores.
fn best_by<T: PartialOrd + Copy>(
    members: &[FileAttributes],
    candidates: &[usize],
    score: impl Fn(&FileAttributes) -> Option<T>,
) -> Vec<usize> {
    let best = candidates
        .iter()
        .filter_map(|&i| score(&members[i]))
        .fold(None, |best: Option<T>, value| match best {
            Some(b) if b >= value => Some(b),
            _ => Some(value),
        });
    match best {
        Some(best) => candidates
            .iter()
            .copied()
            .filter(|&i| score(&members[i]) == Some(best))
            .collect(),
        None => candidates.to_vec(),
    }
}

fn keep_keyword_tier(members: &[FileAttributes], candidates: &[usize]) -> Vec<usize> {
    best_by(members, candidates, |a| a.has_keep_keyword.then_some(()))
}

fn keep_folder_tier(members: &[FileAttributes], candidates: &[usize]) -> Vec<usize> {
    best_by(members, candidates, |a| a.keep_in_ancestor_folder().then_some(()))
}

fn closest_folder_tier(members: &[FileAttributes], candidates: &[usize]) -> Vec<usize> {
    // Negated so that the smallest index scores highest.
    best_by(members, candidates, |a| a.keep_ancestor_index.map(|i| -(i as i64)))
}

fn depth_tier(members: &[FileAttributes], candidates: &[usize]) -> Vec<usize> {
    best_by(members, candidates, |a| Some(a.path_depth))
}

fn mtime_tier(members: &[FileAttributes], candidates: &[usize]) -> Vec<usize> {
    let newest = candidates
        .iter()
        .map(|&i| members[i].mtime)
        .fold(f64::NEG_INFINITY, f64::max);
    candidates
        .iter()
        .copied()
        .filter(|&i| (newest - members[i].mtime).abs() <= MTIME_TOLERANCE)
        .collect()
}
