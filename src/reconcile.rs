use std::collections::{BTreeSet, HashSet};

use crate::models::RepoInfo;
use crate::notion::StoreSnapshot;

/// How existing store records are treated during classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Existing records are left alone
    Normal,
    /// Every existing record is re-summarized
    Force,
    /// Only existing records with an empty stored summary are re-summarized
    EmptyOnly,
}

impl SyncMode {
    /// Force wins over empty-only when both flags are set
    pub fn from_flags(force_resummarize: bool, include_empty_summary: bool) -> Self {
        if force_resummarize {
            SyncMode::Force
        } else if include_empty_summary {
            SyncMode::EmptyOnly
        } else {
            SyncMode::Normal
        }
    }
}

/// Partition of the starred list against the store snapshot.
///
/// `new`, `resummarize` and `skip` are pairwise disjoint and together cover
/// exactly the starred list; `unstarred` is the snapshot keys that are no
/// longer starred, sorted for deterministic display and archive order.
#[derive(Debug, Default)]
pub struct Classification {
    pub new: Vec<RepoInfo>,
    pub resummarize: Vec<RepoInfo>,
    pub skip: Vec<RepoInfo>,
    pub unstarred: BTreeSet<String>,
}

/// Classify each starred repo into an action. Pure and deterministic; the
/// snapshot is the only knowledge of store state this function ever sees.
pub fn classify(repos: Vec<RepoInfo>, snapshot: &StoreSnapshot, mode: SyncMode) -> Classification {
    let starred: HashSet<&str> = repos.iter().map(|repo| repo.full_name.as_str()).collect();

    let unstarred = snapshot
        .pages
        .keys()
        .filter(|key| !starred.contains(key.as_str()))
        .cloned()
        .collect();

    let mut classification = Classification {
        unstarred,
        ..Default::default()
    };

    for repo in repos {
        if !snapshot.pages.contains_key(&repo.full_name) {
            classification.new.push(repo);
            continue;
        }

        match mode {
            SyncMode::Force => classification.resummarize.push(repo),
            SyncMode::EmptyOnly if snapshot.empty_summary.contains(&repo.full_name) => {
                classification.resummarize.push(repo)
            }
            SyncMode::Normal | SyncMode::EmptyOnly => classification.skip.push(repo),
        }
    }

    classification
}
