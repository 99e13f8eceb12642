pub mod naming;
pub mod probe;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::state::SharedState;

/// One logical archive ready for a worker: the key claimed for it, the
/// member to invoke the extractor on, and every file belonging to the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTask {
    pub group_key: String,
    pub main_path: PathBuf,
    pub member_paths: Vec<PathBuf>,
}

// Files that are not themselves recognizable archives still belong in a
// group when their name marks them as a volume (`.part2.rar`, `.r01`,
// `.z02`, `.003`).
static VOLUME_FALLBACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(part\d+\.rar|[rz]?\d+)$").expect("volume fallback pattern"));

// The member the extractor must be pointed at: an explicit first volume, or
// a plain single-file archive.
static MAIN_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(part0*1\.rar|7z\.001|zip\.001|7z|zip|rar)$").expect("main entry pattern")
});

/// Walks `root` and returns every logical archive not yet claimed in
/// `state`.
///
/// Claims are per key and atomic, so concurrent scans over overlapping trees
/// hand each archive to exactly one caller. Re-entrant by design: the engine
/// points this at freshly extracted directories to harvest cascades. Output
/// directories from earlier runs are ordinary files and directories that
/// fail the probe, so re-running over a processed tree discovers nothing.
pub fn scan_for_tasks(root: &Path, state: &SharedState) -> Vec<ArchiveTask> {
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "skipping unreadable entry during scan");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if !is_group_candidate(&path) {
            continue;
        }
        let Some(key) = naming::group_key(&path) else {
            continue;
        };
        groups.entry(key).or_default().push(path);
    }

    let mut tasks = Vec::new();
    for (key, mut members) in groups {
        // A lone numeric-suffix file with no recognizable archive next to it
        // is stray data, not a volume set.
        if !members.iter().any(|m| probe::looks_like_archive(m)) {
            debug!(key = %key, "group has no archive-typed member, ignoring");
            continue;
        }
        if !state.claim(&key) {
            continue;
        }
        members.sort();
        let main_path = members
            .iter()
            .find(|m| is_main_entry(m))
            .unwrap_or(&members[0])
            .clone();
        debug!(key = %key, main = %main_path.display(), members = members.len(), "discovered archive group");
        tasks.push(ArchiveTask {
            group_key: key,
            main_path,
            member_paths: members,
        });
    }
    tasks
}

fn is_group_candidate(path: &Path) -> bool {
    if probe::looks_like_archive(path) {
        return true;
    }
    file_name_matches(path, &VOLUME_FALLBACK)
}

fn is_main_entry(path: &Path) -> bool {
    file_name_matches(path, &MAIN_ENTRY)
}

fn file_name_matches(path: &Path, pattern: &Regex) -> bool {
    path.file_name()
        .map(|n| pattern.is_match(&n.to_string_lossy()))
        .unwrap_or(false)
}
