
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::fs_utils::unique_path;
use crate::host::{LogSink, RunSummary};
use crate::space::SpaceManager;
use crate::state::SharedState;

const FAILURE_MANIFEST: &str = "failed_log.txt";

/// End-of-run pass: evict whatever extracted sources remain, collapse
/// single-child directory chains, write the failure manifest, and report the
/// summary.
pub fn run(
    root: &Path,
    state: &SharedState,
    space: &SpaceManager,
    sink: &dyn LogSink,
    elapsed: Duration,
    succeeded: usize,
) -> RunSummary {
    let drained = space.drain_extracted();
    debug!(drained, "cleared extracted-archive queue");

    flatten_single_child_dirs(root);

    let failures = state.take_failures();
    let summary = RunSummary {
        elapsed,
        succeeded,
        failed: failures.len(),
    };

    if !failures.is_empty() {
        let manifest = root.join(FAILURE_MANIFEST);
        let mut body = String::new();
        for failure in &failures {
            body.push_str(&failure.display_name);
            body.push_str(": ");
            body.push_str(&failure.kind.to_string());
            body.push('\n');
        }
        if let Err(e) = fs::write(&manifest, body) {
            warn!(path = %manifest.display(), error = %e, "could not write failure manifest");
        }
    }

    info!(
        elapsed_secs = summary.elapsed.as_secs(),
        succeeded = summary.succeeded,
        failed = summary.failed,
        "run complete"
    );
    sink.line(&format!(
        "finished in {:.1} min: {} extracted, {} failed",
        summary.elapsed_minutes(),
        summary.succeeded,
        summary.failed
    ));
    summary
}

/// Collapses every directory under `root` whose entries are exactly one
/// subdirectory and no files, bottom-up, so chains like `x/y/z/f` become
/// `x/f`. Name collisions while moving entries up get a ` (N)` suffix before
/// the extension. The root itself is never collapsed.
pub fn flatten_single_child_dirs(root: &Path) {
    let mut dirs: Vec<(usize, PathBuf)> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| (entry.depth(), entry.into_path()))
        .collect();
    // Deepest first, so collapsing a parent sees its children already
    // flattened.
    dirs.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, dir) in dirs {
        if let Err(e) = collapse_if_single_child(&dir) {
            debug!(dir = %dir.display(), error = %e, "skipping directory during flatten");
        }
    }
}

fn collapse_if_single_child(dir: &Path) -> io::Result<()> {
    let entries: Vec<fs::DirEntry> = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    let [only] = entries.as_slice() else {
        return Ok(());
    };
    if !only.file_type()?.is_dir() {
        return Ok(());
    }
    let child = only.path();
    for entry in fs::read_dir(&child)?.collect::<io::Result<Vec<_>>>()? {
        let target = unique_path(&dir.join(entry.file_name()));
        fs::rename(entry.path(), target)?;
    }
    fs::remove_dir(&child)?;
    Ok(())
}
