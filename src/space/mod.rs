#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sysinfo::Disks;
use tracing::{debug, error, warn};

use crate::host::LogSink;
use crate::state::SharedState;

/// Soft-delete seam. Production sends files to the platform recycle bin;
/// tests script it.
pub trait DeleteBackend: Send + Sync {
    fn delete(&self, path: &Path) -> Result<(), String>;
}

pub struct SystemTrashBackend;

impl DeleteBackend for SystemTrashBackend {
    fn delete(&self, path: &Path) -> Result<(), String> {
        trash::delete(path).map_err(|e| format!("Failed to move to trash: {e}"))
    }
}

/// Free-space query seam for the working volume.
pub trait DiskProbe: Send + Sync {
    fn available_bytes(&self, path: &Path) -> Option<u64>;
}

pub struct SystemDiskProbe;

impl DiskProbe for SystemDiskProbe {
    fn available_bytes(&self, path: &Path) -> Option<u64> {
        let disks = Disks::new_with_refreshed_list();
        // Longest mount-point prefix wins so /home does not shadow /.
        disks
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Keeps the working volume above a free-space headroom by evicting the
/// member files of already-extracted archives, oldest extraction first.
pub struct SpaceManager {
    root: PathBuf,
    state: Arc<SharedState>,
    delete: Box<dyn DeleteBackend>,
    disk: Box<dyn DiskProbe>,
    sink: Arc<dyn LogSink>,
    critical_reported: AtomicBool,
}

impl SpaceManager {
    pub fn new(root: PathBuf, state: Arc<SharedState>, sink: Arc<dyn LogSink>) -> Self {
        Self::with_backends(
            root,
            state,
            sink,
            Box::new(SystemTrashBackend),
            Box::new(SystemDiskProbe),
        )
    }

    pub fn with_backends(
        root: PathBuf,
        state: Arc<SharedState>,
        sink: Arc<dyn LogSink>,
        delete: Box<dyn DeleteBackend>,
        disk: Box<dyn DiskProbe>,
    ) -> Self {
        Self {
            root,
            state,
            delete,
            disk,
            sink,
            critical_reported: AtomicBool::new(false),
        }
    }

    /// Returns true once free space on the working volume strictly exceeds
    /// `headroom_bytes`, evicting the oldest extracted archives as needed.
    /// Returns false when the queue ran dry with space still short; that
    /// condition is reported as CRITICAL exactly once per run.
    pub fn ensure_space(&self, headroom_bytes: u64) -> bool {
        loop {
            let Some(free) = self.disk.available_bytes(&self.root) else {
                // No measurement beats evicting blindly.
                warn!(root = %self.root.display(), "free-space query failed, proceeding unchecked");
                return true;
            };
            if free > headroom_bytes {
                return true;
            }
            debug!(free, headroom_bytes, "below headroom, evicting oldest extracted archive");
            match self.state.pop_oldest_extracted() {
                Some(members) => self.evict_members(&members),
                None => {
                    if !self.critical_reported.swap(true, Ordering::Relaxed) {
                        error!(free, headroom_bytes, "nothing left to evict");
                        self.sink.line(
                            "CRITICAL: free space below threshold and no extracted archives left to evict",
                        );
                    }
                    return false;
                }
            }
        }
    }

    /// Deletes every remaining entry in the extracted queue. Used once the
    /// run has drained; per-file failures are ignored as during eviction.
    pub fn drain_extracted(&self) -> usize {
        let mut drained = 0;
        while let Some(members) = self.state.pop_oldest_extracted() {
            self.evict_members(&members);
            drained += 1;
        }
        drained
    }

    fn evict_members(&self, members: &[PathBuf]) {
        for path in members {
            if fs::symlink_metadata(path).is_err() {
                continue;
            }
            if let Err(soft_err) = self.delete.delete(path) {
                debug!(path = %path.display(), error = %soft_err, "soft delete failed, removing directly");
                let result = if path.is_dir() {
                    fs::remove_dir_all(path)
                } else {
                    fs::remove_file(path)
                };
                if let Err(hard_err) = result {
                    warn!(path = %path.display(), error = %hard_err, "could not evict file");
                }
            }
        }
    }
}
