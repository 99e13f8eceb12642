use super::{DeleteBackend, DiskProbe, SpaceManager};
use crate::host::LogSink;
use crate::state::SharedState;

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

const GIB: u64 = 1024 * 1024 * 1024;

fn uniq_root(label: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_nanos();
    let root = std::env::temp_dir().join(format!("exhume-space-{label}-{ts}"));
    fs::create_dir_all(&root).expect("create test root");
    root
}

#[derive(Default)]
struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl LogSink for RecordingSink {
    fn line(&self, text: &str) {
        self.lines.lock().expect("sink lock").push(text.to_string());
    }
}

#[derive(Default)]
struct FakeDelete {
    deleted: Mutex<Vec<PathBuf>>,
    fail_always: bool,
}

impl FakeDelete {
    fn failing() -> Self {
        Self {
            fail_always: true,
            ..Self::default()
        }
    }
}

impl DeleteBackend for FakeDelete {
    fn delete(&self, path: &Path) -> Result<(), String> {
        if self.fail_always {
            return Err("simulated trash failure".into());
        }
        self.deleted.lock().expect("delete lock").push(path.to_path_buf());
        let _ = fs::remove_file(path);
        Ok(())
    }
}

/// Yields scripted free-space values, repeating the last one once the
/// script runs out.
struct ScriptedDisk {
    values: Mutex<VecDeque<u64>>,
    last: Mutex<u64>,
}

impl ScriptedDisk {
    fn new(values: &[u64]) -> Self {
        Self {
            values: Mutex::new(values.iter().copied().collect()),
            last: Mutex::new(values.last().copied().unwrap_or(0)),
        }
    }
}

impl DiskProbe for ScriptedDisk {
    fn available_bytes(&self, _path: &Path) -> Option<u64> {
        let mut values = self.values.lock().expect("disk lock");
        match values.pop_front() {
            Some(v) => {
                *self.last.lock().expect("last lock") = v;
                Some(v)
            }
            None => Some(*self.last.lock().expect("last lock")),
        }
    }
}

fn manager_with(
    root: &Path,
    state: Arc<SharedState>,
    delete: Box<dyn DeleteBackend>,
    disk: Box<dyn DiskProbe>,
) -> (SpaceManager, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let manager = SpaceManager::with_backends(
        root.to_path_buf(),
        state,
        sink.clone(),
        delete,
        disk,
    );
    (manager, sink)
}

fn touch(path: &Path) {
    fs::write(path, b"data").expect("write file");
}

#[test]
fn plenty_of_space_means_no_eviction() {
    let root = uniq_root("noop");
    let state = Arc::new(SharedState::new(1));
    state.push_extracted(vec![root.join("a.zip")]);
    let (manager, _sink) = manager_with(
        &root,
        state.clone(),
        Box::new(FakeDelete::default()),
        Box::new(ScriptedDisk::new(&[100 * GIB])),
    );

    assert!(manager.ensure_space(5 * GIB));
    assert_eq!(state.extracted_len(), 1);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn eviction_follows_extraction_order() {
    let root = uniq_root("fifo");
    let a = root.join("a.zip");
    let b1 = root.join("b.7z.001");
    let b2 = root.join("b.7z.002");
    let c = root.join("c.rar");
    for p in [&a, &b1, &b2, &c] {
        touch(p);
    }

    let state = Arc::new(SharedState::new(1));
    state.push_extracted(vec![a.clone()]);
    state.push_extracted(vec![b1.clone(), b2.clone()]);
    state.push_extracted(vec![c.clone()]);

    // Two evictions needed before free space clears the headroom.
    let delete = Box::new(FakeDelete::default());
    let (manager, _sink) = manager_with(
        &root,
        state.clone(),
        delete,
        Box::new(ScriptedDisk::new(&[GIB, 2 * GIB, 6 * GIB])),
    );

    assert!(manager.ensure_space(5 * GIB));
    assert_eq!(state.extracted_len(), 1);
    assert!(!a.exists());
    assert!(!b1.exists());
    assert!(!b2.exists());
    assert!(c.exists());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn free_space_equal_to_headroom_still_evicts() {
    let root = uniq_root("boundary");
    let a = root.join("a.zip");
    touch(&a);
    let state = Arc::new(SharedState::new(1));
    state.push_extracted(vec![a.clone()]);

    let (manager, _sink) = manager_with(
        &root,
        state.clone(),
        Box::new(FakeDelete::default()),
        Box::new(ScriptedDisk::new(&[5 * GIB, 6 * GIB])),
    );

    assert!(manager.ensure_space(5 * GIB));
    assert!(!a.exists());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn empty_queue_reports_critical_once() {
    let root = uniq_root("critical");
    let state = Arc::new(SharedState::new(1));
    let (manager, sink) = manager_with(
        &root,
        state,
        Box::new(FakeDelete::default()),
        Box::new(ScriptedDisk::new(&[GIB])),
    );

    assert!(!manager.ensure_space(5 * GIB));
    assert!(!manager.ensure_space(5 * GIB));
    let lines = sink.lines.lock().expect("sink lock");
    assert_eq!(
        lines
            .iter()
            .filter(|line| line.starts_with("CRITICAL"))
            .count(),
        1
    );
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn soft_delete_failure_falls_back_to_hard_delete() {
    let root = uniq_root("fallback");
    let a = root.join("a.zip");
    touch(&a);
    let state = Arc::new(SharedState::new(1));
    state.push_extracted(vec![a.clone(), root.join("gone.zip")]);

    let (manager, _sink) = manager_with(
        &root,
        state,
        Box::new(FakeDelete::failing()),
        Box::new(ScriptedDisk::new(&[GIB, 6 * GIB])),
    );

    assert!(manager.ensure_space(5 * GIB));
    assert!(!a.exists());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn drain_removes_every_remaining_entry() {
    let root = uniq_root("drain");
    let a = root.join("a.zip");
    let b = root.join("b.zip");
    touch(&a);
    touch(&b);
    let state = Arc::new(SharedState::new(1));
    state.push_extracted(vec![a.clone()]);
    state.push_extracted(vec![b.clone()]);

    let (manager, _sink) = manager_with(
        &root,
        state.clone(),
        Box::new(FakeDelete::default()),
        Box::new(ScriptedDisk::new(&[100 * GIB])),
    );

    assert_eq!(manager.drain_extracted(), 2);
    assert_eq!(state.extracted_len(), 0);
    assert!(!a.exists());
    assert!(!b.exists());
    let _ = fs::remove_dir_all(&root);
}
