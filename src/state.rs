use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::extractor::error::FailureKind;

/// One failed task, kept for the end-of-run manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub display_name: String,
    pub kind: FailureKind,
}

#[derive(Debug, Default)]
struct StateInner {
    /// Group keys ever claimed by a scan. Grows monotonically; a claimed key
    /// is never rediscovered.
    processed: HashSet<String>,
    /// Keys currently owned by a worker. Always a subset of `processed`.
    in_progress: HashSet<String>,
    /// Member-path lists of successfully extracted archives, oldest first.
    extracted: VecDeque<Vec<PathBuf>>,
    /// Live admission cap for workers.
    current_limit: usize,
    /// Workers admitted and not yet released.
    active_workers: usize,
    failures: Vec<FailureRecord>,
}

/// All cross-thread engine state behind a single mutex, with one condition
/// variable coordinating worker admission.
///
/// Scanners claim group keys here, workers gate on the adaptive limit, the
/// sampler adjusts that limit, and the space manager drains the extracted
/// queue; one lock covers every invariant that spans those actors.
pub struct SharedState {
    inner: Mutex<StateInner>,
    admission: Condvar,
}

impl SharedState {
    pub fn new(initial_limit: usize) -> Self {
        Self {
            inner: Mutex::new(StateInner {
                current_limit: initial_limit.max(1),
                ..StateInner::default()
            }),
            admission: Condvar::new(),
        }
    }

    // A poisoned lock only means some worker panicked mid-update; the sets
    // stay structurally valid, so recover the guard instead of propagating.
    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically claims `key` for extraction. Returns false when the key was
    /// already claimed by an earlier scan or is being worked on right now.
    pub fn claim(&self, key: &str) -> bool {
        let mut inner = self.lock();
        if inner.processed.contains(key) || inner.in_progress.contains(key) {
            return false;
        }
        inner.processed.insert(key.to_string());
        true
    }

    pub fn mark_in_progress(&self, key: &str) {
        self.lock().in_progress.insert(key.to_string());
    }

    pub fn clear_in_progress(&self, key: &str) {
        self.lock().in_progress.remove(key);
    }

    pub fn in_progress_is_empty(&self) -> bool {
        self.lock().in_progress.is_empty()
    }

    /// Blocks until a worker slot is free under the live limit, then takes
    /// one. The returned permit releases the slot on drop, including during
    /// unwinding.
    pub fn admit(self: &Arc<Self>) -> AdmissionPermit {
        let mut inner = self.lock();
        while inner.active_workers >= inner.current_limit {
            inner = self
                .admission
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        inner.active_workers += 1;
        AdmissionPermit {
            state: Arc::clone(self),
        }
    }

    fn release(&self) {
        let mut inner = self.lock();
        inner.active_workers = inner.active_workers.saturating_sub(1);
        drop(inner);
        self.admission.notify_all();
    }

    /// Sets the admission limit, clamped to `[min, max]`, and wakes blocked
    /// workers when it changed. Returns the limit now in effect.
    pub fn set_limit_clamped(&self, desired: usize, min: usize, max: usize) -> usize {
        let clamped = desired.clamp(min, max);
        let mut inner = self.lock();
        let changed = inner.current_limit != clamped;
        inner.current_limit = clamped;
        drop(inner);
        if changed {
            self.admission.notify_all();
        }
        clamped
    }

    pub fn current_limit(&self) -> usize {
        self.lock().current_limit
    }

    pub fn active_workers(&self) -> usize {
        self.lock().active_workers
    }

    /// Appends the member files of a successfully extracted archive to the
    /// eviction queue. Order of calls is the eviction order.
    pub fn push_extracted(&self, members: Vec<PathBuf>) {
        self.lock().extracted.push_back(members);
    }

    pub fn pop_oldest_extracted(&self) -> Option<Vec<PathBuf>> {
        self.lock().extracted.pop_front()
    }

    pub fn extracted_len(&self) -> usize {
        self.lock().extracted.len()
    }

    pub fn record_failure(&self, record: FailureRecord) {
        self.lock().failures.push(record);
    }

    pub fn failure_count(&self) -> usize {
        self.lock().failures.len()
    }

    pub fn take_failures(&self) -> Vec<FailureRecord> {
        std::mem::take(&mut self.lock().failures)
    }
}

/// RAII admission slot; see [`SharedState::admit`].
pub struct AdmissionPermit {
    state: Arc<SharedState>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.state.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn claim_is_idempotent_per_key() {
        let state = SharedState::new(2);
        assert!(state.claim("a/b"));
        assert!(!state.claim("a/b"));
        // Completion does not un-claim.
        state.mark_in_progress("a/b");
        state.clear_in_progress("a/b");
        assert!(!state.claim("a/b"));
    }

    #[test]
    fn limit_is_clamped_to_bounds() {
        let state = SharedState::new(4);
        assert_eq!(state.set_limit_clamped(0, 1, 8), 1);
        assert_eq!(state.set_limit_clamped(99, 1, 8), 8);
        assert_eq!(state.set_limit_clamped(3, 1, 8), 3);
    }

    #[test]
    fn extracted_queue_pops_oldest_first() {
        let state = SharedState::new(1);
        state.push_extracted(vec![PathBuf::from("/w/a.zip")]);
        state.push_extracted(vec![PathBuf::from("/w/b.zip")]);
        assert_eq!(
            state.pop_oldest_extracted(),
            Some(vec![PathBuf::from("/w/a.zip")])
        );
        assert_eq!(
            state.pop_oldest_extracted(),
            Some(vec![PathBuf::from("/w/b.zip")])
        );
        assert_eq!(state.pop_oldest_extracted(), None);
    }

    #[test]
    fn admission_blocks_at_limit_and_wakes_on_raise() {
        let state = Arc::new(SharedState::new(1));
        let first = state.admit();
        assert_eq!(state.active_workers(), 1);

        let waiter = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                let permit = state.admit();
                drop(permit);
            })
        };
        // The second admit must still be parked.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(state.active_workers(), 1);

        state.set_limit_clamped(2, 1, 8);
        waiter.join().expect("waiter finished");
        drop(first);
        assert_eq!(state.active_workers(), 0);
    }

    #[test]
    fn permit_releases_slot_on_drop() {
        let state = Arc::new(SharedState::new(1));
        {
            let _permit = state.admit();
            assert_eq!(state.active_workers(), 1);
        }
        assert_eq!(state.active_workers(), 0);
    }
}
