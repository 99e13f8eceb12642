
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sysinfo::Disks;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::state::SharedState;

/// Samples kept in the sliding throughput window.
const WINDOW: usize = 5;

const SHUTDOWN_POLL_SLICE_MS: u64 = 100;

/// Source of a machine-wide cumulative disk IO counter (read + written
/// bytes). Split out so the control loop is testable without real disks.
pub trait IoCounterSource: Send {
    fn total_bytes(&mut self) -> u64;
}

pub struct SystemIoCounters;

impl IoCounterSource for SystemIoCounters {
    fn total_bytes(&mut self) -> u64 {
        let disks = Disks::new_with_refreshed_list();
        disks
            .iter()
            .map(|disk| {
                let usage = disk.usage();
                usage.total_read_bytes + usage.total_written_bytes
            })
            .sum()
    }
}

/// Feedback controller over the admission limit: low disk throughput means
/// workers are CPU-bound and one more can run; sustained high throughput
/// means the volume is saturated and the limit steps down. Adjustments are
/// one step per sample, clamped to the configured bounds.
pub struct IoSampler {
    low_threshold: u64,
    high_threshold: u64,
    min_workers: usize,
    max_workers: usize,
    window: VecDeque<u64>,
    prev_total: Option<u64>,
}

impl IoSampler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            low_threshold: config.low_threshold_bytes(),
            high_threshold: config.high_threshold_bytes(),
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            window: VecDeque::with_capacity(WINDOW + 1),
            prev_total: None,
        }
    }

    /// Feeds one cumulative counter reading. Returns the new limit when it
    /// changed. The first reading only establishes the baseline.
    pub fn observe(&mut self, total: u64, state: &SharedState) -> Option<usize> {
        let prev = self.prev_total.replace(total)?;
        let delta = total.saturating_sub(prev);
        self.window.push_back(delta);
        if self.window.len() > WINDOW {
            self.window.pop_front();
        }
        let avg = self.window.iter().sum::<u64>() / self.window.len() as u64;

        let current = state.current_limit();
        let desired = if avg < self.low_threshold {
            current + 1
        } else if avg >= self.high_threshold {
            current.saturating_sub(1)
        } else {
            debug!(avg, limit = current, "throughput in band, holding limit");
            return None;
        };
        let applied = state.set_limit_clamped(desired, self.min_workers, self.max_workers);
        if applied == current {
            return None;
        }
        info!(avg, limit = applied, "adjusted worker limit");
        Some(applied)
    }
}

/// Runs the sampling loop on its own thread until `running` clears.
pub fn spawn_sampler(
    state: Arc<SharedState>,
    config: &EngineConfig,
    running: Arc<AtomicBool>,
    mut source: Box<dyn IoCounterSource>,
) -> JoinHandle<()> {
    let interval = config.sample_interval;
    let mut sampler = IoSampler::new(config);
    thread::Builder::new()
        .name("io-sampler".into())
        .spawn(move || {
            while running.load(Ordering::Relaxed) {
                sleep_while_running(interval, &running);
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                let total = source.total_bytes();
                sampler.observe(total, &state);
            }
        })
        .unwrap_or_else(|e| {
            // Extraction still works without adaptation; fall back to a
            // finished handle.
            warn!(error = %e, "could not start IO sampler thread");
            thread::spawn(|| {})
        })
}

// Sleeps in short slices so shutdown is not delayed by a full interval.
fn sleep_while_running(total: Duration, running: &AtomicBool) {
    let slice = Duration::from_millis(SHUTDOWN_POLL_SLICE_MS);
    let mut remaining = total;
    while !remaining.is_zero() && running.load(Ordering::Relaxed) {
        let nap = remaining.min(slice);
        thread::sleep(nap);
        remaining = remaining.saturating_sub(nap);
    }
}
