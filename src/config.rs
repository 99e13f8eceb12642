use std::path::PathBuf;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;

/// Hard ceiling on the adaptive worker limit regardless of core count.
pub const WORKER_CAP_CEILING: usize = 8;

/// In-process tuning knobs for one engine run.
///
/// Defaults match a single working volume on commodity hardware: sample disk
/// throughput every 5 seconds, keep between one worker and one per core
/// (capped at [`WORKER_CAP_CEILING`]), require 5 GiB of free headroom before
/// an extraction and 10 GiB to retry after the extractor itself ran out of
/// space.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval between disk-throughput samples.
    pub sample_interval: Duration,
    /// Lower bound of the adaptive worker limit.
    pub min_workers: usize,
    /// Upper bound of the adaptive worker limit.
    pub max_workers: usize,
    /// Below this average throughput (MiB/s) the limit is raised one step.
    pub low_band_mibps: u64,
    /// At or above this average throughput (MiB/s) the limit is lowered one step.
    pub high_band_mibps: u64,
    /// Free-space headroom required before starting an extraction.
    pub headroom_bytes: u64,
    /// Free-space headroom required to retry after the extractor reported
    /// space exhaustion.
    pub recovery_headroom_bytes: u64,
    /// Retry budget per task when the extractor runs out of space mid-write.
    pub max_retries: u32,
    /// Run the cheap integrity-test pass over candidate passwords before
    /// extracting. Skipped automatically when no passwords were supplied.
    pub test_before_extract: bool,
    /// Explicit extractor binary, bypassing bundled-directory and PATH lookup.
    pub extractor_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(5),
            min_workers: 1,
            max_workers: default_max_workers(),
            low_band_mibps: 10,
            high_band_mibps: 60,
            headroom_bytes: 5 * GIB,
            recovery_headroom_bytes: 10 * GIB,
            max_retries: 3,
            test_before_extract: true,
            extractor_path: None,
        }
    }
}

impl EngineConfig {
    /// Clamps the worker bounds into a usable shape (`1 <= min <= max`).
    pub fn normalized(mut self) -> Self {
        self.min_workers = self.min_workers.max(1);
        self.max_workers = self.max_workers.max(self.min_workers);
        self
    }

    /// At most this many tasks are handed to the pool at once.
    pub fn submit_cap(&self) -> usize {
        self.max_workers * 2
    }

    /// Low throughput band scaled to bytes per sample interval.
    pub fn low_threshold_bytes(&self) -> u64 {
        self.low_band_mibps * MIB * self.sample_interval.as_secs().max(1)
    }

    /// High throughput band scaled to bytes per sample interval.
    pub fn high_threshold_bytes(&self) -> u64 {
        self.high_band_mibps * MIB * self.sample_interval.as_secs().max(1)
    }
}

pub fn default_max_workers() -> usize {
    num_cpus::get().min(WORKER_CAP_CEILING).max(1)
}
