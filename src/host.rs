use std::path::PathBuf;
use std::time::Duration;

/// Receives user-facing progress lines from the engine.
///
/// The engine never touches a terminal or window itself; milestone messages
/// (per-archive success/failure, critical space warnings, the final summary)
/// go through this sink while diagnostics stay on `tracing`.
pub trait LogSink: Send + Sync {
    fn line(&self, text: &str);
}

/// Sink that drops everything. Useful for hosts that only consume the
/// [`RunSummary`].
pub struct NullSink;

impl LogSink for NullSink {
    fn line(&self, _text: &str) {}
}

/// Start signal from the host: where to work and which passwords to try.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub working_dir: PathBuf,
    pub passwords: Vec<String>,
}

impl StartRequest {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            passwords: Vec::new(),
        }
    }

    /// Drops blank entries and duplicates while preserving first-seen order.
    pub fn with_passwords<I, S>(mut self, passwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for password in passwords {
            let password = password.into();
            if password.is_empty() || self.passwords.contains(&password) {
                continue;
            }
            self.passwords.push(password);
        }
        self
    }
}

/// Outcome of one engine run, handed to the completion callback and returned
/// from [`crate::engine::Engine::run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub elapsed: Duration,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn elapsed_minutes(&self) -> f64 {
        self.elapsed.as_secs_f64() / 60.0
    }
}
