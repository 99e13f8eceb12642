use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::extractor::error::{
    classify_failure, signals_space_exhaustion, stderr_signals_wrong_password, FailureKind,
};
use crate::extractor::ExtractorBackend;
use crate::fs_utils::display_name;
use crate::host::LogSink;
use crate::scanner::ArchiveTask;
use crate::space::SpaceManager;
use crate::state::{FailureRecord, SharedState};

/// Everything a worker needs to process tasks; shared across the pool.
pub struct WorkerContext {
    pub config: EngineConfig,
    pub state: Arc<SharedState>,
    pub space: Arc<SpaceManager>,
    pub extractor: Arc<dyn ExtractorBackend>,
    pub passwords: Arc<Vec<String>>,
    pub sink: Arc<dyn LogSink>,
}

struct InProgressGuard<'a> {
    state: &'a SharedState,
    key: &'a str,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.state.clear_in_progress(self.key);
    }
}

/// Runs one task to a terminal outcome. Returns the populated output
/// directory on success, `None` on any failure (the failure is recorded).
///
/// Admission and the in-progress flag are both held via guards, so the slot
/// and flag are released on every exit path, including unwinding.
pub fn run_task(ctx: &WorkerContext, task: &ArchiveTask) -> Option<PathBuf> {
    let _permit = ctx.state.admit();
    ctx.state.mark_in_progress(&task.group_key);
    let _flag = InProgressGuard {
        state: ctx.state.as_ref(),
        key: &task.group_key,
    };

    let name = display_name(&task.main_path);
    let out_dir = output_dir(task);
    if let Err(e) = fs::create_dir_all(&out_dir) {
        warn!(out_dir = %out_dir.display(), error = %e, "could not create output directory");
        return fail(ctx, &name, &out_dir, FailureKind::Unknown);
    }
    debug!(key = %task.group_key, out_dir = %out_dir.display(), "starting extraction");

    // Password found by the test phase; kept across space-exhaustion retries
    // so those do not re-run the trial.
    let mut confirmed: Option<String> = None;
    let mut retries = 0u32;
    loop {
        if !ctx.space.ensure_space(ctx.config.headroom_bytes) {
            return fail(ctx, &name, &out_dir, FailureKind::OutOfSpace);
        }

        if confirmed.is_none() && ctx.config.test_before_extract && !ctx.passwords.is_empty() {
            match find_password(ctx, task) {
                Trial::Found(password) => confirmed = Some(password),
                Trial::Rejected => return fail(ctx, &name, &out_dir, FailureKind::WrongPassword),
                Trial::Errored => return fail(ctx, &name, &out_dir, FailureKind::Unknown),
            }
        }

        let output = match ctx
            .extractor
            .extract(&task.main_path, &out_dir, confirmed.as_deref())
        {
            Ok(output) => output,
            Err(e) => {
                warn!(archive = %task.main_path.display(), error = %e, "extractor did not run");
                return fail(ctx, &name, &out_dir, FailureKind::Unknown);
            }
        };

        if output.succeeded() {
            info!(archive = %task.main_path.display(), "extraction succeeded");
            ctx.sink.line(&format!("{name}: extracted"));
            ctx.state.push_extracted(task.member_paths.clone());
            return Some(out_dir);
        }

        if signals_space_exhaustion(output.exit_code, &output.stderr) {
            if retries < ctx.config.max_retries
                && ctx.space.ensure_space(ctx.config.recovery_headroom_bytes)
            {
                retries += 1;
                debug!(archive = %task.main_path.display(), retries, "retrying after space exhaustion");
                continue;
            }
            return fail(ctx, &name, &out_dir, FailureKind::OutOfSpace);
        }

        return fail(
            ctx,
            &name,
            &out_dir,
            classify_failure(output.exit_code, &output.stderr),
        );
    }
}

enum Trial {
    Found(String),
    Rejected,
    Errored,
}

// Tries every supplied password plus the empty one in test mode, stopping
// at the first acceptance. A test failure other than a password complaint
// also stops the trial, since more passwords will not fix a broken archive.
fn find_password(ctx: &WorkerContext, task: &ArchiveTask) -> Trial {
    for password in ctx
        .passwords
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(""))
    {
        let output = match ctx.extractor.test(&task.main_path, password) {
            Ok(output) => output,
            Err(e) => {
                warn!(archive = %task.main_path.display(), error = %e, "password test did not run");
                return Trial::Errored;
            }
        };
        if output.succeeded() {
            debug!(archive = %task.main_path.display(), "password accepted");
            return Trial::Found(password.to_string());
        }
        if !stderr_signals_wrong_password(&output.stderr) {
            debug!(
                archive = %task.main_path.display(),
                exit_code = output.exit_code,
                "test failed for a non-password reason, stopping trial"
            );
            break;
        }
    }
    Trial::Rejected
}

fn fail(ctx: &WorkerContext, name: &str, out_dir: &Path, kind: FailureKind) -> Option<PathBuf> {
    let _ = fs::remove_dir_all(out_dir);
    ctx.sink.line(&format!("{name}: extraction failed ({kind})"));
    ctx.state.record_failure(FailureRecord {
        display_name: name.to_string(),
        kind,
    });
    None
}

// `<dirname(main)>/<basename(group_key)>`: outputs sit next to their source
// archive, named after the logical archive.
fn output_dir(task: &ArchiveTask) -> PathBuf {
    let base = Path::new(&task.group_key)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("extracted"));
    task.main_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(base)
}
