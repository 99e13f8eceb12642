pub mod worker;


use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::extractor::error::ExtractorResult;
use crate::extractor::{ExtractorBackend, SevenZipCli};
use crate::finalize;
use crate::host::{LogSink, RunSummary, StartRequest};
use crate::limiter::{spawn_sampler, SystemIoCounters};
use crate::scanner::{scan_for_tasks, ArchiveTask};
use crate::space::SpaceManager;
use crate::state::SharedState;
use worker::WorkerContext;

/// How long the orchestrator waits for a completion before re-evaluating
/// its termination predicate.
const COMPLETION_WAIT: Duration = Duration::from_secs(1);

const IDLE_NAP: Duration = Duration::from_millis(50);

struct Completion {
    group_key: String,
    out_dir: Option<PathBuf>,
}

type CompletionHook = Box<dyn Fn(&RunSummary) + Send + Sync>;

/// The batch engine: discovers archives under a working directory, extracts
/// them through a worker pool throttled by disk throughput, cascades into
/// nested archives, and reclaims space by evicting extracted sources.
pub struct Engine {
    config: EngineConfig,
    sink: Arc<dyn LogSink>,
    extractor: Arc<dyn ExtractorBackend>,
    on_complete: Option<CompletionHook>,
}

impl Engine {
    /// Builds an engine around the system archive tool; fails when none can
    /// be located.
    pub fn new(config: EngineConfig, sink: Arc<dyn LogSink>) -> ExtractorResult<Self> {
        let config = config.normalized();
        let cli = SevenZipCli::locate(config.extractor_path.as_deref())?;
        info!(binary = %cli.binary().display(), "archive tool resolved");
        Ok(Self {
            config,
            sink,
            extractor: Arc::new(cli),
            on_complete: None,
        })
    }

    /// Builds an engine around an arbitrary extractor backend.
    pub fn with_backend(
        config: EngineConfig,
        sink: Arc<dyn LogSink>,
        extractor: Arc<dyn ExtractorBackend>,
    ) -> Self {
        Self {
            config: config.normalized(),
            sink,
            extractor,
            on_complete: None,
        }
    }

    /// Registers a callback invoked with the summary after every run.
    pub fn on_complete(mut self, hook: impl Fn(&RunSummary) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    /// Processes everything under `request.working_dir` and returns once the
    /// task set has fully drained.
    pub fn run(&self, request: StartRequest) -> RunSummary {
        let started = Instant::now();
        let state = Arc::new(SharedState::new(self.config.min_workers));
        let space = Arc::new(SpaceManager::new(
            request.working_dir.clone(),
            Arc::clone(&state),
            Arc::clone(&self.sink),
        ));
        let running = Arc::new(AtomicBool::new(true));
        let sampler = spawn_sampler(
            Arc::clone(&state),
            &self.config,
            Arc::clone(&running),
            Box::new(SystemIoCounters),
        );

        let context = Arc::new(WorkerContext {
            config: self.config.clone(),
            state: Arc::clone(&state),
            space: Arc::clone(&space),
            extractor: Arc::clone(&self.extractor),
            passwords: Arc::new(request.passwords.clone()),
            sink: Arc::clone(&self.sink),
        });

        let (task_tx, task_rx) = mpsc::channel::<ArchiveTask>();
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (done_tx, done_rx) = mpsc::channel::<Completion>();
        let pool = spawn_pool(self.config.max_workers, &context, &task_rx, &done_tx);
        drop(done_tx);

        let mut pending: VecDeque<ArchiveTask> =
            scan_for_tasks(&request.working_dir, &state).into();
        info!(count = pending.len(), root = %request.working_dir.display(), "initial scan complete");
        self.sink
            .line(&format!("discovered {} archive(s)", pending.len()));

        let mut succeeded = 0usize;
        if pool.is_empty() {
            error!("no worker threads could be started");
        } else {
            succeeded = self.drive(&state, &mut pending, &task_tx, &done_rx);
        }

        drop(task_tx);
        for handle in pool {
            let _ = handle.join();
        }
        running.store(false, Ordering::Relaxed);
        let _ = sampler.join();

        let summary = finalize::run(
            &request.working_dir,
            &state,
            &space,
            self.sink.as_ref(),
            started.elapsed(),
            succeeded,
        );
        if let Some(hook) = &self.on_complete {
            hook(&summary);
        }
        summary
    }

    // Submission/completion loop. Terminates only when no task is pending,
    // submitted, or in progress: a task in flight may still produce a
    // cascade, so draining `pending` alone is not enough.
    fn drive(
        &self,
        state: &Arc<SharedState>,
        pending: &mut VecDeque<ArchiveTask>,
        task_tx: &mpsc::Sender<ArchiveTask>,
        done_rx: &mpsc::Receiver<Completion>,
    ) -> usize {
        let submit_cap = self.config.submit_cap();
        let mut submitted = 0usize;
        let mut succeeded = 0usize;
        loop {
            while submitted < submit_cap {
                let Some(task) = pending.pop_front() else { break };
                if task_tx.send(task).is_err() {
                    warn!("worker pool is gone, dropping remaining tasks");
                    pending.clear();
                    break;
                }
                submitted += 1;
            }

            if submitted == 0 {
                if pending.is_empty() && state.in_progress_is_empty() {
                    break;
                }
                thread::sleep(IDLE_NAP);
                continue;
            }

            let completion = match done_rx.recv_timeout(COMPLETION_WAIT) {
                Ok(completion) => completion,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            submitted -= 1;
            self.absorb(state, pending, completion, &mut succeeded);
            while let Ok(completion) = done_rx.try_recv() {
                submitted -= 1;
                self.absorb(state, pending, completion, &mut succeeded);
            }
        }
        succeeded
    }

    fn absorb(
        &self,
        state: &Arc<SharedState>,
        pending: &mut VecDeque<ArchiveTask>,
        completion: Completion,
        succeeded: &mut usize,
    ) {
        let Some(out_dir) = completion.out_dir else {
            return;
        };
        *succeeded += 1;
        let cascades = scan_for_tasks(&out_dir, state);
        if !cascades.is_empty() {
            debug!(
                key = %completion.group_key,
                count = cascades.len(),
                "extraction produced nested archives"
            );
            pending.extend(cascades);
        }
    }
}

fn spawn_pool(
    size: usize,
    context: &Arc<WorkerContext>,
    task_rx: &Arc<Mutex<mpsc::Receiver<ArchiveTask>>>,
    done_tx: &mpsc::Sender<Completion>,
) -> Vec<JoinHandle<()>> {
    let mut pool = Vec::with_capacity(size);
    for index in 0..size {
        let context = Arc::clone(context);
        let task_rx = Arc::clone(task_rx);
        let done_tx = done_tx.clone();
        let handle = thread::Builder::new()
            .name(format!("extract-{index}"))
            .spawn(move || worker_loop(&context, &task_rx, &done_tx));
        match handle {
            Ok(handle) => pool.push(handle),
            Err(e) => warn!(index, error = %e, "could not start worker thread"),
        }
    }
    pool
}

fn worker_loop(
    context: &WorkerContext,
    task_rx: &Mutex<mpsc::Receiver<ArchiveTask>>,
    done_tx: &mpsc::Sender<Completion>,
) {
    loop {
        let task = {
            let rx = task_rx.lock().unwrap_or_else(PoisonError::into_inner);
            rx.recv()
        };
        let Ok(task) = task else { break };
        let out_dir = panic::catch_unwind(AssertUnwindSafe(|| worker::run_task(context, &task)))
            .unwrap_or_else(|_| {
                error!(key = %task.group_key, "worker panicked, abandoning task");
                None
            });
        if done_tx
            .send(Completion {
                group_key: task.group_key.clone(),
                out_dir,
            })
            .is_err()
        {
            break;
        }
    }
}
