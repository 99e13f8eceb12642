use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use once_cell::sync::OnceCell;

use exhume::config::EngineConfig;
use exhume::engine::Engine;
use exhume::host::{LogSink, StartRequest};

const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024; // 10 MiB

struct LocalTimestamp;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimestamp {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        // Local wall-clock time with timezone offset, e.g. 2026-02-15T14:08:12.345678+01:00
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f%:z")
        )
    }
}

struct SizeLimitedWriter {
    file: std::fs::File,
    path: PathBuf,
    max_bytes: u64,
}

impl SizeLimitedWriter {
    fn new(path: PathBuf, max_bytes: u64) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            file,
            path,
            max_bytes,
        })
    }

    fn rotate_if_needed(&mut self) {
        if let Ok(meta) = self.file.metadata() {
            if meta.len() < self.max_bytes {
                return;
            }
        }
        let _ = self.file.flush();
        let rotated = self.path.with_extension("log.1");
        let _ = std::fs::remove_file(&rotated);
        let _ = std::fs::rename(&self.path, &rotated);
        if let Ok(new_file) = std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.path)
        {
            self.file = new_file;
        }
    }
}

impl std::io::Write for SizeLimitedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.rotate_if_needed();
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

fn init_logging() {
    static GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
    let base = dirs_next::data_dir().unwrap_or_else(std::env::temp_dir);
    let log_dir = base.join("exhume").join("logs");
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log dir {:?}: {}", log_dir, e);
        return;
    }
    let writer = match SizeLimitedWriter::new(log_dir.join("exhume.log"), MAX_LOG_BYTES) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Failed to open log file: {e}");
            return;
        }
    };
    let (non_blocking, guard) =
        tracing_appender::non_blocking::NonBlockingBuilder::default().finish(writer);
    let _ = GUARD.set(guard);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_timer(LocalTimestamp)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(non_blocking);
    if let Err(e) = subscriber.try_init() {
        eprintln!("Failed to init tracing subscriber: {e}");
    }
}

/// Bulk-extracts nested, multi-volume, possibly password-protected archives
/// under a directory, trying passwords from a list and reclaiming disk space
/// as it goes.
#[derive(Parser)]
#[command(name = "exhume", version)]
struct Cli {
    /// Directory to scan for archives
    working_dir: PathBuf,

    /// Password to try, in order (repeatable)
    #[arg(short = 'p', long = "password")]
    passwords: Vec<String>,

    /// UTF-8 file with one password per line, appended after -p passwords
    #[arg(long)]
    password_file: Option<PathBuf>,

    /// Seconds between disk-throughput samples
    #[arg(long, default_value_t = 5)]
    sample_interval: u64,

    /// Lower bound of the adaptive worker count
    #[arg(long)]
    min_workers: Option<usize>,

    /// Upper bound of the adaptive worker count (default: CPU count, max 8)
    #[arg(long)]
    max_workers: Option<usize>,

    /// Free-space headroom in GiB required before each extraction
    #[arg(long, default_value_t = 5)]
    headroom_gib: u64,

    /// Extract directly instead of testing passwords first
    #[arg(long)]
    no_test_phase: bool,

    /// Explicit path to a 7-Zip compatible tool
    #[arg(long)]
    extractor: Option<PathBuf>,
}

struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn line(&self, text: &str) {
        println!("{text}");
    }
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    if !cli.working_dir.is_dir() {
        eprintln!("Not a directory: {}", cli.working_dir.display());
        std::process::exit(2);
    }

    let mut passwords = cli.passwords.clone();
    if let Some(file) = &cli.password_file {
        match std::fs::read_to_string(file) {
            Ok(body) => {
                passwords.extend(body.lines().map(|l| l.trim_end_matches('\r').to_string()));
            }
            Err(e) => {
                eprintln!("Failed to read password file {}: {e}", file.display());
                std::process::exit(2);
            }
        }
    }

    let defaults = EngineConfig::default();
    let gib = 1024 * 1024 * 1024u64;
    let config = EngineConfig {
        sample_interval: Duration::from_secs(cli.sample_interval.max(1)),
        min_workers: cli.min_workers.unwrap_or(defaults.min_workers),
        max_workers: cli.max_workers.unwrap_or(defaults.max_workers),
        headroom_bytes: cli.headroom_gib * gib,
        recovery_headroom_bytes: cli.headroom_gib * 2 * gib,
        test_before_extract: !cli.no_test_phase,
        extractor_path: cli.extractor.clone(),
        ..defaults
    };

    let engine = match Engine::new(config, Arc::new(ConsoleSink)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let summary = engine.run(StartRequest::new(&cli.working_dir).with_passwords(passwords));
    std::process::exit(if summary.failed > 0 { 1 } else { 0 });
}
