pub mod error;
pub mod resolver;


use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use tracing::{debug, warn};

use error::{ExtractorError, ExtractorResult};

/// Captured outcome of one extractor invocation. `exit_code` is `None` when
/// the process died to a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl RunOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Seam between the engine and the external archive tool. Workers only see
/// this trait; tests script it, production uses [`SevenZipCli`].
pub trait ExtractorBackend: Send + Sync {
    /// Cheap integrity test of `archive` under `password` (empty string for
    /// no password). Writes nothing.
    fn test(&self, archive: &Path, password: &str) -> ExtractorResult<RunOutput>;

    /// Extracts `archive` into `out_dir`, auto-confirming overwrites.
    fn extract(
        &self,
        archive: &Path,
        out_dir: &Path,
        password: Option<&str>,
    ) -> ExtractorResult<RunOutput>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Test,
    Extract,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Test => "t",
            Self::Extract => "x",
        }
    }
}

/// Wrapper around a 7-Zip compatible command-line tool.
#[derive(Debug, Clone)]
pub struct SevenZipCli {
    binary: PathBuf,
}

impl SevenZipCli {
    /// Resolves the tool (bundled directory first, then the OS path) and
    /// wraps it. `explicit` bypasses the search entirely.
    pub fn locate(explicit: Option<&Path>) -> ExtractorResult<Self> {
        let binary = resolver::locate_extractor(explicit)?;
        Ok(Self { binary })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn run(&self, mode: Mode, args: Vec<OsString>) -> ExtractorResult<RunOutput> {
        let started = Instant::now();
        let mut command = Command::new(&self.binary);
        command.args(&args);
        // Any unexpected interactive prompt must fail instead of hanging.
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        // Hide the console window on Windows.
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(0x08000000); // CREATE_NO_WINDOW
        }

        let output = command
            .output()
            .map_err(|e| ExtractorError::spawn_failed(&self.binary, e))?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let exit_code = output.status.code();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            debug!(mode = mode.as_str(), elapsed_ms, "archive tool succeeded");
        } else {
            warn!(
                mode = mode.as_str(),
                elapsed_ms,
                exit_code,
                stderr = %stderr.trim(),
                "archive tool returned an error"
            );
        }
        Ok(RunOutput { exit_code, stderr })
    }
}

impl ExtractorBackend for SevenZipCli {
    fn test(&self, archive: &Path, password: &str) -> ExtractorResult<RunOutput> {
        self.run(Mode::Test, test_args(archive, password))
    }

    fn extract(
        &self,
        archive: &Path,
        out_dir: &Path,
        password: Option<&str>,
    ) -> ExtractorResult<RunOutput> {
        self.run(Mode::Extract, extract_args(archive, out_dir, password))
    }
}

// `-p` is passed even for the empty password so the tool cannot stall on a
// password prompt for encrypted archives.
fn test_args(archive: &Path, password: &str) -> Vec<OsString> {
    vec![
        OsString::from(Mode::Test.as_str()),
        archive.as_os_str().to_owned(),
        password_flag(password),
        OsString::from("-y"),
    ]
}

fn extract_args(archive: &Path, out_dir: &Path, password: Option<&str>) -> Vec<OsString> {
    let mut args = vec![
        OsString::from(Mode::Extract.as_str()),
        archive.as_os_str().to_owned(),
        output_flag(out_dir),
    ];
    if let Some(password) = password {
        args.push(password_flag(password));
    }
    args.push(OsString::from("-y"));
    args
}

fn password_flag(password: &str) -> OsString {
    let mut flag = OsString::from("-p");
    flag.push(password);
    flag
}

fn output_flag(out_dir: &Path) -> OsString {
    let mut flag = OsString::from("-o");
    flag.push(out_dir.as_os_str());
    flag
}
