use std::fmt;
use std::path::Path;

use crate::errors::domain::{classify_message_by_patterns, ErrorCode};

/// Terminal classification of a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Extractor exited 1; output may be partial.
    Warning,
    /// Extractor exited 2; archive corrupt or unsupported.
    Fatal,
    /// Extractor exited 7; we built a bad command line.
    Arg,
    /// Extractor exited 8 or stderr indicated exhaustion, and eviction could
    /// not free enough.
    OutOfSpace,
    /// Extractor exited 255.
    Interrupted,
    /// Every candidate password, including the empty one, was rejected.
    WrongPassword,
    Unknown,
}

impl ErrorCode for FailureKind {
    fn as_code_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Fatal => "fatal",
            Self::Arg => "arg",
            Self::OutOfSpace => "out-of-space",
            Self::Interrupted => "interrupted",
            Self::WrongPassword => "wrong-password",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code_str())
    }
}

const WRONG_PASSWORD_PATTERNS: &[&str] = &["wrong password"];
const SPACE_PATTERNS: &[&str] = &["no space", "write error"];

pub fn stderr_signals_wrong_password(stderr: &str) -> bool {
    let rules: &[(bool, &[&str])] = &[(true, WRONG_PASSWORD_PATTERNS)];
    classify_message_by_patterns(stderr, rules, false)
}

/// Space exhaustion is recoverable by eviction, so it is detected separately
/// from the terminal classification.
pub fn signals_space_exhaustion(exit_code: Option<i32>, stderr: &str) -> bool {
    if exit_code == Some(8) {
        return true;
    }
    let rules: &[(bool, &[&str])] = &[(true, SPACE_PATTERNS)];
    classify_message_by_patterns(stderr, rules, false)
}

/// Maps a non-zero extractor exit to the failure taxonomy. A "wrong
/// password" complaint on stderr wins over whatever the exit code says.
pub fn classify_failure(exit_code: Option<i32>, stderr: &str) -> FailureKind {
    if stderr_signals_wrong_password(stderr) {
        return FailureKind::WrongPassword;
    }
    match exit_code {
        Some(1) => FailureKind::Warning,
        Some(2) => FailureKind::Fatal,
        Some(7) => FailureKind::Arg,
        Some(8) => FailureKind::OutOfSpace,
        Some(255) => FailureKind::Interrupted,
        _ => FailureKind::Unknown,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorErrorCode {
    NotFound,
    NotExecutable,
    SpawnFailed,
}

impl ErrorCode for ExtractorErrorCode {
    fn as_code_str(self) -> &'static str {
        match self {
            Self::NotFound => "extractor_not_found",
            Self::NotExecutable => "extractor_not_executable",
            Self::SpawnFailed => "extractor_spawn_failed",
        }
    }
}

/// Failure to locate or launch the extractor binary itself, as opposed to a
/// failed extraction.
#[derive(Debug, Clone)]
pub struct ExtractorError {
    code: ExtractorErrorCode,
    message: String,
}

impl ExtractorError {
    pub fn new(code: ExtractorErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(names: &[&str]) -> Self {
        Self::new(
            ExtractorErrorCode::NotFound,
            format!("No archive tool found (looked for {})", names.join(", ")),
        )
    }

    pub fn not_executable(path: &Path) -> Self {
        Self::new(
            ExtractorErrorCode::NotExecutable,
            format!("Archive tool is not executable: {}", path.display()),
        )
    }

    pub fn spawn_failed(path: &Path, error: std::io::Error) -> Self {
        Self::new(
            ExtractorErrorCode::SpawnFailed,
            format!("Failed to run archive tool {}: {error}", path.display()),
        )
    }

    pub fn code(&self) -> ExtractorErrorCode {
        self.code
    }
}

impl fmt::Display for ExtractorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExtractorError {}

pub type ExtractorResult<T> = Result<T, ExtractorError>;
