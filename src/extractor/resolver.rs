use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use tracing::debug;

use super::error::{ExtractorError, ExtractorResult};

#[cfg(not(windows))]
const EXTRACTOR_NAMES: &[&str] = &["7z", "7zz", "7za"];

#[cfg(windows)]
const EXTRACTOR_NAMES: &[&str] = &["7z.exe", "7za.exe"];

/// Directory of bundled tools, looked up relative to the running executable
/// before falling back to the OS path.
const BUNDLED_TOOLS_DIR: &str = "tools";

pub fn locate_extractor(explicit: Option<&Path>) -> ExtractorResult<PathBuf> {
    if let Some(path) = explicit {
        return normalize_candidate(path);
    }

    if let Some(bundled) = bundled_tools_dir() {
        for name in EXTRACTOR_NAMES {
            let candidate = bundled.join(name);
            if let Ok(resolved) = normalize_candidate(&candidate) {
                debug!(path = %resolved.display(), "using bundled archive tool");
                return Ok(resolved);
            }
        }
    }

    for name in EXTRACTOR_NAMES {
        if let Ok(found) = which::which(name) {
            if let Ok(resolved) = normalize_candidate(&found) {
                debug!(path = %resolved.display(), "using archive tool from PATH");
                return Ok(resolved);
            }
        }
    }

    Err(ExtractorError::not_found(EXTRACTOR_NAMES))
}

fn bundled_tools_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join(BUNDLED_TOOLS_DIR))
}

fn normalize_candidate(candidate: &Path) -> ExtractorResult<PathBuf> {
    let canonical = candidate.canonicalize().map_err(|_| {
        ExtractorError::not_found(&[candidate.to_string_lossy().as_ref()])
    })?;
    if !canonical.is_file() {
        return Err(ExtractorError::not_found(&[canonical
            .to_string_lossy()
            .as_ref()]));
    }

    #[cfg(unix)]
    {
        let mode = canonical
            .metadata()
            .map_err(|e| ExtractorError::spawn_failed(&canonical, e))?
            .permissions()
            .mode();
        if mode & 0o111 == 0 {
            return Err(ExtractorError::not_executable(&canonical));
        }
    }

    Ok(canonical)
}
