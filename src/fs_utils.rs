use std::path::{Path, PathBuf};

/// Returns `dest` if free, otherwise the first `name (N).ext` variant that
/// does not exist yet.
pub fn unique_path(dest: &Path) -> PathBuf {
    if !dest.exists() {
        return dest.to_path_buf();
    }
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "item".to_string());
    let ext = dest.extension().map(|e| e.to_string_lossy().to_string());
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut idx = 1usize;
    loop {
        let mut candidate = parent.join(format!("{} ({})", stem, idx));
        if let Some(ext) = &ext {
            candidate.set_extension(ext);
        }
        if !candidate.exists() {
            return candidate;
        }
        idx += 1;
    }
}

/// File name of `path` for user-facing messages; falls back to the full
/// lossy path when there is no final component.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
