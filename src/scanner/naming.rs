use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

static PART_VOLUME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.part\d+\.rar$").expect("part-volume pattern"));
static NUMBERED_VOLUME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(7z|zip|rar)\.\d+$").expect("numbered-volume pattern"));

/// Lowercase logical base of a file name with any multi-volume suffix
/// stripped.
///
/// `movie.part3.rar`, `movie.part03.rar`, and `movie.rar` all map to
/// `movie`; `backup.7z.002` maps to `backup`. A single trailing extension is
/// dropped for plain names, then trailing whitespace and dots are trimmed so
/// sloppy names like `data..zip` do not split into distinct groups.
pub fn logical_base(file_name: &str) -> String {
    let lower = file_name.to_lowercase();
    let stripped = if let Some(m) = PART_VOLUME.find(&lower) {
        &lower[..m.start()]
    } else if let Some(m) = NUMBERED_VOLUME.find(&lower) {
        &lower[..m.start()]
    } else {
        match lower.rsplit_once('.') {
            Some((stem, _ext)) if !stem.is_empty() => stem,
            _ => lower.as_str(),
        }
    };
    stripped
        .trim_end_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string()
}

/// Identity of the logical archive a file belongs to: its directory joined
/// with the lowercase logical base. Every volume of one archive folds to the
/// same key without content inspection.
pub fn group_key(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_string_lossy();
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let key = dir.join(logical_base(&file_name));
    Some(key.to_string_lossy().to_lowercase())
}
