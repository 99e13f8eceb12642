use std::fs::File;
use std::io::Read;
use std::path::Path;

const ZIP_MAGIC: &[u8] = &[0x50, 0x4B];
const SEVEN_Z_MAGIC: &[u8] = &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];
const RAR_MAGIC: &[u8] = &[0x52, 0x61, 0x72, 0x21];

/// Sniffs the leading bytes of `path` for a zip, 7z, or rar signature.
///
/// This is the only content inspection in the engine; any open or read
/// failure answers `false` rather than erroring, so unreadable files simply
/// never become tasks.
pub fn looks_like_archive(path: &Path) -> bool {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return false,
    };
    let mut buf = [0u8; 8];
    let n = match file.read(&mut buf) {
        Ok(n) => n,
        Err(_) => return false,
    };
    let head = &buf[..n];
    head.starts_with(ZIP_MAGIC) || head.starts_with(SEVEN_Z_MAGIC) || head.starts_with(RAR_MAGIC)
}
