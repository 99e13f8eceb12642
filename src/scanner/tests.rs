use super::naming::{group_key, logical_base};
use super::probe::looks_like_archive;
use super::scan_for_tasks;
use crate::state::SharedState;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const ZIP_HEAD: &[u8] = b"PK\x03\x04rest-of-archive";
const SEVEN_Z_HEAD: &[u8] = &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0x00, 0x04];
const RAR_HEAD: &[u8] = b"Rar!\x1a\x07\x00";

fn uniq_root(label: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_nanos();
    let root = std::env::temp_dir().join(format!("exhume-scan-{label}-{ts}"));
    fs::create_dir_all(&root).expect("create test root");
    root
}

fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .expect("open file");
    file.write_all(bytes).expect("write file");
}

#[test]
fn probe_recognizes_the_three_magics_and_nothing_else() {
    let root = uniq_root("probe");
    for (name, bytes, expected) in [
        ("a.zip", ZIP_HEAD, true),
        ("b.7z", SEVEN_Z_HEAD, true),
        ("c.rar", RAR_HEAD, true),
        ("d.txt", b"hello world".as_slice(), false),
        ("short", b"P".as_slice(), false),
        ("empty", b"".as_slice(), false),
    ] {
        let path = root.join(name);
        write_file(&path, bytes);
        assert_eq!(looks_like_archive(&path), expected, "{name}");
    }
    assert!(!looks_like_archive(&root.join("missing.zip")));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn logical_base_folds_volume_suffixes() {
    assert_eq!(logical_base("Movie.part1.rar"), "movie");
    assert_eq!(logical_base("Movie.part01.rar"), "movie");
    assert_eq!(logical_base("Movie.part001.RAR"), "movie");
    assert_eq!(logical_base("backup.7z.001"), "backup");
    assert_eq!(logical_base("backup.ZIP.042"), "backup");
    assert_eq!(logical_base("plain.rar"), "plain");
    assert_eq!(logical_base("noext"), "noext");
    assert_eq!(logical_base("data. ."), "data");
    assert_eq!(logical_base("data..zip"), "data");
}

#[test]
fn group_key_is_shared_by_all_volumes() {
    let dir = Path::new("/work/In");
    let key = group_key(&dir.join("Set.part1.rar")).expect("key");
    assert_eq!(key, group_key(&dir.join("set.part02.rar")).expect("key"));
    assert_eq!(key, group_key(&dir.join("SET.part3.RAR")).expect("key"));
    assert!(key.ends_with("set"));
}

#[test]
fn scan_groups_multi_volume_and_picks_first_volume_as_main() {
    let root = uniq_root("multivol");
    write_file(&root.join("b.7z.001"), SEVEN_Z_HEAD);
    write_file(&root.join("b.7z.002"), b"not-an-archive");
    write_file(&root.join("b.7z.003"), b"not-an-archive");

    let state = SharedState::new(4);
    let tasks = scan_for_tasks(&root, &state);
    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.main_path, root.join("b.7z.001"));
    assert_eq!(
        task.member_paths,
        vec![
            root.join("b.7z.001"),
            root.join("b.7z.002"),
            root.join("b.7z.003"),
        ]
    );
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn scan_ignores_groups_without_an_archive_member() {
    let root = uniq_root("strays");
    // Numeric-suffix names with no archive-typed sibling anywhere.
    write_file(&root.join("notes.001"), b"plain text");
    write_file(&root.join("notes.002"), b"plain text");

    let state = SharedState::new(4);
    assert!(scan_for_tasks(&root, &state).is_empty());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn rescan_without_extraction_returns_nothing() {
    let root = uniq_root("rescan");
    write_file(&root.join("a.zip"), ZIP_HEAD);
    write_file(&root.join("sub/c.rar"), RAR_HEAD);

    let state = SharedState::new(4);
    let first = scan_for_tasks(&root, &state);
    assert_eq!(first.len(), 2);
    assert!(scan_for_tasks(&root, &state).is_empty());
    // Scans of a subtree respect claims made by the full scan.
    assert!(scan_for_tasks(&root.join("sub"), &state).is_empty());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn plain_rar_and_its_part_volumes_form_one_task() {
    let root = uniq_root("parts");
    write_file(&root.join("movie.part1.rar"), RAR_HEAD);
    write_file(&root.join("movie.part2.rar"), b"continuation");
    write_file(&root.join("movie.part3.rar"), b"continuation");

    let state = SharedState::new(4);
    let tasks = scan_for_tasks(&root, &state);
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].main_path, root.join("movie.part1.rar"));
    assert_eq!(tasks[0].member_paths.len(), 3);
    let _ = fs::remove_dir_all(&root);
}
