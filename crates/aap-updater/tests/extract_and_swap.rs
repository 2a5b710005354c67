use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use aap_updater::apply::{extract_zip, install_extracted, swap_executable};
use aap_updater::UpdateError;
use sha2::{Digest, Sha256};
use zip::write::FileOptions;
use zip::ZipWriter;

fn write_zip(path: &Path, entries: &[(&str, &[u8], Option<u32>)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, data, mode) in entries {
        let mut options = FileOptions::default();
        if let Some(mode) = mode {
            options = options.unix_permissions(*mode);
        }
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

fn digest(path: &Path) -> Vec<u8> {
    Sha256::digest(fs::read(path).unwrap()).to_vec()
}

#[test]
fn extracts_nested_entries() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("update.zip");
    write_zip(
        &archive,
        &[
            ("AdbAutoPlayer.exe", b"new launcher", None),
            ("binaries/adb_auto_player.exe", b"worker", None),
        ],
    );
    let dest = dir.path().join("extracted");
    extract_zip(&archive, &dest).unwrap();
    assert_eq!(fs::read(dest.join("AdbAutoPlayer.exe")).unwrap(), b"new launcher");
    assert_eq!(
        fs::read(dest.join("binaries/adb_auto_player.exe")).unwrap(),
        b"worker"
    );
}

#[cfg(unix)]
#[test]
fn preserves_entry_mode_bits() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("update.zip");
    write_zip(&archive, &[("tool", b"#!/bin/sh\n", Some(0o755))]);
    let dest = dir.path().join("extracted");
    extract_zip(&archive, &dest).unwrap();
    let mode = fs::metadata(dest.join("tool")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn escaping_entry_aborts_without_writing_outside() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("update.zip");
    write_zip(
        &archive,
        &[
            ("ok.txt", b"fine", None),
            ("../evil.txt", b"pwned", None),
            ("after.txt", b"never", None),
        ],
    );
    let dest = dir.path().join("extracted");
    let err = extract_zip(&archive, &dest).unwrap_err();
    assert!(matches!(err, UpdateError::ExtractionInvalidPath(ref name) if name == "../evil.txt"));
    assert!(!dir.path().join("evil.txt").exists());
    assert!(!dest.join("after.txt").exists());
}

#[test]
fn failed_move_restores_previous_binary() {
    let dir = tempfile::tempdir().unwrap();
    let current = dir.path().join("AdbAutoPlayer.exe");
    fs::write(&current, b"pre-update launcher bytes").unwrap();
    let before = digest(&current);

    let missing = dir.path().join("extracted/AdbAutoPlayer.exe");
    let err = swap_executable(&current, &missing).unwrap_err();
    assert!(matches!(err, UpdateError::SwapFailed { .. }));
    assert_eq!(digest(&current), before);
    assert!(!dir.path().join("AdbAutoPlayer.exe.old").exists());
}

#[test]
fn archive_without_executable_leaves_install_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let app = dir.path().join("app");
    fs::create_dir_all(&app).unwrap();
    let current = app.join("AdbAutoPlayer.exe");
    fs::write(&current, b"v1").unwrap();
    let before = digest(&current);

    let extracted = dir.path().join("extracted");
    fs::create_dir_all(&extracted).unwrap();
    fs::write(extracted.join("README.md"), b"docs").unwrap();

    let err = install_extracted(&extracted, &current).unwrap_err();
    assert!(matches!(err, UpdateError::NoExecutable));
    assert_eq!(digest(&current), before);
    assert!(!app.join("README.md").exists());
}

#[test]
fn install_replaces_binary_and_copies_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let app = dir.path().join("app");
    fs::create_dir_all(app.join("binaries")).unwrap();
    let current = app.join("AdbAutoPlayer.exe");
    fs::write(&current, b"v1").unwrap();
    fs::write(app.join("binaries/adb.exe"), b"adb v1").unwrap();

    let archive = dir.path().join("update.zip");
    write_zip(
        &archive,
        &[
            ("AdbAutoPlayer.exe", b"v2", None),
            ("binaries/adb.exe", b"adb v2", None),
            ("binaries/tesseract/eng.traineddata", b"data", None),
        ],
    );
    let extracted = dir.path().join("extracted");
    extract_zip(&archive, &extracted).unwrap();

    let old = install_extracted(&extracted, &current).unwrap();
    assert_eq!(fs::read(&current).unwrap(), b"v2");
    assert_eq!(fs::read(&old).unwrap(), b"v1");
    assert_eq!(fs::read(app.join("binaries/adb.exe")).unwrap(), b"adb v2");
    assert_eq!(
        fs::read(app.join("binaries/tesseract/eng.traineddata")).unwrap(),
        b"data"
    );
}
