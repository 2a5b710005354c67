//! On-disk half of a self-update: extraction, executable swap and the
//! restart script that cleans up after the old process exits.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use aap_supervisor::worker::kill_tree_in;

use crate::error::UpdateError;

/// Helper processes shipped under `<appDir>/binaries/` that hold file locks.
pub const AUXILIARY_PROCESSES: &[&str] = &["adb.exe", "adb_auto_player.exe", "tesseract.exe"];

const OLD_SUFFIX: &str = ".old";

/// Join an archive entry name onto `root`, refusing anything that resolves outside it.
pub fn safe_join(root: &Path, name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut out = root.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// Extract `archive` into `dest`. Aborts on the first entry escaping `dest`.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<(), UpdateError> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
    fs::create_dir_all(dest)?;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let name = entry.name().to_string();
        let Some(target) = safe_join(dest, &name) else {
            error!(entry = %name, "archive entry escapes extraction root");
            return Err(UpdateError::ExtractionInvalidPath(name));
        };
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            set_mode(&target, entry.unix_mode())?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        drop(out);
        set_mode(&target, entry.unix_mode())?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode {
        Some(mode) => fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}

/// The updated launcher inside `dir`: an `.exe` named like the app or `main`,
/// else the first `.exe` encountered.
pub fn find_new_executable(dir: &Path) -> Result<PathBuf, UpdateError> {
    let mut fallback = None;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if !name.ends_with(".exe") {
            continue;
        }
        if name.contains("adbautoplayer") || name.contains("main") {
            return Ok(entry.into_path());
        }
        if fallback.is_none() {
            fallback = Some(entry.into_path());
        }
    }
    fallback.ok_or(UpdateError::NoExecutable)
}

fn same_path(a: &Path, b: &Path) -> bool {
    a.to_string_lossy()
        .eq_ignore_ascii_case(&b.to_string_lossy())
}

/// Kill auxiliary processes whose executable lives under `<app_dir>/binaries/`.
/// Same-named processes elsewhere are left alone. Returns how many were targeted.
pub fn kill_auxiliary_processes(app_dir: &Path, names: &[&str]) -> usize {
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_exe(UpdateKind::OnlyIfNotSet),
    );
    let binaries = app_dir.join("binaries");
    let mut targeted = 0;
    for name in names {
        let expected = binaries.join(name);
        let pids: Vec<Pid> = sys
            .processes()
            .iter()
            .filter(|(_, p)| p.thread_kind().is_none())
            .filter(|(_, p)| p.exe().is_some_and(|exe| same_path(exe, &expected)))
            .map(|(pid, _)| *pid)
            .collect();
        if pids.is_empty() {
            debug!(process = %name, "no auxiliary process to stop");
        }
        for pid in pids {
            info!(pid = pid.as_u32(), path = %expected.display(), "killing auxiliary process");
            kill_tree_in(&sys, pid);
            targeted += 1;
        }
    }
    targeted
}

pub fn old_path(current_exe: &Path) -> PathBuf {
    let mut name = current_exe.as_os_str().to_os_string();
    name.push(OLD_SUFFIX);
    PathBuf::from(name)
}

fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    fs::copy(src, dst)?;
    fs::remove_file(src)
}

/// Replace `current_exe` with `new_exe`, keeping the previous binary at
/// `<current_exe>.old`. On failure the previous binary is put back.
pub fn swap_executable(current_exe: &Path, new_exe: &Path) -> Result<PathBuf, UpdateError> {
    let old = old_path(current_exe);
    fs::rename(current_exe, &old).map_err(|err| UpdateError::SwapFailed {
        path: current_exe.to_path_buf(),
        reason: format!("failed to rename current executable: {err}"),
    })?;
    if let Err(err) = move_file(new_exe, current_exe) {
        error!(%err, "failed to move new executable, restoring previous one");
        if let Err(restore) = fs::rename(&old, current_exe) {
            return Err(UpdateError::SwapFailed {
                path: current_exe.to_path_buf(),
                reason: format!(
                    "failed to move new executable: {err}; failed to restore previous executable: {restore}"
                ),
            });
        }
        return Err(UpdateError::SwapFailed {
            path: current_exe.to_path_buf(),
            reason: format!("failed to move new executable: {err}"),
        });
    }
    Ok(old)
}

/// Copy everything under `src` into `dest`, skipping files named `skip_name`.
pub fn copy_other_files(src: &Path, dest: &Path, skip_name: &str) -> Result<(), UpdateError> {
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|err| io::Error::other(err.to_string()))?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if entry
            .file_name()
            .to_string_lossy()
            .eq_ignore_ascii_case(skip_name)
        {
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(entry.path(), &target)?;
    }
    Ok(())
}

/// Steps run once the archive is extracted: locate, swap, copy the rest.
/// Returns the path of the retired binary.
pub fn install_extracted(extract_dir: &Path, current_exe: &Path) -> Result<PathBuf, UpdateError> {
    let new_exe = find_new_executable(extract_dir)?;
    info!(new = %new_exe.display(), current = %current_exe.display(), "installing update");
    let old = swap_executable(current_exe, &new_exe)?;
    let app_dir = current_exe.parent().unwrap_or_else(|| Path::new("."));
    let exe_name = current_exe
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Err(err) = copy_other_files(extract_dir, app_dir, &exe_name) {
        warn!(%err, "failed to copy remaining update files");
        return Err(err);
    }
    Ok(old)
}

/// Batch script that waits for the old process to exit, deletes the
/// retired binary, starts the new one and removes itself.
pub fn restart_script(old_exe: &Path, current_exe: &Path) -> String {
    let image = current_exe
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let old = old_exe.display();
    let current = current_exe.display();
    let lines = [
        "@echo off".to_string(),
        "echo Waiting for application to close...".to_string(),
        "set /a counter=0".to_string(),
        ":waitloop".to_string(),
        format!("tasklist /FI \"IMAGENAME eq {image}\" 2>NUL | find /I \"{image}\" >NUL"),
        "if not errorlevel 1 (".to_string(),
        "    set /a counter+=1".to_string(),
        "    if %counter% lss 30 (".to_string(),
        "        timeout /t 1 /nobreak >nul".to_string(),
        "        goto waitloop".to_string(),
        "    ) else (".to_string(),
        "        echo Warning: Process still running after 30 seconds".to_string(),
        "    )".to_string(),
        ")".to_string(),
        "set /a delete_counter=0".to_string(),
        ":deleteloop".to_string(),
        format!("if exist \"{old}\" ("),
        format!("    del \"{old}\" >nul 2>&1"),
        format!("    if exist \"{old}\" ("),
        "        set /a delete_counter+=1".to_string(),
        "        if %delete_counter% lss 5 (".to_string(),
        "            timeout /t 1 /nobreak >nul".to_string(),
        "            goto deleteloop".to_string(),
        "        ) else (".to_string(),
        "            echo Warning: Could not delete old executable after 5 attempts".to_string(),
        "        )".to_string(),
        "    )".to_string(),
        ")".to_string(),
        "echo Starting updated application...".to_string(),
        format!("start \"\" \"{current}\""),
        "(goto) 2>nul & del \"%~f0\"".to_string(),
    ];
    let mut script = lines.join("\r\n");
    script.push_str("\r\n");
    script
}

pub fn write_restart_script(
    dir: &Path,
    old_exe: &Path,
    current_exe: &Path,
) -> io::Result<PathBuf> {
    let path = dir.join(format!("cleanup_{}.bat", chrono::Utc::now().timestamp()));
    fs::write(&path, restart_script(old_exe, current_exe))?;
    Ok(path)
}
