//! Per-task JSON-lines log files under `debug/` and the debug archive.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, error};
use walkdir::WalkDir;
use zip::write::FileOptions;

use aap_core::LogFrame;

use crate::error::SupervisorError;

pub const DEBUG_DIR: &str = "debug";

static UNSAFE_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("static regex"));

/// `<yyyymmdd_HHMMSS>_<args>.log` with args joined by `_` and stripped to
/// `[A-Za-z0-9_-]`.
pub fn log_file_name(args: &[String], now: chrono::DateTime<chrono::Utc>) -> String {
    let joined = args.join("_");
    let suffix = UNSAFE_NAME_CHARS.replace_all(&joined, "");
    format!("{}_{}.log", now.format("%Y%m%d_%H%M%S"), suffix)
}

/// An open task log. Frames are appended as one JSON object per line.
pub struct TaskLog {
    path: PathBuf,
    out: BufWriter<File>,
}

impl TaskLog {
    /// Create a log for `args` in `dir` and prune the directory to `limit`
    /// files. Returns `Ok(None)` when `limit` is zero.
    pub fn create(dir: &Path, args: &[String], limit: u32) -> std::io::Result<Option<Self>> {
        if limit == 0 {
            return Ok(None);
        }
        std::fs::create_dir_all(dir)?;
        let (path, file) = create_unique(dir, &log_file_name(args, chrono::Utc::now()))?;
        rotate(dir, limit as usize);
        Ok(Some(Self {
            path,
            out: BufWriter::new(file),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_frame(&mut self, frame: &LogFrame) {
        let line = match serde_json::to_string(frame) {
            Ok(line) => line,
            Err(err) => {
                error!(%err, "failed to encode log frame");
                return;
            }
        };
        if let Err(err) = writeln!(self.out, "{line}").and_then(|_| self.out.flush()) {
            error!(path = %self.path.display(), %err, "failed to write to log file");
        }
    }
}

/// Open `name` in `dir` without touching an existing file. A taken name
/// gets `_1`, `_2`, ... inserted before the extension.
fn create_unique(dir: &Path, name: &str) -> std::io::Result<(PathBuf, File)> {
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, "log"));
    let mut attempt = 0u32;
    loop {
        let candidate = if attempt == 0 {
            name.to_string()
        } else {
            format!("{stem}_{attempt}.{ext}")
        };
        let path = dir.join(candidate);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists && attempt < 1000 => attempt += 1,
            Err(err) => return Err(err),
        }
    }
}

/// Delete the oldest `*.log` files by mtime until at most `limit` remain.
pub fn rotate(dir: &Path, limit: usize) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut logs: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "log"))
        .map(|path| {
            let modified = std::fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect();
    if logs.len() <= limit {
        return;
    }
    logs.sort_by(|a, b| a.0.cmp(&b.0));
    let excess = logs.len() - limit;
    for (_, path) in logs.into_iter().take(excess) {
        if let Err(err) = std::fs::remove_file(&path) {
            debug!(path = %path.display(), %err, "failed to delete old log file");
        }
    }
}

/// Zip the contents of `debug_dir` into `dest` (paths relative to the dir).
pub fn save_debug_zip(debug_dir: &Path, dest: &Path) -> Result<(), SupervisorError> {
    let file = File::create(dest)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for entry in WalkDir::new(debug_dir).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|err| {
            SupervisorError::Io(
                err.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("walk loop detected")),
            )
        })?;
        let path = entry.path();
        if path == dest {
            continue;
        }
        let Ok(rel) = path.strip_prefix(debug_dir) else {
            continue;
        };
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if entry.file_type().is_dir() {
            writer.add_directory(name, options)?;
        } else if entry.file_type().is_file() {
            writer.start_file(name, options)?;
            let mut src = File::open(path)?;
            std::io::copy(&mut src, &mut writer)?;
        }
    }
    writer.finish()?;
    Ok(())
}
