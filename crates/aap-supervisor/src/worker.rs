//! Worker process: locating, spawning, probing and killing it.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, error};

use aap_core::{paths, Endpoint};

use crate::error::SupervisorError;

#[cfg(windows)]
pub const WORKER_EXECUTABLE: &str = "adb_auto_player.exe";
#[cfg(not(windows))]
pub const WORKER_EXECUTABLE: &str = "adb_auto_player";

/// Env var pointing at the worker source tree in development.
pub const WORKER_DIR_ENV: &str = "AAP_WORKER_DIR";

/// Record of the worker server the supervisor talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerHandle {
    /// `None` for adopted workers; their PID is never looked up.
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub adopted: bool,
    pub endpoint: Endpoint,
}

impl WorkerHandle {
    pub fn spawned(pid: Option<u32>, endpoint: Endpoint) -> Self {
        Self {
            pid,
            started_at: Utc::now(),
            adopted: false,
            endpoint,
        }
    }

    pub fn adopted(endpoint: Endpoint) -> Self {
        Self {
            pid: None,
            started_at: Utc::now(),
            adopted: true,
            endpoint,
        }
    }
}

/// How to launch the worker server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub inherit_stdout: bool,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            inherit_stdout: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Packaged build: run the binary directly with `--server`.
    pub fn binary(path: impl Into<PathBuf>) -> Self {
        Self::new(path).arg("--server")
    }

    /// Development checkout: `uv run adb-auto-player --server` in the source tree.
    pub fn dev(worker_dir: impl Into<PathBuf>) -> Self {
        let mut cmd = Self::new("uv")
            .arg("run")
            .arg("adb-auto-player")
            .arg("--server");
        cmd.current_dir = Some(worker_dir.into());
        cmd.inherit_stdout = true;
        cmd
    }

    pub(crate) fn spawn(&self) -> std::io::Result<tokio::process::Child> {
        if let Some(dir) = &self.current_dir {
            if !dir.is_dir() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("dev worker dir does not exist: {}", dir.display()),
                ));
            }
        }
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        if self.inherit_stdout {
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        }
        cmd.spawn()
    }
}

/// Places a packaged or locally built worker binary may live, in priority order.
pub fn worker_binary_candidates(base: &Path) -> Vec<PathBuf> {
    vec![
        base.join("binaries").join(WORKER_EXECUTABLE),
        // macOS app bundle
        base.join("../Resources/binaries").join(WORKER_EXECUTABLE),
        base.join("../../../python/main.dist").join(WORKER_EXECUTABLE),
        base.join("../../python/main.dist").join(WORKER_EXECUTABLE),
        base.join("python/main.dist").join(WORKER_EXECUTABLE),
    ]
}

pub fn locate_worker_binary(base: &Path) -> Result<PathBuf, SupervisorError> {
    let candidates = worker_binary_candidates(base);
    paths::first_existing(&candidates).ok_or(SupervisorError::BinaryNotFound(candidates))
}

/// Worker source directory for development runs.
pub fn resolve_dev_worker_dir(base: &Path) -> PathBuf {
    let mut candidates = Vec::new();
    if let Ok(dir) = std::env::var(WORKER_DIR_ENV) {
        if !dir.trim().is_empty() {
            candidates.push(paths::expand_user(dir.trim()));
        }
    }
    candidates.push(base.join("python"));
    candidates.push(base.join("../python"));
    paths::first_existing_or_first(&candidates).unwrap_or_else(|| base.join("python"))
}

/// Resolve the launch command for the current build flavor.
pub fn resolve_worker_command(is_dev: bool, base: &Path) -> Result<WorkerCommand, SupervisorError> {
    if is_dev {
        return Ok(WorkerCommand::dev(resolve_dev_worker_dir(base)));
    }
    locate_worker_binary(base).map(WorkerCommand::binary)
}

/// True when something already listens on the endpoint.
pub fn port_in_use(endpoint: &Endpoint) -> std::io::Result<bool> {
    match TcpListener::bind((endpoint.host.as_str(), endpoint.port)) {
        Ok(listener) => {
            drop(listener);
            Ok(false)
        }
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => Ok(true),
        Err(err) => Err(err),
    }
}

/// Kill `pid` and all of its descendants, children first. Best effort.
pub fn kill_process_tree(pid: u32) {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);
    kill_tree_in(&sys, Pid::from_u32(pid));
}

/// Kill `pid` and its descendants in an already-refreshed process table.
pub fn kill_tree_in(sys: &System, pid: Pid) {
    let children: Vec<Pid> = sys
        .processes()
        .iter()
        .filter(|(_, proc_)| proc_.parent() == Some(pid) && proc_.thread_kind().is_none())
        .map(|(child, _)| *child)
        .collect();
    for child in children {
        kill_tree_in(sys, child);
    }
    match sys.process(pid) {
        Some(process) => {
            if !process.kill() {
                error!(pid = pid.as_u32(), "failed to kill process");
            }
        }
        None => debug!(pid = pid.as_u32(), "process already exited"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_command_passes_server_flag() {
        let cmd = WorkerCommand::binary("/opt/aap/binaries/adb_auto_player");
        assert_eq!(cmd.args, vec!["--server".to_string()]);
        assert!(!cmd.inherit_stdout);
        assert!(cmd.current_dir.is_none());
    }

    #[test]
    fn dev_command_runs_through_uv() {
        let cmd = WorkerCommand::dev("/src/python");
        assert_eq!(cmd.program, PathBuf::from("uv"));
        assert_eq!(cmd.args, vec!["run", "adb-auto-player", "--server"]);
        assert_eq!(cmd.current_dir, Some(PathBuf::from("/src/python")));
        assert!(cmd.inherit_stdout);
    }

    #[test]
    fn locate_prefers_packaged_binaries_dir() {
        let dir = tempfile::tempdir().unwrap();
        let dev = dir.path().join("python/main.dist");
        std::fs::create_dir_all(&dev).unwrap();
        std::fs::write(dev.join(WORKER_EXECUTABLE), b"").unwrap();
        assert_eq!(
            locate_worker_binary(dir.path()).unwrap(),
            dev.join(WORKER_EXECUTABLE)
        );

        let packaged = dir.path().join("binaries");
        std::fs::create_dir_all(&packaged).unwrap();
        std::fs::write(packaged.join(WORKER_EXECUTABLE), b"").unwrap();
        assert_eq!(
            locate_worker_binary(dir.path()).unwrap(),
            packaged.join(WORKER_EXECUTABLE)
        );
    }

    #[test]
    fn missing_binary_lists_candidates() {
        let dir = tempfile::tempdir().unwrap();
        match locate_worker_binary(dir.path()) {
            Err(SupervisorError::BinaryNotFound(searched)) => assert_eq!(searched.len(), 5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn port_check_sees_bound_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let endpoint = Endpoint::new("127.0.0.1", port);
        assert!(port_in_use(&endpoint).unwrap());
        drop(listener);
        assert!(!port_in_use(&endpoint).unwrap());
    }

    #[tokio::test]
    async fn missing_dev_dir_fails_before_spawn() {
        let cmd = WorkerCommand::dev("/definitely/not/here");
        let err = cmd.spawn().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kill_process_tree_terminates_child() {
        let mut child = WorkerCommand::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id().unwrap();
        kill_process_tree(pid);
        let status = tokio::time::timeout(std::time::Duration::from_secs(5), child.wait())
            .await
            .expect("child exits")
            .unwrap();
        assert!(!status.success());
    }
}
