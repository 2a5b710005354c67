//! Supervision of the ADB Auto Player worker: process lifecycle, the
//! task WebSocket, per-task log files and `/execute` calls.

pub mod client;
pub mod error;
pub mod notify;
pub mod state;
pub mod supervisor;
pub mod task_log;
pub mod worker;

pub use client::WorkerClient;
pub use error::SupervisorError;
pub use notify::{LogNotifier, Notifier};
pub use state::TaskState;
pub use supervisor::{Supervisor, SupervisorOptions};
pub use task_log::save_debug_zip;
pub use worker::{resolve_worker_command, WorkerCommand, WorkerHandle};
