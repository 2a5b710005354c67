use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Idle => "idle",
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Stopping => "stopping",
        }
    }

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => TaskState::Starting,
            2 => TaskState::Running,
            3 => TaskState::Stopping,
            _ => TaskState::Idle,
        }
    }
}

/// Lock-free task state readable without the supervisor's mutexes.
#[derive(Debug, Default)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn get(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: TaskState) {
        self.0.store(state.to_u8(), Ordering::SeqCst);
    }

    /// Move `from -> to`; on failure return the state actually observed.
    pub fn transition(&self, from: TaskState, to: TaskState) -> Result<(), TaskState> {
        self.0
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(TaskState::from_u8)
    }
}
