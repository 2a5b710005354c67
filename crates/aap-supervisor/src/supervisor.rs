//! IPC supervisor: owns the worker server and the per-task WebSocket.
//!
//! Two async mutexes guard the mutable state. `server` covers the worker
//! handle and child process; `socket` covers the WebSocket writer and task
//! bookkeeping. Operations that need both take `server` first. The task
//! state itself lives in an atomic so it can be read without either lock.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use aap_core::{
    Endpoint, FrontendLog, InboundFrame, LogFrame, LogLevel, SettingsStore, SummaryFrame,
};
use aap_events::Bus;
use aap_topics::{TOPIC_TASK_STOPPED, TOPIC_WRITE_SUMMARY_TO_LOG};

use crate::client::WorkerClient;
use crate::error::SupervisorError;
use crate::notify::{LogNotifier, Notifier};
use crate::state::{StateCell, TaskState};
use crate::task_log::{TaskLog, DEBUG_DIR};
use crate::worker::{self, kill_process_tree, port_in_use, WorkerCommand, WorkerHandle};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Total time a freshly spawned worker gets to pass `/health`.
    pub startup_timeout: Duration,
    pub health_poll_interval: Duration,
    /// Upper bound on the WebSocket handshake with a healthy worker.
    pub connect_timeout: Duration,
    /// Directory receiving per-task log files.
    pub debug_dir: PathBuf,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(30),
            health_poll_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            debug_dir: PathBuf::from(DEBUG_DIR),
        }
    }
}

#[derive(Serialize)]
struct ExecuteCommand<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    command: &'a [String],
}

#[derive(Serialize)]
struct StopCommand {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Default)]
struct ServerSlot {
    handle: Option<WorkerHandle>,
    child: Option<tokio::process::Child>,
    command: Option<WorkerCommand>,
}

impl ServerSlot {
    fn child_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct SocketSlot {
    writer: Option<WsWriter>,
    /// Ends the current session's reader.
    stop: Option<oneshot::Sender<()>>,
    session: u64,
    notify_on_end: Arc<AtomicBool>,
}

impl SocketSlot {
    /// Drop both halves of the current session. The reader stops before it
    /// handles another frame.
    async fn shut(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(mut writer) = self.writer.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, writer.close())
                .await
                .is_err()
            {
                debug!("websocket close did not complete");
            }
        }
    }
}

/// Bookkeeping owned by the reader loop for the lifetime of one task.
struct TaskContext {
    session: u64,
    log_file: Option<TaskLog>,
    notify_on_end: Arc<AtomicBool>,
    restore_level: Option<LogLevel>,
    summary: Option<SummaryFrame>,
    last_frame: Option<LogFrame>,
}

struct Inner {
    settings: Arc<SettingsStore>,
    log: FrontendLog,
    bus: Bus,
    notifier: Arc<dyn Notifier>,
    client: WorkerClient,
    options: SupervisorOptions,
    state: StateCell,
    server: Mutex<ServerSlot>,
    socket: Mutex<SocketSlot>,
}

#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(
        settings: Arc<SettingsStore>,
        log: FrontendLog,
        bus: Bus,
        command: Option<WorkerCommand>,
    ) -> Result<Self, SupervisorError> {
        Self::with_options(
            settings,
            log,
            bus,
            command,
            Arc::new(LogNotifier),
            SupervisorOptions::default(),
        )
    }

    pub fn with_options(
        settings: Arc<SettingsStore>,
        log: FrontendLog,
        bus: Bus,
        command: Option<WorkerCommand>,
        notifier: Arc<dyn Notifier>,
        options: SupervisorOptions,
    ) -> Result<Self, SupervisorError> {
        let inner = Inner {
            settings,
            log,
            bus,
            notifier,
            client: WorkerClient::new()?,
            options,
            state: StateCell::default(),
            server: Mutex::new(ServerSlot {
                command,
                ..Default::default()
            }),
            socket: Mutex::new(SocketSlot::default()),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn state(&self) -> TaskState {
        self.inner.state.get()
    }

    /// Snapshot of the current worker handle, if any.
    pub async fn worker(&self) -> Option<WorkerHandle> {
        self.inner.server.lock().await.handle.clone()
    }

    /// Replace the launch command used for future spawns.
    pub async fn set_worker_command(&self, command: Option<WorkerCommand>) {
        self.inner.server.lock().await.command = command;
    }

    pub async fn start_task(
        &self,
        args: Vec<String>,
        notify_on_end: bool,
        log_level_override: Option<LogLevel>,
    ) -> Result<(), SupervisorError> {
        let inner = &self.inner;
        inner
            .state
            .transition(TaskState::Idle, TaskState::Starting)
            .map_err(|state| SupervisorError::Busy(state.as_str()))?;

        let restore_level = log_level_override.map(|level| {
            let previous = inner.log.level();
            inner.log.set_level(level);
            previous
        });

        match self
            .start_locked(args, notify_on_end, restore_level)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Some(level) = restore_level {
                    inner.log.set_level(level);
                }
                inner.state.set(TaskState::Idle);
                error!(%err, "failed to start task");
                inner.log.error(err.to_string());
                Err(err)
            }
        }
    }

    async fn start_locked(
        &self,
        args: Vec<String>,
        notify_on_end: bool,
        restore_level: Option<LogLevel>,
    ) -> Result<(), SupervisorError> {
        let inner = &self.inner;
        let settings = inner.settings.get();
        let endpoint = settings.endpoint();

        let mut server = inner.server.lock().await;
        inner.ensure_worker(&mut server, &endpoint).await?;
        let mut socket = inner.socket.lock().await;
        drop(server);

        if inner.state.get() != TaskState::Starting {
            // stopped while the worker was coming up
            if let Some(level) = restore_level {
                inner.log.set_level(level);
            }
            inner.state.set(TaskState::Idle);
            inner.bus.publish(TOPIC_WRITE_SUMMARY_TO_LOG, &None::<SummaryFrame>);
            inner.bus.emit(TOPIC_TASK_STOPPED);
            return Ok(());
        }

        let url = endpoint.ws_url("/ws");
        let connect = tokio_tungstenite::connect_async(url.as_str());
        let stream = match tokio::time::timeout(inner.options.connect_timeout, connect).await {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(err)) => {
                return Err(SupervisorError::SocketFailed {
                    endpoint,
                    reason: err.to_string(),
                })
            }
            Err(_) => {
                return Err(SupervisorError::SocketFailed {
                    endpoint,
                    reason: format!(
                        "no handshake within {}s",
                        inner.options.connect_timeout.as_secs_f32()
                    ),
                })
            }
        };
        let (mut writer, reader) = stream.split();

        let log_file = match TaskLog::create(
            &inner.options.debug_dir,
            &args,
            settings.logging.task_log_limit,
        ) {
            Ok(file) => file,
            Err(err) => {
                error!(%err, "failed to set up task log file");
                inner.log.error(format!("Failed to setup log file: {err}"));
                None
            }
        };

        let payload = serde_json::to_string(&ExecuteCommand {
            kind: "execute_command",
            command: &args,
        })
        .map_err(|err| SupervisorError::DecodeFailed(err.to_string()))?;
        if let Err(err) = writer.send(Message::Text(payload)).await {
            return Err(SupervisorError::SocketFailed {
                endpoint,
                reason: format!("failed to send command: {err}"),
            });
        }

        socket.session += 1;
        let notify = Arc::new(AtomicBool::new(notify_on_end));
        socket.notify_on_end = notify.clone();
        socket.writer = Some(writer);
        let (stop_tx, stop_rx) = oneshot::channel();
        socket.stop = Some(stop_tx);
        let ctx = TaskContext {
            session: socket.session,
            log_file,
            notify_on_end: notify,
            restore_level,
            summary: None,
            last_frame: None,
        };
        inner.state.set(TaskState::Running);
        debug!(?args, %endpoint, "task started");
        tokio::spawn(read_loop(inner.clone(), reader, stop_rx, ctx));
        Ok(())
    }

    /// Ask the worker to stop the running task and close the socket.
    /// A no-op when idle.
    pub async fn stop_task(&self, reason: Option<&str>) {
        self.inner
            .stop_socket(Some(reason.unwrap_or("Stopping")))
            .await;
    }

    /// True iff the task socket is open and a ping can be written to it.
    pub async fn is_task_running(&self) -> bool {
        let inner = &self.inner;
        let mut socket = inner.socket.lock().await;
        let Some(writer) = socket.writer.as_mut() else {
            return false;
        };
        if writer.send(Message::Ping(Vec::new())).await.is_ok() {
            return true;
        }
        socket.shut().await;
        inner.state.set(TaskState::Idle);
        false
    }

    /// Run a short command through `POST /execute` and return its frames.
    pub async fn post_command(&self, args: &[String]) -> Result<Vec<LogFrame>, SupervisorError> {
        let inner = &self.inner;
        let endpoint = inner.settings.get().endpoint();
        {
            let mut server = inner.server.lock().await;
            inner.ensure_worker(&mut server, &endpoint).await?;
        }
        inner.client.execute(&endpoint, args).await
    }

    /// Forward a payload-less change notification to a worker we already
    /// know about. Failures are only logged.
    pub async fn notify_worker(&self, path: &str) {
        let inner = &self.inner;
        let endpoint = inner.settings.get().endpoint();
        if inner.server.lock().await.handle.is_none() {
            return;
        }
        if let Err(err) = inner
            .client
            .post_json(&endpoint, path, &serde_json::json!({}))
            .await
        {
            debug!(%err, path, "worker notification failed");
        }
    }

    /// Drop the task socket after the worker endpoint changed so the next
    /// start connects to the new address. An adopted worker is forgotten.
    pub async fn reinitialize(&self) {
        let inner = &self.inner;
        let mut server = inner.server.lock().await;
        if server.handle.as_ref().is_some_and(|h| h.adopted) {
            server.handle = None;
        }
        drop(server);
        inner.stop_socket(None).await;
    }

    /// Stop any task and terminate the worker unless it was adopted.
    pub async fn cleanup(&self) {
        let inner = &self.inner;
        inner.stop_socket(None).await;
        let mut server = inner.server.lock().await;
        match server.handle.as_ref() {
            Some(handle) if handle.adopted => {
                debug!("not stopping adopted worker");
                server.handle = None;
            }
            Some(_) => inner.kill_owned(&mut server).await,
            None => {}
        }
    }
}

impl Inner {
    async fn ensure_worker(
        &self,
        server: &mut ServerSlot,
        endpoint: &Endpoint,
    ) -> Result<(), SupervisorError> {
        if let Some(handle) = server.handle.clone() {
            if handle.adopted {
                if handle.endpoint == *endpoint && self.client.is_healthy(endpoint).await {
                    return Ok(());
                }
                debug!(endpoint = %handle.endpoint, "adopted worker stopped answering");
                server.handle = None;
            } else if server.child_alive() {
                if self.client.is_healthy(endpoint).await {
                    return Ok(());
                }
                warn!(pid = ?handle.pid, "owned worker failed health check, restarting");
                self.kill_owned(server).await;
            } else {
                debug!(pid = ?handle.pid, "owned worker exited");
                server.handle = None;
                server.child = None;
            }
        }

        let in_use = port_in_use(endpoint).map_err(|err| {
            error!(%endpoint, %err, "failed to check port availability");
            SupervisorError::Io(err)
        })?;
        if in_use {
            if self.client.is_healthy(endpoint).await {
                info!(%endpoint, "AutoPlayer Server found running");
                server.handle = Some(WorkerHandle::adopted(endpoint.clone()));
                return Ok(());
            }
            return Err(SupervisorError::PortUsedByForeign(endpoint.clone()));
        }

        let command = match server.command.clone() {
            Some(command) => command,
            None => {
                let base = std::env::current_dir()?;
                return Err(SupervisorError::BinaryNotFound(
                    worker::worker_binary_candidates(&base),
                ));
            }
        };
        let child = command
            .spawn()
            .map_err(|source| SupervisorError::SpawnFailed {
                endpoint: endpoint.clone(),
                source,
            })?;
        let pid = child.id();
        debug!(?pid, program = %command.program.display(), "started worker");
        server.handle = Some(WorkerHandle::spawned(pid, endpoint.clone()));
        server.child = Some(child);

        let deadline = Instant::now() + self.options.startup_timeout;
        let mut ticker = tokio::time::interval(self.options.health_poll_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if self.client.is_healthy(endpoint).await {
                info!(%endpoint, "AutoPlayer Server started");
                return Ok(());
            }
            if Instant::now() >= deadline {
                error!(%endpoint, "timeout waiting for worker health check");
                self.kill_owned(server).await;
                return Err(SupervisorError::HealthTimeout(endpoint.clone()));
            }
        }
    }

    async fn kill_owned(&self, server: &mut ServerSlot) {
        if let Some(pid) = server.handle.take().and_then(|h| h.pid) {
            if let Err(err) = tokio::task::spawn_blocking(move || kill_process_tree(pid)).await {
                warn!(pid, %err, "process tree kill did not complete");
            }
        }
        if let Some(mut child) = server.child.take() {
            let _ = child.start_kill();
            if tokio::time::timeout(Duration::from_secs(5), child.wait())
                .await
                .is_err()
            {
                warn!("worker did not exit after kill");
            }
        }
    }

    /// Send `stop`, drop the connection and log `warning` if given. The
    /// warning is published before the socket lock is released so it always
    /// precedes the reader's `task.stopped`.
    async fn stop_socket(&self, warning: Option<&str>) {
        let mut socket = self.socket.lock().await;
        let state = self.state.get();
        if matches!(state, TaskState::Idle | TaskState::Stopping) {
            return;
        }
        socket.notify_on_end.store(false, Ordering::SeqCst);
        if let Some(writer) = socket.writer.as_mut() {
            let stop = serde_json::to_string(&StopCommand { kind: "stop" })
                .unwrap_or_else(|_| String::from(r#"{"type":"stop"}"#));
            match tokio::time::timeout(CLOSE_TIMEOUT, writer.send(Message::Text(stop))).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) if is_closing(&err) => debug!(%err, "stop sent on closing socket"),
                Ok(Err(err)) => error!(%err, "failed to send stop command"),
                Err(_) => warn!("stop command not written in time"),
            }
        }
        socket.shut().await;
        self.state.set(TaskState::Stopping);
        if let Some(warning) = warning {
            self.log.warning(warning);
        }
    }

    fn handle_text(&self, text: &str, ctx: &mut TaskContext) {
        match InboundFrame::parse(text) {
            InboundFrame::Log(frame) => {
                if let Some(file) = ctx.log_file.as_mut() {
                    file.write_frame(&frame);
                }
                self.log.log_frame(frame.clone());
                ctx.last_frame = Some(frame);
            }
            InboundFrame::Summary(summary) => {
                if !summary.summary_message.is_empty() {
                    ctx.summary = Some(summary);
                }
            }
            InboundFrame::Unknown(raw) => debug!(frame = %raw, "unknown frame"),
        }
    }

    async fn finish_task(&self, mut ctx: TaskContext) {
        let current = {
            let mut socket = self.socket.lock().await;
            let current = socket.session == ctx.session;
            if current {
                socket.writer = None;
                socket.stop = None;
            }
            current
        };

        if ctx.notify_on_end.load(Ordering::SeqCst) && self.settings.get().ui.notifications_enabled
        {
            let (title, body) =
                end_of_task_notification(ctx.last_frame.as_ref(), ctx.summary.as_ref());
            self.notifier.notify(title, &body);
        }
        ctx.log_file = None;
        if let Some(level) = ctx.restore_level {
            self.log.set_level(level);
        }
        if current {
            self.state.set(TaskState::Idle);
        }
        self.bus.publish(TOPIC_WRITE_SUMMARY_TO_LOG, &ctx.summary);
        self.bus.emit(TOPIC_TASK_STOPPED);
    }
}

async fn read_loop(
    inner: Arc<Inner>,
    mut reader: WsReader,
    mut stop: oneshot::Receiver<()>,
    mut ctx: TaskContext,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = &mut stop => {
                debug!("reader stopped on request");
                break;
            }
            msg = reader.next() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        match msg {
            Ok(Message::Text(text)) => inner.handle_text(&text, &mut ctx),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                if is_closing(&err) {
                    debug!(%err, "websocket closed");
                } else {
                    error!(%err, "websocket error");
                }
                break;
            }
        }
    }
    drop(reader);
    inner.finish_task(ctx).await;
}

fn is_closing(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(
                tungstenite::error::ProtocolError::ResetWithoutClosingHandshake
            )
    )
}

/// Title and body shown when a task ends.
pub fn end_of_task_notification(
    last_frame: Option<&LogFrame>,
    summary: Option<&SummaryFrame>,
) -> (&'static str, String) {
    match last_frame {
        Some(frame) if frame.level == LogLevel::Error => {
            ("Task exited with Error", frame.message.clone())
        }
        _ => (
            "Task ended",
            summary
                .map(|s| s.summary_message.clone())
                .unwrap_or_default(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_frame_wins_over_summary() {
        let err = LogFrame::new(LogLevel::Error, "device offline");
        let summary = SummaryFrame {
            summary_message: "3 runs".into(),
        };
        assert_eq!(
            end_of_task_notification(Some(&err), Some(&summary)),
            ("Task exited with Error", "device offline".to_string())
        );
    }

    #[test]
    fn summary_used_when_task_ends_cleanly() {
        let info = LogFrame::new(LogLevel::Info, "done");
        let summary = SummaryFrame {
            summary_message: "3 runs".into(),
        };
        assert_eq!(
            end_of_task_notification(Some(&info), Some(&summary)),
            ("Task ended", "3 runs".to_string())
        );
        assert_eq!(
            end_of_task_notification(None, None),
            ("Task ended", String::new())
        );
    }

    #[test]
    fn command_frames_serialize_with_type_tag() {
        let args = vec!["Debug".to_string()];
        let exec = serde_json::to_value(ExecuteCommand {
            kind: "execute_command",
            command: &args,
        })
        .unwrap();
        assert_eq!(exec, serde_json::json!({"type": "execute_command", "command": ["Debug"]}));
        let stop = serde_json::to_value(StopCommand { kind: "stop" }).unwrap();
        assert_eq!(stop, serde_json::json!({"type": "stop"}));
    }
}
