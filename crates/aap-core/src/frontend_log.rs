//! User-visible log lines.
//!
//! Frames are filtered by a minimum level, path-sanitized and published on
//! the bus as `task.log.message`; every accepted frame is mirrored to
//! `tracing` as well.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use aap_events::Bus;
use aap_topics::TOPIC_LOG_MESSAGE;

use crate::frames::{LogFrame, LogLevel};
use crate::sanitize::PathSanitizer;

#[derive(Clone)]
pub struct FrontendLog {
    bus: Bus,
    min_level: Arc<AtomicU8>,
    sanitizer: Arc<PathSanitizer>,
}

impl FrontendLog {
    pub fn new(bus: Bus) -> Self {
        Self::with_sanitizer(bus, PathSanitizer::current())
    }

    pub fn with_sanitizer(bus: Bus, sanitizer: PathSanitizer) -> Self {
        Self {
            bus,
            min_level: Arc::new(AtomicU8::new(LogLevel::Info.priority())),
            sanitizer: Arc::new(sanitizer),
        }
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_priority(self.min_level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: LogLevel) {
        self.min_level.store(level.priority(), Ordering::Relaxed);
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level.priority() >= self.min_level.load(Ordering::Relaxed)
    }

    /// Publish a frame if it passes the level filter. Returns whether it was
    /// published.
    pub fn log_frame(&self, mut frame: LogFrame) -> bool {
        if !self.enabled(frame.level) {
            return false;
        }
        frame.message = self.sanitizer.sanitize(&frame.message);
        mirror_to_tracing(&frame);
        self.bus.publish(TOPIC_LOG_MESSAGE, &frame);
        true
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) -> bool {
        self.log_frame(LogFrame::new(level, message))
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}

fn mirror_to_tracing(frame: &LogFrame) {
    let msg = frame.message.as_str();
    match frame.level {
        LogLevel::Trace => tracing::trace!(target: "frontend", "{msg}"),
        LogLevel::Debug => tracing::debug!(target: "frontend", "{msg}"),
        LogLevel::Info => tracing::info!(target: "frontend", "{msg}"),
        LogLevel::Warning => tracing::warn!(target: "frontend", "{msg}"),
        LogLevel::Error | LogLevel::Fatal => tracing::error!(target: "frontend", "{msg}"),
    }
}
