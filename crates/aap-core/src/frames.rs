//! Wire shapes the worker emits over the WebSocket and `/execute`.
//!
//! Log and summary frames share one transport. Both decode with
//! `deny_unknown_fields` so a payload can only ever match one of them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    /// Levels a user may pick in settings (TRACE is internal only).
    pub const SELECTABLE: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    pub(crate) fn priority(self) -> u8 {
        match self {
            LogLevel::Trace => 1,
            LogLevel::Debug => 2,
            LogLevel::Info => 3,
            LogLevel::Warning => 4,
            LogLevel::Error => 5,
            LogLevel::Fatal => 6,
        }
    }

    pub(crate) fn from_priority(p: u8) -> Self {
        match p {
            0 | 1 => LogLevel::Trace,
            2 => LogLevel::Debug,
            3 => LogLevel::Info,
            4 => LogLevel::Warning,
            5 => LogLevel::Error,
            _ => LogLevel::Fatal,
        }
    }

    /// Parse a level name, falling back to INFO for anything unrecognized.
    pub fn parse_lossy(raw: &str) -> Self {
        raw.parse().unwrap_or(LogLevel::Info)
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn tracing_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Fatal => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            other => Err(format!("unknown log level `{other}`")),
        }
    }
}

/// UTC ISO-8601 timestamp with millisecond precision.
pub fn now_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogFrame {
    pub level: LogLevel,
    pub message: String,
    #[serde(default = "now_timestamp")]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_class: Option<String>,
}

impl LogFrame {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: now_timestamp(),
            source_file: None,
            function_name: None,
            line_number: None,
            html_class: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SummaryFrame {
    pub summary_message: String,
}

/// One decoded text frame from the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Log(LogFrame),
    Summary(SummaryFrame),
    Unknown(String),
}

impl InboundFrame {
    /// Try the log shape first, then the summary shape.
    pub fn parse(text: &str) -> Self {
        if let Ok(frame) = serde_json::from_str::<LogFrame>(text) {
            return InboundFrame::Log(frame);
        }
        if let Ok(summary) = serde_json::from_str::<SummaryFrame>(text) {
            return InboundFrame::Summary(summary);
        }
        InboundFrame::Unknown(text.to_string())
    }
}
