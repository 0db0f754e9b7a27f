//! Builds log, error and panic events.

use crate::{AgentError, AgentResult};
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;
use std::str::FromStr;
use telemetry_config::TelemetryConfig;
use telemetry_ingest::AccountIds;
use telemetry_queue::Event;

/// Context attached to events captured by the panic hook.
pub const UNCAUGHT_PANIC: &str = "UNCAUGHT_PANIC";

/// Version reported in `device.sdkVersion`.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Guard against self-referential `source()` chains.
const MAX_CAUSE_DEPTH: usize = 16;

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = AgentError;

    fn from_str(s: &str) -> AgentResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" | "d" => Ok(LogLevel::Debug),
            "info" | "i" => Ok(LogLevel::Info),
            "warn" | "warning" | "w" => Ok(LogLevel::Warn),
            "error" | "e" => Ok(LogLevel::Error),
            other => Err(AgentError::InvalidArgument(format!(
                "unknown log level: {other}"
            ))),
        }
    }
}

/// One parsed backtrace frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl StackFrame {
    fn to_json(&self) -> Value {
        let mut frame = Map::new();
        frame.insert("function".into(), json!(self.function));
        if let Some(file) = &self.file {
            frame.insert("file".into(), json!(file));
        }
        if let Some(line) = self.line {
            frame.insert("line".into(), json!(line));
        }
        if let Some(column) = self.column {
            frame.insert("column".into(), json!(column));
        }
        Value::Object(frame)
    }
}

/// Parse the text form of a captured `Backtrace` into frames.
///
/// Frame lines look like `  3: crate::module::function` and may be followed
/// by an `at path/to/file.rs:12:5` line.
pub fn parse_backtrace(text: &str) -> Vec<StackFrame> {
    let mut frames: Vec<StackFrame> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                let mut parts = location.rsplitn(3, ':');
                let column = parts.next().and_then(|c| c.parse().ok());
                let line_no = parts.next().and_then(|l| l.parse().ok());
                match (parts.next(), line_no, column) {
                    (Some(file), Some(line_no), Some(column)) => {
                        frame.file = Some(file.to_string());
                        frame.line = Some(line_no);
                        frame.column = Some(column);
                    }
                    _ => frame.file = Some(location.to_string()),
                }
            }
            continue;
        }

        let Some((index, function)) = line.split_once(": ") else {
            continue;
        };
        if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) {
            frames.push(StackFrame {
                function: function.to_string(),
                file: None,
                line: None,
                column: None,
            });
        }
    }

    frames
}

/// Best-effort type name for an error reached through `source()`.
///
/// Uses the leading identifier of its `Debug` output, e.g. `Custom` for
/// `Custom { kind: Other, .. }`.
fn debug_name(err: &dyn Error) -> String {
    let debug = format!("{err:?}");
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    if name.is_empty() {
        "Error".to_string()
    } else {
        name
    }
}

/// Creates events stamped with the account, install and device envelope.
pub struct EventBuilder {
    ids: AccountIds,
    install_id: String,
    environment: Option<String>,
    user_id: RwLock<Option<String>>,
    max_stack_frames: usize,
}

impl EventBuilder {
    pub fn new(config: &TelemetryConfig, install_id: impl Into<String>) -> Self {
        Self {
            ids: AccountIds::new(&config.project_id, &config.app_id, &config.package_name),
            install_id: install_id.into(),
            environment: config.environment.clone(),
            user_id: RwLock::new(config.user_id.clone()),
            max_stack_frames: config.max_stack_frames.max(1),
        }
    }

    pub fn ids(&self) -> &AccountIds {
        &self.ids
    }

    pub fn install_id(&self) -> &str {
        &self.install_id
    }

    /// Replace the user id stamped on subsequent events.
    pub fn set_user_id(&self, user_id: Option<String>) {
        *self.user_id.write() = user_id.filter(|id| !id.trim().is_empty());
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }

    fn base(&self) -> Event {
        let mut event = Event::new();
        event.insert("timestamp", chrono::Utc::now().timestamp_millis());
        event.insert("projectId", self.ids.project_id.as_str());
        event.insert("appId", self.ids.app_id.as_str());
        event.insert("packageName", self.ids.package_name.as_str());
        event.insert("installId", self.install_id.as_str());
        if let Some(environment) = &self.environment {
            event.insert("environment", environment.as_str());
        }
        if let Some(user_id) = self.user_id() {
            event.insert("userId", user_id);
        }
        event.insert(
            "device",
            json!({
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
                "family": std::env::consts::FAMILY,
                "sdkVersion": SDK_VERSION,
            }),
        );
        event
    }

    /// `type: "log"` event.
    pub fn log(&self, level: LogLevel, tag: &str, message: &str) -> Event {
        let mut event = self.base();
        event.insert("type", "log");
        event.insert("level", level.as_str());
        event.insert("tag", tag);
        event.insert("message", message);
        event
    }

    /// `type: "error"` event for `err` and its `source()` chain.
    ///
    /// `name` overrides the top-level exception name; causes are named from
    /// their `Debug` output. Frames come from `backtrace`, captured where the
    /// error was reported.
    pub fn error(
        &self,
        err: &(dyn Error + 'static),
        name: Option<&str>,
        context: &str,
        backtrace: &Backtrace,
    ) -> Event {
        let name = name.map_or_else(|| debug_name(err), str::to_string);
        let frames = parse_backtrace(&backtrace.to_string());
        let mut exception = self.exception(&name, &err.to_string(), &frames);

        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            if causes.len() >= MAX_CAUSE_DEPTH {
                break;
            }
            causes.push(self.exception(&debug_name(cause), &cause.to_string(), &[]));
            source = cause.source();
        }
        // Nest innermost-last: exception.cause.cause...
        let nested = causes.into_iter().rev().reduce(|inner, mut outer| {
            if let Value::Object(map) = &mut outer {
                map.insert("cause".into(), inner);
            }
            outer
        });
        if let (Some(cause), Value::Object(map)) = (nested, &mut exception) {
            map.insert("cause".into(), cause);
        }

        let mut event = self.base();
        event.insert("type", "error");
        event.insert("context", context);
        event.insert("exception", exception);
        event
    }

    /// Error event for a panic caught by the crash hook.
    pub fn panic(&self, message: &str, location: Option<&str>, backtrace: &Backtrace) -> Event {
        let frames = parse_backtrace(&backtrace.to_string());
        let mut exception = self.exception("panic", message, &frames);
        if let (Some(location), Value::Object(map)) = (location, &mut exception) {
            map.insert("location".into(), json!(location));
        }

        let mut event = self.base();
        event.insert("type", "error");
        event.insert("context", UNCAUGHT_PANIC);
        event.insert("exception", exception);
        event
    }

    fn exception(&self, name: &str, message: &str, frames: &[StackFrame]) -> Value {
        let frames: Vec<&StackFrame> = frames.iter().take(self.max_stack_frames).collect();

        let mut stacktrace = format!("{name}: {message}");
        for frame in &frames {
            stacktrace.push_str("\n    at ");
            stacktrace.push_str(&frame.function);
            if let (Some(file), Some(line)) = (&frame.file, frame.line) {
                stacktrace.push_str(&format!(" ({file}:{line})"));
            }
        }

        json!({
            "name": name,
            "message": message,
            "stacktrace": stacktrace,
            "frames": frames.iter().map(|f| f.to_json()).collect::<Vec<_>>(),
        })
    }
}
