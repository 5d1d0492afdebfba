//! Data models module
//!
//! Defines the event records carried from producing contexts to the
//! monitoring surface:
//! - LogEntry: one captured logging call
//! - IpcMessage: one leg of a captured inter-process exchange
//! - PerformanceSample: periodic CPU/memory snapshot
//! - Event: the tagged union actually placed on the transport
//!
//! All records are plain values. They are moved across the transport and
//! never shared with the producer afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::{TOPIC_IPC_MESSAGE, TOPIC_LOG, TOPIC_PERFORMANCE_SAMPLE};

#[cfg(test)]
mod tests;

/// Severity of a captured logging call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Log,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Every severity a console interceptor wraps
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Log,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Log => "log",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Producing context of an event.
///
/// Serialized as `"host"` for the privileged process and `"renderer-<id>"`
/// for an untrusted context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Origin {
    Host,
    Renderer(u32),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Host => f.write_str("host"),
            Origin::Renderer(id) => write!(f, "renderer-{}", id),
        }
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        origin.to_string()
    }
}

impl FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "host" {
            return Ok(Origin::Host);
        }
        s.strip_prefix("renderer-")
            .filter(|id| is_canonical_id(id))
            .and_then(|id| id.parse::<u32>().ok())
            .map(Origin::Renderer)
            .ok_or_else(|| format!("invalid origin '{}': expected 'host' or 'renderer-<id>'", s))
    }
}

// Digits only, no sign, no leading zero, so every id has one spelling
fn is_canonical_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) && (id == "0" || !id.starts_with('0'))
}

impl TryFrom<String> for Origin {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One captured logging call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    /// One element per original argument, in call order
    pub payload: Vec<Value>,
    pub origin: Origin,
    pub timestamp: DateTime<Utc>,
}

/// Which way an IPC leg travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    OriginToHost,
    HostToOrigin,
}

/// Kind of IPC leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    FireAndForget,
    Request,
    ResponseOk,
    ResponseError,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::FireAndForget => "fire-and-forget",
            MessageKind::Request => "request",
            MessageKind::ResponseOk => "response-ok",
            MessageKind::ResponseError => "response-error",
        }
    }

    /// Whether this leg travels back to the untrusted context
    pub fn direction(&self) -> Direction {
        match self {
            MessageKind::FireAndForget | MessageKind::Request => Direction::OriginToHost,
            MessageKind::ResponseOk | MessageKind::ResponseError => Direction::HostToOrigin,
        }
    }
}

/// One captured leg of an inter-process exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpcMessage {
    pub channel: String,
    pub direction: Direction,
    pub kind: MessageKind,
    pub sender_id: u32,
    pub payload: Vec<Value>,
    pub timestamp: DateTime<Utc>,
    /// Shared by a request and its response; absent for fire-and-forget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<Uuid>,
}

/// CPU (percent) and memory (MB) of one process
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessUsage {
    pub cpu: f64,
    pub memory: f64,
}

impl ProcessUsage {
    /// Negative or non-finite readings are reported as zero
    pub fn new(cpu: f64, memory: f64) -> Self {
        Self {
            cpu: non_negative(cpu),
            memory: non_negative(memory),
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Periodic resource snapshot of the host and a renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub main: ProcessUsage,
    pub renderer: ProcessUsage,
    pub timestamp: DateTime<Utc>,
}

/// Named delivery address on the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "log")]
    Log,
    #[serde(rename = "ipc-message")]
    IpcMessage,
    #[serde(rename = "performance-sample")]
    PerformanceSample,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Log, Topic::IpcMessage, Topic::PerformanceSample];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Log => TOPIC_LOG,
            Topic::IpcMessage => TOPIC_IPC_MESSAGE,
            Topic::PerformanceSample => TOPIC_PERFORMANCE_SAMPLE,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| format!("unknown topic '{}'", s))
    }
}

/// Unit carried by the transport; each variant belongs to exactly one topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "data")]
pub enum Event {
    #[serde(rename = "log")]
    Log(LogEntry),
    #[serde(rename = "ipc-message")]
    Ipc(IpcMessage),
    #[serde(rename = "performance-sample")]
    Performance(PerformanceSample),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::Log(_) => Topic::Log,
            Event::Ipc(_) => Topic::IpcMessage,
            Event::Performance(_) => Topic::PerformanceSample,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Log(entry) => entry.timestamp,
            Event::Ipc(message) => message.timestamp,
            Event::Performance(sample) => sample.timestamp,
        }
    }
}

impl From<LogEntry> for Event {
    fn from(entry: LogEntry) -> Self {
        Event::Log(entry)
    }
}

impl From<IpcMessage> for Event {
    fn from(message: IpcMessage) -> Self {
        Event::Ipc(message)
    }
}

impl From<PerformanceSample> for Event {
    fn from(sample: PerformanceSample) -> Self {
        Event::Performance(sample)
    }
}
