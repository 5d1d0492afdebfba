//! Output formatting module
//!
//! Handles:
//! - Human-readable rendering of bridge events, one line each
//! - JSON rendering (one object per line) using the event serde shape
//! - The end-of-session summary

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::models::{Event, IpcMessage, LogEntry, PerformanceSample};

/// Counters collected while a session runs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub log_events: u64,
    pub ipc_events: u64,
    pub performance_samples: u64,
    pub blocked_messages: u64,
    pub dropped_events: u64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
}

impl SessionSummary {
    pub fn count(&mut self, event: &Event) {
        match event {
            Event::Log(_) => self.log_events += 1,
            Event::Ipc(_) => self.ipc_events += 1,
            Event::Performance(_) => self.performance_samples += 1,
        }
    }
}

fn render_payload(payload: &[Value]) -> String {
    payload
        .iter()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_log(entry: &LogEntry) -> String {
    format!(
        "[{}] {} {}: {}",
        entry.timestamp.format("%H:%M:%S%.3f"),
        entry.origin,
        entry.level,
        render_payload(&entry.payload)
    )
}

fn format_ipc(message: &IpcMessage) -> String {
    let invocation = message
        .invocation_id
        .map(|id| format!(" #{}", &id.simple().to_string()[..8]))
        .unwrap_or_default();

    format!(
        "[{}] ipc {} {} on '{}' (sender {}){}: {}",
        message.timestamp.format("%H:%M:%S%.3f"),
        message.kind.as_str(),
        match message.direction {
            crate::models::Direction::OriginToHost => "->",
            crate::models::Direction::HostToOrigin => "<-",
        },
        message.channel,
        message.sender_id,
        invocation,
        Value::Array(message.payload.clone())
    )
}

fn format_performance(sample: &PerformanceSample) -> String {
    format!(
        "[{}] perf main {:.1}% {:.1}MB | renderer {:.1}% {:.1}MB",
        sample.timestamp.format("%H:%M:%S%.3f"),
        sample.main.cpu,
        sample.main.memory,
        sample.renderer.cpu,
        sample.renderer.memory
    )
}

/// Format an event as a single human-readable line
pub fn format_event_human(event: &Event) -> String {
    match event {
        Event::Log(entry) => format_log(entry),
        Event::Ipc(message) => format_ipc(message),
        Event::Performance(sample) => format_performance(sample),
    }
}

/// Format an event as a single-line JSON object
pub fn format_event_json(event: &Event) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

/// Human-readable session summary
pub fn format_summary(summary: &SessionSummary) -> String {
    let mut lines = vec![
        "Session Summary:".to_string(),
        format!("  Log entries: {}", summary.log_events),
        format!("  IPC messages: {}", summary.ipc_events),
        format!("  Performance samples: {}", summary.performance_samples),
    ];

    if summary.blocked_messages > 0 {
        lines.push(format!("  Blocked by allow-list: {}", summary.blocked_messages));
    }
    if summary.dropped_events > 0 {
        lines.push(format!("  Dropped (overflow): {}", summary.dropped_events));
    }

    let duration_sec = summary.duration_ms as f64 / 1000.0;
    if duration_sec < 1.0 {
        lines.push(format!("  Duration: {}ms", summary.duration_ms));
    } else {
        lines.push(format!("  Duration: {:.2}s", duration_sec));
    }

    if let Some(true) = summary.interrupted {
        lines.push("  Status: Interrupted by user".to_string());
    }

    lines.join("\n")
}
