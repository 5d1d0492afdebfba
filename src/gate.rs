//! Allow-list gate between untrusted contexts and the privileged registry
//!
//! Every outbound send or request from an untrusted context passes through
//! a [`Gate`]. Channels not on the matching allow-list never reach the
//! registry. Entries are exact channel names, or glob patterns when they
//! contain `*`, `?` or `[`.

use glob::Pattern;
use serde_json::Value;
use std::fmt;

use crate::error::{BridgeError, Result};
use crate::registry::HostPort;

/// Which side of the allow-list a call is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Send,
    Request,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Send => "send",
            Operation::Request => "request",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check if an allow-list entry contains glob pattern characters
pub fn is_glob_pattern(entry: &str) -> bool {
    entry.contains('*') || entry.contains('?') || entry.contains('[')
}

#[derive(Debug, Clone)]
enum ChannelRule {
    Exact(String),
    Glob(Pattern),
}

impl ChannelRule {
    fn parse(entry: &str) -> Result<Self> {
        if !is_glob_pattern(entry) {
            return Ok(ChannelRule::Exact(entry.to_string()));
        }
        Pattern::new(entry)
            .map(ChannelRule::Glob)
            .map_err(|e| BridgeError::InvalidPattern {
                pattern: entry.to_string(),
                reason: e.to_string(),
            })
    }

    fn matches(&self, channel: &str) -> bool {
        match self {
            ChannelRule::Exact(name) => name == channel,
            ChannelRule::Glob(pattern) => pattern.matches(channel),
        }
    }
}

/// Static allow-lists for outbound sends and requests
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    send: Vec<ChannelRule>,
    request: Vec<ChannelRule>,
}

impl AllowList {
    /// Build from raw entries. Invalid glob patterns are rejected here
    /// rather than silently never matching.
    pub fn new<S: AsRef<str>>(send: &[S], request: &[S]) -> Result<Self> {
        let parse_all = |entries: &[S]| -> Result<Vec<ChannelRule>> {
            entries.iter().map(|e| ChannelRule::parse(e.as_ref())).collect()
        };
        Ok(Self {
            send: parse_all(send)?,
            request: parse_all(request)?,
        })
    }

    pub fn permits(&self, channel: &str, operation: Operation) -> bool {
        let rules = match operation {
            Operation::Send => &self.send,
            Operation::Request => &self.request,
        };
        rules.iter().any(|rule| rule.matches(channel))
    }

    fn check(&self, channel: &str, operation: Operation) -> Result<()> {
        if self.permits(channel, operation) {
            return Ok(());
        }
        Err(BridgeError::ChannelNotAllowed {
            channel: channel.to_string(),
            operation,
        })
    }
}

/// The only messaging surface handed to an untrusted context
pub struct Gate<P: HostPort> {
    port: P,
    allow: AllowList,
}

impl<P: HostPort> Gate<P> {
    pub fn new(port: P, allow: AllowList) -> Self {
        Self { port, allow }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow
    }

    /// Fire-and-forget send. A disallowed channel is logged and refused.
    pub fn send(&self, channel: &str, args: Vec<Value>) -> Result<()> {
        if let Err(err) = self.allow.check(channel, Operation::Send) {
            log::warn!(target: "devbridge::gate", "blocked send on channel '{}'", channel);
            return Err(err);
        }
        self.port.send(channel, args);
        Ok(())
    }

    /// Request/response. A disallowed channel is rejected without crossing.
    pub async fn request(&self, channel: &str, args: Vec<Value>) -> Result<Value> {
        if let Err(err) = self.allow.check(channel, Operation::Request) {
            log::debug!(target: "devbridge::gate", "rejected request on channel '{}'", channel);
            return Err(err);
        }
        self.port.invoke(channel, args).await
    }
}
