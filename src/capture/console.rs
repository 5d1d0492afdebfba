//! Console interception
//!
//! [`Console`] is the process logging entry point: one call per message,
//! any number of arguments of any serializable shape. The interceptor
//! forwards the call untouched and then emits a `LogEntry` with one
//! guarded payload element per argument.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use crate::guard;
use crate::models::{LogEntry, LogLevel, Origin};
use crate::transport::{MonotonicClock, SinkHandle};

/// A single console argument
pub trait ConsoleArg {
    /// Human rendering used by the original output
    fn render(&self) -> String;

    /// Guarded structural copy used for the captured payload
    fn snapshot(&self) -> Value;
}

impl<T: Serialize + fmt::Debug + ?Sized> ConsoleArg for T {
    fn render(&self) -> String {
        // Strings print bare, everything else as JSON when possible
        match guard::snapshot(self) {
            Value::String(s) => s,
            value if !guard::is_sentinel(&value) => value.to_string(),
            _ => format!("{:?}", self),
        }
    }

    fn snapshot(&self) -> Value {
        guard::snapshot(self)
    }
}

/// Logging entry point of a context
pub trait Console: Send + Sync {
    fn write(&self, level: LogLevel, args: &[&dyn ConsoleArg]);
}

impl<C: Console + ?Sized> Console for Arc<C> {
    fn write(&self, level: LogLevel, args: &[&dyn ConsoleArg]) {
        (**self).write(level, args)
    }
}

/// Where [`StdConsole`] writes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleTarget {
    /// debug/log/info to stdout, warn/error to stderr
    #[default]
    Split,
    /// Everything to stderr, leaving stdout to the event stream
    Stderr,
    /// Nothing is printed
    Discard,
}

/// The process's own console output
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole {
    target: ConsoleTarget,
}

impl StdConsole {
    pub fn new(target: ConsoleTarget) -> Self {
        Self { target }
    }

    fn format_line(args: &[&dyn ConsoleArg]) -> String {
        args.iter()
            .map(|arg| arg.render())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Console for StdConsole {
    fn write(&self, level: LogLevel, args: &[&dyn ConsoleArg]) {
        let to_stderr = match self.target {
            ConsoleTarget::Discard => return,
            ConsoleTarget::Stderr => true,
            ConsoleTarget::Split => matches!(level, LogLevel::Warn | LogLevel::Error),
        };
        let line = Self::format_line(args);
        // Broken pipes must not take the application down
        let _ = if to_stderr {
            writeln!(std::io::stderr().lock(), "{}", line)
        } else {
            writeln!(std::io::stdout().lock(), "{}", line)
        };
    }
}

/// Console decorator that mirrors every call to the monitoring surface
pub struct ConsoleInterceptor<C: Console> {
    inner: C,
    sink: SinkHandle,
    origin: Origin,
    clock: Arc<MonotonicClock>,
}

impl<C: Console> ConsoleInterceptor<C> {
    /// Wrap `inner`. Every captured entry is stamped with `origin`.
    ///
    /// Precondition: `inner` is not itself an interceptor on the same sink.
    pub fn install(inner: C, sink: SinkHandle, origin: Origin) -> Self {
        Self::with_clock(inner, sink, origin, Arc::new(MonotonicClock::new()))
    }

    /// Wrap `inner`, sharing a clock with other interceptors of the same context
    pub fn with_clock(inner: C, sink: SinkHandle, origin: Origin, clock: Arc<MonotonicClock>) -> Self {
        Self {
            inner,
            sink,
            origin,
            clock,
        }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn debug(&self, args: &[&dyn ConsoleArg]) {
        self.write(LogLevel::Debug, args);
    }

    pub fn log(&self, args: &[&dyn ConsoleArg]) {
        self.write(LogLevel::Log, args);
    }

    pub fn info(&self, args: &[&dyn ConsoleArg]) {
        self.write(LogLevel::Info, args);
    }

    pub fn warn(&self, args: &[&dyn ConsoleArg]) {
        self.write(LogLevel::Warn, args);
    }

    pub fn error(&self, args: &[&dyn ConsoleArg]) {
        self.write(LogLevel::Error, args);
    }
}

impl<C: Console> Console for ConsoleInterceptor<C> {
    fn write(&self, level: LogLevel, args: &[&dyn ConsoleArg]) {
        self.inner.write(level, args);

        if self.sink.is_closed() {
            return;
        }

        let payload: Vec<Value> = args.iter().map(|arg| arg.snapshot()).collect();
        let origin = self.origin;
        self.clock.stamp_and_deliver(&self.sink, |timestamp| LogEntry {
            level,
            payload,
            origin,
            timestamp,
        });
    }
}
