//! Capture for the `log` facade
//!
//! Wraps whichever `log::Log` backend the process uses (env_logger by
//! default) so records still reach it, and mirrors each record to the
//! monitoring surface as a `LogEntry` with the rendered message as its
//! single payload element.

use serde_json::Value;
use std::sync::Arc;

use crate::constants::BRIDGE_LOG_TARGET;
use crate::error::{BridgeError, Result};
use crate::models::{LogEntry, LogLevel, Origin};
use crate::transport::{MonotonicClock, SinkHandle};

/// `log::Log` decorator feeding the monitoring surface
pub struct CapturingLogger<L: log::Log> {
    inner: L,
    sink: SinkHandle,
    origin: Origin,
    clock: Arc<MonotonicClock>,
}

impl<L: log::Log> CapturingLogger<L> {
    pub fn new(inner: L, sink: SinkHandle, origin: Origin, clock: Arc<MonotonicClock>) -> Self {
        Self {
            inner,
            sink,
            origin,
            clock,
        }
    }

    fn is_own_record(record: &log::Record<'_>) -> bool {
        record.target().starts_with(BRIDGE_LOG_TARGET)
    }
}

impl<L: log::Log + 'static> CapturingLogger<L> {
    /// Make this the process-wide logger. Fails if one is already set.
    pub fn install(self, max_level: log::LevelFilter) -> Result<()> {
        log::set_boxed_logger(Box::new(self))
            .map_err(|e| BridgeError::LoggerInstall(e.to_string()))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl CapturingLogger<env_logger::Logger> {
    /// Capture on top of env_logger configured from `RUST_LOG`, falling
    /// back to `default_filter` when it is unset
    pub fn from_env(
        default_filter: &str,
        sink: SinkHandle,
        origin: Origin,
        clock: Arc<MonotonicClock>,
    ) -> (Self, log::LevelFilter) {
        let inner = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
            .format_timestamp_millis()
            .build();
        let filter = inner.filter();
        (Self::new(inner, sink, origin, clock), filter)
    }
}

/// Map a `log` level onto the console severities
pub fn map_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug | log::Level::Trace => LogLevel::Debug,
    }
}

impl<L: log::Log> log::Log for CapturingLogger<L> {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record<'_>) {
        self.inner.log(record);

        if Self::is_own_record(record) || !self.inner.enabled(record.metadata()) {
            return;
        }
        if self.sink.is_closed() {
            return;
        }

        let level = map_level(record.level());
        let payload = vec![Value::String(record.args().to_string())];
        let origin = self.origin;
        self.clock.stamp_and_deliver(&self.sink, |timestamp| LogEntry {
            level,
            payload,
            origin,
            timestamp,
        });
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Event;
    use crate::transport;
    use log::Log;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        messages: Mutex<Vec<String>>,
    }

    impl log::Log for RecordingBackend {
        fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
            metadata.level() <= log::Level::Debug
        }

        fn log(&self, record: &log::Record<'_>) {
            if self.enabled(record.metadata()) {
                self.messages.lock().push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    fn emit(logger: &impl log::Log, level: log::Level, target: &str, message: &str) {
        logger.log(
            &log::Record::builder()
                .level(level)
                .target(target)
                .args(format_args!("{}", message))
                .build(),
        );
    }

    fn logger() -> (CapturingLogger<RecordingBackend>, crossbeam_channel::Receiver<Event>) {
        let (sink, rx) = transport::channel(16);
        let logger = CapturingLogger::new(
            RecordingBackend::default(),
            sink,
            Origin::Host,
            Arc::new(MonotonicClock::new()),
        );
        (logger, rx)
    }

    #[test]
    fn test_record_is_forwarded_and_captured() {
        let (logger, rx) = logger();
        emit(&logger, log::Level::Warn, "app::storage", "disk low");

        assert_eq!(logger.inner.messages.lock().as_slice(), &["disk low".to_string()]);
        match rx.try_recv().unwrap() {
            Event::Log(entry) => {
                assert_eq!(entry.level, LogLevel::Warn);
                assert_eq!(entry.payload, vec![Value::String("disk low".to_string())]);
                assert_eq!(entry.origin, Origin::Host);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_bridge_records_are_not_captured() {
        let (logger, rx) = logger();
        emit(&logger, log::Level::Info, "devbridge::transport", "internal");

        assert_eq!(logger.inner.messages.lock().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_records_filtered_by_backend_are_not_captured() {
        let (logger, rx) = logger();
        emit(&logger, log::Level::Trace, "app", "too chatty");

        assert!(logger.inner.messages.lock().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(map_level(log::Level::Error), LogLevel::Error);
        assert_eq!(map_level(log::Level::Warn), LogLevel::Warn);
        assert_eq!(map_level(log::Level::Info), LogLevel::Info);
        assert_eq!(map_level(log::Level::Debug), LogLevel::Debug);
        assert_eq!(map_level(log::Level::Trace), LogLevel::Debug);
    }
}
