//! Global constants for devbridge
//!
//! Centralized location for topic names, limits and defaults

/// Topic carrying `LogEntry` events
pub const TOPIC_LOG: &str = "log";

/// Topic carrying `IpcMessage` events
pub const TOPIC_IPC_MESSAGE: &str = "ipc-message";

/// Topic carrying `PerformanceSample` events
pub const TOPIC_PERFORMANCE_SAMPLE: &str = "performance-sample";

/// Substituted for any captured value that cannot be structurally cloned
pub const UNSERIALIZABLE_SENTINEL: &str = "[Unserializable Object]";

/// Deepest array/object nesting the serialization guard will write.
/// Must stay below serde_json's own parse recursion limit (128).
pub const MAX_SNAPSHOT_DEPTH: usize = 64;

/// Log target prefix used by the bridge itself; records under it are never captured
pub const BRIDGE_LOG_TARGET: &str = "devbridge";

/// Default transport buffer size (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default performance sampling cadence in seconds
pub const DEFAULT_SAMPLE_INTERVAL_SECS: f64 = 2.0;

/// Note: bounds are enforced by `BridgeConfiguration::validate`
pub const SAMPLE_INTERVAL_MIN: f64 = 0.1;
pub const SAMPLE_INTERVAL_MAX: f64 = 300.0;

/// Default retained history per topic on the monitoring surface
pub const DEFAULT_LOG_HISTORY: usize = 1000;
pub const DEFAULT_IPC_HISTORY: usize = 1000;
pub const DEFAULT_PERFORMANCE_HISTORY: usize = 30;

/// Config file name under the user config directory
pub const CONFIG_DIR_NAME: &str = "devbridge";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Bytes per megabyte for memory figures in performance samples
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
