//! Interceptors that turn calls into monitoring events
//!
//! Each interceptor is a decorator over an injectable entry point. It runs
//! the original behavior first, builds an event from the call, and hands it
//! to the transport:
//! - `console`: wraps a [`console::Console`] and produces `LogEntry` events
//! - `logger`: wraps a `log::Log` backend and produces `LogEntry` events
//! - `ipc`: wraps a [`crate::registry::MessageRegistry`] and produces
//!   `IpcMessage` events
//!
//! Wrapping an entry point that is already wrapped captures every call
//! twice. Callers install each interceptor once.

pub mod console;
pub mod ipc;
pub mod logger;

pub use console::{Console, ConsoleArg, ConsoleInterceptor, ConsoleTarget, StdConsole};
pub use ipc::IpcInterceptor;
pub use logger::CapturingLogger;
