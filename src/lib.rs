//! devbridge - cross-context observability bridge
//!
//! Captures console output, IPC traffic and performance samples from a
//! privileged host context and its untrusted renderer contexts, and streams
//! them over one bounded transport to a single monitoring surface.

pub mod bridge;
pub mod capture;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod gate;
pub mod guard;
pub mod models;
pub mod output;
pub mod perf;
pub mod registry;
pub mod surface;
pub mod transport;

pub use bridge::DevBridge;
pub use error::{BridgeError, Result};
