//! Privileged message registry
//!
//! The registry is where the host registers fire-and-forget listeners and
//! request/response handlers by channel name. It is expressed as the
//! [`MessageRegistry`] trait so instrumentation can be layered around it
//! (see `capture::ipc`) instead of patching a shared singleton.
//!
//! [`Router`] is the in-process implementation. It also carries the
//! dispatch side used by untrusted contexts through a [`HostPort`].

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BridgeError, Result};

/// Context handed to listeners and handlers for every incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcEvent {
    /// Id of the untrusted context that sent the message
    pub sender_id: u32,
    pub channel: String,
}

/// Fire-and-forget listener
pub type Listener = Arc<dyn Fn(&IpcEvent, &[Value]) + Send + Sync>;

/// Asynchronous request handler; `Err` is the handler's own failure
pub type Handler =
    Arc<dyn Fn(IpcEvent, Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Registration entry points of the privileged registry
pub trait MessageRegistry: Send + Sync {
    /// Add a listener for fire-and-forget messages on `channel`
    fn on(&self, channel: &str, listener: Listener);

    /// Register the single request handler for `channel`
    fn handle(&self, channel: &str, handler: Handler) -> Result<()>;
}

impl<R: MessageRegistry + ?Sized> MessageRegistry for Arc<R> {
    fn on(&self, channel: &str, listener: Listener) {
        (**self).on(channel, listener)
    }

    fn handle(&self, channel: &str, handler: Handler) -> Result<()> {
        (**self).handle(channel, handler)
    }
}

/// Wrap a closure as a [`Listener`]
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&IpcEvent, &[Value]) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap an async closure as a [`Handler`]
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(IpcEvent, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |event: IpcEvent, args: Vec<Value>| -> BoxFuture<'static, anyhow::Result<Value>> {
        Box::pin(f(event, args))
    })
}

/// In-process registry and dispatcher
#[derive(Default)]
pub struct Router {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    handlers: RwLock<HashMap<String, Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a fire-and-forget message to every listener on `channel`,
    /// in registration order. Returns whether any listener ran.
    pub fn emit(&self, sender_id: u32, channel: &str, args: Vec<Value>) -> bool {
        // Clone out so listeners may register further listeners
        let listeners = match self.listeners.read().get(channel) {
            Some(listeners) if !listeners.is_empty() => listeners.clone(),
            _ => {
                log::debug!(target: "devbridge::registry", "no listener on '{}', message ignored", channel);
                return false;
            }
        };

        let event = IpcEvent {
            sender_id,
            channel: channel.to_string(),
        };
        for listener in &listeners {
            listener(&event, &args);
        }
        true
    }

    /// Run the handler for `channel` and wait for it to settle
    pub async fn invoke(&self, sender_id: u32, channel: &str, args: Vec<Value>) -> Result<Value> {
        let handler = self
            .handlers
            .read()
            .get(channel)
            .cloned()
            .ok_or_else(|| BridgeError::NoHandler(channel.to_string()))?;

        let event = IpcEvent {
            sender_id,
            channel: channel.to_string(),
        };
        handler(event, args).await.map_err(BridgeError::Handler)
    }

    /// Unregister the handler for `channel`, if any
    pub fn remove_handler(&self, channel: &str) -> bool {
        self.handlers.write().remove(channel).is_some()
    }

    /// Unregister every listener on `channel`
    pub fn remove_all_listeners(&self, channel: &str) -> usize {
        self.listeners
            .write()
            .remove(channel)
            .map(|removed| removed.len())
            .unwrap_or(0)
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.listeners.read().get(channel).map(Vec::len).unwrap_or(0)
    }

    pub fn has_handler(&self, channel: &str) -> bool {
        self.handlers.read().contains_key(channel)
    }
}

impl MessageRegistry for Router {
    fn on(&self, channel: &str, listener: Listener) {
        self.listeners
            .write()
            .entry(channel.to_string())
            .or_default()
            .push(listener);
    }

    fn handle(&self, channel: &str, handler: Handler) -> Result<()> {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(channel) {
            return Err(BridgeError::DuplicateHandler(channel.to_string()));
        }
        handlers.insert(channel.to_string(), handler);
        Ok(())
    }
}

/// Outbound path from an untrusted context into the privileged registry
pub trait HostPort: Send + Sync {
    fn send(&self, channel: &str, args: Vec<Value>);

    fn invoke<'a>(&'a self, channel: &'a str, args: Vec<Value>) -> BoxFuture<'a, Result<Value>>;
}

/// [`HostPort`] for one renderer, identified by its sender id
#[derive(Clone)]
pub struct RendererPort {
    router: Arc<Router>,
    sender_id: u32,
}

impl RendererPort {
    pub fn new(router: Arc<Router>, sender_id: u32) -> Self {
        Self { router, sender_id }
    }

    pub fn sender_id(&self) -> u32 {
        self.sender_id
    }
}

impl HostPort for RendererPort {
    fn send(&self, channel: &str, args: Vec<Value>) {
        self.router.emit(self.sender_id, channel, args);
    }

    fn invoke<'a>(&'a self, channel: &'a str, args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
        Box::pin(self.router.invoke(self.sender_id, channel, args))
    }
}
