//! IPC interception
//!
//! [`IpcInterceptor`] sits in front of a [`MessageRegistry`]. Listeners and
//! handlers registered through it are wrapped so that every incoming
//! message is mirrored to the monitoring surface:
//!
//! - fire-and-forget: one `fire-and-forget` event, emitted before the
//!   listener runs
//! - request/response: a `request` event before the handler runs, then
//!   exactly one `response-ok` or `response-error` once it settles
//!
//! Handler results and failures are returned to the caller untouched. A
//! handler that never settles produces no response event, and neither does
//! a caller that drops the future before it settles.

use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::guard;
use crate::models::{IpcMessage, MessageKind};
use crate::registry::{Handler, IpcEvent, Listener, MessageRegistry};
use crate::transport::{MonotonicClock, SinkHandle};

/// Shared capture state, cloned into every wrapped registration
#[derive(Clone)]
struct Recorder {
    sink: SinkHandle,
    clock: Arc<MonotonicClock>,
}

impl Recorder {
    fn record(
        &self,
        event: &IpcEvent,
        kind: MessageKind,
        payload: &[Value],
        invocation_id: Option<Uuid>,
    ) {
        if self.sink.is_closed() {
            return;
        }

        let payload = guard::snapshot_all(payload);
        self.clock.stamp_and_deliver(&self.sink, |timestamp| IpcMessage {
            channel: event.channel.clone(),
            direction: kind.direction(),
            kind,
            sender_id: event.sender_id,
            payload,
            timestamp,
            invocation_id,
        });
    }
}

/// Registry decorator that records IPC traffic
pub struct IpcInterceptor<R: MessageRegistry> {
    inner: R,
    recorder: Recorder,
}

impl<R: MessageRegistry> IpcInterceptor<R> {
    /// Wrap `inner`; registrations made through the returned value are recorded.
    ///
    /// Precondition: `inner` is not itself an interceptor on the same sink.
    pub fn install(inner: R, sink: SinkHandle) -> Self {
        Self::with_clock(inner, sink, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(inner: R, sink: SinkHandle, clock: Arc<MonotonicClock>) -> Self {
        Self {
            inner,
            recorder: Recorder { sink, clock },
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    fn wrap_listener(&self, listener: Listener) -> Listener {
        let recorder = self.recorder.clone();
        Arc::new(move |event: &IpcEvent, args: &[Value]| {
            recorder.record(event, MessageKind::FireAndForget, args, None);
            listener(event, args)
        })
    }

    fn wrap_handler(&self, handler: Handler) -> Handler {
        let recorder = self.recorder.clone();
        Arc::new(move |event: IpcEvent, args: Vec<Value>| -> BoxFuture<'static, anyhow::Result<Value>> {
            let recorder = recorder.clone();
            let handler = handler.clone();
            Box::pin(async move {
                let invocation_id = Some(Uuid::new_v4());
                recorder.record(&event, MessageKind::Request, &args, invocation_id);

                let outcome = handler(event.clone(), args).await;
                match &outcome {
                    Ok(value) => recorder.record(
                        &event,
                        MessageKind::ResponseOk,
                        std::slice::from_ref(value),
                        invocation_id,
                    ),
                    Err(err) => recorder.record(
                        &event,
                        MessageKind::ResponseError,
                        &[Value::String(err.to_string())],
                        invocation_id,
                    ),
                }
                outcome
            })
        })
    }
}

impl<R: MessageRegistry> MessageRegistry for IpcInterceptor<R> {
    fn on(&self, channel: &str, listener: Listener) {
        self.inner.on(channel, self.wrap_listener(listener));
    }

    fn handle(&self, channel: &str, handler: Handler) -> Result<()> {
        self.inner.handle(channel, self.wrap_handler(handler))
    }
}
