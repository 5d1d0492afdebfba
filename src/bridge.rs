//! Bridge assembly
//!
//! [`DevBridge`] wires one transport, one monitoring surface and the
//! privileged registry together from a [`BridgeConfiguration`], and hands
//! out interceptors bound to that surface. The host context shares a single
//! [`MonotonicClock`] across its console, logger and IPC capture; each
//! renderer context gets its own.

use std::sync::Arc;

use crate::capture::{CapturingLogger, Console, ConsoleInterceptor, IpcInterceptor};
use crate::config::BridgeConfiguration;
use crate::error::Result;
use crate::gate::{AllowList, Gate};
use crate::models::{Event, Origin, Topic};
use crate::perf::PerformanceSampler;
use crate::registry::{RendererPort, Router};
use crate::surface::{MonitorSurface, Subscription};
use crate::transport::{self, MonotonicClock, SinkHandle};

pub struct DevBridge {
    config: BridgeConfiguration,
    surface: MonitorSurface,
    router: Arc<Router>,
    registry: IpcInterceptor<Arc<Router>>,
    allow: AllowList,
    host_clock: Arc<MonotonicClock>,
}

impl DevBridge {
    /// Start the monitoring surface and install IPC capture on a fresh router
    pub fn new(config: BridgeConfiguration) -> Result<Self> {
        config.validate()?;
        let allow = config.allow_list()?;

        let (handle, receiver) = transport::channel(config.bridge.channel_capacity);
        let surface = MonitorSurface::start(receiver, handle.clone(), config.history_limits())?;

        let host_clock = Arc::new(MonotonicClock::new());
        let router = Arc::new(Router::new());
        let registry = IpcInterceptor::with_clock(router.clone(), handle, host_clock.clone());

        log::debug!(
            target: "devbridge::bridge",
            "bridge started (capacity {}, {} send / {} request allow-list entries)",
            config.bridge.channel_capacity,
            config.allow_list.send.len(),
            config.allow_list.request.len()
        );

        Ok(Self {
            config,
            surface,
            router,
            registry,
            allow,
            host_clock,
        })
    }

    pub fn config(&self) -> &BridgeConfiguration {
        &self.config
    }

    pub fn surface(&self) -> &MonitorSurface {
        &self.surface
    }

    pub fn handle(&self) -> SinkHandle {
        self.surface.handle()
    }

    /// Registry the host registers listeners and handlers on; every
    /// registration is captured
    pub fn registry(&self) -> &IpcInterceptor<Arc<Router>> {
        &self.registry
    }

    /// Uninstrumented dispatch side of the registry
    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    pub fn subscribe<F>(&self, topic: Topic, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.surface.subscribe(topic, callback)
    }

    /// Capture a host console
    pub fn host_console<C: Console>(&self, inner: C) -> ConsoleInterceptor<C> {
        ConsoleInterceptor::with_clock(inner, self.handle(), Origin::Host, self.host_clock.clone())
    }

    /// Capture the console of renderer `sender_id`
    pub fn renderer_console<C: Console>(&self, inner: C, sender_id: u32) -> ConsoleInterceptor<C> {
        ConsoleInterceptor::install(inner, self.handle(), Origin::Renderer(sender_id))
    }

    /// Capture `log` records of the host on top of `inner`
    pub fn host_logger<L: log::Log>(&self, inner: L) -> CapturingLogger<L> {
        CapturingLogger::new(inner, self.handle(), Origin::Host, self.host_clock.clone())
    }

    /// Install env_logger wrapped in capture as the process logger
    pub fn install_env_logger(&self, default_filter: &str) -> Result<()> {
        let (logger, filter) =
            CapturingLogger::from_env(default_filter, self.handle(), Origin::Host, self.host_clock.clone());
        logger.install(filter)
    }

    /// The gated messaging surface for renderer `sender_id`
    pub fn renderer_gate(&self, sender_id: u32) -> Gate<RendererPort> {
        Gate::new(RendererPort::new(self.router.clone(), sender_id), self.allow.clone())
    }

    pub fn sampler(&self) -> Result<PerformanceSampler> {
        PerformanceSampler::new(self.handle(), self.config.bridge.renderer_pid, self.host_clock.clone())
    }

    /// Sample on the current tokio runtime at the configured cadence
    pub fn spawn_sampler(&self) -> Result<tokio::task::JoinHandle<()>> {
        Ok(self.sampler()?.spawn(self.config.sample_interval()))
    }

    /// Stop capture delivery and the surface dispatcher
    pub fn close(&mut self) {
        self.surface.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllowListSettings;
    use crate::error::BridgeError;
    use crate::models::{IpcMessage, LogLevel, MessageKind};
    use crate::registry::{handler, listener, MessageRegistry};
    use crate::capture::{ConsoleTarget, StdConsole};
    use serde_json::{json, Value};
    use std::time::{Duration, Instant};

    fn bridge() -> DevBridge {
        let mut config = BridgeConfiguration::default();
        config.allow_list = AllowListSettings {
            send: vec!["my-async-channel".to_string()],
            request: vec!["sum".to_string()],
        };
        DevBridge::new(config).unwrap()
    }

    fn wait_for(bridge: &DevBridge, topic: Topic, count: usize) -> Vec<Event> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let events = bridge.surface().recent(topic);
            if events.len() >= count || Instant::now() > deadline {
                return events;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn ipc(events: &[Event]) -> Vec<&IpcMessage> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Ipc(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_gated_request_is_captured_end_to_end() {
        let bridge = bridge();
        bridge
            .registry()
            .handle(
                "sum",
                handler(|_, args| async move {
                    Ok(json!(args.iter().filter_map(Value::as_i64).sum::<i64>()))
                }),
            )
            .unwrap();

        let gate = bridge.renderer_gate(3);
        assert_eq!(gate.request("sum", vec![json!(2), json!(3)]).await.unwrap(), json!(5));

        let events = wait_for(&bridge, Topic::IpcMessage, 2);
        let messages = ipc(&events);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, MessageKind::Request);
        assert_eq!(messages[0].sender_id, 3);
        assert_eq!(messages[1].kind, MessageKind::ResponseOk);
        assert_eq!(messages[1].payload, vec![json!(5)]);
    }

    #[test]
    fn test_blocked_send_produces_no_ipc_event() {
        let bridge = bridge();
        bridge.registry().on("fs-delete", listener(|_, _| {}));
        bridge.registry().on("my-async-channel", listener(|_, _| {}));

        let gate = bridge.renderer_gate(3);
        assert!(matches!(
            gate.send("fs-delete", vec![]),
            Err(BridgeError::ChannelNotAllowed { .. })
        ));
        gate.send("my-async-channel", vec![json!("hello")]).unwrap();

        let events = wait_for(&bridge, Topic::IpcMessage, 1);
        let messages = ipc(&events);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].channel, "my-async-channel");
        assert_eq!(messages[0].kind, MessageKind::FireAndForget);
    }

    #[test]
    fn test_consoles_carry_their_origin() {
        let bridge = bridge();
        let host = bridge.host_console(StdConsole::new(ConsoleTarget::Discard));
        let renderer = bridge.renderer_console(StdConsole::new(ConsoleTarget::Discard), 5);

        host.warn(&[&"disk low", &json!({"pct": 5})]);
        renderer.log(&[&"hello from renderer"]);

        let events = wait_for(&bridge, Topic::Log, 2);
        let origins: Vec<(Origin, LogLevel)> = events
            .iter()
            .filter_map(|e| match e {
                Event::Log(entry) => Some((entry.origin, entry.level)),
                _ => None,
            })
            .collect();
        assert_eq!(
            origins,
            vec![(Origin::Host, LogLevel::Warn), (Origin::Renderer(5), LogLevel::Log)]
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = BridgeConfiguration::default();
        config.bridge.channel_capacity = 0;
        assert!(DevBridge::new(config).is_err());
    }

    #[test]
    fn test_close_stops_capture() {
        let mut bridge = bridge();
        let console = bridge.host_console(StdConsole::new(ConsoleTarget::Discard));
        bridge.close();
        console.log(&[&"after close"]);
        assert!(bridge.surface().recent(Topic::Log).is_empty());
        assert!(bridge.handle().is_closed());
    }
}
