#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use devbridge::capture::{Console, ConsoleInterceptor, ConsoleTarget, StdConsole};
use devbridge::cli::{self, RunConfig};
use devbridge::config::BridgeConfiguration;
use devbridge::gate::Gate;
use devbridge::models::{Event, Topic};
use devbridge::output::{self, SessionSummary};
use devbridge::registry::{handler, listener, MessageRegistry, RendererPort};
use devbridge::{BridgeError, DevBridge};

/// Sender id of the simulated renderer context
const RENDERER_ID: u32 = 1;

/// Pause between renderer activity bursts
const TICK: Duration = Duration::from_millis(250);

/// Longest wait for queued events to reach the surface at shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Allow-list used when no configuration file is found
fn demo_configuration() -> BridgeConfiguration {
    let mut config = BridgeConfiguration::default();
    config.allow_list.send = vec!["my-async-channel".to_string()];
    config.allow_list.request = vec!["my-invoke-channel".to_string(), "sum".to_string()];
    config
}

fn load_configuration(args: &RunConfig) -> Result<BridgeConfiguration> {
    if let Some(path) = &args.config_path {
        return BridgeConfiguration::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }
    match BridgeConfiguration::default_config_path() {
        Some(path) if path.exists() => BridgeConfiguration::load_from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        _ => Ok(demo_configuration()),
    }
}

/// Host-side listeners and handlers
fn register_host(bridge: &DevBridge) -> Result<()> {
    let registry = bridge.registry();

    registry.on(
        "my-async-channel",
        listener(|event, args| {
            log::info!(target: "host", "renderer {} says {}", event.sender_id, Value::Array(args.to_vec()));
        }),
    );

    registry.handle(
        "my-invoke-channel",
        handler(|_event, args| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            match args.first().and_then(Value::as_str) {
                Some("ping") => Ok(json!("pong")),
                Some(other) => Ok(json!(format!("echo: {}", other))),
                None => Err(anyhow::anyhow!("expected a string argument")),
            }
        }),
    )?;

    registry.handle(
        "sum",
        handler(|_event, args| async move {
            let a = args.first().and_then(Value::as_i64).unwrap_or(0);
            let b = args.get(1).and_then(Value::as_i64).unwrap_or(0);
            a.checked_add(b)
                .map(|total| json!(total))
                .ok_or_else(|| anyhow::anyhow!("overflow"))
        }),
    )?;

    Ok(())
}

/// One burst of renderer activity; returns how many messages the gate blocked
async fn renderer_step<C: Console>(
    gate: &Gate<RendererPort>,
    console: &ConsoleInterceptor<C>,
    tick: i64,
) -> u64 {
    let mut blocked = 0;

    console.log(&[&"tick", &tick]);

    if let Err(BridgeError::ChannelNotAllowed { .. }) =
        gate.send("my-async-channel", vec![json!(format!("hello host #{}", tick))])
    {
        blocked += 1;
    }

    if tick == 0 {
        match gate.request("my-invoke-channel", vec![json!("ping")]).await {
            Ok(reply) => console.info(&[&"invoke replied", &reply]),
            Err(err) => console.error(&[&"invoke failed:", &err.to_string()]),
        }
    }

    // Every fourth tick overflows on purpose
    let args = if tick % 4 == 3 {
        vec![json!(i64::MAX), json!(1)]
    } else {
        vec![json!(tick), json!(tick * 2)]
    };
    match gate.request("sum", args).await {
        Ok(total) => console.info(&[&"sum =", &total]),
        Err(BridgeError::ChannelNotAllowed { .. }) => blocked += 1,
        Err(err) => console.error(&[&"sum failed:", &err.to_string()]),
    }

    if tick % 5 == 4 {
        if let Err(BridgeError::ChannelNotAllowed { .. }) = gate.send("fs-delete", vec![json!("/tmp/cache")]) {
            blocked += 1;
        }
    }

    blocked
}

fn subscribe_printer(
    bridge: &DevBridge,
    json_output: bool,
    summary: Arc<Mutex<SessionSummary>>,
) -> Vec<devbridge::surface::Subscription> {
    Topic::ALL
        .iter()
        .map(|&topic| {
            let summary = summary.clone();
            bridge.subscribe(topic, move |event: &Event| {
                summary.lock().count(event);
                let line = if json_output {
                    match output::format_event_json(event) {
                        Ok(line) => line,
                        Err(err) => {
                            log::error!(target: "devbridge::output", "failed to encode event: {}", err);
                            return;
                        }
                    }
                } else {
                    output::format_event_human(event)
                };
                let _ = writeln!(std::io::stdout().lock(), "{}", line);
            })
        })
        .collect()
}

async fn wait_for_drain(bridge: &DevBridge) {
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while bridge.handle().queued() > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse_args()?;
    let config = load_configuration(&args)?;

    let mut bridge = DevBridge::new(config).context("Failed to start bridge")?;
    bridge
        .install_env_logger(if args.quiet_mode { "error" } else { "info" })
        .context("Failed to install logger")?;

    // Set up interrupt handling
    let interrupted = Arc::new(AtomicBool::new(false));
    let _ = signal_hook::flag::register(signal_hook::consts::SIGINT, interrupted.clone());
    let _ = signal_hook::flag::register(signal_hook::consts::SIGTERM, interrupted.clone());

    let summary = Arc::new(Mutex::new(SessionSummary::default()));
    let subscriptions = subscribe_printer(&bridge, args.json_output, summary.clone());

    register_host(&bridge)?;
    let sampler = bridge.spawn_sampler().context("Failed to start performance sampler")?;

    let console_target = if args.quiet_mode {
        ConsoleTarget::Discard
    } else if args.json_output {
        ConsoleTarget::Stderr
    } else {
        ConsoleTarget::Split
    };
    let host_console = bridge.host_console(StdConsole::new(console_target));
    let renderer_console = bridge.renderer_console(StdConsole::new(console_target), RENDERER_ID);
    let gate = bridge.renderer_gate(RENDERER_ID);

    host_console.info(&[&"session started", &json!({ "duration_ms": args.duration.as_millis() as u64 })]);

    let start_time = Instant::now();
    let mut blocked = 0;
    let mut tick = 0;
    while start_time.elapsed() < args.duration {
        if interrupted.load(Ordering::Relaxed) {
            break;
        }
        blocked += renderer_step(&gate, &renderer_console, tick).await;
        tick += 1;
        tokio::time::sleep(TICK).await;
    }

    host_console.info(&[&"session finished", &json!({ "ticks": tick })]);

    wait_for_drain(&bridge).await;
    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    let dropped = bridge.surface().dropped();
    bridge.close();
    sampler.abort();

    if !args.json_output {
        let mut summary = summary.lock().clone();
        summary.blocked_messages = blocked;
        summary.dropped_events = dropped;
        summary.duration_ms = start_time.elapsed().as_millis() as u64;
        summary.interrupted = if interrupted.load(Ordering::Relaxed) { Some(true) } else { None };
        println!();
        println!("{}", output::format_summary(&summary));
    }

    Ok(())
}
