//! Periodic performance sampling
//!
//! Reads CPU and memory of the host process and, when known, one renderer
//! process, and feeds them to the monitoring surface as
//! `PerformanceSample` events on a fixed cadence.

use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::constants::BYTES_PER_MB;
use crate::error::{BridgeError, Result};
use crate::models::{PerformanceSample, ProcessUsage};
use crate::transport::{Delivery, MonotonicClock, SinkHandle};

/// Convert raw sysinfo readings (percent, bytes) into a `ProcessUsage`
pub fn usage_from(cpu_percent: f32, memory_bytes: u64) -> ProcessUsage {
    ProcessUsage::new(f64::from(cpu_percent), memory_bytes as f64 / BYTES_PER_MB)
}

pub struct PerformanceSampler {
    system: System,
    main_pid: Pid,
    renderer_pid: Option<Pid>,
    sink: SinkHandle,
    clock: Arc<MonotonicClock>,
}

impl PerformanceSampler {
    /// Sample the current process plus an optional renderer pid
    pub fn new(sink: SinkHandle, renderer_pid: Option<u32>, clock: Arc<MonotonicClock>) -> Result<Self> {
        let main_pid = sysinfo::get_current_pid().map_err(|e| BridgeError::Sampler(e.to_string()))?;
        Ok(Self {
            system: System::new(),
            main_pid,
            renderer_pid: renderer_pid.map(Pid::from_u32),
            sink,
            clock,
        })
    }

    pub fn renderer_pid(&self) -> Option<u32> {
        self.renderer_pid.map(|pid| pid.as_u32())
    }

    /// Take one reading. CPU figures are relative to the previous call, so
    /// the first reading of a fresh sampler reports zero CPU.
    pub fn sample(&mut self) -> PerformanceSample {
        let (main, renderer) = self.read();
        PerformanceSample {
            main,
            renderer,
            timestamp: self.clock.now(),
        }
    }

    /// Take one reading and hand it to the sink
    pub fn sample_and_deliver(&mut self) -> Delivery {
        let (main, renderer) = self.read();
        self.clock.stamp_and_deliver(&self.sink, |timestamp| PerformanceSample {
            main,
            renderer,
            timestamp,
        })
    }

    fn read(&mut self) -> (ProcessUsage, ProcessUsage) {
        let mut pids = vec![self.main_pid];
        pids.extend(self.renderer_pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&pids),
            true,
            ProcessRefreshKind::new().with_cpu().with_memory(),
        );
        (self.usage(Some(self.main_pid)), self.usage(self.renderer_pid))
    }

    // A process we cannot see reads as zero rather than failing the sample
    fn usage(&self, pid: Option<Pid>) -> ProcessUsage {
        pid.and_then(|pid| self.system.process(pid))
            .map(|process| usage_from(process.cpu_usage(), process.memory()))
            .unwrap_or_default()
    }

    /// Sample every `interval` until the sink closes
    pub async fn run(mut self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.sink.is_closed() {
                log::debug!(target: "devbridge::perf", "sink closed, sampler stopping");
                break;
            }
            self.sample_and_deliver();
        }
    }

    /// Run on the current tokio runtime
    pub fn spawn(self, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(interval))
    }
}
