//! Transport channel between producing contexts and the monitoring surface
//!
//! One-way and unacknowledged. Producers hold a [`SinkHandle`], the
//! surface owns the matching [`Receiver`]. The buffer is bounded and
//! overflows by discarding the oldest queued event, so a stalled surface
//! costs at most `capacity` events of memory and never blocks a producer.

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::models::Event;

/// Outcome of a single delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the surface
    Queued,
    /// Queued after evicting the oldest buffered event
    QueuedEvictedOldest,
    /// The surface is gone; the event was dropped
    Closed,
}

struct Shared {
    tx: Sender<Event>,
    // Lets a producer pop from the front when the buffer is full
    evict: Receiver<Event>,
    closed: AtomicBool,
    dropped: AtomicU64,
}

/// Producer-side handle to the monitoring surface.
///
/// Cheap to clone. Every clone observes the same closed flag, which is
/// checked before each delivery.
#[derive(Clone)]
pub struct SinkHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHandle")
            .field("closed", &self.is_closed())
            .field("queued", &self.shared.tx.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Create a bounded transport holding at most `capacity` undelivered events
pub fn channel(capacity: usize) -> (SinkHandle, Receiver<Event>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let handle = SinkHandle {
        shared: Arc::new(Shared {
            tx,
            evict: rx.clone(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }),
    };
    (handle, rx)
}

impl SinkHandle {
    /// Whether the surface has been torn down
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Mark the surface as gone. Later deliveries are silently dropped.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    /// Events discarded by overflow since the channel was created
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Events currently buffered and not yet dispatched
    pub fn queued(&self) -> usize {
        self.shared.tx.len()
    }

    /// Best-effort, non-blocking delivery
    pub fn deliver(&self, event: impl Into<Event>) -> Delivery {
        if self.is_closed() {
            log::trace!(target: "devbridge::transport", "surface closed, event dropped");
            return Delivery::Closed;
        }

        match self.shared.tx.try_send(event.into()) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Disconnected(_)) => Delivery::Closed,
            Err(TrySendError::Full(event)) => self.deliver_evicting(event),
        }
    }

    fn deliver_evicting(&self, mut event: Event) -> Delivery {
        // Another producer may refill the slot we free; keep evicting until we get in
        loop {
            if self.shared.evict.try_recv().is_ok() {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
            match self.shared.tx.try_send(event) {
                Ok(()) => return Delivery::QueuedEvictedOldest,
                Err(TrySendError::Disconnected(_)) => return Delivery::Closed,
                Err(TrySendError::Full(returned)) => event = returned,
            }
        }
    }
}

/// Per-context timestamp source that never goes backwards
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        Self::advance(&mut self.last.lock())
    }

    /// Stamp an event and enqueue it while holding the clock.
    ///
    /// Producers sharing one clock may run on different threads; events
    /// stamped through here reach the sink in timestamp order.
    pub fn stamp_and_deliver<E, F>(&self, sink: &SinkHandle, build: F) -> Delivery
    where
        E: Into<Event>,
        F: FnOnce(DateTime<Utc>) -> E,
    {
        let mut last = self.last.lock();
        let stamped = Self::advance(&mut last);
        sink.deliver(build(stamped))
    }

    fn advance(last: &mut Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = Utc::now();
        let stamped = match *last {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        *last = Some(stamped);
        stamped
    }
}
