//! Monitoring surface
//!
//! The single consumer of the transport. A dedicated dispatcher thread owns
//! the receiving end, keeps a bounded per-topic history and fans each event
//! out to the subscribers of its topic. Producers never run subscriber
//! code.
//!
//! Each subscription carries a reentrant lock around its active flag. The
//! dispatcher holds it for the duration of a callback, so
//! [`Subscription::unsubscribe`] called from another thread waits for an
//! in-flight callback to finish, and called from inside the callback it
//! re-enters without deadlocking. Either way the callback is never invoked
//! again once `unsubscribe` has returned.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crate::constants::{DEFAULT_IPC_HISTORY, DEFAULT_LOG_HISTORY, DEFAULT_PERFORMANCE_HISTORY};
use crate::error::Result;
use crate::models::{Event, Topic};
use crate::transport::SinkHandle;

/// Number of events retained per topic for [`MonitorSurface::recent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub log: usize,
    pub ipc_message: usize,
    pub performance_sample: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            log: DEFAULT_LOG_HISTORY,
            ipc_message: DEFAULT_IPC_HISTORY,
            performance_sample: DEFAULT_PERFORMANCE_HISTORY,
        }
    }
}

impl HistoryLimits {
    pub fn for_topic(&self, topic: Topic) -> usize {
        match topic {
            Topic::Log => self.log,
            Topic::IpcMessage => self.ipc_message,
            Topic::PerformanceSample => self.performance_sample,
        }
    }
}

type Callback = Box<dyn Fn(&Event) + Send + Sync>;

struct Slot {
    active: ReentrantMutex<Cell<bool>>,
    callback: Callback,
}

impl Slot {
    fn dispatch(&self, event: &Event) {
        let active = self.active.lock();
        if active.get() {
            (self.callback)(event);
        }
    }

    /// Returns whether the slot was still active
    fn deactivate(&self) -> bool {
        self.active.lock().replace(false)
    }
}

#[derive(Default)]
struct Subscribers {
    next_id: AtomicU64,
    by_topic: RwLock<HashMap<Topic, Vec<(u64, Arc<Slot>)>>>,
}

impl Subscribers {
    fn add(&self, topic: Topic, slot: Arc<Slot>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.by_topic.write().entry(topic).or_default().push((id, slot));
        id
    }

    fn remove(&self, topic: Topic, id: u64) {
        if let Some(slots) = self.by_topic.write().get_mut(&topic) {
            slots.retain(|(slot_id, _)| *slot_id != id);
        }
    }

    // Cloned so callbacks may subscribe or unsubscribe while we iterate
    fn snapshot(&self, topic: Topic) -> Vec<Arc<Slot>> {
        self.by_topic
            .read()
            .get(&topic)
            .map(|slots| slots.iter().map(|(_, slot)| slot.clone()).collect())
            .unwrap_or_default()
    }

    fn count(&self, topic: Topic) -> usize {
        self.by_topic.read().get(&topic).map(Vec::len).unwrap_or(0)
    }
}

struct History {
    limits: HistoryLimits,
    retained: Mutex<HashMap<Topic, VecDeque<Event>>>,
}

impl History {
    fn new(limits: HistoryLimits) -> Self {
        Self {
            limits,
            retained: Mutex::new(HashMap::new()),
        }
    }

    fn record(&self, event: &Event) {
        let topic = event.topic();
        let limit = self.limits.for_topic(topic);
        if limit == 0 {
            return;
        }
        let mut retained = self.retained.lock();
        let queue = retained.entry(topic).or_default();
        while queue.len() >= limit {
            queue.pop_front();
        }
        queue.push_back(event.clone());
    }

    fn recent(&self, topic: Topic) -> Vec<Event> {
        self.retained
            .lock()
            .get(&topic)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Registration returned by [`MonitorSurface::subscribe`].
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    id: u64,
    topic: Topic,
    slot: Arc<Slot>,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn is_active(&self) -> bool {
        self.slot.active.lock().get()
    }

    /// Stop delivery to this callback. Safe to call any number of times,
    /// from any thread, including from inside the callback.
    pub fn unsubscribe(&self) {
        if !self.slot.deactivate() {
            return;
        }
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.remove(self.topic, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

/// Consumer side of the bridge
pub struct MonitorSurface {
    handle: SinkHandle,
    subscribers: Arc<Subscribers>,
    history: Arc<History>,
    stop: Option<Sender<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl MonitorSurface {
    /// Spawn the dispatcher for `receiver`. `handle` must be the producer
    /// side of the same transport; it is closed when the surface closes.
    pub fn start(receiver: Receiver<Event>, handle: SinkHandle, limits: HistoryLimits) -> Result<Self> {
        let subscribers = Arc::new(Subscribers::default());
        let history = Arc::new(History::new(limits));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let dispatcher = {
            let subscribers = subscribers.clone();
            let history = history.clone();
            thread::Builder::new()
                .name("devbridge-surface".to_string())
                .spawn(move || run_dispatcher(receiver, stop_rx, subscribers, history))?
        };

        log::debug!(target: "devbridge::surface", "dispatcher started");
        Ok(Self {
            handle,
            subscribers,
            history,
            stop: Some(stop_tx),
            dispatcher: Some(dispatcher),
        })
    }

    /// Producer handle for interceptors and samplers
    pub fn handle(&self) -> SinkHandle {
        self.handle.clone()
    }

    pub fn subscribe<F>(&self, topic: Topic, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let slot = Arc::new(Slot {
            active: ReentrantMutex::new(Cell::new(true)),
            callback: Box::new(callback),
        });
        let id = self.subscribers.add(topic, slot.clone());
        Subscription {
            id,
            topic,
            slot,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers.count(topic)
    }

    /// Retained events for `topic`, oldest first
    pub fn recent(&self, topic: Topic) -> Vec<Event> {
        self.history.recent(topic)
    }

    /// Events lost to transport overflow
    pub fn dropped(&self) -> u64 {
        self.handle.dropped()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Close the handle and stop the dispatcher. Queued events that were
    /// not yet dispatched are discarded.
    pub fn close(&mut self) {
        self.handle.close();
        // Disconnecting the stop channel wakes the dispatcher
        self.stop.take();

        if let Some(dispatcher) = self.dispatcher.take() {
            if dispatcher.thread().id() == thread::current().id() {
                return;
            }
            if dispatcher.join().is_err() {
                log::error!(target: "devbridge::surface", "dispatcher thread panicked");
            }
            log::debug!(target: "devbridge::surface", "dispatcher stopped");
        }
    }
}

impl Drop for MonitorSurface {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_dispatcher(
    events: Receiver<Event>,
    stop: Receiver<()>,
    subscribers: Arc<Subscribers>,
    history: Arc<History>,
) {
    loop {
        crossbeam_channel::select! {
            recv(events) -> event => match event {
                Ok(event) => dispatch(&event, &subscribers, &history),
                Err(_) => break,
            },
            recv(stop) -> _ => break,
        }
    }
}

fn dispatch(event: &Event, subscribers: &Subscribers, history: &History) {
    history.record(event);

    let topic = event.topic();
    for slot in subscribers.snapshot(topic) {
        if catch_unwind(AssertUnwindSafe(|| slot.dispatch(event))).is_err() {
            log::error!(target: "devbridge::surface", "subscriber on '{}' panicked", topic);
        }
    }
}
