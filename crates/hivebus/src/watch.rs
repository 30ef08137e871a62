//! Topic watcher: file system changes → debounced topic notifications.
//!
//! A `TopicWatcher` attaches a `notify` listener to a topic directory and
//! runs one background thread that drains raw events. Each event that
//! touches a topic file arms that topic's debounce timer; when the window
//! closes the registry fans a [`TopicEvent`](crate::TopicEvent) out to every
//! matching subscription.
//!
//! Lifecycle is `Created → Running → Closed`. [`TopicWatcher::close`] stops
//! all timers, closes every subscriber queue, releases the listener, and
//! returns only after the background thread has exited.
//!
//! The debouncer and the registry each guard their own map. Neither lock is
//! held while the other is taken, and delivery never blocks, so a fan-out
//! running on the timer thread cannot stall the event loop or `close`.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use notify::event::{CreateKind, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::debounce::Debouncer;
use crate::registry::{Registry, Subscription, DEFAULT_QUEUE_CAPACITY};
use crate::topic::{filename_to_topic, TopicDir};
use crate::{BusError, Result};

/// Default debounce window for topic notifications
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Tuning knobs for a [`TopicWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherOptions {
    /// Quiet period required before a topic's notification is dispatched
    pub debounce: Duration,
    /// Capacity of each subscription's delivery queue
    pub queue_capacity: usize,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Messages consumed by the background thread.
enum Signal {
    Fs(notify::Result<Event>),
    Shutdown,
}

/// Resources that exist only while the watcher is running.
struct Running {
    listener: RecommendedWatcher,
    signals: Sender<Signal>,
    worker: JoinHandle<()>,
}

/// Watches a topic directory and notifies subscribers of topic changes.
pub struct TopicWatcher {
    dir: TopicDir,
    options: WatcherOptions,
    registry: Arc<Registry>,
    debouncer: Arc<Debouncer>,
    running: Mutex<Option<Running>>,
}

impl TopicWatcher {
    /// Watch `dir` with default options, creating the directory if absent.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_options(dir, WatcherOptions::default())
    }

    /// Watch `dir` with explicit options.
    ///
    /// Fails if the directory cannot be created or the listener cannot be
    /// attached; no partially started watcher is returned.
    pub fn with_options(dir: impl Into<PathBuf>, options: WatcherOptions) -> Result<Self> {
        let dir = TopicDir::create(dir)?;

        let (signals, inbox) = mpsc::channel();
        let listener_tx = signals.clone();
        let mut listener = RecommendedWatcher::new(
            move |res| {
                let _ = listener_tx.send(Signal::Fs(res));
            },
            notify::Config::default(),
        )?;
        listener.watch(dir.path(), RecursiveMode::NonRecursive)?;

        let registry = Arc::new(Registry::new());
        let debouncer = Arc::new(
            Debouncer::new().map_err(|e| BusError::io("starting debounce timer", dir.path(), e))?,
        );

        let worker = {
            let registry = registry.clone();
            let debouncer = debouncer.clone();
            let debounce = options.debounce;
            thread::Builder::new()
                .name("hivebus-watch".to_string())
                .spawn(move || process_events(inbox, &registry, &debouncer, debounce))
                .map_err(|e| BusError::io("starting watch thread", dir.path(), e))?
        };

        tracing::debug!("Watching topic directory {:?}", dir.path());
        Ok(Self {
            dir,
            options,
            registry,
            debouncer,
            running: Mutex::new(Some(Running {
                listener,
                signals,
                worker,
            })),
        })
    }

    /// Subscribe to topics matching `pattern`.
    ///
    /// Drop the returned [`Subscription`] (or fire its
    /// [`CancelHandle`](crate::registry::CancelHandle)) to unsubscribe.
    /// Delivery is best effort: events for a subscriber whose queue is full
    /// are dropped.
    pub fn watch(&self, pattern: &str) -> Result<Subscription> {
        self.registry.subscribe(pattern, self.options.queue_capacity)
    }

    /// Stop watching and close every subscription.
    ///
    /// Blocks until the background thread has exited. Concurrent and
    /// repeated calls are safe; later callers wait for the first to finish
    /// and then return.
    pub fn close(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(Running {
            listener,
            signals,
            worker,
        }) = running.take()
        else {
            return;
        };

        let _ = signals.send(Signal::Shutdown);
        drop(signals);
        // Releasing the listener drops its sender; the inbox disconnects.
        drop(listener);
        if worker.join().is_err() {
            tracing::warn!("Topic watch thread panicked");
        }

        self.debouncer.shutdown();
        self.registry.close_all();
        tracing::debug!("Closed topic watcher for {:?}", self.dir.path());
    }

    pub fn is_closed(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// The watched topic directory.
    pub fn dir(&self) -> &TopicDir {
        &self.dir
    }

    pub fn options(&self) -> WatcherOptions {
        self.options
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of topics with an armed debounce timer.
    pub fn pending_timers(&self) -> usize {
        self.debouncer.pending()
    }
}

impl Drop for TopicWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TopicWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicWatcher")
            .field("dir", &self.dir.path())
            .field("options", &self.options)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Background loop: one raw event at a time until shutdown or disconnect.
fn process_events(
    inbox: Receiver<Signal>,
    registry: &Arc<Registry>,
    debouncer: &Debouncer,
    debounce: Duration,
) {
    while let Ok(signal) = inbox.recv() {
        let event = match signal {
            Signal::Shutdown => break,
            Signal::Fs(Ok(event)) => event,
            Signal::Fs(Err(e)) => {
                tracing::warn!("Watch error: {:?}", e);
                continue;
            }
        };

        for topic in topics_for_event(&event) {
            let registry = registry.clone();
            let fired = topic.clone();
            debouncer.schedule(&topic, debounce, move || {
                let delivered = registry.fanout(&fired);
                tracing::trace!("Dispatched {} to {} subscribers", fired, delivered);
            });
        }
    }
    tracing::debug!("Topic watch thread exiting");
}

/// Check if an event kind is a file write, create, or rename.
fn is_topic_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(CreateKind::File | CreateKind::Any | CreateKind::Other)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
    )
}

/// Topics touched by a raw event, after the ignore filter.
///
/// Extracted as a free function to make it testable without a listener.
fn topics_for_event(event: &Event) -> Vec<String> {
    if !is_topic_change(&event.kind) {
        return Vec::new();
    }

    let mut topics: Vec<String> = Vec::new();
    for path in &event.paths {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(topic) = filename_to_topic(name) {
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }
    }
    topics
}
