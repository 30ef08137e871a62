//! Per-key trailing-edge debouncing.
//!
//! Each key has at most one armed timer. Scheduling a key that is already
//! armed drops the pending callback and re-arms with the full delay, so a
//! burst of activity yields one callback after the burst goes quiet.
//!
//! A single timer thread owns all deadlines. Keys move through
//! `idle → armed → fired`; a fired key is removed from the map before its
//! callback runs, so the callback may re-arm the same key.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Work run once a key's debounce window closes.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Armed {
    deadline: Instant,
    callback: Callback,
}

#[derive(Default)]
struct State {
    timers: HashMap<String, Armed>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry of single-shot timers keyed by topic name.
pub struct Debouncer {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Create a debouncer and start its timer thread.
    pub fn new() -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            wake: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("hivebus-debounce".to_string())
            .spawn(move || run_timers(&worker_shared))?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Arm (or re-arm) the timer for `key`.
    ///
    /// Any callback already pending for `key` is discarded without running.
    /// Returns `false` if the debouncer has been shut down, in which case
    /// `callback` is dropped.
    pub fn schedule<F>(&self, key: &str, delay: Duration, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.lock();
        if state.shutdown {
            return false;
        }

        let armed = Armed {
            deadline: Instant::now() + delay,
            callback: Box::new(callback),
        };
        if state.timers.insert(key.to_string(), armed).is_some() {
            tracing::trace!("Re-armed debounce timer for {}", key);
        }
        drop(state);

        self.shared.wake.notify_one();
        true
    }

    /// Stop every armed timer without running its callback.
    pub fn cancel_all(&self) {
        let cancelled = {
            let mut state = self.shared.lock();
            std::mem::take(&mut state.timers)
        };
        if !cancelled.is_empty() {
            tracing::debug!("Cancelled {} pending debounce timers", cancelled.len());
        }
        self.shared.wake.notify_one();
    }

    /// Cancel all timers and stop the timer thread.
    ///
    /// Blocks until a callback that is already running has returned.
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            state.shutdown = true;
            state.timers.clear();
        }
        self.shared.wake.notify_all();

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            // A callback that shuts down its own debouncer must not join itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    /// Number of keys with an armed timer.
    pub fn pending(&self) -> usize {
        self.shared.lock().timers.len()
    }

    /// Check whether `key` currently has an armed timer.
    pub fn is_armed(&self, key: &str) -> bool {
        self.shared.lock().timers.contains_key(key)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("pending", &self.pending())
            .finish()
    }
}

fn run_timers(shared: &Shared) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            break;
        }

        let now = Instant::now();
        let next = state.timers.values().map(|armed| armed.deadline).min();
        match next {
            None => {
                state = shared
                    .wake
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Some(deadline) if deadline > now => {
                state = shared
                    .wake
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
            Some(_) => {
                let due: Vec<String> = state
                    .timers
                    .iter()
                    .filter(|(_, armed)| armed.deadline <= now)
                    .map(|(key, _)| key.clone())
                    .collect();
                let fired: Vec<(String, Callback)> = due
                    .into_iter()
                    .filter_map(|key| {
                        let armed = state.timers.remove(&key)?;
                        Some((key, armed.callback))
                    })
                    .collect();

                // Callbacks run unlocked so they can schedule again.
                drop(state);
                for (key, callback) in fired {
                    tracing::trace!("Debounce window closed for {}", key);
                    callback();
                }
                state = shared.lock();
            }
        }
    }
}
