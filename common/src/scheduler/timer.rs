// Cron timer engine
//
// A single driver task sleeps until the earliest due entry, then spawns the
// callbacks of every due entry onto a task tracker. The driver never awaits a
// callback, so a slow job cannot delay other triggers.

use crate::schedule::{next_fire_time, Recurrence};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

/// Handle of a timer registration
pub type EntryId = u64;

/// Work invoked on every firing of an entry
pub type Callback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Upper bound on a single driver sleep when nothing is due
const IDLE_WAIT: Duration = Duration::from_secs(3600);

struct Entry {
    schedule: Recurrence,
    next: Option<DateTime<Utc>>,
    callback: Callback,
}

struct Shared {
    timezone: Tz,
    entries: Mutex<HashMap<EntryId, Entry>>,
    next_id: AtomicU64,
    changed: Notify,
}

struct Driver {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Recurring timer engine driving cron schedules
pub struct TimerEngine {
    shared: Arc<Shared>,
    tracker: TaskTracker,
    driver: Mutex<Option<Driver>>,
}

impl TimerEngine {
    pub fn new(timezone: Tz) -> Self {
        Self {
            shared: Arc::new(Shared {
                timezone,
                entries: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                changed: Notify::new(),
            }),
            tracker: TaskTracker::new(),
            driver: Mutex::new(None),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.shared.timezone
    }

    /// Register a schedule; the entry fires from its next occurrence onwards
    pub fn register(&self, schedule: Recurrence, callback: Callback) -> EntryId {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let next = next_fire_time(&schedule, self.shared.timezone, Utc::now());

        self.shared.entries.lock().insert(
            id,
            Entry {
                schedule,
                next,
                callback,
            },
        );
        self.shared.changed.notify_one();

        trace!(entry_id = id, next_fire = ?next, "Timer entry registered");
        id
    }

    /// Remove an entry; returns false if it was not registered
    ///
    /// A firing that already started is not affected.
    pub fn remove(&self, id: EntryId) -> bool {
        let removed = self.shared.entries.lock().remove(&id).is_some();
        if removed {
            self.shared.changed.notify_one();
            trace!(entry_id = id, "Timer entry removed");
        }
        removed
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.shared.entries.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.entries.lock().is_empty()
    }

    /// Next time the entry is due, if it is registered and has one
    pub fn next_fire_time(&self, id: EntryId) -> Option<DateTime<Utc>> {
        self.shared.entries.lock().get(&id).and_then(|entry| entry.next)
    }

    pub fn is_running(&self) -> bool {
        self.driver.lock().is_some()
    }

    /// Number of callbacks currently executing
    pub fn active_callbacks(&self) -> usize {
        self.tracker.len()
    }

    /// Start the driver task; returns false if it is already running
    pub fn start(&self) -> bool {
        let mut driver = self.driver.lock();
        if driver.is_some() {
            return false;
        }

        self.tracker.reopen();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(drive(
            self.shared.clone(),
            self.tracker.clone(),
            cancel.clone(),
        ));
        *driver = Some(Driver { cancel, handle });

        info!(entries = self.len(), "Timer engine started");
        true
    }

    /// Stop firing and wait for callbacks that already started to return
    pub async fn stop(&self) {
        let driver = self.driver.lock().take();
        let Some(driver) = driver else {
            return;
        };

        driver.cancel.cancel();
        if let Err(e) = driver.handle.await {
            warn!(error = %e, "Timer driver task ended abnormally");
        }

        self.tracker.close();
        let in_flight = self.tracker.len();
        if in_flight > 0 {
            info!(in_flight, "Waiting for running timer callbacks to finish");
        }
        self.tracker.wait().await;

        info!("Timer engine stopped");
    }
}

impl Drop for TimerEngine {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.cancel.cancel();
        }
    }
}

async fn drive(shared: Arc<Shared>, tracker: TaskTracker, cancel: CancellationToken) {
    loop {
        let now = Utc::now();
        let (due, earliest) = collect_due(&shared, now);

        for callback in due {
            tracker.spawn(callback());
        }

        let wait = earliest
            .and_then(|next| (next - Utc::now()).to_std().ok())
            .unwrap_or(if earliest.is_some() {
                Duration::ZERO
            } else {
                IDLE_WAIT
            });

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shared.changed.notified() => continue,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    debug!("Timer driver exited");
}

/// Take the callbacks of every entry due at `now` and advance those entries
///
/// Missed occurrences collapse into a single firing.
fn collect_due(shared: &Shared, now: DateTime<Utc>) -> (Vec<Callback>, Option<DateTime<Utc>>) {
    let mut entries = shared.entries.lock();
    let mut due = Vec::new();
    let mut earliest: Option<DateTime<Utc>> = None;

    for entry in entries.values_mut() {
        if let Some(next) = entry.next {
            if next <= now {
                due.push(entry.callback.clone());
                entry.next = next_fire_time(&entry.schedule, shared.timezone, now);
            }
        }
        if let Some(next) = entry.next {
            earliest = Some(earliest.map_or(next, |current| current.min(next)));
        }
    }

    (due, earliest)
}
