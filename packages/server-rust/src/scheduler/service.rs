//! Deduplicated periodic scheduler.

use std::any::type_name;
use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Timelike;
use parking_lot::Mutex;
use smarthub_core::hash::sha256_hex;
use tracing::{debug, error, info, warn};

use super::entry::{Entry, ScheduleMode, SchedulerError, TimeSpec};
use crate::service::config::SchedulerConfig;
use crate::service::registry::{ManagedService, ServiceState, ServiceStatus};
use crate::service::worker::{BackgroundRunnable, BackgroundWorker};

/// Service name of the scheduler.
pub const SCHEDULER_SERVICE: &str = "scheduler";

/// Counter of callbacks that returned an error or panicked.
pub const CALLBACK_FAILURES: &str = "smarthub_scheduler_callback_failures_total";

type EntrySet = Arc<Mutex<Vec<Arc<Entry>>>>;

/// Runs callbacks at second, minute, hour or day granularity, or at a
/// custom time of day.
///
/// Entries are identified by a dedup key: either the caller-supplied key
/// (`register_keyed`) or, as a best-effort fallback, a digest of the
/// callback's type name, the call site, the mode and the literal time
/// fields. Closures in one function share a type name, so the call site
/// keeps them apart. The fallback changes whenever the calling code moves,
/// so long-lived jobs should use an explicit key.
pub struct Scheduler {
    state: ServiceState,
    config: SchedulerConfig,
    entries: EntrySet,
    worker: Mutex<Option<BackgroundWorker>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            state: ServiceState::new(SCHEDULER_SERVICE),
            config,
            entries: Arc::new(Mutex::new(Vec::new())),
            worker: Mutex::new(None),
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Registers `callback(&context)` under a key derived from the call site.
    ///
    /// Returns the derived key, to be passed to [`Scheduler::unregister`], or
    /// `None` (and logs a warning) if the key already exists.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] when a custom time field is out of range.
    #[track_caller]
    pub fn register<C, F>(
        &self,
        callback: F,
        context: C,
        mode: ScheduleMode,
        time: TimeSpec,
    ) -> Result<Option<String>, SchedulerError>
    where
        C: Send + Sync + 'static,
        F: Fn(&C) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let key = fallback_key::<F>(Location::caller(), mode, time);
        let stored = self.register_keyed(key.clone(), callback, context, mode, time)?;
        Ok(stored.then_some(key))
    }

    /// Registers `callback(&context)` under `key`.
    ///
    /// Returns `Ok(false)` (and logs a warning) if the key already exists.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] when a custom time field is out of range.
    pub fn register_keyed<C, F>(
        &self,
        key: impl Into<String>,
        callback: F,
        context: C,
        mode: ScheduleMode,
        time: TimeSpec,
    ) -> Result<bool, SchedulerError>
    where
        C: Send + Sync + 'static,
        F: Fn(&C) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        if mode == ScheduleMode::Custom {
            time.validate()?;
        }
        let key = key.into();

        let mut entries = self.entries.lock();
        if entries.iter().any(|e| e.key == key) {
            warn!(key = %key, callback = type_name::<F>(), "scheduled task already registered");
            return Ok(false);
        }

        let time = time.normalize(mode, &mut rand::rng());
        debug!(key = %key, %mode, %time, "scheduled task registered");
        entries.push(Arc::new(Entry {
            key,
            label: type_name::<F>(),
            mode,
            time,
            callback: Arc::new(move || callback(&context)),
        }));
        Ok(true)
    }

    /// Removes the entry registered under `key`, either the explicit key or
    /// the one returned by `register`. Returns `false` (and logs a warning)
    /// if there is none.
    pub fn unregister(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.key != key);
        let removed = entries.len() != before;
        if removed {
            debug!(key, "scheduled task unregistered");
        } else {
            warn!(key, "scheduled task not registered");
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().iter().any(|e| e.key == key)
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Evaluates every entry against the current local time.
    pub fn tick(&self) {
        run_due(&self.entries, &chrono::Local::now());
    }

    /// Evaluates every entry against `now`.
    pub fn tick_at<T: Timelike>(&self, now: &T) {
        run_due(&self.entries, now);
    }
}

/// Invokes the due entries in registration order. The entry set is not
/// locked while callbacks run, so a callback may register or unregister.
fn run_due<T: Timelike>(entries: &EntrySet, now: &T) {
    let (hour, minute, second) = (now.hour(), now.minute(), now.second());
    let due: Vec<Arc<Entry>> = entries
        .lock()
        .iter()
        .filter(|e| e.time.matches(hour, minute, second))
        .cloned()
        .collect();

    for entry in due {
        match catch_unwind(AssertUnwindSafe(|| (entry.callback)())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                metrics::counter!(CALLBACK_FAILURES).increment(1);
                error!(key = %entry.key, callback = entry.label, error = %e, "scheduled task failed");
            }
            Err(_) => {
                metrics::counter!(CALLBACK_FAILURES).increment(1);
                error!(key = %entry.key, callback = entry.label, "scheduled task panicked");
            }
        }
    }
}

fn fallback_key<F>(caller: &Location<'_>, mode: ScheduleMode, time: TimeSpec) -> String {
    sha256_hex(&format!(
        "{}|{}:{}:{}|{mode}|{time}",
        type_name::<F>(),
        caller.file(),
        caller.line(),
        caller.column()
    ))
}

/// Tick source driven by the background worker.
struct SchedulerTick {
    entries: EntrySet,
}

#[async_trait]
impl BackgroundRunnable for SchedulerTick {
    async fn on_tick(&mut self) {
        run_due(&self.entries, &chrono::Local::now());
    }
}

#[async_trait]
impl ManagedService for Scheduler {
    fn name(&self) -> &'static str {
        self.state.name()
    }

    fn status(&self) -> ServiceStatus {
        self.state.status()
    }

    async fn start(&self) -> anyhow::Result<()> {
        if self.state.is_running() {
            debug!("scheduler already running");
            return Ok(());
        }
        let tick = SchedulerTick {
            entries: Arc::clone(&self.entries),
        };
        *self.worker.lock() = Some(BackgroundWorker::start(tick, self.config.tick_interval));
        self.state.mark_running();
        info!(entries = self.len(), interval = ?self.config.tick_interval, "scheduler started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if !self.state.is_running() {
            debug!("scheduler not running");
            return Ok(());
        }
        let worker = self.worker.lock().take();
        if let Some(mut worker) = worker {
            worker.stop().await;
        }
        self.state.mark_stopped();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
