//! Per-currency polling.
//!
//! A [`Poller`] owns one background task that fetches prices for a single
//! currency on a fixed cadence. Forced polls run out of band without moving
//! the scheduled ticks. Fetches for one currency never overlap.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Notify};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use pricefeed_traits::{AssetId, CurrencyCode, PriceBatch, PriceFetcher, SourceError};

/// Identifier of one poller instance.
///
/// A currency that is dropped and later re-subscribed gets a new poller with
/// a new id, so results from the old one can be told apart.
pub type PollerId = u64;

/// Poller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollerState {
    /// Not polling.
    Stopped,
    /// Timer armed; fetches in progress or pending.
    Running,
}

/// Why a poll ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollTrigger {
    /// Regular timer tick.
    Scheduled,
    /// Out-of-band request via [`Poller::force_now`].
    Forced,
}

/// Receives the poller's requests and results.
pub trait PollDriver: Send + Sync + 'static {
    /// Assets to fetch for the next poll.
    ///
    /// Returning `None` means the poller is no longer wanted; its task exits.
    fn poll_targets(&self, poller_id: PollerId, currency: &CurrencyCode) -> Option<Vec<AssetId>>;

    /// Called once per completed fetch, successful or not.
    fn on_poll_complete(
        &self,
        poller_id: PollerId,
        currency: &CurrencyCode,
        trigger: PollTrigger,
        result: Result<PriceBatch, SourceError>,
    );
}

/// Timing parameters for a poller.
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    /// Cadence of scheduled polls
    pub interval: Duration,
    /// Upper bound on one fetch
    pub fetch_timeout: Duration,
}

/// Snapshot of a poller, for introspection.
#[derive(Debug, Clone, Serialize)]
pub struct PollerInfo {
    /// Poller id
    pub id: PollerId,
    /// Currency polled
    pub currency: CurrencyCode,
    /// Current state
    pub state: PollerState,
    /// Number of accepted `force_now` requests
    pub forced_count: u64,
    /// Number of fetches that returned (success, failure or timeout)
    pub completed_polls: u64,
    /// When `force_now` was last accepted
    pub last_forced: Option<DateTime<Utc>>,
}

struct PollerShared {
    running: AtomicBool,
    force: Notify,
    forced_count: AtomicU64,
    completed_polls: AtomicU64,
    last_forced: Mutex<Option<DateTime<Utc>>>,
}

/// Periodic price poller for one currency.
pub struct Poller {
    id: PollerId,
    currency: CurrencyCode,
    shared: Arc<PollerShared>,
    shutdown_tx: Option<broadcast::Sender<()>>,
}

impl Poller {
    /// Create a stopped poller.
    pub fn new(id: PollerId, currency: CurrencyCode) -> Self {
        Self {
            id,
            currency,
            shared: Arc::new(PollerShared {
                running: AtomicBool::new(false),
                force: Notify::new(),
                forced_count: AtomicU64::new(0),
                completed_polls: AtomicU64::new(0),
                last_forced: Mutex::new(None),
            }),
            shutdown_tx: None,
        }
    }

    /// Poller id.
    pub fn id(&self) -> PollerId {
        self.id
    }

    /// Currency polled.
    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    /// Current state.
    pub fn state(&self) -> PollerState {
        if self.shared.running.load(Ordering::SeqCst) {
            PollerState::Running
        } else {
            PollerState::Stopped
        }
    }

    /// Start polling on `runtime`.
    ///
    /// The first scheduled tick fires one full interval after start; callers
    /// that need data sooner use [`force_now`](Self::force_now). Returns false
    /// if the poller was already running.
    pub fn start(
        &mut self,
        runtime: &Handle,
        fetcher: Arc<dyn PriceFetcher>,
        driver: Weak<dyn PollDriver>,
        schedule: PollSchedule,
    ) -> bool {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return false;
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let task = PollTask {
            id: self.id,
            currency: self.currency.clone(),
            shared: self.shared.clone(),
            fetcher,
            driver,
            schedule,
        };
        runtime.spawn(task.run(shutdown_rx));

        info!(
            "Started poller {} for {} every {:?}",
            self.id, self.currency, schedule.interval
        );
        true
    }

    /// Request an immediate out-of-band fetch.
    ///
    /// Requests made while a fetch is already pending collapse into one.
    /// Returns false (and does nothing) if the poller is stopped.
    pub fn force_now(&self) -> bool {
        if !self.shared.running.load(Ordering::SeqCst) {
            return false;
        }
        self.shared.forced_count.fetch_add(1, Ordering::Relaxed);
        *self.shared.last_forced.lock() = Some(Utc::now());
        self.shared.force.notify_one();
        true
    }

    /// Stop polling.
    ///
    /// Pending ticks are cancelled. A fetch already in flight completes, but
    /// its result is not delivered.
    pub fn stop(&mut self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        info!("Stopped poller {} for {}", self.id, self.currency);
    }

    /// Snapshot for introspection.
    pub fn info(&self) -> PollerInfo {
        PollerInfo {
            id: self.id,
            currency: self.currency.clone(),
            state: self.state(),
            forced_count: self.shared.forced_count.load(Ordering::Relaxed),
            completed_polls: self.shared.completed_polls.load(Ordering::Relaxed),
            last_forced: *self.shared.last_forced.lock(),
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PollTask {
    id: PollerId,
    currency: CurrencyCode,
    shared: Arc<PollerShared>,
    fetcher: Arc<dyn PriceFetcher>,
    driver: Weak<dyn PollDriver>,
    schedule: PollSchedule,
}

impl PollTask {
    async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let period = self.schedule.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_fetch: Option<Instant> = None;

        loop {
            let (trigger, due) = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = self.shared.force.notified() => (PollTrigger::Forced, None),
                due = ticker.tick() => (PollTrigger::Scheduled, Some(due)),
            };

            // A fetch that started at or after this tick's deadline already covered it.
            if let (Some(due), Some(started)) = (due, last_fetch) {
                if started >= due {
                    debug!(
                        "Poller {} skipping tick for {}, already fetched",
                        self.id, self.currency
                    );
                    continue;
                }
            }

            let assets = match self.driver.upgrade() {
                Some(driver) => match driver.poll_targets(self.id, &self.currency) {
                    Some(assets) => assets,
                    None => break,
                },
                None => break,
            };
            if assets.is_empty() {
                continue;
            }

            debug!(
                "Poller {} fetching {} assets for {} ({:?})",
                self.id,
                assets.len(),
                self.currency,
                trigger
            );
            last_fetch = Some(Instant::now());
            let result = self.fetch(assets).await;
            self.shared.completed_polls.fetch_add(1, Ordering::Relaxed);

            if !self.shared.running.load(Ordering::SeqCst) {
                debug!(
                    "Poller {} stopped during fetch for {}, discarding result",
                    self.id, self.currency
                );
                break;
            }
            match self.driver.upgrade() {
                Some(driver) => driver.on_poll_complete(self.id, &self.currency, trigger, result),
                None => break,
            }
        }

        self.shared.running.store(false, Ordering::SeqCst);
        debug!("Poller task {} for {} exited", self.id, self.currency);
    }

    /// One bounded fetch on its own task, so a panicking fetcher fails this
    /// poll instead of killing the poller.
    async fn fetch(&self, assets: Vec<AssetId>) -> Result<PriceBatch, SourceError> {
        let fetcher = self.fetcher.clone();
        let currency = self.currency.clone();
        let mut fetch = tokio::spawn(async move { fetcher.fetch(&currency, &assets).await });

        match timeout(self.schedule.fetch_timeout, &mut fetch).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                warn!(
                    "Poller {} fetch task for {} failed: {}",
                    self.id, self.currency, err
                );
                Err(SourceError::Internal(format!("fetch task failed: {}", err)))
            }
            Err(_) => {
                fetch.abort();
                Err(SourceError::Timeout)
            }
        }
    }
}
