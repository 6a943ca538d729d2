//! The price subscription broker.
//!
//! [`PriceUpdateBroker`] multiplexes any number of consumer subscriptions onto
//! one [`Poller`] per currency:
//!
//! ```text
//!                 ┌──────────────┐          ┌────────────────────┐
//!  PriceFetcher ◄─│ Poller (USD) │─result──►│                    │──► Subject USD[BTC]     ──► handles
//!                 └──────────────┘          │  PriceUpdateBroker │──► Subject USD[BTC,ETH] ──► handles
//!                 ┌──────────────┐          │  (one mutex)       │
//!  PriceFetcher ◄─│ Poller (EUR) │─result──►│                    │──► Subject EUR[ETH]     ──► handles
//!                 └──────────────┘          └────────────────────┘
//! ```
//!
//! The subject table, per-subject reference counts and the poller table live
//! behind a single mutex. The lock is never held across an await, a fetch, or
//! a call into the price cache.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pricefeed_traits::{
    AssetId, CurrencyCode, PriceBatch, PriceCache, PriceFetcher, SourceError,
};

use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::key::SubscriptionKey;
use crate::poller::{PollDriver, PollSchedule, PollTrigger, Poller, PollerId, PollerInfo};
use crate::subject::{HandleId, Subject, SubjectEvent};
use crate::subscription::SubscriptionHandle;

/// Broker counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    /// Live subjects (distinct keys)
    pub subjects: usize,
    /// Running pollers (distinct currencies)
    pub pollers: usize,
    /// Attached handles across all subjects
    pub handles: usize,
    /// Batches passed to `publish`
    pub batches_published: u64,
}

/// Multiplexes price subscriptions onto per-currency pollers.
///
/// Cheap to clone; clones share the same tables.
#[derive(Clone)]
pub struct PriceUpdateBroker {
    inner: Arc<BrokerInner>,
}

pub(crate) struct BrokerInner {
    config: BrokerConfig,
    fetcher: Arc<dyn PriceFetcher>,
    cache: Arc<dyn PriceCache>,
    runtime: Handle,
    state: Mutex<BrokerState>,
    next_handle_id: AtomicU64,
    next_poller_id: AtomicU64,
    batches_published: AtomicU64,
}

#[derive(Default)]
struct BrokerState {
    subjects: HashMap<SubscriptionKey, Subject>,
    pollers: HashMap<CurrencyCode, Poller>,
    shut_down: bool,
}

impl BrokerState {
    /// Union of the asset sets of every subject for `currency`.
    fn observed_asset_ids(&self, currency: &CurrencyCode) -> BTreeSet<AssetId> {
        self.subjects
            .keys()
            .filter(|key| key.currency() == currency)
            .flat_map(|key| key.asset_ids().iter().cloned())
            .collect()
    }

    fn has_subjects_for(&self, currency: &CurrencyCode) -> bool {
        self.subjects.keys().any(|key| key.currency() == currency)
    }

    fn is_current_poller(&self, currency: &CurrencyCode, poller_id: PollerId) -> bool {
        self.pollers
            .get(currency)
            .map(|p| p.id() == poller_id)
            .unwrap_or(false)
    }
}

impl PriceUpdateBroker {
    /// Create a broker on the current tokio runtime.
    pub fn new(
        config: BrokerConfig,
        fetcher: Arc<dyn PriceFetcher>,
        cache: Arc<dyn PriceCache>,
    ) -> Result<Self, BrokerError> {
        let runtime = Handle::try_current().map_err(|_| BrokerError::NoRuntime)?;
        Self::with_runtime(config, fetcher, cache, runtime)
    }

    /// Create a broker whose pollers run on `runtime`.
    pub fn with_runtime(
        config: BrokerConfig,
        fetcher: Arc<dyn PriceFetcher>,
        cache: Arc<dyn PriceCache>,
        runtime: Handle,
    ) -> Result<Self, BrokerError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(BrokerInner {
                config,
                fetcher,
                cache,
                runtime,
                state: Mutex::new(BrokerState::default()),
                next_handle_id: AtomicU64::new(1),
                next_poller_id: AtomicU64::new(1),
                batches_published: AtomicU64::new(0),
            }),
        })
    }

    /// Subscribe to prices for `asset_ids` in `currency`.
    ///
    /// Reuses the subject for an identical key, starts the currency's poller
    /// if none is running, and forces an immediate poll when the request names
    /// any asset not already tracked for the currency.
    pub fn subscribe<I, A>(
        &self,
        asset_ids: I,
        currency: impl Into<CurrencyCode>,
    ) -> Result<SubscriptionHandle, BrokerError>
    where
        I: IntoIterator<Item = A>,
        A: Into<AssetId>,
    {
        let key = SubscriptionKey::new(asset_ids, currency);
        self.subscribe_key(key)
    }

    /// Subscribe with a prebuilt key.
    pub fn subscribe_key(&self, key: SubscriptionKey) -> Result<SubscriptionHandle, BrokerError> {
        let inner = &self.inner;
        if key.is_empty() {
            return Err(BrokerError::InvalidSubscription(
                "at least one asset id is required".into(),
            ));
        }
        let currency = key.currency().clone();
        if !inner.config.allows_currency(&currency) || !inner.fetcher.supports_currency(&currency)
        {
            return Err(BrokerError::InvalidSubscription(format!(
                "unsupported currency {}",
                currency
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let seed = if inner.config.replay_cached {
            let cached = inner.cache.get_many(&key.to_vec(), &currency);
            if !cached.is_empty() {
                let _ = tx.send(SubjectEvent::Prices(cached.clone()));
            }
            Some(cached)
        } else {
            None
        };
        let replay_tx = seed.as_ref().map(|_| tx.clone());
        let handle_id = inner.next_handle_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut guard = inner.state.lock();
            let state = &mut *guard;
            if state.shut_down {
                return Err(BrokerError::Shutdown);
            }

            let observed = state.observed_asset_ids(&currency);
            let new_assets: Vec<&AssetId> = key
                .asset_ids()
                .iter()
                .filter(|id| !observed.contains(*id))
                .collect();

            let subject = state.subjects.entry(key.clone()).or_insert_with(|| {
                info!("Created subject {}", key);
                Subject::new()
            });
            subject.attach(handle_id, tx);

            let poller = match state.pollers.entry(currency.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let id = inner.next_poller_id.fetch_add(1, Ordering::Relaxed);
                    let mut poller = Poller::new(id, currency.clone());
                    let weak: Weak<BrokerInner> = Arc::downgrade(&self.inner);
                    let driver: Weak<dyn PollDriver> = weak;
                    poller.start(
                        &inner.runtime,
                        inner.fetcher.clone(),
                        driver,
                        PollSchedule {
                            interval: inner.config.poll_interval(),
                            fetch_timeout: inner.config.fetch_timeout(),
                        },
                    );
                    entry.insert(poller)
                }
            };

            if !new_assets.is_empty() {
                debug!(
                    "Forcing poll for {}: {} new asset(s) {:?}",
                    currency,
                    new_assets.len(),
                    new_assets
                );
                poller.force_now();
            }
        }

        // A result cached and published between the seed read and attach
        // never reached this handle; resend whatever is newer than the seed.
        if let (Some(seed), Some(replay_tx)) = (seed, replay_tx) {
            let latest = inner.cache.get_many(&key.to_vec(), &currency);
            let newer: PriceBatch = latest
                .into_iter()
                .filter(|(id, point)| {
                    seed.get(id)
                        .map(|seeded| point.timestamp > seeded.timestamp)
                        .unwrap_or(true)
                })
                .collect();
            if !newer.is_empty() {
                debug!("Replaying {} newer cached price(s) to {}", newer.len(), key);
                let _ = replay_tx.send(SubjectEvent::Prices(newer));
            }
        }

        Ok(SubscriptionHandle::new(
            handle_id,
            key,
            rx,
            Arc::downgrade(&self.inner),
        ))
    }

    /// Cancel `handle`. Equivalent to [`SubscriptionHandle::cancel`].
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.cancel();
    }

    /// Fan `batch` out to every subject for `currency`.
    ///
    /// Each subject receives only the prices for its own assets; subjects
    /// with no overlap receive nothing. Returns the number of subjects
    /// notified.
    pub fn publish(&self, currency: &CurrencyCode, batch: &PriceBatch) -> usize {
        self.inner.publish(currency, batch)
    }

    /// Force an immediate poll for `currency`.
    ///
    /// Returns false if nothing subscribes to the currency.
    pub fn refresh(&self, currency: &CurrencyCode) -> bool {
        let state = self.inner.state.lock();
        match state.pollers.get(currency) {
            Some(poller) => {
                debug!("Manual refresh for {}", currency);
                poller.force_now()
            }
            None => false,
        }
    }

    /// Stop every poller and close every subscription.
    ///
    /// Later calls to `subscribe` fail with [`BrokerError::Shutdown`].
    pub fn shutdown(&self) {
        let (pollers, subjects) = {
            let mut state = self.inner.state.lock();
            state.shut_down = true;
            let pollers: Vec<Poller> = state.pollers.drain().map(|(_, p)| p).collect();
            let subjects: Vec<Subject> = state.subjects.drain().map(|(_, s)| s).collect();
            (pollers, subjects)
        };

        info!(
            "Shutting down broker: {} poller(s), {} subject(s)",
            pollers.len(),
            subjects.len()
        );
        for mut poller in pollers {
            poller.stop();
        }
        drop(subjects);
    }

    /// Returns true after [`shutdown`](Self::shutdown).
    pub fn is_shut_down(&self) -> bool {
        self.inner.state.lock().shut_down
    }

    /// Number of handles attached to `key`.
    pub fn subscriber_count(&self, key: &SubscriptionKey) -> usize {
        self.inner
            .state
            .lock()
            .subjects
            .get(key)
            .map(Subject::ref_count)
            .unwrap_or(0)
    }

    /// Whether a subject exists for `key`.
    pub fn has_subject(&self, key: &SubscriptionKey) -> bool {
        self.inner.state.lock().subjects.contains_key(key)
    }

    /// Assets currently tracked for `currency`.
    pub fn observed_asset_ids(&self, currency: &CurrencyCode) -> BTreeSet<AssetId> {
        self.inner.state.lock().observed_asset_ids(currency)
    }

    /// Snapshot of the poller for `currency`, if one exists.
    pub fn poller_info(&self, currency: &CurrencyCode) -> Option<PollerInfo> {
        self.inner.state.lock().pollers.get(currency).map(Poller::info)
    }

    /// Currencies with a running poller.
    pub fn active_currencies(&self) -> Vec<CurrencyCode> {
        let mut currencies: Vec<CurrencyCode> =
            self.inner.state.lock().pollers.keys().cloned().collect();
        currencies.sort();
        currencies
    }

    /// Broker counters.
    pub fn stats(&self) -> BrokerStats {
        let state = self.inner.state.lock();
        BrokerStats {
            subjects: state.subjects.len(),
            pollers: state.pollers.len(),
            handles: state.subjects.values().map(Subject::ref_count).sum(),
            batches_published: self.inner.batches_published.load(Ordering::Relaxed),
        }
    }

    /// Timestamp of the oldest cached price among the key's assets.
    pub fn oldest_price_timestamp(&self, key: &SubscriptionKey) -> Option<DateTime<Utc>> {
        self.inner
            .cache
            .oldest_timestamp(&key.to_vec(), key.currency())
    }

    /// True if any asset of `key` is uncached or older than the stale threshold.
    pub fn is_stale(&self, key: &SubscriptionKey) -> bool {
        let ids = key.to_vec();
        let cached = self.inner.cache.get_many(&ids, key.currency());
        if cached.len() < ids.len() {
            return true;
        }
        match self.inner.cache.oldest_timestamp(&ids, key.currency()) {
            Some(oldest) => {
                let age = (Utc::now() - oldest).to_std().unwrap_or_default();
                age > self.inner.config.stale_threshold()
            }
            None => true,
        }
    }

    /// The shared price cache.
    pub fn cache(&self) -> &Arc<dyn PriceCache> {
        &self.inner.cache
    }

    /// The broker configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }
}

impl BrokerInner {
    fn publish(&self, currency: &CurrencyCode, batch: &PriceBatch) -> usize {
        let state = self.state.lock();
        self.publish_locked(&state, currency, batch)
    }

    fn publish_locked(
        &self,
        state: &BrokerState,
        currency: &CurrencyCode,
        batch: &PriceBatch,
    ) -> usize {
        self.batches_published.fetch_add(1, Ordering::Relaxed);

        let mut notified = 0;
        for (key, subject) in state.subjects.iter() {
            if key.currency() != currency {
                continue;
            }
            let filtered: PriceBatch = batch
                .iter()
                .filter(|(id, _)| key.contains(id))
                .map(|(id, point)| (id.clone(), point.clone()))
                .collect();
            if filtered.is_empty() {
                continue;
            }
            subject.publish(&filtered);
            notified += 1;
        }

        debug!(
            "Published {} price(s) for {} to {} subject(s)",
            batch.len(),
            currency,
            notified
        );
        notified
    }

    /// Detach handle `id` from `key`, tearing down the subject and the
    /// currency's poller when they become unused.
    pub(crate) fn release(&self, key: &SubscriptionKey, id: HandleId) {
        let stopped = {
            let mut state = self.state.lock();
            let Some(subject) = state.subjects.get_mut(key) else {
                return;
            };
            if !subject.detach(id) || !subject.is_unreferenced() {
                return;
            }

            state.subjects.remove(key);
            info!("Removed subject {}", key);

            if state.has_subjects_for(key.currency()) {
                None
            } else {
                state.pollers.remove(key.currency())
            }
        };

        if let Some(mut poller) = stopped {
            poller.stop();
        }
    }

    /// Close every subscription for `currency` with `error` and stop its poller.
    fn fail_currency(&self, currency: &CurrencyCode, poller_id: PollerId, error: BrokerError) {
        let (subjects, poller) = {
            let mut state = self.state.lock();
            if !state.is_current_poller(currency, poller_id) {
                return;
            }
            let keys: Vec<SubscriptionKey> = state
                .subjects
                .keys()
                .filter(|key| key.currency() == currency)
                .cloned()
                .collect();
            let subjects: Vec<Subject> = keys
                .iter()
                .filter_map(|key| state.subjects.remove(key))
                .collect();
            (subjects, state.pollers.remove(currency))
        };

        warn!(
            "{}; closing {} subject(s)",
            error,
            subjects.len()
        );
        for subject in subjects {
            subject.fail(&error);
        }
        if let Some(mut poller) = poller {
            poller.stop();
        }
    }

    fn deliver(&self, poller_id: PollerId, currency: &CurrencyCode, batch: PriceBatch) {
        if !self.state.lock().is_current_poller(currency, poller_id) {
            debug!("Dropping stale result from poller {} for {}", poller_id, currency);
            return;
        }

        self.cache.put(&batch);

        let state = self.state.lock();
        if !state.is_current_poller(currency, poller_id) {
            debug!("Poller {} for {} removed during cache write", poller_id, currency);
            return;
        }
        self.publish_locked(&state, currency, &batch);
    }
}

impl PollDriver for BrokerInner {
    fn poll_targets(&self, poller_id: PollerId, currency: &CurrencyCode) -> Option<Vec<AssetId>> {
        let state = self.state.lock();
        if !state.is_current_poller(currency, poller_id) {
            return None;
        }
        Some(state.observed_asset_ids(currency).into_iter().collect())
    }

    fn on_poll_complete(
        &self,
        poller_id: PollerId,
        currency: &CurrencyCode,
        trigger: PollTrigger,
        result: Result<PriceBatch, SourceError>,
    ) {
        match result {
            Ok(batch) => {
                debug!(
                    "{:?} poll for {} returned {} price(s)",
                    trigger,
                    currency,
                    batch.len()
                );
                self.deliver(poller_id, currency, batch);
            }
            Err(err) => match BrokerError::from_source(currency, err) {
                fatal @ BrokerError::FatalCurrency { .. } => {
                    self.fail_currency(currency, poller_id, fatal)
                }
                transient => warn!("{:?} poll failed: {}", trigger, transient),
            },
        }
    }
}
