//! Per-key fan-out point.

use std::collections::HashMap;

use tokio::sync::mpsc;

use pricefeed_traits::PriceBatch;

use crate::error::BrokerError;

/// Identifier of one subscription handle.
pub type HandleId = u64;

/// Event queued to a subscription handle.
#[derive(Debug, Clone)]
pub(crate) enum SubjectEvent {
    /// Prices for (a subset of) the handle's assets.
    Prices(PriceBatch),
    /// Unrecoverable error; the subscription is closed after this.
    Failed(BrokerError),
}

impl SubjectEvent {
    pub(crate) fn into_result(self) -> Result<PriceBatch, BrokerError> {
        match self {
            SubjectEvent::Prices(batch) => Ok(batch),
            SubjectEvent::Failed(err) => Err(err),
        }
    }
}

/// Live handles sharing one subscription key.
///
/// Each handle has its own queue. The reference count is the number of
/// attached handles, so detaching an id twice is harmless.
#[derive(Default)]
pub(crate) struct Subject {
    listeners: HashMap<HandleId, mpsc::UnboundedSender<SubjectEvent>>,
}

impl Subject {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(&mut self, id: HandleId, tx: mpsc::UnboundedSender<SubjectEvent>) {
        self.listeners.insert(id, tx);
    }

    /// Returns true if `id` was attached.
    pub(crate) fn detach(&mut self, id: HandleId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn is_unreferenced(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Queue `batch` for every handle.
    pub(crate) fn publish(&self, batch: &PriceBatch) {
        for tx in self.listeners.values() {
            // A closed queue belongs to a handle being dropped; its detach follows.
            let _ = tx.send(SubjectEvent::Prices(batch.clone()));
        }
    }

    /// Deliver `error` to every handle and close all queues.
    pub(crate) fn fail(self, error: &BrokerError) {
        for tx in self.listeners.into_values() {
            let _ = tx.send(SubjectEvent::Failed(error.clone()));
        }
    }
}
