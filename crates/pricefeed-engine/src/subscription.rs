//! Consumer-side subscription handle.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;

use pricefeed_traits::PriceBatch;

use crate::broker::BrokerInner;
use crate::error::BrokerError;
use crate::key::SubscriptionKey;
use crate::subject::{HandleId, SubjectEvent};

/// A live subscription to price updates for one [`SubscriptionKey`].
///
/// Updates arrive in the order the broker published them. The stream ends
/// after the handle is cancelled, after the broker shuts down, or right after
/// a fatal error for the currency has been delivered.
///
/// Dropping the handle cancels it.
pub struct SubscriptionHandle {
    id: HandleId,
    key: SubscriptionKey,
    rx: mpsc::UnboundedReceiver<SubjectEvent>,
    broker: Weak<BrokerInner>,
    cancelled: AtomicBool,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        id: HandleId,
        key: SubscriptionKey,
        rx: mpsc::UnboundedReceiver<SubjectEvent>,
        broker: Weak<BrokerInner>,
    ) -> Self {
        Self {
            id,
            key,
            rx,
            broker,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Handle id, unique within its broker.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// The key this handle is attached to.
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Receives the next update.
    ///
    /// Returns `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<Result<PriceBatch, BrokerError>> {
        self.rx.recv().await.map(SubjectEvent::into_result)
    }

    /// Receives an update if one is already queued.
    pub fn try_recv(&mut self) -> Option<Result<PriceBatch, BrokerError>> {
        self.rx.try_recv().ok().map(SubjectEvent::into_result)
    }

    /// A stream view over the remaining updates.
    ///
    /// Dropping the stream does not cancel the subscription; calling
    /// `stream()` again resumes where the previous one stopped.
    pub fn stream(&mut self) -> PriceStream<'_> {
        PriceStream { rx: &mut self.rx }
    }

    /// Detach from the broker. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(broker) = self.broker.upgrade() {
            broker.release(&self.key, self.id);
        }
    }

    /// Returns true once [`cancel`](Self::cancel) has run.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Stream of updates borrowed from a [`SubscriptionHandle`].
pub struct PriceStream<'a> {
    rx: &'a mut mpsc::UnboundedReceiver<SubjectEvent>,
}

impl Stream for PriceStream<'_> {
    type Item = Result<PriceBatch, BrokerError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut()
            .rx
            .poll_recv(cx)
            .map(|event| event.map(SubjectEvent::into_result))
    }
}
