//! In-process invalidation bus.
//!
//! Anything that mutates the favorite store publishes here; anything that
//! derives state from it subscribes. Delivery is per-subscriber, one
//! notification per publish; order across subscribers is unspecified.
//! The bus is in-process only: not persisted, not networked.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::INVALIDATION_BUS_CAPACITY;

/// Typed invalidation payload. Subscribers that only need the "favorite
/// set changed, discard cached assumptions" signal can ignore the fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    FavoritesChanged { id: String, is_favorite: bool },
}

/// Cheap to clone; all clones publish into the same channel.
#[derive(Clone)]
pub struct InvalidationBus {
    tx: broadcast::Sender<Invalidation>,
}

impl InvalidationBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(INVALIDATION_BUS_CAPACITY);
        Self { tx }
    }

    /// Delivers the event to every live subscriber. Publishing with no
    /// subscribers is not an error.
    pub fn publish(&self, event: Invalidation) {
        let delivered = self.tx.send(event).unwrap_or(0);
        debug!(delivered, "invalidation published");
    }

    #[must_use]
    pub fn subscribe(&self) -> InvalidationReceiver {
        InvalidationReceiver {
            rx: self.tx.subscribe(),
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscription handle. Dropping it stops further deliveries.
pub struct InvalidationReceiver {
    rx: broadcast::Receiver<Invalidation>,
}

impl InvalidationReceiver {
    /// Next invalidation, or `None` once the bus itself is gone.
    ///
    /// A receiver that lagged past the channel capacity skips to the
    /// oldest retained event: some payloads are lost but a change is
    /// still observed, which is sufficient for consumers that reset
    /// wholesale.
    pub async fn recv(&mut self) -> Option<Invalidation> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "invalidation receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
