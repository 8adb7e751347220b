//! Broadcast hub for live alert subscribers
//!
//! The hub owns the set of connected subscribers. Callers only ever go through
//! [`BroadcastHub::subscribe`], [`BroadcastHub::unsubscribe`] and
//! [`BroadcastHub::broadcast`].
//!
//! A subscriber whose delivery fails (or exceeds [`SEND_TIMEOUT`]) is treated
//! as disconnected and pruned; the remaining subscribers still receive the
//! message.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, instrument, trace, warn};

/// Upper bound on a single subscriber delivery
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Identifier handed out by [`BroadcastHub::subscribe`]
pub type SubscriberId = u64;

/// A live connection able to receive text frames
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn send_text(&self, text: &str) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct BroadcastHub {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection whose handshake has completed
    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(id, subscriber);
        debug!("subscriber {id} connected ({} active)", subscribers.len());
        id
    }

    /// Remove a connection; removing an unknown id is a no-op
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let removed = subscribers.remove(&id).is_some();
        if removed {
            debug!("subscriber {id} disconnected ({} active)", subscribers.len());
        }
        removed
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Deliver `message` to every active subscriber
    ///
    /// Returns the number of successful deliveries. Failing subscribers are
    /// removed; nothing is raised to the caller.
    #[instrument(skip(self, message))]
    pub async fn broadcast(&self, message: &str) -> usize {
        let snapshot: Vec<(SubscriberId, Arc<dyn Subscriber>)> = self
            .subscribers
            .read()
            .await
            .iter()
            .map(|(id, subscriber)| (*id, subscriber.clone()))
            .collect();

        if snapshot.is_empty() {
            trace!("no subscribers for broadcast");
            return 0;
        }

        let results = join_all(snapshot.into_iter().map(|(id, subscriber)| async move {
            match timeout(SEND_TIMEOUT, subscriber.send_text(message)).await {
                Ok(Ok(())) => (id, true),
                Ok(Err(e)) => {
                    warn!("delivery to subscriber {id} failed: {e:#}");
                    (id, false)
                }
                Err(_) => {
                    warn!("delivery to subscriber {id} timed out");
                    (id, false)
                }
            }
        }))
        .await;

        let failed: Vec<SubscriberId> = results
            .iter()
            .filter(|(_, delivered)| !delivered)
            .map(|(id, _)| *id)
            .collect();

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in &failed {
                subscribers.remove(id);
            }
            debug!(
                "pruned {} subscriber(s), {} active",
                failed.len(),
                subscribers.len()
            );
        }

        results.len() - failed.len()
    }
}
