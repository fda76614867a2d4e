use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use parley_types::events::GatewayEvent;

/// Fans realtime events out to the live connections of each identity.
///
/// Every identity owns one logical channel keyed by its user id. A user may
/// hold several simultaneous connections (multiple devices); all of them are
/// subscribed to the same channel and all receive every publish. The table
/// is process-local and written only by the handshake (subscribe) and
/// disconnect (unsubscribe) paths.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// user_id -> conn_id -> sender for that connection's event loop
    channels: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Bind a new connection to an identity's channel. Returns the
    /// connection id and the receiving end the socket's send loop drains.
    pub async fn subscribe(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .channels
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Remove exactly one connection's subscription. Other connections of
    /// the same identity are untouched.
    pub async fn unsubscribe(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.channels.write().await;
        if let Some(conns) = channels.get_mut(&user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// Deliver an event to every live connection of an identity. Returns how
    /// many connections were reached; zero means the event was dropped.
    /// There is no store-and-forward, the persisted record is the durable
    /// copy.
    pub async fn publish(&self, user_id: Uuid, event: GatewayEvent) -> usize {
        let channels = self.inner.channels.read().await;
        let Some(conns) = channels.get(&user_id) else {
            return 0;
        };

        let mut delivered = 0;
        for tx in conns.values() {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of live connections currently bound to an identity.
    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner
            .channels
            .read()
            .await
            .get(&user_id)
            .map_or(0, HashMap::len)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> GatewayEvent {
        GatewayEvent::Ready {
            user_id: Uuid::new_v4(),
            username: "alice".into(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_connection_of_the_user() {
        let dispatcher = Dispatcher::new();
        let bob = Uuid::new_v4();

        let (_phone, mut phone_rx) = dispatcher.subscribe(bob).await;
        let (_laptop, mut laptop_rx) = dispatcher.subscribe(bob).await;

        let delivered = dispatcher.publish(bob, sample_event()).await;
        assert_eq!(delivered, 2);
        assert!(phone_rx.recv().await.is_some());
        assert!(laptop_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn publish_is_scoped_to_the_target_identity() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (_conn, mut alice_rx) = dispatcher.subscribe(alice).await;

        let delivered = dispatcher.publish(bob, sample_event()).await;
        assert_eq!(delivered, 0);
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_drops_the_event() {
        let dispatcher = Dispatcher::new();
        let delivered = dispatcher.publish(Uuid::new_v4(), sample_event()).await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn unsubscribe_removes_only_that_connection() {
        let dispatcher = Dispatcher::new();
        let bob = Uuid::new_v4();

        let (phone, _phone_rx) = dispatcher.subscribe(bob).await;
        let (_laptop, mut laptop_rx) = dispatcher.subscribe(bob).await;

        dispatcher.unsubscribe(bob, phone).await;
        assert_eq!(dispatcher.connection_count(bob).await, 1);

        let delivered = dispatcher.publish(bob, sample_event()).await;
        assert_eq!(delivered, 1);
        assert!(laptop_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn last_unsubscribe_clears_the_channel_entry() {
        let dispatcher = Dispatcher::new();
        let bob = Uuid::new_v4();

        let (conn, _rx) = dispatcher.subscribe(bob).await;
        dispatcher.unsubscribe(bob, conn).await;

        assert_eq!(dispatcher.connection_count(bob).await, 0);
        assert_eq!(dispatcher.publish(bob, sample_event()).await, 0);
    }
}
