use crate::message::Frame;
use log::*;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};

/// Number of frames a subscriber may have pending before new ones are dropped.
pub const CLIENT_BUFFER: usize = 16;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of connected subscribers.
///
/// Membership changes take the write lock; broadcasts only take the read lock,
/// so concurrent broadcasts never serialize against each other.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Sender<Frame>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new subscriber and hand back the receiving end of its buffer.
    pub fn register(&self) -> (ConnectionId, Receiver<Frame>) {
        let connection_id = ConnectionId::new();
        let (sender, receiver) = mpsc::channel(CLIENT_BUFFER);

        self.connections
            .write()
            .insert(connection_id.clone(), sender);

        (connection_id, receiver)
    }

    pub fn unregister(&self, connection_id: &ConnectionId) {
        self.connections.write().remove(connection_id);
    }

    /// Offer `frame` to every subscriber without waiting.
    ///
    /// A subscriber whose buffer is full misses this frame; the others are
    /// unaffected. Returns the number of subscribers that accepted it.
    pub fn broadcast(&self, frame: &Frame) -> usize {
        let connections = self.connections.read();
        let mut delivered = 0;

        for (connection_id, sender) in connections.iter() {
            match sender.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    trace!(
                        "Dropping frame for slow connection {}",
                        connection_id.as_str()
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    trace!(
                        "Dropping frame for closing connection {}",
                        connection_id.as_str()
                    );
                }
            }
        }

        delivered
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered subscriber.
///
/// Dropping the subscription removes it from the registry, whichever way the
/// owning task ends.
pub struct Subscription {
    connection_id: ConnectionId,
    receiver: Receiver<Frame>,
    registry: Arc<ConnectionRegistry>,
}

impl Subscription {
    pub(crate) fn new(registry: Arc<ConnectionRegistry>) -> Self {
        let (connection_id, receiver) = registry.register();
        Self {
            connection_id,
            receiver,
            registry,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Wait for the next frame. Returns `None` once the subscription has been
    /// removed from the registry and its buffer is drained.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!(
            "Removing SSE connection {} from registry",
            self.connection_id.as_str()
        );
        self.registry.unregister(&self.connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister_track_membership() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = registry.register();
        let (second, _rx2) = registry.register();
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);

        registry.unregister(&first);
        assert_eq!(registry.len(), 1);

        // Removing an unknown id is a no-op.
        registry.unregister(&first);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn broadcast_drops_frames_once_buffer_is_full() {
        let registry = ConnectionRegistry::new();
        let (_id, mut rx) = registry.register();

        for i in 0..CLIENT_BUFFER {
            assert_eq!(registry.broadcast(&Frame::new("message", &i.to_string())), 1);
        }
        assert_eq!(registry.broadcast(&Frame::new("message", "overflow")), 0);

        for i in 0..CLIENT_BUFFER {
            let frame = rx.try_recv().expect("buffered frame");
            assert_eq!(frame, Frame::new("message", &i.to_string()));
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropping_subscription_unregisters_it() {
        let registry = Arc::new(ConnectionRegistry::new());
        let subscription = Subscription::new(Arc::clone(&registry));
        assert_eq!(registry.len(), 1);

        drop(subscription);
        assert!(registry.is_empty());
    }
}
