use crate::connection::{ConnectionRegistry, Subscription};
use crate::error::{Error, Result};
use crate::message::{Frame, DEFAULT_EVENT};
use crate::sink::EventSink;
use log::*;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// Fans event-stream frames out to every connected client.
///
/// `Hub` is meant to be created once per server and shared behind an `Arc`.
/// Publishing never blocks: a client that does not keep up with its
/// [`crate::connection::CLIENT_BUFFER`] pending frames simply misses new ones.
pub struct Hub {
    registry: Arc<ConnectionRegistry>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Register a new subscriber. It stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe(&self) -> Subscription {
        let subscription = Subscription::new(Arc::clone(&self.registry));
        info!(
            "Registered new SSE connection {}",
            subscription.connection_id().as_str()
        );
        subscription
    }

    /// Serve one client until `cancelled` resolves or the sink fails.
    ///
    /// The sink is checked for incremental flushing and opened before the
    /// client is registered, so a rejected connection never shows up in
    /// [`Hub::client_count`]. The subscription is dropped, and therefore
    /// unregistered, on every exit path.
    pub async fn serve<S, C>(&self, sink: &mut S, cancelled: C) -> Result<()>
    where
        S: EventSink,
        C: Future<Output = ()>,
    {
        if !sink.supports_flush() {
            warn!("Rejecting SSE connection: transport cannot flush incrementally");
            return Err(Error::streaming_unsupported());
        }

        sink.open().await?;

        let mut subscription = self.subscribe();
        tokio::pin!(cancelled);

        loop {
            tokio::select! {
                _ = &mut cancelled => {
                    debug!(
                        "SSE connection {} cancelled",
                        subscription.connection_id().as_str()
                    );
                    return Ok(());
                }
                frame = subscription.recv() => {
                    let Some(frame) = frame else {
                        return Ok(());
                    };
                    sink.write_frame(&frame).await?;
                    sink.flush().await?;
                }
            }
        }
    }

    /// Broadcast `data` under the default `message` event name.
    pub fn send(&self, data: &str) -> usize {
        self.send_event(DEFAULT_EVENT, data)
    }

    /// Broadcast `data` under `event` to every connected client.
    ///
    /// Returns the number of clients that accepted the frame.
    pub fn send_event(&self, event: &str, data: &str) -> usize {
        let frame = Frame::new(event, data);
        let delivered = self.registry.broadcast(&frame);
        trace!(
            "Broadcast '{event}' event to {delivered} of {} connection(s)",
            self.registry.len()
        );
        delivered
    }

    /// Serialize `value` as compact JSON and broadcast it under `event`.
    ///
    /// Nothing is broadcast if serialization fails.
    pub fn send_json<T>(&self, event: &str, value: &T) -> Result<usize>
    where
        T: Serialize + ?Sized,
    {
        let data = serde_json::to_string(value).map_err(|e| {
            error!("Failed to serialize SSE event '{event}': {e}");
            Error::from(e)
        })?;
        Ok(self.send_event(event, &data))
    }

    /// Number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::CLIENT_BUFFER;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use serde::ser::Error as _;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};

    /// Sink that forwards every written frame to a channel.
    struct ChannelSink {
        flushable: bool,
        opened: bool,
        frames: mpsc::UnboundedSender<String>,
    }

    impl ChannelSink {
        fn new(flushable: bool) -> (Self, mpsc::UnboundedReceiver<String>) {
            let (frames, rx) = mpsc::unbounded_channel();
            (
                Self {
                    flushable,
                    opened: false,
                    frames,
                },
                rx,
            )
        }
    }

    #[async_trait]
    impl EventSink for ChannelSink {
        fn supports_flush(&self) -> bool {
            self.flushable
        }

        async fn open(&mut self) -> Result<()> {
            self.opened = true;
            Ok(())
        }

        async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
            assert!(self.opened, "frame written before the stream was opened");
            self.frames
                .send(frame.as_str().to_owned())
                .map_err(Error::transport)
        }

        async fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> core::result::Result<S::Ok, S::Error> {
            Err(S::Error::custom("cannot serialize"))
        }
    }

    async fn wait_for_clients(hub: &Hub, expected: usize) {
        for _ in 0..100 {
            if hub.client_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(hub.client_count(), expected);
    }

    fn spawn_client(
        hub: &Arc<Hub>,
    ) -> (
        oneshot::Sender<()>,
        mpsc::UnboundedReceiver<String>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let (cancel, cancelled) = oneshot::channel::<()>();
        let (mut sink, frames) = ChannelSink::new(true);
        let hub = Arc::clone(hub);
        let task = tokio::spawn(async move {
            hub.serve(&mut sink, async move {
                let _ = cancelled.await;
            })
            .await
        });
        (cancel, frames, task)
    }

    #[tokio::test]
    async fn single_client_receives_event() {
        let hub = Arc::new(Hub::new());
        let (_cancel, mut frames, _task) = spawn_client(&hub);
        wait_for_clients(&hub, 1).await;

        assert_eq!(hub.send_event("greeting", "Hello, world!"), 1);
        assert_eq!(
            frames.recv().await.as_deref(),
            Some("event: greeting\ndata: Hello, world!\n\n")
        );
    }

    #[tokio::test]
    async fn send_uses_message_event_for_every_client() {
        let hub = Arc::new(Hub::new());
        let clients: Vec<_> = (0..3).map(|_| spawn_client(&hub)).collect();
        wait_for_clients(&hub, 3).await;

        assert_eq!(hub.send("broadcast message"), 3);
        for (_cancel, mut frames, _task) in clients {
            assert_eq!(
                frames.recv().await.as_deref(),
                Some("event: message\ndata: broadcast message\n\n")
            );
        }
    }

    #[tokio::test]
    async fn cancellation_unregisters_client() {
        let hub = Arc::new(Hub::new());
        let (cancel, _frames, task) = spawn_client(&hub);
        wait_for_clients(&hub, 1).await;

        cancel.send(()).expect("serve loop is waiting");
        task.await.expect("serve task").expect("serve result");
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn aborted_serve_task_still_unregisters_client() {
        let hub = Arc::new(Hub::new());
        let (_cancel, _frames, task) = spawn_client(&hub);
        wait_for_clients(&hub, 1).await;

        task.abort();
        let _ = task.await;
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn failed_write_ends_serving_and_unregisters() {
        let hub = Arc::new(Hub::new());
        let (_cancel, frames, task) = spawn_client(&hub);
        wait_for_clients(&hub, 1).await;

        drop(frames);
        hub.send("nobody is listening");

        let err = task.await.expect("serve task").unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Transport);
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn unflushable_sink_is_rejected_before_registration() {
        let hub = Hub::new();
        let (mut sink, _frames) = ChannelSink::new(false);

        let err = hub
            .serve(&mut sink, std::future::pending::<()>())
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::StreamingUnsupported);
        assert_eq!(err.to_string(), "streaming unsupported");
        assert!(!sink.opened);
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn send_json_broadcasts_compact_json() {
        #[derive(Serialize)]
        struct Payload {
            id: u32,
            message: &'static str,
        }

        let hub = Arc::new(Hub::new());
        let (_cancel, mut frames, _task) = spawn_client(&hub);
        wait_for_clients(&hub, 1).await;

        let delivered = hub
            .send_json(
                "status",
                &Payload {
                    id: 42,
                    message: "test",
                },
            )
            .expect("payload serializes");
        assert_eq!(delivered, 1);
        assert_eq!(
            frames.recv().await.as_deref(),
            Some("event: status\ndata: {\"id\":42,\"message\":\"test\"}\n\n")
        );
    }

    #[tokio::test]
    async fn send_json_failure_broadcasts_nothing() {
        let hub = Hub::new();
        let mut subscription = hub.subscribe();

        let err = hub.send_json("status", &Unserializable).unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Serialization);

        // Maps with non-string keys are rejected by serde_json as well.
        let mut bad_keys = HashMap::new();
        bad_keys.insert(vec![1u8], "value");
        assert!(hub.send_json("status", &bad_keys).is_err());

        hub.send("after");
        assert_eq!(subscription.recv().await, Some(Frame::new("message", "after")));
    }

    #[tokio::test]
    async fn stalled_client_drops_overflow_while_others_receive_everything() {
        let hub = Arc::new(Hub::new());
        let (_c1, mut fast_one, _t1) = spawn_client(&hub);
        let (_c2, mut fast_two, _t2) = spawn_client(&hub);
        let mut stalled = hub.subscribe();
        wait_for_clients(&hub, 3).await;

        let total = CLIENT_BUFFER + 4;
        for i in 0..total {
            hub.send(&i.to_string());
            // Let the serving loops drain between broadcasts.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        for frames in [&mut fast_one, &mut fast_two] {
            for i in 0..total {
                let expected = Frame::new("message", &i.to_string());
                assert_eq!(frames.recv().await.as_deref(), Some(expected.as_str()));
            }
        }

        for i in 0..CLIENT_BUFFER {
            assert_eq!(stalled.recv().await, Some(Frame::new("message", &i.to_string())));
        }
        // Everything past the sixteenth frame was dropped for the stalled client.
        hub.send("fresh");
        assert_eq!(stalled.recv().await, Some(Frame::new("message", "fresh")));
    }

    #[tokio::test]
    async fn broadcast_returns_without_waiting_on_full_buffers() {
        let hub = Hub::new();
        let _stalled: Vec<_> = (0..8).map(|_| hub.subscribe()).collect();

        for _ in 0..CLIENT_BUFFER {
            assert_eq!(hub.send("fill"), 8);
        }
        let delivered = tokio::time::timeout(Duration::from_secs(1), async { hub.send("overflow") })
            .await
            .expect("broadcast returned promptly");
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn concurrent_subscribe_and_unsubscribe_settle_to_difference() {
        let hub = Arc::new(Hub::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let hub = Arc::clone(&hub);
            handles.push(tokio::spawn(async move { hub.subscribe() }));
        }

        let mut subscriptions = Vec::new();
        for handle in handles {
            subscriptions.push(handle.await.expect("subscribe task"));
        }
        assert_eq!(hub.client_count(), 32);

        let removed: Vec<_> = subscriptions.drain(..12).collect();
        let mut drops = Vec::new();
        for subscription in removed {
            drops.push(tokio::spawn(async move { drop(subscription) }));
        }
        for handle in drops {
            handle.await.expect("unsubscribe task");
        }
        assert_eq!(hub.client_count(), 20);
    }
}
