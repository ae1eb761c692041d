//! Live gallery updates: connection registry, event fan-out, and the SSE
//! stream adapter
//!
//! The registry is process-memory only. Connections do not survive a
//! restart and an event published here reaches only channels held open by
//! this process; a multi-instance deployment would need a shared pub/sub
//! backbone behind the same surface.

use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use axum::response::sse::Event;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Events pushed to open gallery sessions
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GalleryEvent {
    /// Initial acknowledgment sent when a channel opens
    Connected,
    /// A new photo passed moderation and is visible in the gallery
    NewPhoto {
        #[serde(rename = "photoId")]
        photo_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

/// Process-wide registry of live gallery subscriber channels.
///
/// Cloning is cheap; all clones share one table. Senders are unbounded and
/// non-blocking, so fan-out can run under the table lock, which is what
/// guarantees every subscriber observes events in publish order and never
/// sees a half-inserted entry.
#[derive(Clone, Default)]
pub struct GalleryHub {
    connections: Arc<Mutex<HashMap<Uuid, mpsc::UnboundedSender<String>>>>,
}

impl GalleryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber channel. The `connected` acknowledgment is
    /// queued before the channel becomes visible to publishers, so it is
    /// always the first frame a client observes.
    pub fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        if let Ok(frame) = serde_json::to_string(&GalleryEvent::Connected) {
            let _ = tx.send(frame);
        }

        self.table().insert(id, tx);
        debug!("Registered gallery connection {}", id);

        (id, rx)
    }

    /// Remove a subscriber channel
    pub fn unregister(&self, id: Uuid) {
        self.table().remove(&id);
        debug!("Unregistered gallery connection {}", id);
    }

    /// Broadcast an event to every registered channel.
    ///
    /// Fire-and-forget: neither serialization nor delivery problems reach
    /// the caller that triggered the event, and a failed channel does not
    /// stop delivery to the rest.
    pub fn publish(&self, event: &GalleryEvent) {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize gallery event: {}", e);
                return;
            }
        };

        let table = self.table();
        for (id, tx) in table.iter() {
            if tx.send(frame.clone()).is_err() {
                warn!("Dropping gallery event for closed connection {}", id);
            }
        }
    }

    /// Number of currently registered connections
    pub fn connection_count(&self) -> usize {
        self.table().len()
    }

    /// Open a subscriber stream suitable for an SSE response. The stream
    /// unregisters itself when dropped, so a transport abort cleans up the
    /// registry entry immediately.
    pub fn subscribe(&self) -> UpdateStream {
        let (id, rx) = self.register();

        UpdateStream {
            id,
            hub: self.clone(),
            rx,
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<Uuid, mpsc::UnboundedSender<String>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// One client's live update channel, yielding SSE events one per frame
pub struct UpdateStream {
    id: Uuid,
    hub: GalleryHub,
    rx: mpsc::UnboundedReceiver<String>,
}

impl Stream for UpdateStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx
            .poll_recv(cx)
            .map(|frame| frame.map(|frame| Ok(Event::default().data(frame))))
    }
}

impl Drop for UpdateStream {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_photo_event() -> GalleryEvent {
        GalleryEvent::NewPhoto {
            photo_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }

    fn frame_of(event: &GalleryEvent) -> String {
        serde_json::to_string(event).unwrap()
    }

    #[test]
    fn events_serialize_to_the_wire_format() {
        assert_eq!(
            serde_json::to_string(&GalleryEvent::Connected).unwrap(),
            r#"{"type":"connected"}"#
        );

        let frame = frame_of(&new_photo_event());
        assert!(frame.contains(r#""type":"new-photo""#));
        assert!(frame.contains(r#""photoId""#));
        assert!(frame.contains(r#""timestamp""#));
    }

    #[tokio::test]
    async fn delivers_events_to_all_connections_in_publish_order() {
        let hub = GalleryHub::new();
        let (_id_a, mut rx_a) = hub.register();
        let (_id_b, mut rx_b) = hub.register();

        let first = new_photo_event();
        let second = new_photo_event();
        let third = new_photo_event();

        hub.publish(&first);
        hub.publish(&second);
        hub.publish(&third);

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(
                rx.recv().await.unwrap(),
                frame_of(&GalleryEvent::Connected)
            );
            assert_eq!(rx.recv().await.unwrap(), frame_of(&first));
            assert_eq!(rx.recv().await.unwrap(), frame_of(&second));
            assert_eq!(rx.recv().await.unwrap(), frame_of(&third));
        }
    }

    #[test]
    fn publish_with_no_connections_is_a_noop() {
        let hub = GalleryHub::new();
        hub.publish(&new_photo_event());
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn unregistered_connection_receives_nothing_further() {
        let hub = GalleryHub::new();
        let (id_a, mut rx_a) = hub.register();
        let (_id_b, mut rx_b) = hub.register();

        hub.unregister(id_a);
        hub.publish(&new_photo_event());

        // The removed connection drains its acknowledgment, then the
        // channel is closed with nothing else delivered
        assert_eq!(
            rx_a.recv().await.unwrap(),
            frame_of(&GalleryEvent::Connected)
        );
        assert!(rx_a.recv().await.is_none());

        assert_eq!(
            rx_b.recv().await.unwrap(),
            frame_of(&GalleryEvent::Connected)
        );
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn a_dead_receiver_does_not_break_fanout() {
        let hub = GalleryHub::new();
        let (_id_a, rx_a) = hub.register();
        drop(rx_a);

        let (_id_b, mut rx_b) = hub.register();

        let event = new_photo_event();
        hub.publish(&event);

        assert_eq!(
            rx_b.recv().await.unwrap(),
            frame_of(&GalleryEvent::Connected)
        );
        assert_eq!(rx_b.recv().await.unwrap(), frame_of(&event));
    }

    #[tokio::test]
    async fn dropping_a_stream_unregisters_its_connection() {
        let hub = GalleryHub::new();

        let stream = hub.subscribe();
        assert_eq!(hub.connection_count(), 1);

        drop(stream);
        assert_eq!(hub.connection_count(), 0);
    }
}
