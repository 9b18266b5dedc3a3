use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use uuid::Uuid;

use crate::database::models::Notification;

/// In-process pub/sub for freshly stored notifications
#[derive(Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many subscribers saw the notification; zero is not an error
    pub fn publish(&self, notification: Notification) -> usize {
        match self.sender.send(notification) {
            Ok(receivers) => receivers,
            Err(_) => 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Notifications addressed to `user_id`. Lagged events are skipped.
    pub fn stream_for(&self, user_id: Uuid) -> impl Stream<Item = Notification> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(move |item| async move {
            match item {
                Ok(notification) if notification.user_id == user_id => Some(notification),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::debug!("Notification stream for {} skipped {} events", user_id, skipped);
                    None
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn notification(user_id: Uuid, n: i64) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: "message".to_string(),
            payload: json!({ "n": n }),
            read_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn publish_without_subscribers() {
        let hub = NotificationHub::new(4);
        assert_eq!(hub.publish(notification(Uuid::new_v4(), 1)), 0);
    }

    #[tokio::test]
    async fn stream_only_yields_own_notifications() {
        let hub = NotificationHub::new(16);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let stream = hub.stream_for(alice);
        tokio::pin!(stream);

        hub.publish(notification(bob, 1));
        hub.publish(notification(alice, 2));

        let got = stream.next().await.unwrap();
        assert_eq!(got.user_id, alice);
        assert_eq!(got.payload["n"], 2);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_missed_events() {
        let hub = NotificationHub::new(2);
        let alice = Uuid::new_v4();
        let stream = hub.stream_for(alice);
        tokio::pin!(stream);

        for n in 0..5 {
            hub.publish(notification(alice, n));
        }

        // Capacity 2 keeps only the newest two
        assert_eq!(stream.next().await.unwrap().payload["n"], 3);
        assert_eq!(stream.next().await.unwrap().payload["n"], 4);
    }
}
