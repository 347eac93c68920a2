//! Session event bus
//!
//! The engine publishes an immutable snapshot on every state change so
//! observers (the live monitor, history writers) follow sessions without
//! polling shared storage. Observation cadence is the subscriber's problem;
//! slow subscribers see `Lagged` and re-sync from the next snapshot.

use crate::engine::session::SessionSnapshot;
use tokio::sync::broadcast;

#[derive(Clone, Debug)]
pub enum SessionEvent {
    Created(SessionSnapshot),
    NumberCalled {
        number: u8,
        snapshot: SessionSnapshot,
    },
    StatusChanged(SessionSnapshot),
    Ended(SessionSnapshot),
}

impl SessionEvent {
    pub fn snapshot(&self) -> &SessionSnapshot {
        match self {
            SessionEvent::Created(s) => s,
            SessionEvent::NumberCalled { snapshot, .. } => snapshot,
            SessionEvent::StatusChanged(s) => s,
            SessionEvent::Ended(s) => s,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish to whoever is listening; no subscribers is not an error
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::session::SessionStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            id: Uuid::new_v4(),
            room_id: "bronze".to_string(),
            status: SessionStatus::Waiting,
            paused: false,
            called: vec![],
            humans: vec![],
            bots: vec![],
            stake: 500,
            prize_pool: 0,
            commission_bps: 500,
            winner: None,
            cancel_reason: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let snap = snapshot();
        bus.publish(SessionEvent::Created(snap.clone()));
        match rx.recv().await.expect("event") {
            SessionEvent::Created(received) => assert_eq!(received.id, snap.id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new(16);
        bus.publish(SessionEvent::StatusChanged(snapshot()));
        assert_eq!(bus.observer_count(), 0);
    }
}
