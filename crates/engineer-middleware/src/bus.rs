//! Topic-based event bus for the operator UI.
//!
//! Each [`Topic`] is its own [`tokio::sync::broadcast`] lane: subscribers see
//! every event published after they subscribed, a slow subscriber only loses
//! its own backlog, and publishing never awaits, so the control tick and the
//! goal callbacks can publish directly.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Status`] | One [`EngineerCmd`][engineer_types::EngineerCmd] per step-queue feedback |
//! | [`Topic::Mode`] | Operating mode changes and finished goals |
//! | [`Topic::SystemAlerts`] | Rejected submissions, hardware faults |

use engineer_types::{Event, ManualError};
use tokio::sync::broadcast;
use tracing::trace;

/// Events buffered per lane before a lagging subscriber starts losing them.
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes of the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Step-queue progress records for the operator UI.
    Status,
    /// MANUAL / MIDDLEWARE transitions and goal results.
    Mode,
    /// Rejected submissions and hardware faults.
    SystemAlerts,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Status, Topic::Mode, Topic::SystemAlerts];

    const fn lane(self) -> usize {
        match self {
            Topic::Status => 0,
            Topic::Mode => 1,
            Topic::SystemAlerts => 2,
        }
    }
}

/// Handle to the bus.  Clones publish into and subscribe from the same
/// lanes.
#[derive(Clone, Debug)]
pub struct EventBus {
    lanes: [broadcast::Sender<Event>; 3],
}

impl EventBus {
    /// Bus whose lanes each buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            lanes: Topic::ALL.map(|_| broadcast::channel(capacity).0),
        }
    }

    /// Publish `event` on `topic`, returning how many subscribers got it.
    ///
    /// # Errors
    ///
    /// Returns [`ManualError::Channel`] when nobody is subscribed to `topic`.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, ManualError> {
        self.lanes[topic.lane()]
            .send(event)
            .map_err(|_| ManualError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Publish `event` and drop it silently if nobody listens.
    ///
    /// Used from the control tick and goal callbacks, where an absent
    /// operator UI is normal.
    pub fn notify(&self, topic: Topic, event: Event) {
        if self.publish_to(topic, event).is_err() {
            trace!(?topic, "event dropped, no subscribers");
        }
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.lanes[topic.lane()].subscribe(),
        }
    }

    /// Current number of subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.lanes[topic.lane()].receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Subscription to one [`Topic`], from [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Next event on the lane.  `Lagged(n)` means `n` events were overwritten
    /// before this subscriber read them; `Closed` means every bus handle is
    /// gone.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking poll, used by synchronous tests and the control tick.
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engineer_types::{EngineerCmd, EventPayload, OperatingMode};

    fn status_event(step: &str) -> Event {
        Event::new(
            "engineer-middleware::test",
            EventPayload::Status(EngineerCmd {
                current_step_name: step.to_string(),
                finished_step: 1,
                total_steps: 2,
                symbol: false,
            }),
        )
    }

    #[tokio::test]
    async fn every_subscriber_sees_each_status() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut sub1 = bus.subscribe_to(Topic::Status);
        let mut sub2 = bus.subscribe_to(Topic::Status);
        assert_eq!(bus.subscriber_count(Topic::Status), 2);
        assert_eq!(bus.subscriber_count(Topic::Mode), 0);

        let event = status_event("lift");
        assert_eq!(bus.publish_to(Topic::Status, event.clone())?, 2);

        assert_eq!(sub1.recv().await?.id, event.id);
        assert_eq!(sub2.recv().await?.id, event.id);
        Ok(())
    }

    #[tokio::test]
    async fn topics_are_isolated() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
        let _status = bus.subscribe_to(Topic::Status);

        bus.publish_to(Topic::Status, status_event("lift"))?;

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), alerts.recv()).await;
        assert!(result.is_err(), "SystemAlerts must not see Status traffic");
        assert_eq!(alerts.topic(), Topic::SystemAlerts);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_channel_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(
            Topic::Mode,
            Event::new(
                "test",
                EventPayload::ModeChanged {
                    mode: OperatingMode::Manual,
                },
            ),
        );
        assert!(matches!(result, Err(ManualError::Channel(_))));
    }

    #[test]
    fn notify_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.notify(Topic::Status, status_event("lift"));

        let mut sub = bus.subscribe_to(Topic::Status);
        bus.notify(Topic::Status, status_event("extend"));
        let got = sub.try_recv().unwrap();
        match got.payload {
            EventPayload::Status(cmd) => assert_eq!(cmd.current_step_name, "extend"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_subscriber_lags() {
        let bus = EventBus::new(16);
        let mut slow = bus.subscribe_to(Topic::Status);
        for _ in 0..100 {
            bus.notify(Topic::Status, status_event("flood"));
        }
        let result = slow.recv().await;
        assert!(matches!(result, Err(broadcast::error::RecvError::Lagged(_))));
    }
}
