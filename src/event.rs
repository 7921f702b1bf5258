//! Service to coordinator notifications.

use anyhow::Result;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 16;

/// Events published by running services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A critical service stopped with an error; the daemon must exit.
    ControlFailure(String),
    SystemShutdown,
}

/// Broadcast channel shared between the coordinator and its services.
///
/// # Example
///
/// ```
/// use vision_pwmd::event::{Event, EventBus};
///
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
/// bus.publish(Event::SystemShutdown).unwrap();
/// assert_eq!(rx.try_recv().unwrap(), Event::SystemShutdown);
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { sender }
    }

    /// Fails when nobody is subscribed.
    pub fn publish(&self, event: Event) -> Result<()> {
        self.sender.send(event)?;
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::time::{Duration, sleep};

    #[test]
    fn clones_share_one_channel() {
        let bus = EventBus::new();
        let other = bus.clone();
        let _rx1 = bus.subscribe();
        let _rx2 = other.subscribe();
        assert_eq!(bus.sender.receiver_count(), 2);
    }

    #[test]
    fn publish_without_subscribers_fails() {
        let bus = EventBus::new();
        assert!(bus.publish(Event::SystemShutdown).is_err());

        let rx = bus.subscribe();
        drop(rx);
        assert!(bus.publish(Event::SystemShutdown).is_err());
    }

    #[tokio::test]
    async fn failure_reaches_every_subscriber_in_order() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(Event::ControlFailure("HIDIOCGUSAGE failed".into()))
            .unwrap();
        bus.publish(Event::SystemShutdown).unwrap();

        for rx in [&mut rx1, &mut rx2] {
            assert_eq!(
                rx.recv().await.unwrap(),
                Event::ControlFailure("HIDIOCGUSAGE failed".into())
            );
            assert_eq!(rx.recv().await.unwrap(), Event::SystemShutdown);
        }
    }

    #[tokio::test]
    async fn events_cross_task_boundaries() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let publisher = bus.clone();

        tokio::spawn(async move {
            sleep(Duration::from_millis(5)).await;
            publisher.publish(Event::SystemShutdown).unwrap();
        });

        assert_eq!(rx.recv().await.unwrap(), Event::SystemShutdown);
    }
}
