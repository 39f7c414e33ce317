// Copyright (c) James Kassemi, SC, US. All rights reserved.
use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::{
    event::{UPDATE_EVENT_NAME, UpdateEvent},
    publisher::{PublishError, Publisher},
};

/// One message as observed by channel subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub name: &'static str,
    pub data: UpdateEvent,
}

/// Named in-process pub/sub channel. Delivery is fire-and-forget: slow
/// subscribers lag and drop messages, and publishing with nobody listening
/// is not an error.
#[derive(Clone)]
pub struct ChannelHub {
    name: String,
    sender: broadcast::Sender<ChannelMessage>,
}

impl ChannelHub {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            name: name.into(),
            sender,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl Publisher for ChannelHub {
    async fn publish(&self, event: &UpdateEvent) -> Result<(), PublishError> {
        let message = ChannelMessage {
            channel: self.name.clone(),
            name: UPDATE_EVENT_NAME,
            data: event.clone(),
        };
        match self.sender.send(message) {
            Ok(receivers) => debug!("[{}] update delivered to {receivers} subscriber(s)", self.name),
            Err(_) => debug!("[{}] update published with no subscribers", self.name),
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PublishFlags;
    use core_types::Counters;

    #[tokio::test]
    async fn subscribers_receive_update_events() {
        let hub = ChannelHub::new("global-counter", 8);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        let event = UpdateEvent::new(Counters([1, 2, 3]), 5, None, PublishFlags::default());
        hub.publish(&event).await.unwrap();

        for rx in [&mut first, &mut second] {
            let message = rx.recv().await.unwrap();
            assert_eq!(message.channel, "global-counter");
            assert_eq!(message.name, "update");
            assert_eq!(message.data.team_score, 6);
        }
    }

    #[tokio::test]
    async fn publishing_without_subscribers_succeeds() {
        let hub = ChannelHub::new("global-counter", 8);
        let event = UpdateEvent::new(Counters::ZERO, 5, None, PublishFlags::default());
        assert!(hub.publish(&event).await.is_ok());
    }
}
