// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::sync::Arc;

use async_trait::async_trait;
use core_types::{
    Counters, LastVote,
    status::{OverallStatus, ServiceStatusHandle},
};
use log::warn;
use metrics::{Metrics, SideChannel};
use thiserror::Error;

use crate::event::{PublishFlags, UpdateEvent};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("channel {channel} unavailable: {reason}")]
    Unavailable { channel: String, reason: String },
}

/// A pub/sub service carrying one shared channel. Delivery is neither
/// guaranteed nor acknowledged.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, event: &UpdateEvent) -> Result<(), PublishError>;
    fn channel_name(&self) -> &str;
}

/// Best-effort front for a [`Publisher`]. Failures are logged, counted and
/// reflected in the realtime health status, never returned.
#[derive(Clone)]
pub struct StatePublisher {
    publisher: Arc<dyn Publisher>,
    metrics: Arc<Metrics>,
    status: ServiceStatusHandle,
}

impl StatePublisher {
    pub fn new(publisher: Arc<dyn Publisher>, metrics: Arc<Metrics>) -> Self {
        Self {
            publisher,
            metrics,
            status: ServiceStatusHandle::new("realtime"),
        }
    }

    pub fn status_handle(&self) -> ServiceStatusHandle {
        self.status.clone()
    }

    /// Returns whether the publisher accepted the event.
    pub async fn publish(
        &self,
        counters: Counters,
        snapshot: Option<LastVote>,
        flags: PublishFlags,
        timestamp: i64,
    ) -> bool {
        let event = UpdateEvent::new(counters, timestamp, snapshot, flags);
        match self.publisher.publish(&event).await {
            Ok(()) => {
                if self.status.overall() != OverallStatus::Ok {
                    self.status.mark_ok();
                }
                true
            }
            Err(err) => {
                warn!(
                    "[{}] failed to publish update: {err}",
                    self.publisher.channel_name()
                );
                self.metrics.inc_side_channel_failure(SideChannel::Broadcast);
                self.status.set_overall(OverallStatus::Warn);
                self.status.push_error(err.to_string());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::ChannelHub;
    use parking_lot::Mutex;

    struct FlakyPublisher {
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl Publisher for FlakyPublisher {
        async fn publish(&self, _event: &UpdateEvent) -> Result<(), PublishError> {
            if *self.fail.lock() {
                Err(PublishError::Unavailable {
                    channel: "global-counter".into(),
                    reason: "connection reset".into(),
                })
            } else {
                Ok(())
            }
        }

        fn channel_name(&self) -> &str {
            "global-counter"
        }
    }

    #[tokio::test]
    async fn failures_are_swallowed_and_reported_in_status() {
        let flaky = Arc::new(FlakyPublisher {
            fail: Mutex::new(true),
        });
        let metrics = Arc::new(Metrics::new().unwrap());
        let publisher = StatePublisher::new(flaky.clone(), metrics.clone());

        let delivered = publisher
            .publish(Counters::ZERO, None, PublishFlags::default(), 1)
            .await;
        assert!(!delivered);
        assert_eq!(metrics.side_channel_failures(SideChannel::Broadcast), 1);
        let status = publisher.status_handle().snapshot();
        assert_eq!(status.overall, OverallStatus::Warn);
        assert_eq!(status.errors.len(), 1);

        *flaky.fail.lock() = false;
        assert!(
            publisher
                .publish(Counters::ZERO, None, PublishFlags::default(), 2)
                .await
        );
        assert!(publisher.status_handle().snapshot().is_healthy());
    }

    #[tokio::test]
    async fn events_reach_hub_subscribers() {
        let hub = Arc::new(ChannelHub::new("global-counter", 4));
        let mut rx = hub.subscribe();
        let publisher = StatePublisher::new(hub, Arc::new(Metrics::new().unwrap()));

        publisher
            .publish(Counters([1, 1, -5]), None, PublishFlags::quota_reset(), 7)
            .await;
        let message = rx.recv().await.unwrap();
        assert_eq!(message.data.team_score, -3);
        assert_eq!(message.data.quota_was_reset, Some(true));
    }
}
