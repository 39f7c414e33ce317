// Copyright (c) James Kassemi, SC, US. All rights reserved.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use core_types::{Identity, RetryPolicy};
use ledger::{Ballot, LedgerConfig, LedgerController, ManualClock};
use metrics::Metrics;
use parking_lot::Mutex;
use realtime::{ChannelHub, PublishError, Publisher, StatePublisher, UpdateEvent};
use storage::{KvStore, MemoryStore, StoreError, StoreResult};

/// Memory store that fails every primitive on keys with a blocked prefix,
/// and can delete a key right after an increment to stand in for a reset
/// landing mid-vote.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    blocked: Mutex<Vec<String>>,
    delete_after_incr: Mutex<Option<(String, String)>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&self, prefix: &str) {
        self.blocked.lock().push(prefix.to_string());
    }

    pub fn heal(&self) {
        self.blocked.lock().clear();
    }

    /// The next successful `incr` on a key starting with `prefix` deletes
    /// `victim` before returning.
    pub fn delete_after_next_incr(&self, prefix: &str, victim: &str) {
        *self.delete_after_incr.lock() = Some((prefix.to_string(), victim.to_string()));
    }

    fn check(&self, key: &str) -> StoreResult<()> {
        if self
            .blocked
            .lock()
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()))
        {
            return Err(StoreError::unavailable(format!("injected fault on {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FaultyStore {
    async fn get_int(&self, key: &str) -> StoreResult<Option<i64>> {
        self.check(key)?;
        self.inner.get_int(key).await
    }

    async fn set_int(&self, key: &str, value: i64) -> StoreResult<()> {
        self.check(key)?;
        self.inner.set_int(key, value).await
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.check(key)?;
        let value = self.inner.incr(key).await?;
        let victim = {
            let mut pending = self.delete_after_incr.lock();
            let fires = matches!(
                pending.as_ref(),
                Some((prefix, _)) if key.starts_with(prefix.as_str())
            );
            if fires {
                pending.take().map(|(_, victim)| victim)
            } else {
                None
            }
        };
        if let Some(victim) = victim {
            self.inner.del(&victim).await?;
        }
        Ok(value)
    }

    async fn decr(&self, key: &str) -> StoreResult<i64> {
        self.check(key)?;
        self.inner.decr(key).await
    }

    async fn decr_if_positive(&self, key: &str) -> StoreResult<i64> {
        self.check(key)?;
        self.inner.decr_if_positive(key).await
    }

    async fn get_str(&self, key: &str) -> StoreResult<Option<String>> {
        self.check(key)?;
        self.inner.get_str(key).await
    }

    async fn set_str(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check(key)?;
        self.inner.set_str(key, value).await
    }

    async fn set_str_if_absent(&self, key: &str, value: &str) -> StoreResult<String> {
        self.check(key)?;
        self.inner.set_str_if_absent(key, value).await
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.check(key)?;
        self.inner.sadd(key, member).await
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        self.check(key)?;
        self.inner.smembers(key).await
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        self.check(key)?;
        self.inner.scard(key).await
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        self.check(key)?;
        self.inner.del(key).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check("")?;
        self.inner.ping().await
    }
}

/// Publisher whose channel is always down.
pub struct DownPublisher;

#[async_trait]
impl Publisher for DownPublisher {
    async fn publish(&self, _event: &UpdateEvent) -> Result<(), PublishError> {
        Err(PublishError::Unavailable {
            channel: "global-counter".into(),
            reason: "realtime service unreachable".into(),
        })
    }

    fn channel_name(&self) -> &str {
        "global-counter"
    }
}

pub struct Harness {
    pub ledger: Arc<LedgerController>,
    pub store: Arc<FaultyStore>,
    pub hub: Arc<ChannelHub>,
    pub clock: Arc<ManualClock>,
    pub metrics: Arc<Metrics>,
}

pub fn harness() -> Harness {
    let hub = Arc::new(ChannelHub::new("global-counter", 1024));
    harness_with_publisher(hub.clone(), hub)
}

pub fn harness_with_publisher(publisher: Arc<dyn Publisher>, hub: Arc<ChannelHub>) -> Harness {
    let store = Arc::new(FaultyStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 11, 3, 9, 15, 0).unwrap(),
    ));
    let metrics = Arc::new(Metrics::new().unwrap());
    let ledger = Arc::new(LedgerController::new(
        LedgerConfig::default().with_reset_retry(RetryPolicy::new(2, 1, 1, 0.0)),
        store.clone(),
        clock.clone(),
        StatePublisher::new(publisher, metrics.clone()),
        metrics.clone(),
    ));
    Harness {
        ledger,
        store,
        hub,
        clock,
        metrics,
    }
}

pub fn ballot(identity: &Identity, counter_id: i64, delta: i64) -> Ballot<'_> {
    Ballot {
        identity,
        origin_address: "203.0.113.7",
        counter_id,
        delta,
        privileged: false,
    }
}
