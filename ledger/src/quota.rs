// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::sync::Arc;

use core_types::{Identity, UNLIMITED_VOTES};
use log::warn;
use metrics::{Metrics, SideChannel};
use storage::KvStore;

use crate::{
    day::VoteDay,
    error::{LedgerError, Result},
    keys,
};

/// Result of quota admission for one vote attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Metered { used: u32, votes_remaining: u32 },
    Unmetered,
}

impl Admission {
    pub fn votes_remaining(&self) -> u32 {
        match self {
            Admission::Metered {
                votes_remaining, ..
            } => *votes_remaining,
            Admission::Unmetered => UNLIMITED_VOTES,
        }
    }

    pub fn is_metered(&self) -> bool {
        matches!(self, Admission::Metered { .. })
    }
}

/// Per-identity daily vote metering plus the day's voter index.
///
/// Admission increments first and compensates on overflow. The atomic
/// increment is the serialization point: only increments that land at or
/// under the limit are honored, whatever the interleaving. Do not turn this
/// into check-then-increment.
#[derive(Clone)]
pub struct DailyQuota {
    store: Arc<dyn KvStore>,
    limit: u32,
    metrics: Arc<Metrics>,
}

impl DailyQuota {
    pub fn new(store: Arc<dyn KvStore>, limit: u32, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            limit,
            metrics,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub async fn admit(&self, identity: &Identity, day: VoteDay) -> Result<Admission> {
        // Index before the quota entry exists, so a reset can always find it.
        self.store
            .sadd(&keys::voter_index(day), identity.as_str())
            .await?;

        let key = keys::daily_quota(identity.as_str(), day);
        let used = self.store.incr(&key).await?;
        if used > i64::from(self.limit) {
            self.give_back(&key, "overflow compensation").await;
            return Err(LedgerError::QuotaExceeded { limit: self.limit });
        }
        if used <= 0 {
            // Only a foreign write can leave a non-positive count behind.
            warn!("quota record held a non-positive count, restarting it at one");
            self.store.set_int(&key, 1).await?;
            return Ok(Admission::Metered {
                used: 1,
                votes_remaining: self.limit - 1,
            });
        }
        let used = used as u32;
        Ok(Admission::Metered {
            used,
            votes_remaining: self.limit - used,
        })
    }

    /// Gives back an admitted vote whose counter step did not happen.
    pub async fn refund(&self, identity: &Identity, day: VoteDay) {
        let key = keys::daily_quota(identity.as_str(), day);
        self.give_back(&key, "refund").await;
    }

    /// Guarded decrement: a reset may have deleted the record since it was
    /// incremented, and an absent record must stay absent.
    async fn give_back(&self, key: &str, step: &str) {
        if let Err(err) = self.store.decr_if_positive(key).await {
            warn!("quota {step} failed: {err}");
            self.metrics
                .inc_side_channel_failure(SideChannel::QuotaCompensation);
        }
    }

    pub async fn used(&self, identity: &Identity, day: VoteDay) -> Result<i64> {
        let key = keys::daily_quota(identity.as_str(), day);
        Ok(self.store.get_int(&key).await?.unwrap_or(0))
    }

    pub async fn remaining(&self, identity: &Identity, day: VoteDay) -> Result<u32> {
        let used = self.used(identity, day).await?;
        Ok((i64::from(self.limit) - used).clamp(0, i64::from(self.limit)) as u32)
    }
}
