// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::sync::Arc;

use core_types::{
    CounterId, Counters, Identity, LastVote, LedgerState, Team, ValueError, VoteDelta,
    VoteReceipt,
};
use log::{debug, warn};
use metrics::{Metrics, RejectReason, SideChannel};
use realtime::{PublishFlags, StatePublisher};
use storage::KvStore;

use crate::{
    config::LedgerConfig,
    day::{Clock, VoteDay},
    error::{LedgerError, Result},
    keys,
    quota::{Admission, DailyQuota},
    stats::Statistics,
    team::TeamAssignments,
};

/// One vote request as it arrives from the outside, before validation.
#[derive(Clone, Copy, Debug)]
pub struct Ballot<'a> {
    pub identity: &'a Identity,
    /// Only consulted when the identity has no team yet.
    pub origin_address: &'a str,
    pub counter_id: i64,
    pub delta: i64,
    pub privileged: bool,
}

/// Checks the raw counter id and delta of a vote.
pub fn validate_vote(counter_id: i64, delta: i64) -> Result<(CounterId, VoteDelta)> {
    let counter = CounterId::try_from(counter_id).map_err(|err| match err {
        ValueError::InvalidCounter { value } => LedgerError::InvalidCounter { value },
        _ => LedgerError::InvalidCounter { value: counter_id },
    })?;
    let delta = VoteDelta::try_from(delta).map_err(|err| match err {
        ValueError::InvalidDelta { value } => LedgerError::InvalidDelta { value },
        _ => LedgerError::InvalidDelta { value: delta },
    })?;
    Ok((counter, delta))
}

pub struct LedgerController {
    config: LedgerConfig,
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    teams: TeamAssignments,
    quota: DailyQuota,
    stats: Statistics,
    publisher: StatePublisher,
    metrics: Arc<Metrics>,
}

impl LedgerController {
    pub fn new(
        config: LedgerConfig,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        publisher: StatePublisher,
        metrics: Arc<Metrics>,
    ) -> Self {
        let teams = TeamAssignments::new(store.clone());
        let quota = DailyQuota::new(store.clone(), config.daily_vote_limit, metrics.clone());
        let stats = Statistics::new(store.clone());
        Self {
            config,
            store,
            clock,
            teams,
            quota,
            stats,
            publisher,
            metrics,
        }
    }

    /// Full vote path: validate, resolve the team, then apply.
    pub async fn cast_vote(&self, ballot: Ballot<'_>) -> Result<VoteReceipt> {
        let (counter_id, delta) = match validate_vote(ballot.counter_id, ballot.delta) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.metrics.inc_vote_rejected(RejectReason::Validation);
                return Err(err);
            }
        };
        let team = match self
            .teams
            .get_or_assign(ballot.identity, ballot.origin_address)
            .await
        {
            Ok(team) => team,
            Err(err) => {
                self.metrics.inc_vote_rejected(RejectReason::Store);
                return Err(err);
            }
        };
        self.apply_vote(ballot.identity, team, counter_id, delta, ballot.privileged)
            .await
    }

    /// Applies a validated vote for an identity whose team is
    /// already known.
    ///
    /// Errors before the counter step cancel the vote. Once the counter moves
    /// the vote stands: statistics, the last-vote snapshot and the broadcast
    /// are advisory and their failures are only logged.
    pub async fn apply_vote(
        &self,
        identity: &Identity,
        team: Team,
        counter_id: CounterId,
        delta: VoteDelta,
        privileged: bool,
    ) -> Result<VoteReceipt> {
        let day = VoteDay::today(self.clock.as_ref());

        let admission = if privileged {
            Admission::Unmetered
        } else {
            match self.quota.admit(identity, day).await {
                Ok(admission) => admission,
                Err(err) => {
                    self.record_rejection(&err);
                    return Err(err);
                }
            }
        };

        let key = keys::counter(counter_id);
        let step = match delta {
            VoteDelta::Up => self.store.incr(&key).await,
            VoteDelta::Down => self.store.decr(&key).await,
        };
        if let Err(err) = step {
            if admission.is_metered() {
                self.quota.refund(identity, day).await;
            }
            self.metrics.inc_vote_rejected(RejectReason::Store);
            return Err(err.into());
        }
        self.metrics.inc_vote_accepted(team);

        if let Err(err) = self.stats.record_vote(identity, team, day).await {
            warn!("statistics update failed after vote: {err}");
            self.metrics.inc_side_channel_failure(SideChannel::Statistics);
        }

        let snapshot = LastVote {
            counter_id,
            delta,
            team,
            timestamp: self.clock.now_millis(),
        };
        self.write_snapshot(&snapshot).await;

        let counters = match self.read_counters().await {
            Ok(counters) => counters,
            Err(err) => {
                warn!("vote on counter {counter_id} committed but read-back failed: {err}");
                return Err(err);
            }
        };

        self.publisher
            .publish(
                counters,
                Some(snapshot),
                PublishFlags::default(),
                self.clock.now_millis(),
            )
            .await;

        debug!("vote applied to counter {counter_id} for team {team}");
        Ok(VoteReceipt {
            counters,
            team_score: counters.team_score(),
            team,
            votes_remaining: admission.votes_remaining(),
        })
    }

    /// Pure read of the counters and the identity's remaining votes today.
    pub async fn read_state(&self, identity: &Identity) -> Result<LedgerState> {
        let counters = self.read_counters().await?;
        let day = VoteDay::today(self.clock.as_ref());
        let votes_remaining = self.quota.remaining(identity, day).await?;
        Ok(LedgerState {
            counters,
            team_score: counters.team_score(),
            votes_remaining,
        })
    }

    pub async fn read_counters(&self) -> Result<Counters> {
        let mut counters = Counters::ZERO;
        for id in CounterId::ALL {
            counters.0[id.index()] = self.store.get_int(&keys::counter(id)).await?.unwrap_or(0);
        }
        Ok(counters)
    }

    /// Most recent vote, if any. An unreadable record reads as absent.
    pub async fn last_vote(&self) -> Result<Option<LastVote>> {
        let Some(raw) = self.store.get_str(keys::LAST_VOTE).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(vote) => Ok(Some(vote)),
            Err(err) => {
                warn!("ignoring unreadable last-vote record: {err}");
                Ok(None)
            }
        }
    }

    async fn write_snapshot(&self, snapshot: &LastVote) {
        let encoded = match serde_json::to_string(snapshot) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!("failed to encode last-vote snapshot: {err}");
                self.metrics.inc_side_channel_failure(SideChannel::Snapshot);
                return;
            }
        };
        if let Err(err) = self.store.set_str(keys::LAST_VOTE, &encoded).await {
            warn!("failed to store last-vote snapshot: {err}");
            self.metrics.inc_side_channel_failure(SideChannel::Snapshot);
        }
    }

    fn record_rejection(&self, err: &LedgerError) {
        let reason = match err {
            LedgerError::QuotaExceeded { .. } => RejectReason::Quota,
            LedgerError::StoreUnavailable(_) => RejectReason::Store,
            LedgerError::InvalidCounter { .. } | LedgerError::InvalidDelta { .. } => {
                RejectReason::Validation
            }
        };
        self.metrics.inc_vote_rejected(reason);
    }

    pub fn teams(&self) -> &TeamAssignments {
        &self.teams
    }

    pub fn quota(&self) -> &DailyQuota {
        &self.quota
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn publisher(&self) -> &StatePublisher {
        &self.publisher
    }

    pub fn store(&self) -> Arc<dyn KvStore> {
        Arc::clone(&self.store)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }
}
