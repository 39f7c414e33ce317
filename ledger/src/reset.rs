// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Privileged roll-back of ledger state.
//!
//! Each scope is a sequence of independent key-level steps. A step that keeps
//! failing after retries is recorded and the rest still run where that is
//! safe; the report always states whether the reset was complete, partial or
//! a total failure.

use std::{fmt, future::Future, sync::Arc};

use core_types::{CounterId, Counters, ResetScope};
use futures::future::join_all;
use log::{info, warn};
use realtime::PublishFlags;
use storage::{StoreError, StoreResult};

use crate::{controller::LedgerController, day::VoteDay, keys};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetStep {
    ZeroCounters,
    ZeroTotalVotes,
    ClearDailyQuotas,
    ClearVoterIndex,
}

impl ResetStep {
    pub fn as_str(self) -> &'static str {
        match self {
            ResetStep::ZeroCounters => "zero_counters",
            ResetStep::ZeroTotalVotes => "zero_total_votes",
            ResetStep::ClearDailyQuotas => "clear_daily_quotas",
            ResetStep::ClearVoterIndex => "clear_voter_index",
        }
    }
}

impl fmt::Display for ResetStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResetFailure {
    pub step: ResetStep,
    pub detail: String,
}

impl fmt::Display for ResetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.detail)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Every step succeeded.
    Complete,
    /// Some steps changed state and at least one failed.
    Partial,
    /// Nothing was changed.
    Failed,
}

impl ResetOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ResetOutcome::Complete => "complete",
            ResetOutcome::Partial => "partial",
            ResetOutcome::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResetReport {
    pub scope: ResetScope,
    pub outcome: ResetOutcome,
    pub counters_zeroed: usize,
    pub quotas_cleared: usize,
    pub failed_steps: Vec<ResetFailure>,
    pub broadcast_delivered: bool,
}

impl ResetReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == ResetOutcome::Complete
    }

    /// Confirmation text for the caller.
    pub fn message(&self) -> String {
        match (self.outcome, self.scope) {
            (ResetOutcome::Complete, ResetScope::Counters) => "All counters reset".to_string(),
            (ResetOutcome::Complete, ResetScope::Votes) => {
                format!("Vote limits reset for {} voters today", self.quotas_cleared)
            }
            (ResetOutcome::Complete, ResetScope::All) => {
                "Everything reset (counters and all vote limits)".to_string()
            }
            (ResetOutcome::Partial, scope) => format!(
                "Reset '{scope}' partially applied; failed steps: {}",
                self.failed_list()
            ),
            (ResetOutcome::Failed, scope) => format!(
                "Reset '{scope}' failed, nothing was changed; failed steps: {}",
                self.failed_list()
            ),
        }
    }

    fn failed_list(&self) -> String {
        self.failed_steps
            .iter()
            .map(|failure| failure.step.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Running tally for one reset.
#[derive(Default)]
struct Progress {
    counters_zeroed: usize,
    quotas_cleared: usize,
    other_changes: usize,
    failures: Vec<ResetFailure>,
}

impl Progress {
    fn fail(&mut self, step: ResetStep, detail: impl Into<String>) {
        let failure = ResetFailure {
            step,
            detail: detail.into(),
        };
        warn!("reset step failed: {failure}");
        self.failures.push(failure);
    }

    fn changed_anything(&self) -> bool {
        self.counters_zeroed + self.quotas_cleared + self.other_changes > 0
    }

    fn outcome(&self) -> ResetOutcome {
        if self.failures.is_empty() {
            ResetOutcome::Complete
        } else if self.changed_anything() {
            ResetOutcome::Partial
        } else {
            ResetOutcome::Failed
        }
    }
}

pub struct ResetCoordinator {
    ledger: Arc<LedgerController>,
}

impl ResetCoordinator {
    pub fn new(ledger: Arc<LedgerController>) -> Self {
        Self { ledger }
    }

    /// Runs `scope` and broadcasts the resulting state. Callers must have
    /// checked authorization already.
    pub async fn reset(&self, scope: ResetScope) -> ResetReport {
        let mut progress = Progress::default();
        let day = VoteDay::today(self.ledger.clock().as_ref());

        let (counters_hint, flags) = match scope {
            ResetScope::Counters => (
                self.zero_counters(&mut progress).await,
                PublishFlags::default(),
            ),
            ResetScope::Votes => {
                self.clear_daily_quotas(day, &mut progress).await;
                (None, PublishFlags::quota_reset())
            }
            ResetScope::All => {
                let zeroed = self.zero_counters(&mut progress).await;
                self.zero_total_votes(&mut progress).await;
                self.clear_daily_quotas(day, &mut progress).await;
                (zeroed, PublishFlags::default())
            }
        };

        let broadcast_delivered = self.broadcast(counters_hint, flags).await;
        let outcome = progress.outcome();
        self.ledger.metrics().inc_reset(scope, outcome.as_str());
        info!(
            "reset '{scope}' finished: {} ({} counters zeroed, {} quotas cleared)",
            outcome.as_str(),
            progress.counters_zeroed,
            progress.quotas_cleared
        );

        ResetReport {
            scope,
            outcome,
            counters_zeroed: progress.counters_zeroed,
            quotas_cleared: progress.quotas_cleared,
            failed_steps: progress.failures,
            broadcast_delivered,
        }
    }

    async fn retry<T, F, Fut>(&self, op: F) -> StoreResult<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        self.ledger
            .config()
            .reset_retry
            .retry_if(op, StoreError::is_transient)
            .await
    }

    /// Returns the zeroed state when all three counters were written.
    async fn zero_counters(&self, progress: &mut Progress) -> Option<Counters> {
        let store = self.ledger.store();
        let attempts = CounterId::ALL.map(|id| {
            let store = store.clone();
            async move {
                let key = keys::counter(id);
                let result = self.retry(|_| store.set_int(&key, 0)).await;
                (id, result)
            }
        });

        let mut failed = Vec::new();
        for (id, result) in join_all(attempts).await {
            match result {
                Ok(()) => progress.counters_zeroed += 1,
                Err(err) => failed.push(format!("counter {id}: {err}")),
            }
        }
        if failed.is_empty() {
            Some(Counters::ZERO)
        } else {
            progress.fail(ResetStep::ZeroCounters, failed.join("; "));
            None
        }
    }

    async fn zero_total_votes(&self, progress: &mut Progress) {
        let stats = self.ledger.stats();
        match self.retry(|_| stats.zero_total_votes()).await {
            Ok(()) => progress.other_changes += 1,
            Err(err) => progress.fail(ResetStep::ZeroTotalVotes, err.to_string()),
        }
    }

    /// Deletes every quota entry the day's voter index references, then the
    /// index. The index is kept when any entry survives so a repeated reset
    /// can still find it.
    async fn clear_daily_quotas(&self, day: VoteDay, progress: &mut Progress) {
        let store = self.ledger.store();
        let index_key = keys::voter_index(day);

        let voters = match self.retry(|_| store.smembers(&index_key)).await {
            Ok(voters) => voters,
            Err(err) => {
                progress.fail(
                    ResetStep::ClearDailyQuotas,
                    format!("voter index unreadable: {err}"),
                );
                return;
            }
        };

        let deletions = voters.iter().map(|voter| {
            let store = store.clone();
            async move {
                let key = keys::daily_quota(voter, day);
                self.retry(|_| store.del(&key)).await
            }
        });
        let mut surviving = 0;
        let mut last_error = None;
        for result in join_all(deletions).await {
            match result {
                Ok(true) => progress.quotas_cleared += 1,
                Ok(false) => {}
                Err(err) => {
                    surviving += 1;
                    last_error = Some(err);
                }
            }
        }
        if let Some(err) = last_error {
            progress.fail(
                ResetStep::ClearDailyQuotas,
                format!(
                    "{surviving} of {} quota entries not cleared, voter index kept: {err}",
                    voters.len()
                ),
            );
            return;
        }

        match self.retry(|_| store.del(&index_key)).await {
            Ok(true) => progress.other_changes += 1,
            Ok(false) => {}
            Err(err) => progress.fail(ResetStep::ClearVoterIndex, err.to_string()),
        }
    }

    /// Publishes `known` when the reset fully determined the counters,
    /// otherwise whatever the store holds now.
    async fn broadcast(&self, known: Option<Counters>, flags: PublishFlags) -> bool {
        let counters = match known {
            Some(counters) => counters,
            None => match self.ledger.read_counters().await {
                Ok(counters) => counters,
                Err(err) => {
                    warn!("skipping reset broadcast, counters unreadable: {err}");
                    return false;
                }
            },
        };
        let timestamp = self.ledger.clock().now_millis();
        self.ledger
            .publisher()
            .publish(counters, None, flags, timestamp)
            .await
    }
}
