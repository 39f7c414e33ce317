// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::sync::Arc;

use core_types::{Identity, Team};
use serde::Serialize;
use storage::{KvStore, StoreError};

use crate::{day::VoteDay, error::Result, keys};

/// Aggregate statistics. Approximate by nature: resets adjust them but do not
/// reconstruct history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_votes: i64,
    pub total_users: u64,
    pub team_a_users: u64,
    pub team_b_users: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamVoteStats {
    pub votes_all_time_team_a: i64,
    pub votes_all_time_team_b: i64,
    pub votes_today_team_a: i64,
    pub votes_today_team_b: i64,
}

#[derive(Clone)]
pub struct Statistics {
    store: Arc<dyn KvStore>,
}

impl Statistics {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Attempts every bookkeeping write even when an earlier one fails and
    /// reports the first failure.
    pub async fn record_vote(
        &self,
        identity: &Identity,
        team: Team,
        day: VoteDay,
    ) -> std::result::Result<(), StoreError> {
        let results = [
            self.store.incr(keys::TOTAL_VOTES).await.map(drop),
            self.store
                .sadd(keys::ALL_USERS, identity.as_str())
                .await
                .map(drop),
            self.store
                .sadd(&keys::team_users(team), identity.as_str())
                .await
                .map(drop),
            self.store.incr(&keys::team_votes(team)).await.map(drop),
            self.store
                .incr(&keys::team_votes_on(team, day))
                .await
                .map(drop),
        ];
        results.into_iter().collect()
    }

    pub async fn zero_total_votes(&self) -> std::result::Result<(), StoreError> {
        self.store.set_int(keys::TOTAL_VOTES, 0).await
    }

    pub async fn summary(&self) -> Result<StatsSummary> {
        Ok(StatsSummary {
            total_votes: self.store.get_int(keys::TOTAL_VOTES).await?.unwrap_or(0),
            total_users: self.store.scard(keys::ALL_USERS).await?,
            team_a_users: self.store.scard(&keys::team_users(Team::A)).await?,
            team_b_users: self.store.scard(&keys::team_users(Team::B)).await?,
        })
    }

    pub async fn team_votes(&self, day: VoteDay) -> Result<TeamVoteStats> {
        let mut tallies = [0i64; 4];
        for (slot, key) in [
            keys::team_votes(Team::A),
            keys::team_votes(Team::B),
            keys::team_votes_on(Team::A, day),
            keys::team_votes_on(Team::B, day),
        ]
        .iter()
        .enumerate()
        {
            tallies[slot] = self.store.get_int(key).await?.unwrap_or(0);
        }
        Ok(TeamVoteStats {
            votes_all_time_team_a: tallies[0],
            votes_all_time_team_b: tallies[1],
            votes_today_team_a: tallies[2],
            votes_today_team_b: tallies[3],
        })
    }
}
