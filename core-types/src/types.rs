// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Value types shared by the ledger, the broadcast channel and the HTTP surface.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of shared counters in the tally.
pub const COUNTER_COUNT: usize = 3;

/// Votes-remaining value reported to privileged callers, who are not metered.
pub const UNLIMITED_VOTES: u32 = 999;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("invalid counter id {value}; expected 1, 2, or 3")]
    InvalidCounter { value: i64 },
    #[error("invalid delta {value}; expected 1 or -1")]
    InvalidDelta { value: i64 },
    #[error("unknown team '{value}'")]
    UnknownTeam { value: String },
    #[error("unknown reset scope '{value}'")]
    UnknownResetScope { value: String },
}

/// One of the three shared counters, numbered 1..=3 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterId(u8);

impl CounterId {
    pub const ALL: [CounterId; COUNTER_COUNT] = [CounterId(1), CounterId(2), CounterId(3)];

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based position inside a [`Counters`] array.
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl TryFrom<i64> for CounterId {
    type Error = ValueError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1..=3 => Ok(CounterId(value as u8)),
            _ => Err(ValueError::InvalidCounter { value }),
        }
    }
}

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for CounterId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for CounterId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        CounterId::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// A single vote step; counters only ever move by one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteDelta {
    Up,
    Down,
}

impl VoteDelta {
    pub fn as_i64(self) -> i64 {
        match self {
            VoteDelta::Up => 1,
            VoteDelta::Down => -1,
        }
    }
}

impl TryFrom<i64> for VoteDelta {
    type Error = ValueError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteDelta::Up),
            -1 => Ok(VoteDelta::Down),
            _ => Err(ValueError::InvalidDelta { value }),
        }
    }
}

impl Serialize for VoteDelta {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> Deserialize<'de> for VoteDelta {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        VoteDelta::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// Permanent faction a participant is bound to on their first vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    A,
    B,
}

impl Team {
    pub const ALL: [Team; 2] = [Team::A, Team::B];

    pub fn as_str(self) -> &'static str {
        match self {
            Team::A => "A",
            Team::B => "B",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Team {
    type Err = ValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "A" => Ok(Team::A),
            "B" => Ok(Team::B),
            other => Err(ValueError::UnknownTeam {
                value: other.to_string(),
            }),
        }
    }
}

/// Opaque per-participant token. Carries no personal data and is never
/// written into anything that gets broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Values of the three shared counters, in counter-id order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Counters(pub [i64; COUNTER_COUNT]);

impl Counters {
    pub const ZERO: Counters = Counters([0; COUNTER_COUNT]);

    pub fn get(&self, id: CounterId) -> i64 {
        self.0[id.index()]
    }

    /// Derived on every call; never stored.
    pub fn team_score(&self) -> i64 {
        self.0.iter().sum()
    }
}

/// Public record of the most recent vote. Deliberately has no identity or
/// address field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastVote {
    pub counter_id: CounterId,
    pub delta: VoteDelta,
    pub team: Team,
    /// Unix milliseconds.
    pub timestamp: i64,
}

/// Authoritative state as seen by one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerState {
    pub counters: Counters,
    pub team_score: i64,
    pub votes_remaining: u32,
}

/// Result of an admitted vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub counters: Counters,
    pub team_score: i64,
    pub team: Team,
    pub votes_remaining: u32,
}

/// Privileged reset scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetScope {
    Counters,
    Votes,
    All,
}

impl ResetScope {
    pub fn as_str(self) -> &'static str {
        match self {
            ResetScope::Counters => "counters",
            ResetScope::Votes => "votes",
            ResetScope::All => "all",
        }
    }
}

impl fmt::Display for ResetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResetScope {
    type Err = ValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "counters" => Ok(ResetScope::Counters),
            "votes" => Ok(ResetScope::Votes),
            "all" => Ok(ResetScope::All),
            other => Err(ValueError::UnknownResetScope {
                value: other.to_string(),
            }),
        }
    }
}
