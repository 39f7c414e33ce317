// Copyright (c) James Kassemi, SC, US. All rights reserved.
use core_types::{Counters, LastVote};
use serde::{Deserialize, Serialize};

pub const UPDATE_EVENT_NAME: &str = "update";

/// Markers that travel alongside the aggregate state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishFlags {
    /// Every subscriber should re-pull its own votes-remaining count.
    pub quota_was_reset: bool,
}

impl PublishFlags {
    pub fn quota_reset() -> Self {
        Self {
            quota_was_reset: true,
        }
    }
}

/// `update` payload. Optional members are omitted from the wire form when
/// absent rather than sent as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEvent {
    pub counters: Counters,
    pub team_score: i64,
    /// Unix milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_vote: Option<LastVote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_was_reset: Option<bool>,
}

impl UpdateEvent {
    /// Team score is always derived from `counters` here so the two can
    /// never disagree on the wire.
    pub fn new(
        counters: Counters,
        timestamp: i64,
        last_vote: Option<LastVote>,
        flags: PublishFlags,
    ) -> Self {
        Self {
            counters,
            team_score: counters.team_score(),
            timestamp,
            last_vote,
            quota_was_reset: flags.quota_was_reset.then_some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{CounterId, Team, VoteDelta};

    #[test]
    fn absent_members_are_omitted() {
        let event = UpdateEvent::new(Counters::ZERO, 10, None, PublishFlags::default());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"counters": [0, 0, 0], "teamScore": 0, "timestamp": 10})
        );
    }

    #[test]
    fn vote_event_carries_snapshot_without_identity() {
        let last_vote = LastVote {
            counter_id: CounterId::try_from(1).unwrap(),
            delta: VoteDelta::Up,
            team: Team::A,
            timestamp: 99,
        };
        let event = UpdateEvent::new(
            Counters([3, -1, 2]),
            100,
            Some(last_vote),
            PublishFlags::quota_reset(),
        );
        assert_eq!(event.team_score, 4);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""quotaWasReset":true"#));
        assert!(json.contains(r#""lastVote":{"counterId":1,"delta":1,"team":"A","timestamp":99}"#));
        assert!(!json.contains("identity"));
        assert!(!json.contains("address"));
    }
}
