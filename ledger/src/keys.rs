// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Store key layout. Any store substituted behind `KvStore` must keep the
//! voter index: it is the only way to find a day's quota entries without
//! enumerating keys.

use core_types::{CounterId, Team};

use crate::day::VoteDay;

pub const TOTAL_VOTES: &str = "stats:total-votes";
pub const ALL_USERS: &str = "stats:all-users";
pub const LAST_VOTE: &str = "last-vote";

pub fn counter(id: CounterId) -> String {
    format!("counter:{id}:value")
}

pub fn team(identity: &str) -> String {
    format!("team:{identity}")
}

pub fn daily_quota(identity: &str, day: VoteDay) -> String {
    format!("votes:{identity}:{day}")
}

pub fn voter_index(day: VoteDay) -> String {
    format!("voters:{day}")
}

pub fn team_users(team: Team) -> String {
    format!("stats:team-{team}-users")
}

pub fn team_votes(team: Team) -> String {
    format!("stats:team-{team}-votes")
}

pub fn team_votes_on(team: Team, day: VoteDay) -> String {
    format!("stats:team-{team}-votes:{day}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn keys_embed_the_utc_day() {
        let day = VoteDay::from_datetime(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap());
        assert_eq!(daily_quota("abc", day), "votes:abc:2025-01-02");
        assert_eq!(voter_index(day), "voters:2025-01-02");
        assert_eq!(team_votes_on(Team::B, day), "stats:team-B-votes:2025-01-02");
        assert_eq!(counter(CounterId::ALL[2]), "counter:3:value");
        assert_eq!(team_users(Team::A), "stats:team-A-users");
    }
}
