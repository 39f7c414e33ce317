// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Concurrent vote ledger.
//!
//! The crate exposes:
//! - [`LedgerController`]: vote submission and state reads over a shared [`storage::KvStore`].
//! - [`TeamAssignments`]: permanent, first-write-wins team binding per identity.
//! - [`DailyQuota`]: per-identity, per-UTC-day vote metering with its voter index.
//! - [`ResetCoordinator`]: privileged roll-back of counters, quotas and statistics.
//!
//! All correctness under concurrency comes from single-key atomic store
//! primitives; nothing here holds an in-process lock across a store call.

pub mod config;
pub mod controller;
pub mod day;
pub mod error;
pub mod keys;
pub mod quota;
pub mod reset;
pub mod stats;
pub mod team;

pub use config::LedgerConfig;
pub use controller::{Ballot, LedgerController, validate_vote};
pub use day::{Clock, ManualClock, SystemClock, VoteDay};
pub use error::{LedgerError, Result};
pub use quota::{Admission, DailyQuota};
pub use reset::{ResetCoordinator, ResetFailure, ResetOutcome, ResetReport, ResetStep};
pub use stats::{Statistics, StatsSummary, TeamVoteStats};
pub use team::{TeamAssignments, assign_team_from_address};
