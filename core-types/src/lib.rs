// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared value types, settings, retry policy and health bookkeeping for the
//! tally service.

pub mod config;
pub mod retry;
pub mod status;
pub mod types;

pub use config::{AppConfig, StoreBackend};
pub use retry::RetryPolicy;
pub use types::{
    COUNTER_COUNT, CounterId, Counters, Identity, LastVote, LedgerState, ResetScope, Team,
    UNLIMITED_VOTES, ValueError, VoteDelta, VoteReceipt,
};
