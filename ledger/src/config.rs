// Copyright (c) James Kassemi, SC, US. All rights reserved.
use core_types::{AppConfig, RetryPolicy};

pub const DEFAULT_DAILY_VOTE_LIMIT: u32 = 3;

#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub daily_vote_limit: u32,
    /// Applied to each key-level step of a reset.
    pub reset_retry: RetryPolicy,
}

impl LedgerConfig {
    pub fn new() -> Self {
        Self {
            daily_vote_limit: DEFAULT_DAILY_VOTE_LIMIT,
            reset_retry: RetryPolicy::default(),
        }
    }

    pub fn from_settings(settings: &AppConfig) -> Self {
        Self {
            daily_vote_limit: settings.ledger.daily_vote_limit.max(1),
            reset_retry: settings.reset.retry_policy(),
        }
    }

    pub fn with_reset_retry(mut self, policy: RetryPolicy) -> Self {
        self.reset_retry = policy;
        self
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::new()
    }
}
