// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{fmt, time::Duration};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;

/// Wall-clock source. Quota and statistics days follow the calendar date in
/// UTC, not a rolling 24-hour window.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for exercising day rollover.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock();
        if let Ok(step) = chrono::Duration::from_std(by) {
            *guard += step;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// UTC calendar day used in quota, voter-index and per-day statistic keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoteDay(NaiveDate);

impl VoteDay {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.date_naive())
    }

    pub fn today(clock: &dyn Clock) -> Self {
        Self::from_datetime(clock.now())
    }
}

impl fmt::Display for VoteDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}
