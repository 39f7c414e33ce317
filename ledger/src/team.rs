// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::sync::Arc;

use core_types::{Identity, Team};
use log::warn;
use storage::KvStore;

use crate::{error::Result, keys};

/// Deterministic team for an origin address.
///
/// A dotted quad sums its four segments; anything else (IPv6, hostnames,
/// garbage) goes through a 32-bit rolling hash over UTF-16 code units. Even
/// parity is team A, odd is team B.
pub fn assign_team_from_address(address: &str) -> Team {
    let parity = match dotted_quad_sum(address) {
        Some(sum) => sum % 2,
        None => u64::from(rolling_hash(address).unsigned_abs()) % 2,
    };
    if parity == 0 { Team::A } else { Team::B }
}

fn dotted_quad_sum(address: &str) -> Option<u64> {
    let mut sum = 0u64;
    let mut segments = 0;
    for segment in address.split('.') {
        let trimmed = segment.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        sum = sum.checked_add(trimmed.parse::<u64>().ok()?)?;
        segments += 1;
    }
    (segments == 4).then_some(sum)
}

fn rolling_hash(value: &str) -> i32 {
    value.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

/// Team bindings. The address only matters on an identity's first call;
/// after that the stored team wins.
#[derive(Clone)]
pub struct TeamAssignments {
    store: Arc<dyn KvStore>,
}

impl TeamAssignments {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn get_or_assign(&self, identity: &Identity, origin_address: &str) -> Result<Team> {
        let key = keys::team(identity.as_str());
        let candidate = assign_team_from_address(origin_address);
        let stored = self
            .store
            .set_str_if_absent(&key, candidate.as_str())
            .await?;
        match stored.parse::<Team>() {
            Ok(team) => Ok(team),
            Err(_) => {
                warn!("replacing unreadable team assignment record");
                self.store.set_str(&key, candidate.as_str()).await?;
                Ok(candidate)
            }
        }
    }

    /// Existing assignment, without creating one.
    pub async fn team_of(&self, identity: &Identity) -> Result<Option<Team>> {
        let stored = self.store.get_str(&keys::team(identity.as_str())).await?;
        Ok(stored.and_then(|value| value.parse().ok()))
    }
}
