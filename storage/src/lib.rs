// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Key-value store seam for the vote ledger.
//!
//! Every [`KvStore`] method is a single atomic step against a single key. The
//! ledger never needs more than that: multi-key actions are sequences of these
//! steps and are written to tolerate interleaving.

mod error;
mod memory;
mod redis_store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Integer value of `key`, `None` when absent.
    async fn get_int(&self, key: &str) -> StoreResult<Option<i64>>;
    async fn set_int(&self, key: &str, value: i64) -> StoreResult<()>;
    /// Adds one, treating an absent key as 0; returns the new value.
    async fn incr(&self, key: &str) -> StoreResult<i64>;
    /// Subtracts one, treating an absent key as 0; returns the new value.
    async fn decr(&self, key: &str) -> StoreResult<i64>;
    /// Subtracts one only while the value is positive; an absent or
    /// non-positive key is left untouched. Returns the value afterwards.
    async fn decr_if_positive(&self, key: &str) -> StoreResult<i64>;

    async fn get_str(&self, key: &str) -> StoreResult<Option<String>>;
    async fn set_str(&self, key: &str, value: &str) -> StoreResult<()>;
    /// Writes `value` only when `key` is absent and returns whatever the key
    /// holds afterwards.
    async fn set_str_if_absent(&self, key: &str, value: &str) -> StoreResult<String>;

    /// Returns `true` when `member` was not already present.
    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;
    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;
    async fn scard(&self, key: &str) -> StoreResult<u64>;

    /// Removes `key` of any type; returns `true` when something was deleted.
    async fn del(&self, key: &str) -> StoreResult<bool>;
    async fn ping(&self) -> StoreResult<()>;
}
