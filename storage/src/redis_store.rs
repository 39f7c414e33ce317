// Copyright (c) James Kassemi, SC, US. All rights reserved.
use async_trait::async_trait;
use log::info;
use redis::{AsyncCommands, ErrorKind, RedisError, Script, aio::ConnectionManager};

use crate::{
    KvStore,
    error::{StoreError, StoreResult},
};

const SET_IF_ABSENT: &str = r"
if redis.call('SET', KEYS[1], ARGV[1], 'NX') then
  return ARGV[1]
end
return redis.call('GET', KEYS[1])
";

const DECR_IF_POSITIVE: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then
  return 0
end
current = tonumber(current)
if current == nil then
  return redis.error_reply('WRONGTYPE value is not an integer')
end
if current > 0 then
  return redis.call('DECR', KEYS[1])
end
return current
";

/// Shared redis-backed store. Any number of service processes pointed at
/// the same instance see one ledger. Commands that are not native single-key
/// primitives run as server-side scripts so they stay atomic.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    set_if_absent: Script,
    decr_if_positive: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(|err| connection_error(&err))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|err| connection_error(&err))?;
        let store = Self {
            conn,
            set_if_absent: Script::new(SET_IF_ABSENT),
            decr_if_positive: Script::new(DECR_IF_POSITIVE),
        };
        store.ping().await?;
        info!("connected to redis store");
        Ok(store)
    }
}

fn connection_error(err: &RedisError) -> StoreError {
    StoreError::unavailable(format!("redis: {err}"))
}

/// Server-side type errors and unparseable replies are type mismatches;
/// everything else is the store being unreachable.
fn command_error(key: &str, expected: &'static str, err: RedisError) -> StoreError {
    if err.code() == Some("WRONGTYPE") || err.kind() == ErrorKind::TypeError {
        StoreError::WrongType {
            key: key.to_string(),
            expected,
            actual: "other",
        }
    } else {
        connection_error(&err)
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get_int(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|err| command_error(key, "integer", err))
    }

    async fn set_int(&self, key: &str, value: i64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.set(key, value)
            .await
            .map_err(|err| command_error(key, "integer", err))
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1_i64)
            .await
            .map_err(|err| command_error(key, "integer", err))
    }

    async fn decr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        conn.decr(key, 1_i64)
            .await
            .map_err(|err| command_error(key, "integer", err))
    }

    async fn decr_if_positive(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = self
            .decr_if_positive
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(|err| command_error(key, "integer", err))?;
        Ok(value)
    }

    async fn get_str(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|err| command_error(key, "string", err))
    }

    async fn set_str(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.set(key, value)
            .await
            .map_err(|err| command_error(key, "string", err))
    }

    async fn set_str_if_absent(&self, key: &str, value: &str) -> StoreResult<String> {
        let mut conn = self.conn.clone();
        let stored: String = self
            .set_if_absent
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(|err| command_error(key, "string", err))?;
        Ok(stored)
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let added: i64 = conn
            .sadd(key, member)
            .await
            .map_err(|err| command_error(key, "set", err))?;
        Ok(added > 0)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut members: Vec<String> = conn
            .smembers(key)
            .await
            .map_err(|err| command_error(key, "set", err))?;
        members.sort();
        Ok(members)
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        conn.scard(key)
            .await
            .map_err(|err| command_error(key, "set", err))
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .del(key)
            .await
            .map_err(|err| command_error(key, "any", err))?;
        Ok(removed > 0)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|err| connection_error(&err))?;
        Ok(())
    }
}
