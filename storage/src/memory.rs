// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    KvStore,
    error::{StoreError, StoreResult},
};

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Str(String),
    Set(BTreeSet<String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Str(_) => "string",
            Value::Set(_) => "set",
        }
    }
}

fn wrong_type(key: &str, expected: &'static str, actual: &Value) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
        actual: actual.kind(),
    }
}

/// Process-local store. Each primitive holds the map lock for exactly one
/// key operation, which is what makes it atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn step_int(&self, key: &str, step: i64) -> StoreResult<i64> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_insert(Value::Int(0));
        match entry {
            Value::Int(current) => {
                *current = current.wrapping_add(step);
                Ok(*current)
            }
            other => Err(wrong_type(key, "integer", other)),
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get_int(&self, key: &str) -> StoreResult<Option<i64>> {
        match self.entries.lock().get(key) {
            None => Ok(None),
            Some(Value::Int(value)) => Ok(Some(*value)),
            Some(other) => Err(wrong_type(key, "integer", other)),
        }
    }

    async fn set_int(&self, key: &str, value: i64) -> StoreResult<()> {
        self.entries.lock().insert(key.to_string(), Value::Int(value));
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.step_int(key, 1)
    }

    async fn decr(&self, key: &str) -> StoreResult<i64> {
        self.step_int(key, -1)
    }

    async fn decr_if_positive(&self, key: &str) -> StoreResult<i64> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            None => Ok(0),
            Some(Value::Int(current)) => {
                if *current > 0 {
                    *current -= 1;
                }
                Ok(*current)
            }
            Some(other) => Err(wrong_type(key, "integer", other)),
        }
    }

    async fn get_str(&self, key: &str) -> StoreResult<Option<String>> {
        match self.entries.lock().get(key) {
            None => Ok(None),
            Some(Value::Str(value)) => Ok(Some(value.clone())),
            Some(other) => Err(wrong_type(key, "string", other)),
        }
    }

    async fn set_str(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), Value::Str(value.to_string()));
        Ok(())
    }

    async fn set_str_if_absent(&self, key: &str, value: &str) -> StoreResult<String> {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Str(value.to_string()));
        match entry {
            Value::Str(stored) => Ok(stored.clone()),
            other => Err(wrong_type(key, "string", other)),
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(BTreeSet::new()));
        match entry {
            Value::Set(members) => Ok(members.insert(member.to_string())),
            other => Err(wrong_type(key, "set", other)),
        }
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        match self.entries.lock().get(key) {
            None => Ok(Vec::new()),
            Some(Value::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(other) => Err(wrong_type(key, "set", other)),
        }
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        match self.entries.lock().get(key) {
            None => Ok(0),
            Some(Value::Set(members)) => Ok(members.len() as u64),
            Some(other) => Err(wrong_type(key, "set", other)),
        }
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
