//! In-process implementation of the atomic primitives on top of DashMap.
//! Every method holds the shard lock of the key it touches for its whole
//! duration, which gives the same per-key atomicity Redis does.

use crate::backend::AtomicStore;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Hash(HashMap<String, String>),
    Sorted(HashMap<String, f64>),
}

#[derive(Default)]
pub struct MemoryStore {
    data: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn with_hash<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, String>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()));
        let result = match entry.value_mut() {
            Value::Hash(hash) => f(hash),
            _ => return Err(StoreError::WrongType(key.to_string())),
        };
        // An empty collection is the same as a missing key.
        if matches!(entry.value(), Value::Hash(h) if h.is_empty()) {
            drop(entry);
            self.data
                .remove_if(key, |_, v| matches!(v, Value::Hash(h) if h.is_empty()));
        }
        result
    }

    fn with_sorted<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, f64>) -> T,
    ) -> StoreResult<T> {
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Sorted(HashMap::new()));
        let result = match entry.value_mut() {
            Value::Sorted(set) => f(set),
            _ => return Err(StoreError::WrongType(key.to_string())),
        };
        if matches!(entry.value(), Value::Sorted(s) if s.is_empty()) {
            drop(entry);
            self.data
                .remove_if(key, |_, v| matches!(v, Value::Sorted(s) if s.is_empty()));
        }
        Ok(result)
    }

    fn read_sorted<T>(
        &self,
        key: &str,
        f: impl FnOnce(&HashMap<String, f64>) -> T,
    ) -> StoreResult<Option<T>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(entry) => match entry.value() {
                Value::Sorted(set) => Ok(Some(f(set))),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }
}

fn parse_int(key: &str, raw: &str) -> StoreResult<i64> {
    raw.parse()
        .map_err(|_| StoreError::NotInteger(key.to_string()))
}

#[async_trait]
impl AtomicStore for MemoryStore {
    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut entry = self.data.entry(key.to_string()).or_insert(Value::Int(0));
        match entry.value_mut() {
            Value::Int(n) => {
                *n += 1;
                Ok(*n)
            }
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn hincr(&self, key: &str, field: &str) -> StoreResult<i64> {
        self.with_hash(key, |hash| {
            let current = match hash.get(field) {
                Some(raw) => parse_int(key, raw)?,
                None => 0,
            };
            hash.insert(field.to_string(), (current + 1).to_string());
            Ok(current + 1)
        })
    }

    async fn hset_nx(&self, key: &str, field: &str, value: i64) -> StoreResult<bool> {
        self.with_hash(key, |hash| {
            if hash.contains_key(field) {
                return Ok(false);
            }
            hash.insert(field.to_string(), value.to_string());
            Ok(true)
        })
    }

    async fn get_int(&self, key: &str) -> StoreResult<Option<i64>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(entry) => match entry.value() {
                Value::Int(n) => Ok(Some(*n)),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn hget_int(&self, key: &str, field: &str) -> StoreResult<Option<i64>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(entry) => match entry.value() {
                Value::Hash(hash) => hash.get(field).map(|raw| parse_int(key, raw)).transpose(),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.with_hash(key, |hash| {
            hash.insert(field.to_string(), value.to_string());
            Ok(())
        })
    }

    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool> {
        match self.data.get(key) {
            None => Ok(false),
            Some(entry) => match entry.value() {
                Value::Hash(hash) => Ok(hash.contains_key(field)),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
        match self.data.get(key) {
            None => Ok(Vec::new()),
            Some(entry) => match entry.value() {
                Value::Hash(hash) => Ok(hash.keys().cloned().collect()),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        if !self.data.contains_key(key) {
            return Ok(false);
        }
        self.with_hash(key, |hash| Ok(hash.remove(field).is_some()))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        self.with_sorted(key, |set| {
            set.insert(member.to_string(), score);
        })
    }

    async fn zadd_nx(&self, key: &str, member: &str, score: f64) -> StoreResult<bool> {
        self.with_sorted(key, |set| {
            if set.contains_key(member) {
                return false;
            }
            set.insert(member.to_string(), score);
            true
        })
    }

    async fn zadd_xx(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        if !self.data.contains_key(key) {
            return Ok(());
        }
        self.with_sorted(key, |set| {
            if let Some(current) = set.get_mut(member) {
                *current = score;
            }
        })
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<bool> {
        if !self.data.contains_key(key) {
            return Ok(false);
        }
        self.with_sorted(key, |set| set.remove(member).is_some())
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        Ok(self
            .read_sorted(key, |set| set.get(member).copied())?
            .flatten())
    }

    async fn ztop(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .read_sorted(key, |set| {
                set.iter()
                    .max_by(|(a_id, a), (b_id, b)| a.total_cmp(b).then_with(|| a_id.cmp(b_id)))
                    .map(|(id, _)| id.clone())
            })?
            .flatten())
    }

    async fn zmembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let members = self
            .read_sorted(key, |set| {
                let mut pairs: Vec<(&String, f64)> = set.iter().map(|(m, s)| (m, *s)).collect();
                pairs.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
                pairs.into_iter().map(|(m, _)| m.clone()).collect::<Vec<_>>()
            })?
            .unwrap_or_default();
        Ok(members)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.data.contains_key(key))
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.data.remove(key);
        Ok(())
    }

    async fn copy_scored(&self, src: &str, dst: &str, score: f64) -> StoreResult<usize> {
        let members = self.zmembers(src).await?;
        if members.is_empty() {
            return Ok(0);
        }
        self.with_sorted(dst, |set| {
            let mut inserted = 0;
            for member in members {
                if !set.contains_key(&member) {
                    set.insert(member, score);
                    inserted += 1;
                }
            }
            inserted
        })
    }
}
