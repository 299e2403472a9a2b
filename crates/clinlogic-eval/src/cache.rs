//! Per-evaluation result cache with TTL expiry

use crate::clock::Clock;
use chrono::{Duration, NaiveDateTime};
use clinlogic_types::{LogicResult, PatientId};
use indexmap::IndexMap;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-patient results of one evaluation
pub type ResultMap = IndexMap<PatientId, LogicResult>;

/// A cached result map
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Deterministic key the entry was stored under
    pub key: String,
    /// Seconds the entry stays fresh
    pub ttl_seconds: u64,
    /// When the entry was stored
    pub inserted_at: NaiveDateTime,
    /// Cached results
    pub value: ResultMap,
}

impl CacheEntry {
    /// Stale once more than `ttl_seconds` have passed since insertion
    pub fn is_stale(&self, now: NaiveDateTime) -> bool {
        let Ok(seconds) = i64::try_from(self.ttl_seconds) else {
            return false;
        };
        match Duration::try_seconds(seconds) {
            Some(ttl) => now - self.inserted_at > ttl,
            None => false,
        }
    }
}

/// Cache of result maps keyed by caller-supplied strings
#[derive(Debug)]
pub struct LogicCache {
    entries: HashMap<String, CacheEntry>,
    default_ttl_seconds: u64,
    clock: Arc<dyn Clock>,
}

impl LogicCache {
    /// Create an empty cache
    pub fn new(default_ttl_seconds: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl_seconds,
            clock,
        }
    }

    /// TTL applied when `put` is given none
    pub fn default_ttl_seconds(&self) -> u64 {
        self.default_ttl_seconds
    }

    /// Get a fresh entry, dropping it if it has expired
    pub fn get(&mut self, key: &str) -> Option<ResultMap> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if entry.is_stale(now) => {
                debug!("Cache entry '{key}' expired");
                self.entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Store a result map with an explicit or default TTL
    pub fn put(&mut self, key: impl Into<String>, value: ResultMap, ttl_seconds: Option<u64>) {
        let key = key.into();
        let entry = CacheEntry {
            key: key.clone(),
            ttl_seconds: ttl_seconds.unwrap_or(self.default_ttl_seconds),
            inserted_at: self.clock.now(),
            value,
        };
        self.entries.insert(key, entry);
    }

    /// Whether a fresh entry exists for `key`
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_stale(now))
    }

    /// Remove one entry
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    /// Number of stored entries, including any not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every stale entry, returning how many were removed
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_stale(now));
        before - self.entries.len()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
