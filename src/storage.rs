use std::time::Duration;

use dict::{Dict, HeapStrings, INITIAL_SIZE, Value};
use log::{debug, trace};

/// Below this fill percentage the cron shrinks the table
const MIN_FILL_PERCENT: usize = 10;

/// The key space: one string dict plus the background maintenance that keeps
/// it sized.
pub struct Keyspace {
    dict: Dict<'static, HeapStrings>,
    rehash_budget: Duration,
}

impl Keyspace {
    /// `rehash_budget` bounds the rehash work of each [`Keyspace::cron`] run
    pub fn new(rehash_budget: Duration) -> Self {
        Self {
            dict: Dict::new(&HeapStrings, ()),
            rehash_budget,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<&str> {
        self.dict
            .fetch_value(&key.to_string())
            .and_then(Value::as_obj)
            .map(String::as_str)
    }

    /// Returns `true` if the key is new
    pub fn set(&mut self, key: &str, val: &str) -> bool {
        self.dict.replace(key.to_string(), val.to_string())
    }

    /// Removes `key`, handing back its value
    pub fn del(&mut self, key: &str) -> Option<String> {
        let entry = self.dict.unlink(&key.to_string())?;
        let val = entry.value().as_obj().cloned();
        self.dict.free_unlinked(entry);
        val
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    pub fn stats(&self) -> String {
        self.dict.stats()
    }

    pub fn random_key(&mut self) -> Option<String> {
        self.dict.random_key().map(|e| e.key().clone())
    }

    /// One step of a key space scan: keeps calling [`Dict::scan`] until about
    /// `count` keys are collected, the scan completes, or `10 * count` buckets
    /// were visited. Returns the cursor to continue from.
    pub fn scan(&self, cursor: u64, count: usize) -> (u64, Vec<String>) {
        let count = count.max(1);
        let mut keys = Vec::new();
        let mut cursor = cursor;
        let mut budget = count.saturating_mul(10);
        loop {
            cursor = self.dict.scan(cursor, |e| keys.push(e.key().clone()));
            budget -= 1;
            if cursor == 0 || keys.len() >= count || budget == 0 {
                break;
            }
        }
        (cursor, keys)
    }

    /// Periodic maintenance, run once per event loop cycle.
    ///
    /// Continues a running rehash for at most the configured budget;
    /// otherwise shrinks the table once it is less than 10% full. Returns
    /// `true` while rehash work remains.
    pub fn cron(&mut self) -> bool {
        if self.dict.is_rehashing() {
            let more = self.dict.rehash_for(self.rehash_budget);
            trace!(target: "cron", "rehash step done, more: {more}");
            return more;
        }

        if self.needs_shrink() {
            debug!(
                target: "cron",
                "shrinking: {} keys in {} slots",
                self.dict.len(),
                self.dict.slots()
            );
            if let Err(e) = self.dict.resize() {
                debug!(target: "cron", "shrink refused: {e}");
            }
        }
        self.dict.is_rehashing()
    }

    fn needs_shrink(&self) -> bool {
        let (size, used) = (self.dict.slots(), self.dict.len());
        size > INITIAL_SIZE && used * 100 / size < MIN_FILL_PERCENT
    }
}
