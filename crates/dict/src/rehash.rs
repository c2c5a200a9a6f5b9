use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::DictError;
use crate::config::FORCE_RESIZE_RATIO;
use crate::dict::Dict;
use crate::hash_table::{HashTable, INITIAL_SIZE};
use crate::types::DictType;

/// Buckets migrated per inner step of [`Dict::rehash_for`]
const REHASH_FOR_STEP: usize = 100;

impl<T: DictType> Dict<'_, T> {
    /// Grows (or shrinks) to the smallest power of two holding `size` entries.
    ///
    /// On a dict with no table this just allocates one; otherwise it starts an
    /// incremental rehash into the new table.
    pub fn expand(&mut self, size: usize) -> Result<(), DictError> {
        if self.is_rehashing() {
            return Err(DictError::RehashInProgress);
        }
        let used = self.ht[0].used;
        if used > size {
            return Err(DictError::InvalidSize { size, used });
        }

        let realsize = HashTable::next_power(size);
        if realsize == self.ht[0].bucket_count() {
            return Err(DictError::InvalidSize { size, used });
        }

        let table = HashTable::new_with_buckets(realsize);
        if !self.ht[0].is_allocated() {
            trace!(target: "resize", "allocated first table: {realsize} buckets");
            self.ht[0] = table;
            return Ok(());
        }

        debug!(
            target: "rehash",
            "rehash started: {} -> {realsize} buckets, {used} entries",
            self.ht[0].bucket_count()
        );
        self.ht[1] = table;
        self.rehash_idx = Some(0);
        Ok(())
    }

    /// Shrinks the table to the smallest size that holds every entry
    /// (never below [`INITIAL_SIZE`]).
    pub fn resize(&mut self) -> Result<(), DictError> {
        let minimal = self.ht[0].used.max(INITIAL_SIZE);
        self.resize_to(minimal)
    }

    /// Administrative resize: like [`Dict::expand`], but refused while
    /// resizing is disabled.
    pub fn resize_to(&mut self, size: usize) -> Result<(), DictError> {
        if !self.config.resize_enabled() {
            return Err(DictError::ResizeDisabled);
        }
        self.expand(size)
    }

    /// Migrates up to `n` non-empty buckets from `ht[0]` into `ht[1]`.
    ///
    /// Empty buckets are skipped but not counted; to bound the work on a sparse
    /// table at most `10 * n` of them are visited per call. Returns `true` while
    /// there is still work left. Nothing moves while a safe iterator is open.
    pub fn rehash(&mut self, n: usize) -> bool {
        let Some(mut idx) = self.rehash_idx else {
            return false;
        };
        if self.iterators > 0 {
            return true;
        }

        let mut empty_visits = n.saturating_mul(10);
        let mut n = n;
        while n > 0 && self.ht[0].used != 0 {
            n -= 1;

            // used != 0 keeps a non-empty bucket at or after idx
            while self.ht[0].buckets[idx].is_none() {
                idx += 1;
                empty_visits -= 1;
                if empty_visits == 0 {
                    self.rehash_idx = Some(idx);
                    return true;
                }
            }

            let mut cur = self.ht[0].buckets[idx].take();
            while let Some(id) = cur {
                let entry = &mut self.entries[id];
                cur = entry.next;
                let dst = self.ht[1].index(self.ty.hash(self.config, &entry.key));
                entry.next = self.ht[1].buckets[dst];
                self.ht[1].buckets[dst] = Some(id);
                self.ht[0].used -= 1;
                self.ht[1].used += 1;
            }
            idx += 1;
        }
        self.rehash_idx = Some(idx);

        if self.ht[0].used == 0 {
            self.ht[0] = std::mem::take(&mut self.ht[1]);
            self.rehash_idx = None;
            debug!(
                target: "rehash",
                "rehash finished: {} buckets, {} entries",
                self.ht[0].bucket_count(),
                self.ht[0].used
            );
            return false;
        }
        true
    }

    /// Rehashes in steps of 100 buckets until done or until `budget` has
    /// elapsed, checking the clock between steps. Returns `true` while there
    /// is still work left.
    pub fn rehash_for(&mut self, budget: Duration) -> bool {
        if self.iterators > 0 {
            return self.is_rehashing();
        }

        let start = Instant::now();
        let mut steps = 0;
        while self.rehash(REHASH_FOR_STEP) {
            steps += REHASH_FOR_STEP;
            if start.elapsed() > budget {
                trace!(target: "rehash", "rehash_for: budget spent after {steps} buckets");
                return true;
            }
        }
        false
    }

    /// One bucket of rehash work, piggybacked on ordinary operations
    pub(crate) fn rehash_step(&mut self) {
        if self.iterators == 0 {
            self.rehash(1);
        }
    }

    /// Growth policy, checked before every insert
    pub(crate) fn expand_if_needed(&mut self) {
        if self.is_rehashing() {
            return;
        }
        if !self.ht[0].is_allocated() {
            if let Err(err) = self.expand(INITIAL_SIZE) {
                debug!(target: "resize", "initial allocation failed: {err}");
            }
            return;
        }

        let (used, size) = (self.ht[0].used, self.ht[0].bucket_count());
        if used < size {
            return;
        }
        if self.iterators > 0 {
            trace!(target: "resize", "growth deferred: {} safe iterators open", self.iterators);
            return;
        }
        if self.config.resize_enabled() || used / size > FORCE_RESIZE_RATIO {
            if let Err(err) = self.expand(used * 2) {
                debug!(target: "resize", "growth to {} failed: {err}", used * 2);
            }
        } else {
            trace!(target: "resize", "growth deferred: resizing disabled ({used}/{size})");
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::dict::test::tracked;
    use crate::{DictConfig, DictError};

    #[test]
    fn expand_errors() {
        let config = DictConfig::new();
        let (mut d, _) = tracked(&config);

        d.expand(4).unwrap();
        assert_eq!(d.slots(), 4);
        assert!(!d.is_rehashing());
        assert_eq!(d.expand(3), Err(DictError::InvalidSize { size: 3, used: 0 }));

        for k in 0..3 {
            d.add(k, k.to_string()).unwrap();
        }
        assert_eq!(d.expand(2), Err(DictError::InvalidSize { size: 2, used: 3 }));

        d.expand(100).unwrap();
        assert!(d.is_rehashing());
        assert_eq!(d.ht[1].bucket_count(), 128);
        assert_eq!(d.expand(1000), Err(DictError::RehashInProgress));
    }

    #[test]
    fn rehash_counts_only_nonempty_buckets() {
        let config = DictConfig::new();
        let (mut d, _) = tracked(&config);
        d.expand(64).unwrap();
        // buckets 0, 20, 40 of 64
        for k in [0, 20, 40] {
            d.add(k, k.to_string()).unwrap();
        }
        d.expand(128).unwrap();

        // one step: bucket 0 moves
        assert!(d.rehash(1));
        assert_eq!(d.rehash_idx, Some(1));
        assert_eq!(d.ht[0].used, 2);

        // 19 empty buckets fit the 10 * 2 budget
        assert!(d.rehash(2));
        assert_eq!(d.ht[0].used, 1);
        assert_eq!(d.rehash_idx, Some(22));
        // last one finishes and swaps tables
        assert!(!d.rehash(5));
        assert!(!d.is_rehashing());
        assert_eq!(d.slots(), 128);
        assert_eq!(d.len(), 3);
    }

    #[test]
    fn rehash_empty_visit_budget() {
        let config = DictConfig::new();
        let (mut d, _) = tracked(&config);
        d.expand(1024).unwrap();
        d.add(1000, "x".into()).unwrap();
        d.expand(2048).unwrap();

        // 1000 empty buckets ahead, 10 visited per step
        assert!(d.rehash(1));
        assert_eq!(d.rehash_idx, Some(10));
        assert_eq!(d.ht[0].used, 1);
        assert!(!d.rehash(1000));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn rehash_for_drains() {
        let config = DictConfig::new();
        let (mut d, _) = tracked(&config);
        for k in 0..5000 {
            d.add(k, String::new()).unwrap();
        }
        while d.rehash(100) {}
        d.expand(1 << 16).unwrap();
        assert!(d.is_rehashing());

        while d.rehash_for(Duration::from_millis(1)) {}
        assert!(!d.is_rehashing());
        assert_eq!(d.slots(), 1 << 16);
        assert_eq!(d.len(), 5000);
        assert!(!d.rehash_for(Duration::from_millis(1)));
    }

    #[test]
    fn shrink_to_fit() {
        let config = DictConfig::new();
        let (mut d, _) = tracked(&config);
        for k in 0..100 {
            d.add(k, String::new()).unwrap();
        }
        while d.rehash(100) {}
        assert_eq!(d.slots(), 128);

        for k in 10..100 {
            d.delete(&k).unwrap();
        }
        while d.rehash(100) {}
        d.resize().unwrap();
        while d.rehash(100) {}
        assert_eq!(d.slots(), 16);
        for k in 0..10 {
            assert!(d.find(&k).is_some());
        }
    }

    #[test]
    fn resize_to_waits_for_enable() {
        let config = DictConfig::new();
        let (mut d, _) = tracked(&config);
        for k in 0..3 {
            d.add(k, String::new()).unwrap();
        }

        config.disable_resize();
        assert_eq!(d.resize_to(64), Err(DictError::ResizeDisabled));
        assert_eq!(d.slots(), 4);
        // a size that is invalid regardless still reports the toggle first
        assert_eq!(d.resize_to(2), Err(DictError::ResizeDisabled));

        config.enable_resize();
        assert_eq!(d.resize_to(2), Err(DictError::InvalidSize { size: 2, used: 3 }));
        assert_eq!(d.resize_to(64), Ok(()));
        assert!(d.is_rehashing());
    }

    #[test]
    fn disabled_resize_defers_growth() {
        let config = DictConfig::new();
        let (mut d, _) = tracked(&config);
        config.disable_resize();

        for k in 0..20 {
            d.add(k, String::new()).unwrap();
        }
        // 20 entries on 4 buckets is still within the forced ratio
        assert_eq!(d.slots(), 4);
        assert!(!d.is_rehashing());
        assert_eq!(d.resize(), Err(DictError::ResizeDisabled));

        // past five per bucket growth is forced
        for k in 20..25 {
            d.add(k, String::new()).unwrap();
        }
        assert!(d.is_rehashing());
        while d.rehash(100) {}
        assert_eq!(d.slots(), 64);

        // after enabling, the next insert catches up
        for k in 25..70 {
            d.add(k, String::new()).unwrap();
        }
        while d.rehash(100) {}
        assert_eq!(d.slots(), 64);
        config.enable_resize();
        d.add(70, String::new()).unwrap();
        assert!(d.is_rehashing());
        while d.rehash(100) {}
        assert_eq!(d.slots(), 256);
        assert_eq!(d.len(), 71);
    }
}
