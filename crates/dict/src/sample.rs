use std::collections::HashSet;

use rand::Rng;

use crate::dict::{Dict, DictEntry};
use crate::entry::EntryId;
use crate::types::DictType;

impl<T: DictType> Dict<'_, T> {
    /// Returns some entry, or `None` if the dict is empty.
    ///
    /// Cheap but not uniform: a random non-empty bucket is chosen first, so
    /// keys in short chains come up more often than keys in long ones.
    pub fn random_key(&mut self) -> Option<&DictEntry<T>> {
        let id = self.random_id()?;
        self.entries.get(id)
    }

    /// Returns an entry drawn uniformly over all keys, or `None` if the dict
    /// is empty.
    ///
    /// Every bucket is padded to the longest chain in the dict: a draw picks
    /// a bucket and a position below that length, and retries when the
    /// position falls past the end of the chain. Finding the longest chain
    /// walks every bucket, so this costs O(slots) per call. Use
    /// [`Dict::random_key`] where the bias does not matter.
    pub fn fair_random_key(&mut self) -> Option<&DictEntry<T>> {
        let id = self.fair_random_id()?;
        self.entries.get(id)
    }

    /// Returns up to `count` distinct entries, walking buckets forward from a
    /// random position. Much faster than `count` calls to
    /// [`Dict::random_key`], but entries that share a bucket tend to come out
    /// together.
    ///
    /// Fewer than `count` entries may come back even when the dict holds
    /// more: the walk gives up after `10 * count` buckets.
    pub fn sample(&mut self, count: usize) -> Vec<&DictEntry<T>> {
        let ids = self.sample_ids(count);
        ids.into_iter().filter_map(|id| self.entries.get(id)).collect()
    }

    /// Buckets that can hold entries, numbered across both tables: ht[0]
    /// below `rehash_idx` is empty, so the range covers the rest of ht[0]
    /// followed by all of ht[1].
    fn live_buckets(&self) -> std::ops::Range<usize> {
        let s0 = self.ht[0].bucket_count();
        match self.rehash_idx {
            Some(rehash_idx) => rehash_idx..s0 + self.ht[1].bucket_count(),
            None => 0..s0,
        }
    }

    /// Maps a position in [`Dict::live_buckets`] to `(table, index)`
    fn locate(&self, h: usize) -> (usize, usize) {
        let s0 = self.ht[0].bucket_count();
        if h >= s0 { (1, h - s0) } else { (0, h) }
    }

    pub(crate) fn random_id(&mut self) -> Option<EntryId> {
        if self.is_empty() {
            return None;
        }
        self.rehash_step();

        let mut rng = rand::thread_rng();
        let live = self.live_buckets();
        let (table, idx) = loop {
            let (table, idx) = self.locate(rng.gen_range(live.clone()));
            if self.ht[table].head(idx).is_some() {
                break (table, idx);
            }
        };

        let len = self.ht[table].chain_len(&self.entries, idx);
        let pick = rng.gen_range(0..len);
        self.ht[table]
            .chain(&self.entries, idx)
            .nth(pick)
            .map(|(id, _)| id)
    }

    pub(crate) fn fair_random_id(&mut self) -> Option<EntryId> {
        if self.is_empty() {
            return None;
        }
        self.rehash_step();

        let live = self.live_buckets();
        let longest = live
            .clone()
            .map(|h| {
                let (table, idx) = self.locate(h);
                self.ht[table].chain_len(&self.entries, idx)
            })
            .max()
            .unwrap_or(0);
        if longest == 0 {
            return None;
        }

        // each (bucket, position) pair is equally likely and exactly one
        // pair maps to each entry
        let mut rng = rand::thread_rng();
        loop {
            let (table, idx) = self.locate(rng.gen_range(live.clone()));
            let pick = rng.gen_range(0..longest);
            if let Some((id, _)) = self.ht[table].chain(&self.entries, idx).nth(pick) {
                return Some(id);
            }
        }
    }

    pub(crate) fn sample_ids(&mut self, count: usize) -> Vec<EntryId> {
        let count = count.min(self.len());
        if count == 0 {
            return Vec::new();
        }
        for _ in 0..count {
            if !self.is_rehashing() {
                break;
            }
            self.rehash_step();
        }

        let tables = if self.is_rehashing() { 2 } else { 1 };
        let mut max_mask = self.ht[0].mask;
        if tables > 1 {
            max_mask = max_mask.max(self.ht[1].mask);
        }

        let mut rng = rand::thread_rng();
        let mut i = rng.gen_range(0..=max_mask);
        let mut empty_run = 0;
        let mut steps = count.saturating_mul(10);
        let mut visited = HashSet::new();
        let mut out = Vec::with_capacity(count);

        while out.len() < count && steps > 0 {
            steps -= 1;
            for table in 0..tables {
                if let Some(rehash_idx) = self.rehash_idx.filter(|_| tables == 2) {
                    if table == 0 && i < rehash_idx {
                        // nothing left below rehash_idx in ht[0]; if ht[1] is
                        // too small to cover i either, jump ahead
                        if i >= self.ht[1].bucket_count() {
                            i = rehash_idx;
                        } else {
                            continue;
                        }
                    }
                }
                if i >= self.ht[table].bucket_count() {
                    continue;
                }

                if self.ht[table].head(i).is_none() {
                    empty_run += 1;
                    if empty_run >= 5 && empty_run > count {
                        i = rng.gen_range(0..=max_mask);
                        empty_run = 0;
                    }
                    continue;
                }

                empty_run = 0;
                if !visited.insert((table, i)) {
                    continue;
                }
                for (id, _) in self.ht[table].chain(&self.entries, i) {
                    out.push(id);
                    if out.len() == count {
                        return out;
                    }
                }
            }
            i = (i + 1) & max_mask;
        }
        out
    }
}
