use crate::dict::{Dict, DictEntry};
use crate::entry::{Entry, EntryId};
use crate::hash_table::Entries;
use crate::types::DictType;

/// Mutable view of one bucket chain, handed to the bucket callback of
/// [`Dict::scan_buckets`] before its entries are visited.
pub struct BucketMut<'a, K, V> {
    entries: &'a mut Entries<K, V>,
    head: Option<EntryId>,
}

impl<K, V> BucketMut<'_, K, V> {
    pub fn len(&self) -> usize {
        let mut n = 0;
        let mut cur = self.head;
        while let Some(id) = cur {
            let Some(entry) = self.entries.get(id) else {
                break;
            };
            n += 1;
            cur = entry.next;
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Calls `f` on every entry of the chain. Keys are read-only, values may
    /// be rewritten in place.
    pub fn for_each<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Entry<K, V>),
    {
        let mut cur = self.head;
        while let Some(id) = cur {
            let Some(entry) = self.entries.get_mut(id) else {
                break;
            };
            f(entry);
            cur = entry.next;
        }
    }
}

/// Table shape a single scan call works against
#[derive(Debug, Clone, Copy)]
enum Layout {
    Single { mask: u64 },
    /// `small` and `large` are table numbers, ordered by size
    Rehashing {
        small: usize,
        small_mask: u64,
        large: usize,
        large_mask: u64,
    },
}

/// Advances `v` by one in reversed bit order, over the bits covered by `mask`.
/// Starting from 0 this enumerates every bucket of the table once and then
/// wraps back to 0.
fn next_cursor(v: u64, mask: u64) -> u64 {
    (v | !mask).reverse_bits().wrapping_add(1).reverse_bits()
}

/// Feeds every bucket that cursor `v` covers to `visit_bucket(table, index)`
/// and returns the cursor for the next call.
///
/// While rehashing, the bucket of the small table is expanded into all of the
/// large table's buckets that share its low bits. Those differ only in the
/// bits above the small mask, which the reversed increment walks first.
fn scan_step(layout: Layout, mut v: u64, mut visit_bucket: impl FnMut(usize, usize)) -> u64 {
    match layout {
        Layout::Single { mask } => {
            visit_bucket(0, (v & mask) as usize);
            next_cursor(v, mask)
        }
        Layout::Rehashing {
            small,
            small_mask,
            large,
            large_mask,
        } => {
            visit_bucket(small, (v & small_mask) as usize);
            loop {
                visit_bucket(large, (v & large_mask) as usize);
                v = next_cursor(v, large_mask);
                if v & (small_mask ^ large_mask) == 0 {
                    break v;
                }
            }
        }
    }
}

impl<T: DictType> Dict<'_, T> {
    /// Visits the entries under `cursor` and returns the cursor to pass next.
    ///
    /// Start with 0; a returned 0 means the scan is complete. Every key that
    /// is in the dict for the whole scan is visited at least once, even if the
    /// dict grows or shrinks between calls. Keys may be visited more than
    /// once, and keys added or removed mid-scan may or may not be.
    pub fn scan<F>(&self, cursor: u64, mut visit: F) -> u64
    where
        F: FnMut(&DictEntry<T>),
    {
        let Some(layout) = self.layout() else {
            return 0;
        };
        scan_step(layout, cursor, |table, idx| {
            for (_, entry) in self.ht[table].chain(&self.entries, idx) {
                visit(entry);
            }
        })
    }

    /// Like [`Dict::scan`], but first hands each bucket to `bucket_fn`, which
    /// may rewrite the values stored in it.
    pub fn scan_buckets<B, F>(&mut self, cursor: u64, mut bucket_fn: B, mut visit: F) -> u64
    where
        B: FnMut(BucketMut<'_, T::Key, T::Val>),
        F: FnMut(&DictEntry<T>),
    {
        let Some(layout) = self.layout() else {
            return 0;
        };
        let (ht, entries) = (&self.ht, &mut self.entries);
        scan_step(layout, cursor, |table, idx| {
            bucket_fn(BucketMut {
                entries: &mut *entries,
                head: ht[table].head(idx),
            });
            for (_, entry) in ht[table].chain(entries, idx) {
                visit(entry);
            }
        })
    }

    fn layout(&self) -> Option<Layout> {
        if self.is_empty() {
            return None;
        }
        if !self.is_rehashing() {
            return Some(Layout::Single {
                mask: self.ht[0].mask as u64,
            });
        }
        let (small, large) = if self.ht[0].bucket_count() <= self.ht[1].bucket_count() {
            (0, 1)
        } else {
            (1, 0)
        };
        Some(Layout::Rehashing {
            small,
            small_mask: self.ht[small].mask as u64,
            large,
            large_mask: self.ht[large].mask as u64,
        })
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::next_cursor;
    use crate::dict::Dict;
    use crate::dict::test::{Tracked, tracked};
    use crate::{DictConfig, Value};

    fn scan_all(d: &Dict<'_, Tracked>) -> Vec<u64> {
        let mut keys = Vec::new();
        let mut cursor = 0;
        loop {
            cursor = d.scan(cursor, |e| keys.push(*e.key()));
            if cursor == 0 {
                break keys;
            }
        }
    }

    #[test]
    fn cursor_order_is_bit_reversed() {
        let mut v = 0;
        let mut order = Vec::new();
        loop {
            order.push(v);
            v = next_cursor(v, 7);
            if v == 0 {
                break;
            }
        }
        assert_eq!(order, [0, 4, 2, 6, 1, 5, 3, 7]);
    }

    #[test]
    fn empty_dict() {
        let config = DictConfig::new();
        let (d, _) = tracked(&config);
        let mut visited = 0;
        assert_eq!(d.scan(0, |_| visited += 1), 0);
        assert_eq!(visited, 0);
    }

    #[test]
    fn stable_table_visits_each_key_once() {
        let config = DictConfig::new();
        let (mut d, _) = tracked(&config);
        for k in 0..100 {
            d.add(k, String::new()).unwrap();
        }
        while d.rehash(100) {}

        let mut keys = scan_all(&d);
        keys.sort();
        assert_eq!(keys, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn rehashing_table_covers_both_tables() {
        let config = DictConfig::new();
        let (mut d, _) = tracked(&config);
        for k in 0..65 {
            d.add(k, String::new()).unwrap();
        }
        assert!(d.is_rehashing());

        let keys: HashSet<u64> = scan_all(&d).into_iter().collect();
        assert_eq!(keys.len(), 65);
    }

    #[test]
    fn growth_mid_scan() {
        let config = DictConfig::new();
        let (mut d, _) = tracked(&config);
        for k in 0..100 {
            d.add(k, String::new()).unwrap();
        }
        while d.rehash(100) {}

        let mut seen = HashSet::new();
        let mut cursor = 0;
        for _ in 0..10 {
            cursor = d.scan(cursor, |e| {
                seen.insert(*e.key());
            });
        }
        assert_ne!(cursor, 0);

        for k in 1000..3000 {
            d.add(k, String::new()).unwrap();
        }
        while cursor != 0 {
            cursor = d.scan(cursor, |e| {
                seen.insert(*e.key());
            });
            d.rehash(1);
        }
        assert!((0..100).all(|k| seen.contains(&k)));
    }

    #[test]
    fn shrink_mid_scan() {
        let config = DictConfig::new();
        let (mut d, _) = tracked(&config);
        for k in 0..1000 {
            d.add(k, String::new()).unwrap();
        }
        while d.rehash(100) {}

        let mut seen = HashSet::new();
        let mut cursor = 0;
        for _ in 0..50 {
            cursor = d.scan(cursor, |e| {
                seen.insert(*e.key());
            });
        }
        assert_ne!(cursor, 0);

        for k in 100..1000 {
            d.delete(&k).unwrap();
        }
        while d.rehash(100) {}
        d.resize().unwrap();
        assert!(d.is_rehashing());

        while cursor != 0 {
            cursor = d.scan(cursor, |e| {
                seen.insert(*e.key());
            });
            d.rehash(1);
        }
        assert!((0..100).all(|k| seen.contains(&k)));

        while d.rehash(100) {}
        assert_eq!(d.slots(), 128);
    }

    #[test]
    fn bucket_fn_rewrites_values() {
        let config = DictConfig::new();
        let (mut d, _) = tracked(&config);
        for k in 0..40 {
            d.add(k, String::new()).unwrap();
        }

        let mut in_buckets = 0;
        let mut visited = 0;
        let mut cursor = 0;
        loop {
            cursor = d.scan_buckets(
                cursor,
                |mut bucket| {
                    in_buckets += bucket.len();
                    bucket.for_each(|e| {
                        let n = *e.key();
                        e.set_unsigned_integer_val(n * 2);
                    });
                },
                |e| {
                    assert_eq!(e.value(), &Value::Unsigned(e.key() * 2));
                    visited += 1;
                },
            );
            if cursor == 0 {
                break;
            }
        }
        assert_eq!(in_buckets, visited);
        assert!(visited >= 40);
    }
}
