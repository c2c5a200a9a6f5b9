use slotmap::SlotMap;

use crate::entry::{Entry, EntryId};

/// Every allocated table has at least this many buckets.
pub const INITIAL_SIZE: usize = 4;

pub(crate) type Entries<K, V> = SlotMap<EntryId, Entry<K, V>>;

/// One bucket array. Entries themselves live in the dict's slab, a bucket
/// only holds the id of its chain head.
#[derive(Debug, Default)]
pub(crate) struct HashTable {
    pub(crate) buckets: Vec<Option<EntryId>>,
    pub(crate) used: usize,
    pub(crate) mask: usize,
}

impl HashTable {
    pub(crate) const EMPTY_TABLE: HashTable = HashTable {
        buckets: Vec::new(),
        used: 0,
        mask: 0,
    };

    /// Creates a table with `size` empty buckets, `size` must be a power of two
    pub(crate) fn new_with_buckets(size: usize) -> Self {
        debug_assert!(size.is_power_of_two(), "table size {size} is not a power of two");
        Self {
            buckets: vec![None; size],
            used: 0,
            mask: size - 1,
        }
    }

    /// Smallest power of two >= `size`, never below [`INITIAL_SIZE`]
    pub(crate) fn next_power(size: usize) -> usize {
        size.max(INITIAL_SIZE)
            .checked_next_power_of_two()
            .unwrap_or(1 << (usize::BITS - 1))
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn is_allocated(&self) -> bool {
        !self.buckets.is_empty()
    }

    pub(crate) fn index(&self, hash: u64) -> usize {
        hash as usize & self.mask
    }

    pub(crate) fn head(&self, idx: usize) -> Option<EntryId> {
        self.buckets.get(idx).copied().flatten()
    }

    /// Links `id` in front of bucket `idx`
    pub(crate) fn push_front<K, V>(&mut self, entries: &mut Entries<K, V>, idx: usize, id: EntryId) {
        entries[id].next = self.buckets[idx];
        self.buckets[idx] = Some(id);
        self.used += 1;
    }

    /// Unlinks the first entry of bucket `idx` matching `pred` and returns its id.
    /// The entry stays in the slab.
    pub(crate) fn unlink_where<K, V>(
        &mut self,
        entries: &mut Entries<K, V>,
        idx: usize,
        mut pred: impl FnMut(&Entry<K, V>) -> bool,
    ) -> Option<EntryId> {
        let mut prev: Option<EntryId> = None;
        let mut cur = self.head(idx);
        while let Some(id) = cur {
            let entry = &entries[id];
            let next = entry.next;
            if pred(entry) {
                match prev {
                    None => self.buckets[idx] = next,
                    Some(p) => entries[p].next = next,
                }
                self.used -= 1;
                return Some(id);
            }
            prev = Some(id);
            cur = next;
        }
        None
    }

    pub(crate) fn chain<'a, K, V>(&self, entries: &'a Entries<K, V>, idx: usize) -> Chain<'a, K, V> {
        Chain {
            entries,
            next: self.head(idx),
        }
    }

    pub(crate) fn chain_len<K, V>(&self, entries: &Entries<K, V>, idx: usize) -> usize {
        self.chain(entries, idx).count()
    }

    /// Identity, size and fill of the table, as mixed into iterator fingerprints
    pub(crate) fn fingerprint_parts(&self) -> [u64; 3] {
        [
            self.buckets.as_ptr() as usize as u64,
            self.bucket_count() as u64,
            self.used as u64,
        ]
    }
}

/// Walks one bucket chain. Stops early on an id that no longer resolves.
pub(crate) struct Chain<'a, K, V> {
    entries: &'a Entries<K, V>,
    next: Option<EntryId>,
}

impl<'a, K, V> Iterator for Chain<'a, K, V> {
    type Item = (EntryId, &'a Entry<K, V>);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let entry = self.entries.get(id)?;
        self.next = entry.next;
        Some((id, entry))
    }
}

#[cfg(test)]
mod test {
    use super::{Entries, HashTable, INITIAL_SIZE};
    use crate::entry::Entry;

    fn push(t: &mut HashTable, entries: &mut Entries<&'static str, ()>, idx: usize, key: &'static str) {
        let id = entries.insert(Entry::new(key, None));
        t.push_front(entries, idx, id);
    }

    fn keys(t: &HashTable, entries: &Entries<&'static str, ()>, idx: usize) -> Vec<&'static str> {
        t.chain(entries, idx).map(|(_, e)| e.key).collect()
    }

    #[test]
    fn new_with_buckets() {
        let t = HashTable::new_with_buckets(16);
        assert_eq!(t.bucket_count(), 16);
        assert_eq!(t.mask + 1, t.bucket_count());
        assert_eq!(t.used, 0);
        assert!(t.is_allocated());
        assert!(!HashTable::EMPTY_TABLE.is_allocated());
    }

    #[test]
    fn next_power() {
        assert_eq!(HashTable::next_power(0), INITIAL_SIZE);
        assert_eq!(HashTable::next_power(3), INITIAL_SIZE);
        assert_eq!(HashTable::next_power(4), 4);
        assert_eq!(HashTable::next_power(5), 8);
        assert_eq!(HashTable::next_power(1000), 1024);
        assert_eq!(HashTable::next_power(usize::MAX), 1 << (usize::BITS - 1));
    }

    #[test]
    fn push_front_reverses_insertion_order() {
        let mut entries = Entries::with_key();
        let mut t = HashTable::new_with_buckets(4);

        push(&mut t, &mut entries, 1, "a");
        push(&mut t, &mut entries, 1, "b");
        push(&mut t, &mut entries, 1, "c");

        assert_eq!(keys(&t, &entries, 1), ["c", "b", "a"]);
        assert_eq!(t.chain_len(&entries, 1), 3);
        assert_eq!(t.chain_len(&entries, 0), 0);
        assert_eq!(t.used, 3);
    }

    #[test]
    fn unlink_head_middle_tail() {
        let mut entries = Entries::with_key();
        let mut t = HashTable::new_with_buckets(4);
        for k in ["a", "b", "c", "d"] {
            push(&mut t, &mut entries, 2, k);
        }

        let id = t.unlink_where(&mut entries, 2, |e| e.key == "c").unwrap();
        assert_eq!(entries[id].key, "c");
        assert_eq!(keys(&t, &entries, 2), ["d", "b", "a"]);

        t.unlink_where(&mut entries, 2, |e| e.key == "d").unwrap();
        assert_eq!(keys(&t, &entries, 2), ["b", "a"]);

        t.unlink_where(&mut entries, 2, |e| e.key == "a").unwrap();
        assert_eq!(keys(&t, &entries, 2), ["b"]);

        assert!(t.unlink_where(&mut entries, 2, |e| e.key == "zzz").is_none());
        assert_eq!(t.used, 1);
    }

    #[test]
    fn chain_stops_on_removed_entry() {
        let mut entries = Entries::with_key();
        let mut t = HashTable::new_with_buckets(4);
        push(&mut t, &mut entries, 0, "a");
        push(&mut t, &mut entries, 0, "b");

        let head = t.head(0).unwrap();
        let next = entries[head].next.unwrap();
        entries.remove(next);
        assert_eq!(keys(&t, &entries, 0), ["b"]);
    }

    #[test]
    fn fingerprint_tracks_used() {
        let mut entries = Entries::with_key();
        let mut t = HashTable::new_with_buckets(4);
        let before = t.fingerprint_parts();
        push(&mut t, &mut entries, 0, "a");
        let after = t.fingerprint_parts();
        assert_eq!(before[..2], after[..2]);
        assert_ne!(before[2], after[2]);
    }
}
