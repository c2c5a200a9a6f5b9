use log::trace;

use crate::DictError;
use crate::dict::{Dict, DictEntry};
use crate::entry::EntryId;
use crate::types::DictType;

/// Iterator that keeps its position without borrowing the dict.
///
/// Both variants are driven with [`DictIterator::next`] and must be handed
/// back with [`DictIterator::release`].
///
/// A *safe* iterator ([`Dict::safe_iterator`]) lets the caller add and delete
/// entries between `next` calls, including deleting the entry just returned.
/// Every key present for the whole iteration is returned at least once; keys
/// added or deleted meanwhile may or may not be, and a key can be returned
/// twice. While one is open the dict neither grows nor moves entries between
/// tables.
///
/// An *unsafe* iterator ([`Dict::iterator`]) does not hold back resizing but
/// allows no changes at all while it is open. Release checks that the dict is
/// structurally unchanged and panics otherwise.
#[must_use = "iterators must be handed back with `release`"]
#[derive(Debug)]
pub struct DictIterator {
    table: usize,
    /// next bucket to enter
    index: usize,
    next_entry: Option<EntryId>,
    safe: bool,
    fingerprint: u64,
}

impl DictIterator {
    fn new(safe: bool, fingerprint: u64) -> Self {
        Self {
            table: 0,
            index: 0,
            next_entry: None,
            safe,
            fingerprint,
        }
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    /// Walks `ht[0]` bucket by bucket, then `ht[1]` if a rehash is in
    /// progress. Chains come out newest first.
    pub fn next<'d, T: DictType>(&mut self, d: &'d Dict<'_, T>) -> Option<&'d DictEntry<T>> {
        loop {
            if let Some(id) = self.next_entry.take() {
                match d.entries.get(id) {
                    Some(entry) => {
                        self.next_entry = entry.next;
                        return Some(entry);
                    }
                    None => {
                        // the saved successor was deleted, walk its bucket again
                        self.index = self.index.saturating_sub(1);
                        continue;
                    }
                }
            }

            let ht = &d.ht[self.table];
            if self.index >= ht.bucket_count() {
                if self.table == 0 && d.is_rehashing() {
                    self.table = 1;
                    self.index = 0;
                    continue;
                }
                return None;
            }
            self.next_entry = ht.head(self.index);
            self.index += 1;
        }
    }

    /// # Panics
    ///
    /// With [`DictError::IteratorMisuse`] if this is an unsafe iterator and
    /// the dict changed since it was created.
    pub fn release<T: DictType>(self, d: &mut Dict<'_, T>) {
        if self.safe {
            d.iterators = d.iterators.saturating_sub(1);
            trace!(target: "iter", "safe iterator released, {} still open", d.iterators);
            return;
        }

        let found = d.fingerprint();
        if found != self.fingerprint {
            panic!(
                "{}",
                DictError::IteratorMisuse {
                    expected: self.fingerprint,
                    found,
                }
            );
        }
    }
}

/// Borrowing iterator over every entry, see [`Dict::iter`]
pub struct Iter<'a, 't, T: DictType> {
    dict: &'a Dict<'t, T>,
    pos: DictIterator,
}

impl<'a, T: DictType> Iterator for Iter<'a, '_, T> {
    type Item = &'a DictEntry<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pos.next(self.dict)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.dict.len()))
    }
}

impl<'a, 't, T: DictType> IntoIterator for &'a Dict<'t, T> {
    type Item = &'a DictEntry<T>;
    type IntoIter = Iter<'a, 't, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'t, T: DictType> Dict<'t, T> {
    /// Unsafe iterator: the dict must not change until it is released
    pub fn iterator(&self) -> DictIterator {
        DictIterator::new(false, self.fingerprint())
    }

    /// Safe iterator: the dict may change while it is open, but will not
    /// resize until it is released.
    ///
    /// Growth and every form of rehashing stay paused until
    /// [`DictIterator::release`] is called. A safe iterator dropped without
    /// `release` keeps them paused for the rest of the dict's life; check
    /// [`Dict::safe_iterators`] if in doubt.
    pub fn safe_iterator(&mut self) -> DictIterator {
        self.iterators += 1;
        DictIterator::new(true, 0)
    }

    /// Safe iterators handed out and not yet released
    pub fn safe_iterators(&self) -> usize {
        self.iterators
    }

    /// Iterates over every entry. The borrow rules out changes meanwhile.
    pub fn iter(&self) -> Iter<'_, 't, T> {
        Iter {
            dict: self,
            pos: DictIterator::new(false, 0),
        }
    }

    /// Mixes the identity, size and fill of both tables into one value
    pub(crate) fn fingerprint(&self) -> u64 {
        let [a, b, c] = self.ht[0].fingerprint_parts();
        let [d, e, f] = self.ht[1].fingerprint_parts();

        let mut hash: u64 = 0;
        for n in [a, b, c, d, e, f] {
            hash = hash.wrapping_add(n);
            hash = (!hash).wrapping_add(hash << 21);
            hash ^= hash >> 24;
            hash = hash.wrapping_add(hash << 3).wrapping_add(hash << 8);
            hash ^= hash >> 14;
            hash = hash.wrapping_add(hash << 2).wrapping_add(hash << 4);
            hash ^= hash >> 28;
            hash = hash.wrapping_add(hash << 31);
        }
        hash
    }
}
