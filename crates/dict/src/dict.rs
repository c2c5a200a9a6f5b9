use std::fmt;

use log::{trace, warn};

use crate::DictError;
use crate::config::DictConfig;
use crate::entry::{Entry, EntryId, Value};
use crate::hash_table::{Entries, HashTable};
use crate::types::DictType;

/// Entry type of a dict over descriptor `T`
pub type DictEntry<T> = Entry<<T as DictType>::Key, <T as DictType>::Val>;

/// Result of [`Dict::add_raw`]
pub enum AddRaw<'a, K, V> {
    /// The key was absent and a new entry was linked in.
    /// Its value is `Value::Unsigned(0)` until the caller sets one.
    Inserted(&'a mut Entry<K, V>),
    /// The key was already present, nothing was inserted
    Existing(&'a mut Entry<K, V>),
}

/// Hash table with two bucket arrays and incremental rehashing.
///
/// `ht[0]` is the main table. While a resize is in progress `ht[1]` is the
/// target table, `rehash_idx` is the next bucket of `ht[0]` to migrate, and
/// every bucket of `ht[0]` below it is empty. New entries always go to the
/// table that is receiving writes: `ht[1]` while rehashing, `ht[0]` otherwise.
pub struct Dict<'t, T: DictType> {
    pub(crate) ty: &'t T,
    pub(crate) privdata: T::Context,
    pub(crate) config: &'t DictConfig,
    pub(crate) entries: Entries<T::Key, T::Val>,
    pub(crate) ht: [HashTable; 2],
    pub(crate) rehash_idx: Option<usize>,
    /// live safe iterators
    pub(crate) iterators: usize,
}

impl<'t, T: DictType> Dict<'t, T> {
    /// Creates an empty dict bound to the process-wide [`DictConfig`].
    /// No buckets are allocated until the first insert.
    pub fn new(ty: &'t T, privdata: T::Context) -> Self {
        Self::with_config(ty, privdata, DictConfig::global())
    }

    pub fn with_config(ty: &'t T, privdata: T::Context, config: &'t DictConfig) -> Self {
        Self {
            ty,
            privdata,
            config,
            entries: Entries::with_key(),
            ht: [HashTable::EMPTY_TABLE, HashTable::EMPTY_TABLE],
            rehash_idx: None,
            iterators: 0,
        }
    }

    /// Number of entries across both tables
    pub fn len(&self) -> usize {
        self.ht[0].used + self.ht[1].used
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of buckets across both tables
    pub fn slots(&self) -> usize {
        self.ht[0].bucket_count() + self.ht[1].bucket_count()
    }

    pub fn is_rehashing(&self) -> bool {
        self.rehash_idx.is_some()
    }

    pub fn context(&self) -> &T::Context {
        &self.privdata
    }

    pub fn dict_type(&self) -> &'t T {
        self.ty
    }

    pub fn config(&self) -> &'t DictConfig {
        self.config
    }

    pub fn get_hash(&self, key: &T::Key) -> u64 {
        self.ty.hash(self.config, key)
    }

    /// Inserts `key` with `val`, failing with [`DictError::KeyExists`]
    /// if the key is already present.
    pub fn add(&mut self, key: T::Key, val: T::Val) -> Result<(), DictError> {
        match self.add_raw_id(key) {
            Ok(id) => {
                let val = self.ty.val_dup(&self.privdata, val);
                self.entries[id].val = Value::Obj(val);
                Ok(())
            }
            Err(_) => Err(DictError::KeyExists),
        }
    }

    /// Low level insert: links a new entry for `key` and hands it back so the
    /// caller can store whatever value it wants, or returns the entry already
    /// holding `key`.
    pub fn add_raw(&mut self, key: T::Key) -> AddRaw<'_, T::Key, T::Val> {
        match self.add_raw_id(key) {
            Ok(id) => AddRaw::Inserted(&mut self.entries[id]),
            Err(id) => AddRaw::Existing(&mut self.entries[id]),
        }
    }

    /// Returns the entry for `key`, inserting an empty one if it is absent
    pub fn add_or_find(&mut self, key: T::Key) -> &mut DictEntry<T> {
        let (Ok(id) | Err(id)) = self.add_raw_id(key);
        &mut self.entries[id]
    }

    /// Inserts or overwrites. Returns `true` if the key was added, `false` if
    /// an existing value was replaced; the old value goes through
    /// `val_destructor` after the new one is in place.
    pub fn replace(&mut self, key: T::Key, val: T::Val) -> bool {
        match self.add_raw_id(key) {
            Ok(id) => {
                let val = self.ty.val_dup(&self.privdata, val);
                self.entries[id].val = Value::Obj(val);
                true
            }
            Err(id) => {
                let val = self.ty.val_dup(&self.privdata, val);
                let old = std::mem::replace(&mut self.entries[id].val, Value::Obj(val));
                self.free_val(old);
                false
            }
        }
    }

    pub fn find(&mut self, key: &T::Key) -> Option<&DictEntry<T>> {
        let id = self.find_id(key)?;
        self.entries.get(id)
    }

    pub fn find_mut(&mut self, key: &T::Key) -> Option<&mut DictEntry<T>> {
        let id = self.find_id(key)?;
        self.entries.get_mut(id)
    }

    pub fn fetch_value(&mut self, key: &T::Key) -> Option<&Value<T::Val>> {
        self.find(key).map(Entry::value)
    }

    /// Removes `key` and runs the destructors on its key and value
    pub fn delete(&mut self, key: &T::Key) -> Result<(), DictError> {
        let id = self.unlink_id(key).ok_or(DictError::KeyNotFound)?;
        if let Some(entry) = self.entries.remove(id) {
            self.free_entry(entry);
        }
        Ok(())
    }

    /// Removes `key` without running destructors and hands the entry to the
    /// caller, who should pass it to [`Dict::free_unlinked`] once done with it.
    pub fn unlink(&mut self, key: &T::Key) -> Option<DictEntry<T>> {
        let id = self.unlink_id(key)?;
        let mut entry = self.entries.remove(id)?;
        entry.next = None;
        Some(entry)
    }

    pub fn free_unlinked(&self, entry: DictEntry<T>) {
        self.free_entry(entry);
    }

    /// Destroys every entry and frees both tables.
    ///
    /// # Panics
    ///
    /// If a safe iterator is still open on this dict.
    pub fn release(self) {
        assert_eq!(
            self.iterators, 0,
            "releasing dict with {} safe iterators still open",
            self.iterators
        );
        // Drop does the work
    }

    /// Destroys every entry and frees both tables, leaving an empty dict.
    /// `callback` gets the context every 65536 buckets so a long clear can
    /// yield to other work.
    pub fn empty<F>(&mut self, mut callback: F)
    where
        F: FnMut(&T::Context),
    {
        self.clear_table(0, &mut callback);
        self.clear_table(1, &mut callback);
        self.rehash_idx = None;
    }

    /// Shorthand for `empty` without a callback
    pub fn clear(&mut self) {
        self.empty(|_| {});
    }

    // [private]

    /// Ok(new entry id) or Err(id of the entry already holding the key)
    fn add_raw_id(&mut self, key: T::Key) -> Result<EntryId, EntryId> {
        self.rehash_step();

        let hash = self.ty.hash(self.config, &key);
        let index = self.key_index(&key, hash)?;

        let table = if self.is_rehashing() { 1 } else { 0 };
        let key = self.ty.key_dup(&self.privdata, key);
        let id = self.entries.insert(Entry::new(key, None));
        self.ht[table].push_front(&mut self.entries, index, id);
        Ok(id)
    }

    /// Bucket index for a new `key` in the table receiving writes,
    /// or the id of the entry that already holds it
    fn key_index(&mut self, key: &T::Key, hash: u64) -> Result<usize, EntryId> {
        self.expand_if_needed();
        if let Some(id) = self.lookup(key, hash) {
            return Err(id);
        }
        let table = if self.is_rehashing() { 1 } else { 0 };
        Ok(self.ht[table].index(hash))
    }

    fn find_id(&mut self, key: &T::Key) -> Option<EntryId> {
        if self.is_empty() {
            return None;
        }
        self.rehash_step();
        let hash = self.ty.hash(self.config, key);
        self.lookup(key, hash)
    }

    pub(crate) fn lookup(&self, key: &T::Key, hash: u64) -> Option<EntryId> {
        for table in 0..=1 {
            let ht = &self.ht[table];
            let idx = ht.index(hash);
            if !self.already_migrated(table, idx) {
                let found = ht
                    .chain(&self.entries, idx)
                    .find(|(_, e)| self.ty.key_compare(&self.privdata, key, &e.key));
                if let Some((id, _)) = found {
                    return Some(id);
                }
            }
            if !self.is_rehashing() {
                break;
            }
        }
        None
    }

    fn unlink_id(&mut self, key: &T::Key) -> Option<EntryId> {
        if self.is_empty() {
            return None;
        }
        self.rehash_step();

        let hash = self.ty.hash(self.config, key);
        for table in 0..=1 {
            let idx = self.ht[table].index(hash);
            if !self.already_migrated(table, idx) {
                let (ty, ctx) = (self.ty, &self.privdata);
                let unlinked = self.ht[table].unlink_where(&mut self.entries, idx, |e| {
                    ty.key_compare(ctx, key, &e.key)
                });
                if unlinked.is_some() {
                    return unlinked;
                }
            }
            if !self.is_rehashing() {
                break;
            }
        }
        None
    }

    /// Buckets of `ht[0]` below the rehash index were already moved to `ht[1]`
    pub(crate) fn already_migrated(&self, table: usize, idx: usize) -> bool {
        table == 0 && self.rehash_idx.is_some_and(|r| idx < r)
    }

    pub(crate) fn free_val(&self, val: Value<T::Val>) {
        if let Value::Obj(v) = val {
            self.ty.val_destructor(&self.privdata, v);
        }
    }

    pub(crate) fn free_entry(&self, entry: DictEntry<T>) {
        let (key, val) = entry.into_parts();
        self.ty.key_destructor(&self.privdata, key);
        self.free_val(val);
    }

    fn clear_table(&mut self, table: usize, callback: &mut dyn FnMut(&T::Context)) {
        let ht = std::mem::take(&mut self.ht[table]);
        trace!(target: "dict", "clearing table {table}: {} buckets, {} entries", ht.bucket_count(), ht.used);

        let mut remaining = ht.used;
        for (i, head) in ht.buckets.into_iter().enumerate() {
            if remaining == 0 {
                break;
            }
            if i & 65535 == 0 {
                callback(&self.privdata);
            }
            let mut cur = head;
            while let Some(id) = cur {
                let Some(entry) = self.entries.remove(id) else {
                    break;
                };
                cur = entry.next;
                remaining -= 1;
                self.free_entry(entry);
            }
        }
    }
}

impl<T: DictType> Drop for Dict<'_, T> {
    fn drop(&mut self) {
        if self.iterators > 0 {
            warn!(
                target: "dict",
                "dropping dict with {} safe iterators never released, rehashing was paused",
                self.iterators
            );
        }
        self.clear();
    }
}

impl<T: DictType> fmt::Debug for Dict<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dict")
            .field("len", &self.len())
            .field("sizes", &[self.ht[0].bucket_count(), self.ht[1].bucket_count()])
            .field("rehash_idx", &self.rehash_idx)
            .field("iterators", &self.iterators)
            .finish()
    }
}
