use std::marker::PhantomData;

use crate::config::DictConfig;

/// Behavior of the keys and values of a dict.
///
/// A descriptor is borrowed by every dict that uses it, so one instance can
/// serve any number of dicts. Each callback also receives the dict's context
/// value. Callbacks never see the dict itself and therefore cannot mutate it
/// while it is calling them.
///
/// `hash` is handed the [`DictConfig`] the dict was created with, so keys are
/// hashed under that config's seed.
pub trait DictType {
    type Key;
    type Val;
    type Context;

    fn hash(&self, config: &DictConfig, key: &Self::Key) -> u64;

    fn key_compare(&self, ctx: &Self::Context, a: &Self::Key, b: &Self::Key) -> bool;

    /// Turns a key handed to an insert into the key the dict stores
    fn key_dup(&self, _ctx: &Self::Context, key: Self::Key) -> Self::Key {
        key
    }

    /// Turns a value handed to `add`/`replace` into the value the dict stores
    fn val_dup(&self, _ctx: &Self::Context, val: Self::Val) -> Self::Val {
        val
    }

    fn key_destructor(&self, _ctx: &Self::Context, key: Self::Key) {
        drop(key);
    }

    fn val_destructor(&self, _ctx: &Self::Context, val: Self::Val) {
        drop(val);
    }
}

/// String keys and string values, hashed with SipHash under the dict's seed
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapStrings;

impl DictType for HeapStrings {
    type Key = String;
    type Val = String;
    type Context = ();

    fn hash(&self, config: &DictConfig, key: &String) -> u64 {
        config.hash(key.as_bytes())
    }

    fn key_compare(&self, _ctx: &(), a: &String, b: &String) -> bool {
        a == b
    }
}

/// String keys compared and hashed ignoring ASCII case, any value type
pub struct NoCaseStrings<V>(PhantomData<fn() -> V>);

impl<V> NoCaseStrings<V> {
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<V> Default for NoCaseStrings<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> DictType for NoCaseStrings<V> {
    type Key = String;
    type Val = V;
    type Context = ();

    fn hash(&self, config: &DictConfig, key: &String) -> u64 {
        config.hash_nocase(key.as_bytes())
    }

    fn key_compare(&self, _ctx: &(), a: &String, b: &String) -> bool {
        a.eq_ignore_ascii_case(b)
    }
}

#[cfg(test)]
mod test {
    use super::{DictType, HeapStrings, NoCaseStrings};
    use crate::DictConfig;

    #[test]
    fn heap_strings() {
        let t = HeapStrings;
        let config = DictConfig::new();
        let (a, b) = ("key".to_string(), "KEY".to_string());
        assert!(t.key_compare(&(), &a, &a.clone()));
        assert!(!t.key_compare(&(), &a, &b));
        assert_eq!(t.hash(&config, &a), t.hash(&config, &"key".to_string()));
        assert_eq!(t.hash(&config, &a), config.hash(b"key"));
    }

    #[test]
    fn nocase_strings() {
        let t: NoCaseStrings<u32> = NoCaseStrings::new();
        let config = DictConfig::new();
        let (a, b) = ("Set".to_string(), "sET".to_string());
        assert!(t.key_compare(&(), &a, &b));
        assert_eq!(t.hash(&config, &a), t.hash(&config, &b));
        assert!(!t.key_compare(&(), &a, &"get".to_string()));
    }
}
