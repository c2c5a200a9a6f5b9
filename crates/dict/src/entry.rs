use slotmap::new_key_type;

new_key_type! {
    /// Stable handle of an entry in a dict's entry slab.
    ///
    /// Handles are generational: once an entry is removed its handle never
    /// resolves again, even if the slot is reused.
    pub struct EntryId;
}

/// Value stored next to a key.
///
/// Only `Obj` values go through the descriptor's duplicate and destroy
/// callbacks; the numeric variants are stored inline.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<V> {
    Obj(V),
    Signed(i64),
    Unsigned(u64),
    Double(f64),
}

impl<V> Default for Value<V> {
    fn default() -> Self {
        Value::Unsigned(0)
    }
}

impl<V> Value<V> {
    pub fn as_obj(&self) -> Option<&V> {
        match self {
            Value::Obj(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_obj_mut(&mut self) -> Option<&mut V> {
        match self {
            Value::Obj(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_obj(self) -> Option<V> {
        match self {
            Value::Obj(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_signed(&self) -> Option<i64> {
        match *self {
            Value::Signed(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_unsigned(&self) -> Option<u64> {
        match *self {
            Value::Unsigned(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match *self {
            Value::Double(d) => Some(d),
            _ => None,
        }
    }
}

/// One key/value pair and the link to the rest of its bucket chain.
pub struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) val: Value<V>,
    pub(crate) next: Option<EntryId>,
}

impl<K, V> Entry<K, V> {
    pub(crate) fn new(key: K, next: Option<EntryId>) -> Self {
        Self {
            key,
            val: Value::default(),
            next,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &Value<V> {
        &self.val
    }

    pub fn value_mut(&mut self) -> &mut Value<V> {
        &mut self.val
    }

    /// Stores `val` as is: the descriptor's `val_dup` is not applied and
    /// the previous value is dropped without `val_destructor`.
    pub fn set_val(&mut self, val: V) {
        self.val = Value::Obj(val);
    }

    pub fn set_signed_integer_val(&mut self, n: i64) {
        self.val = Value::Signed(n);
    }

    pub fn set_unsigned_integer_val(&mut self, n: u64) {
        self.val = Value::Unsigned(n);
    }

    pub fn set_double_val(&mut self, d: f64) {
        self.val = Value::Double(d);
    }

    pub fn into_parts(self) -> (K, Value<V>) {
        (self.key, self.val)
    }
}

impl<K: std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for Entry<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{:?}, {:?}>", self.key, self.val)
    }
}
