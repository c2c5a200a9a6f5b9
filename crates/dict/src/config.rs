use std::hash::Hasher;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::debug;
use siphasher::sip::SipHasher13;

/// Above this load factor a table grows even while resizing is disabled.
pub(crate) const FORCE_RESIZE_RATIO: usize = 5;

static GLOBAL: DictConfig = DictConfig::new();

/// Settings shared by every dict bound to the same config.
///
/// Most programs use [`DictConfig::global`], which the free functions of this
/// crate ([`enable_resize`], [`set_hash_seed`], ...) act on. The hash seed must
/// be set before the first key is hashed: changing it later makes every
/// existing table unreadable.
#[derive(Debug)]
pub struct DictConfig {
    resize_enabled: AtomicBool,
    seed: [AtomicU64; 2],
}

impl Default for DictConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DictConfig {
    /// Resizing enabled, all-zero seed
    pub const fn new() -> Self {
        Self {
            resize_enabled: AtomicBool::new(true),
            seed: [AtomicU64::new(0), AtomicU64::new(0)],
        }
    }

    /// The process-wide config
    pub fn global() -> &'static DictConfig {
        &GLOBAL
    }

    pub fn enable_resize(&self) {
        debug!(target: "resize", "resize enabled");
        self.resize_enabled.store(true, Ordering::Relaxed);
    }

    /// Defers growth until resizing is enabled again, unless a table
    /// gets more than five entries per bucket.
    pub fn disable_resize(&self) {
        debug!(target: "resize", "resize disabled");
        self.resize_enabled.store(false, Ordering::Relaxed);
    }

    pub fn resize_enabled(&self) -> bool {
        self.resize_enabled.load(Ordering::Relaxed)
    }

    pub fn set_hash_seed(&self, seed: [u8; 16]) {
        let seed = u128::from_le_bytes(seed);
        self.seed[0].store(seed as u64, Ordering::Relaxed);
        self.seed[1].store((seed >> 64) as u64, Ordering::Relaxed);
    }

    pub fn hash_seed(&self) -> [u8; 16] {
        let k0 = self.seed[0].load(Ordering::Relaxed) as u128;
        let k1 = self.seed[1].load(Ordering::Relaxed) as u128;
        (k1 << 64 | k0).to_le_bytes()
    }

    /// SipHash-1-3 of `key` under this config's seed
    pub fn hash(&self, key: &[u8]) -> u64 {
        let mut h = self.hasher();
        h.write(key);
        h.finish()
    }

    /// Like [`DictConfig::hash`], but ASCII letters hash the same in
    /// either case.
    pub fn hash_nocase(&self, key: &[u8]) -> u64 {
        let mut h = self.hasher();
        let mut buf = [0u8; 64];
        for chunk in key.chunks(buf.len()) {
            let lower = &mut buf[..chunk.len()];
            lower.copy_from_slice(chunk);
            lower.make_ascii_lowercase();
            h.write(lower);
        }
        h.finish()
    }

    fn hasher(&self) -> SipHasher13 {
        SipHasher13::new_with_keys(
            self.seed[0].load(Ordering::Relaxed),
            self.seed[1].load(Ordering::Relaxed),
        )
    }
}

pub fn enable_resize() {
    DictConfig::global().enable_resize()
}

pub fn disable_resize() {
    DictConfig::global().disable_resize()
}

pub fn set_hash_seed(seed: [u8; 16]) {
    DictConfig::global().set_hash_seed(seed)
}

pub fn get_hash_seed() -> [u8; 16] {
    DictConfig::global().hash_seed()
}

/// Hashes `key` with the process-wide seed
pub fn gen_hash_function(key: &[u8]) -> u64 {
    DictConfig::global().hash(key)
}

/// Case-insensitive variant of [`gen_hash_function`]
pub fn gen_case_hash_function(key: &[u8]) -> u64 {
    DictConfig::global().hash_nocase(key)
}
