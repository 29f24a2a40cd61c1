//! Hashed identifiers used as map keys for definitions, textures and cameras.

use std::cell::RefCell;
use std::hash::Hasher;

use rustc_hash::{FxHashMap, FxHasher};

thread_local! {
    /// Names seen by `IdString::new` on this thread, for display only
    static NAMES: RefCell<FxHashMap<u64, Box<str>>> = RefCell::new(FxHashMap::default());
}

/// A name reduced to its 64-bit hash.
///
/// Two identifiers are equal when their hashes are equal. Hash collisions are
/// treated as the same name, so distinct names that collide are a
/// configuration error the caller must avoid. The string is interned per
/// thread so that [`Display`](std::fmt::Display) can print it; an identifier
/// created on another thread prints as its hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdString(u64);

impl IdString {
    /// Hash `name` into an identifier.
    pub fn new(name: &str) -> Self {
        let mut hasher = FxHasher::default();
        hasher.write(name.as_bytes());
        let hash = hasher.finish();
        NAMES.with(|names| {
            names
                .borrow_mut()
                .entry(hash)
                .or_insert_with(|| name.into());
        });
        Self(hash)
    }

    /// The name this identifier was created from, if known on this thread
    pub fn name(&self) -> Option<String> {
        NAMES.with(|names| names.borrow().get(&self.0).map(|name| name.to_string()))
    }

    /// Raw hash value.
    pub fn hash_value(&self) -> u64 {
        self.0
    }

    /// True if this identifier was created from the empty string.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Default for IdString {
    fn default() -> Self {
        Self::new("")
    }
}

impl From<&str> for IdString {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<&String> for IdString {
    fn from(name: &String) -> Self {
        Self::new(name)
    }
}

impl From<String> for IdString {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

impl std::fmt::Display for IdString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        NAMES.with(|names| match names.borrow().get(&self.0) {
            Some(name) => f.write_str(name),
            None => write!(f, "[{:016x}]", self.0),
        })
    }
}
