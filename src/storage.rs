use std::collections::BTreeMap;

use primitive_types::U256;

/// Per-account persistent key/value words. Absent keys read as zero and
/// zero values are never kept, so two storages holding the same nonzero
/// slots compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Storage {
    slots: BTreeMap<U256, U256>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, key: U256) -> U256 {
        self.slots.get(&key).copied().unwrap_or_default()
    }

    /// Overwrites the slot, returning its previous value.
    pub fn store(&mut self, key: U256, value: U256) -> U256 {
        let previous = if value.is_zero() {
            self.slots.remove(&key)
        } else {
            self.slots.insert(key, value)
        };
        previous.unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&U256, &U256)> {
        self.slots.iter()
    }
}

impl FromIterator<(U256, U256)> for Storage {
    fn from_iter<I: IntoIterator<Item = (U256, U256)>>(iter: I) -> Self {
        let mut storage = Storage::new();
        for (k, v) in iter {
            storage.store(k, v);
        }
        storage
    }
}
