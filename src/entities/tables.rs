use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("key {key} outside {min}..={max}")]
pub struct KeyOutOfRange {
    pub key: i32,
    pub min: i32,
    pub max: i32,
}

/// Sparse id -> value table with a declared inclusive key range.
///
/// A value of zero is the default and is never stored, so iteration only
/// yields meaningful entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseTable {
    min: i32,
    max: i32,
    entries: BTreeMap<i32, i32>,
}

impl SparseTable {
    pub fn new(min: i32, max: i32) -> Self {
        Self {
            min,
            max,
            entries: BTreeMap::new(),
        }
    }

    pub fn bounds(&self) -> (i32, i32) {
        (self.min, self.max)
    }

    pub fn in_range(&self, key: i32) -> bool {
        key >= self.min && key <= self.max
    }

    pub fn get(&self, key: i32) -> i32 {
        self.entries.get(&key).copied().unwrap_or(0)
    }

    pub fn set(&mut self, key: i32, value: i32) -> Result<(), KeyOutOfRange> {
        if !self.in_range(key) {
            return Err(KeyOutOfRange {
                key,
                min: self.min,
                max: self.max,
            });
        }
        if value == 0 {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.entries.iter().map(|(key, value)| (*key, *value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
