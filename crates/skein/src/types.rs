//! Utility types.

use std::{collections::VecDeque, hash::Hash};

type BuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;

pub type Map<K, V> = indexmap::IndexMap<K, V, BuildHasher>;
pub type Set<T> = indexmap::IndexSet<T, BuildHasher>;

/// A FIFO work list that holds each value at most once.
#[derive(Debug)]
pub struct Queue<T> {
    queue: VecDeque<T>,
    hash: Set<T>,
}
impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            hash: Set::default(),
        }
    }
}

impl<T> Queue<T>
where
    T: Clone + Eq + Hash,
{
    pub fn push(&mut self, value: T) {
        if self.hash.insert(value.clone()) {
            self.queue.push_back(value);
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        let value = self.queue.pop_front()?;
        self.hash.swap_remove(&value);
        Some(value)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.hash.clear();
    }
}

impl<T> FromIterator<T> for Queue<T>
where
    T: Clone + Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut queue = Self::default();
        for value in iter {
            queue.push(value);
        }
        queue
    }
}

/// A set kept as a sorted vector.
///
/// Comparison and hashing follow the element order, so two sets with the
/// same members compare equal and can key a `Map`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrdSet<T> {
    items: Vec<T>,
}

impl<T> Default for OrdSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Ord> OrdSet<T> {
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Insert `value`, returning `true` if it was not present yet.
    pub fn insert(&mut self, value: T) -> bool {
        match self.items.binary_search(&value) {
            Ok(..) => false,
            Err(pos) => {
                self.items.insert(pos, value);
                true
            }
        }
    }

    pub fn remove(&mut self, value: &T) -> bool {
        match self.items.binary_search(value) {
            Ok(pos) => {
                self.items.remove(pos);
                true
            }
            Err(..) => false,
        }
    }

    pub fn contains(&self, value: &T) -> bool {
        self.items.binary_search(value).is_ok()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items[..]
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn retain(&mut self, f: impl FnMut(&T) -> bool) {
        self.items.retain(f);
    }
}

impl<T: Ord + Clone> OrdSet<T> {
    /// Insert every member of `other`, returning `true` if anything changed.
    pub fn union_with(&mut self, other: &OrdSet<T>) -> bool {
        let mut changed = false;
        for value in &other.items {
            changed |= self.insert(value.clone());
        }
        changed
    }
}

impl<T: Ord> FromIterator<T> for OrdSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut items: Vec<T> = iter.into_iter().collect();
        items.sort();
        items.dedup();
        Self { items }
    }
}

impl<T: Ord> Extend<T> for OrdSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl<'a, T> IntoIterator for &'a OrdSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_dedups_pending_values() {
        let mut queue: Queue<u32> = [3, 1, 3, 2].into_iter().collect();
        assert_eq!(queue.pop(), Some(3));
        queue.push(3);
        queue.push(1);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn ord_set_keeps_order() {
        let mut set: OrdSet<i64> = [5, -1, 3].into_iter().collect();
        assert!(!set.insert(3));
        assert!(set.insert(4));
        assert_eq!(set.as_slice(), &[-1, 3, 4, 5]);
        assert_eq!(set.last(), Some(&5));
        assert!(set.remove(&-1));
        assert!(!set.contains(&-1));

        let other: OrdSet<i64> = [1, 5].into_iter().collect();
        assert!(set.union_with(&other));
        assert!(!set.union_with(&other));
        assert_eq!(set.as_slice(), &[1, 3, 4, 5]);
    }
}
