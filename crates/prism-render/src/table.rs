// SPDX-License-Identifier: CEPL-1.0
use crate::{FatalError, ObjectId};
use std::collections::HashMap;

/// Dense per-object storage with an id index.
///
/// One entry holds every resource an object owns, so an id is either fully
/// provisioned or absent. Iteration follows insertion order, which is the
/// draw order.
#[derive(Debug)]
pub struct ResourceTable<T> {
    ids: Vec<ObjectId>,
    entries: Vec<T>,
    index: HashMap<ObjectId, usize>,
}

impl<T> Default for ResourceTable<T> {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> ResourceTable<T> {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            ids: Vec::with_capacity(n),
            entries: Vec::with_capacity(n),
            index: HashMap::with_capacity(n),
        }
    }

    pub fn insert(&mut self, id: ObjectId, entry: T) -> Result<(), FatalError> {
        if self.index.contains_key(&id) {
            return Err(FatalError::DuplicateObject(id));
        }
        self.index.insert(id, self.entries.len());
        self.ids.push(id);
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, id: ObjectId) -> Option<&T> {
        self.index.get(&id).map(|&i| &self.entries[i])
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut T> {
        match self.index.get(&id) {
            Some(&i) => Some(&mut self.entries[i]),
            None => None,
        }
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &T)> {
        self.ids.iter().copied().zip(self.entries.iter())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Empties the table in insertion order.
    pub fn drain(&mut self) -> impl Iterator<Item = (ObjectId, T)> + '_ {
        self.index.clear();
        self.ids.drain(..).zip(self.entries.drain(..))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdAllocator;

    #[test]
    fn iterates_in_insertion_order() {
        let mut ids = IdAllocator::new();
        let (a, b, c) = (ids.allocate(), ids.allocate(), ids.allocate());
        let mut t = ResourceTable::default();
        t.insert(c, "c").unwrap();
        t.insert(a, "a").unwrap();
        t.insert(b, "b").unwrap();
        let order: Vec<_> = t.iter().map(|(_, v)| *v).collect();
        assert_eq!(order, ["c", "a", "b"]);
        assert_eq!(t.get(a), Some(&"a"));
    }

    #[test]
    fn duplicate_insert_leaves_table_unchanged() {
        let mut ids = IdAllocator::new();
        let a = ids.allocate();
        let mut t = ResourceTable::with_capacity(1);
        t.insert(a, 1).unwrap();
        assert!(matches!(t.insert(a, 2), Err(FatalError::DuplicateObject(id)) if id == a));
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(a), Some(&1));
    }

    #[test]
    fn drain_empties_index_too() {
        let mut ids = IdAllocator::new();
        let a = ids.allocate();
        let mut t = ResourceTable::default();
        t.insert(a, 1).unwrap();
        *t.get_mut(a).unwrap() += 1;
        let drained: Vec<_> = t.drain().collect();
        assert_eq!(drained, vec![(a, 2)]);
        assert!(t.is_empty());
        assert!(!t.contains(a));
    }
}
