//! Identity maps for collection items.
//!
//! A collection that participates in identity-based matching carries a side
//! table associating each live element with an [`ItemId`] that survives
//! reordering and index shifts. The table mirrors the collection shape: a
//! parallel vector for sequences, a key-indexed map for maps. A separate
//! deleted set records ids of base items that were deliberately removed
//! locally, so a later reconciliation pass does not resurrect them.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::index::Index;

/// Identity of one collection element, independent of its position or key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(Uuid);

impl ItemId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        ItemId(Uuid::new_v4())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ItemIdsData {
    Sequence(Vec<ItemId>),
    Map(IndexMap<String, ItemId>),
}

/// Per-collection identity map plus the locally-deleted id set.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemIds {
    data: ItemIdsData,
    deleted: HashSet<ItemId>,
}

impl ItemIds {
    pub fn new_sequence(len: usize) -> Self {
        ItemIds {
            data: ItemIdsData::Sequence((0..len).map(|_| ItemId::new()).collect()),
            deleted: HashSet::new(),
        }
    }

    pub fn new_map<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        ItemIds {
            data: ItemIdsData::Map(
                keys.into_iter()
                    .map(|k| (k.to_owned(), ItemId::new()))
                    .collect(),
            ),
            deleted: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ItemIdsData::Sequence(v) => v.len(),
            ItemIdsData::Map(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the id attached to the element at `index`, if any.
    pub fn get(&self, index: &Index) -> Option<ItemId> {
        match (&self.data, index) {
            (ItemIdsData::Sequence(v), Index::Num(n)) => v.get(*n).copied(),
            (ItemIdsData::Map(m), Index::Key(k)) => m.get(k).copied(),
            _ => None,
        }
    }

    /// Reverse lookup: the index currently carrying `id`.
    pub fn key_of(&self, id: ItemId) -> Option<Index> {
        match &self.data {
            ItemIdsData::Sequence(v) => v.iter().position(|x| *x == id).map(Index::Num),
            ItemIdsData::Map(m) => m
                .iter()
                .find(|(_, x)| **x == id)
                .map(|(k, _)| Index::Key(k.clone())),
        }
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.key_of(id).is_some()
    }

    /// Assigns a fresh id to a newly inserted element. Returns `None` when the
    /// index does not address an insertion point of this collection shape.
    pub fn insert(&mut self, index: &Index) -> Option<ItemId> {
        let id = ItemId::new();
        self.insert_with(index, id).then_some(id)
    }

    /// Inserts a caller-supplied id (used when mirroring an element from
    /// another collection that already carries an identity).
    pub fn insert_with(&mut self, index: &Index, id: ItemId) -> bool {
        match (&mut self.data, index) {
            (ItemIdsData::Sequence(v), Index::Num(n)) if *n <= v.len() => {
                v.insert(*n, id);
                true
            }
            (ItemIdsData::Sequence(v), Index::Empty) => {
                v.push(id);
                true
            }
            (ItemIdsData::Map(m), Index::Key(k)) => {
                m.insert(k.clone(), id);
                true
            }
            _ => false,
        }
    }

    /// Removes the entry at `index`, returning the id that was attached.
    pub fn remove(&mut self, index: &Index) -> Option<ItemId> {
        match (&mut self.data, index) {
            (ItemIdsData::Sequence(v), Index::Num(n)) if *n < v.len() => Some(v.remove(*n)),
            (ItemIdsData::Map(m), Index::Key(k)) => m.shift_remove(k),
            _ => None,
        }
    }

    /// Moves a sequence entry from one position to another, keeping the id
    /// attached to its element.
    pub fn move_item(&mut self, from: usize, to: usize) -> bool {
        match &mut self.data {
            ItemIdsData::Sequence(v) if from < v.len() && to < v.len() => {
                let id = v.remove(from);
                v.insert(to, id);
                true
            }
            _ => false,
        }
    }

    pub fn mark_deleted(&mut self, id: ItemId) {
        self.deleted.insert(id);
    }

    pub fn unmark_deleted(&mut self, id: ItemId) {
        self.deleted.remove(&id);
    }

    pub fn is_deleted(&self, id: ItemId) -> bool {
        self.deleted.contains(&id)
    }

    pub fn deleted(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.deleted.iter().copied()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn iter(&self) -> Vec<(Index, ItemId)> {
        match &self.data {
            ItemIdsData::Sequence(v) => v
                .iter()
                .enumerate()
                .map(|(i, id)| (Index::Num(i), *id))
                .collect(),
            ItemIdsData::Map(m) => m
                .iter()
                .map(|(k, id)| (Index::Key(k.clone()), *id))
                .collect(),
        }
    }

    /// Brings the table back in sync with the live collection: stale entries
    /// are dropped, missing entries are backfilled with fresh ids. Length and
    /// key mismatches are invariant violations handled defensively here.
    pub fn resync_sequence(&mut self, len: usize) {
        match &mut self.data {
            ItemIdsData::Sequence(v) => {
                v.truncate(len);
                while v.len() < len {
                    v.push(ItemId::new());
                }
            }
            ItemIdsData::Map(_) => {
                self.data = ItemIdsData::Sequence((0..len).map(|_| ItemId::new()).collect());
            }
        }
    }

    pub fn resync_map<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) {
        let keys: Vec<&str> = keys.into_iter().collect();
        match &mut self.data {
            ItemIdsData::Map(m) => {
                m.retain(|k, _| keys.iter().any(|x| x == k));
                for k in keys {
                    if !m.contains_key(k) {
                        m.insert(k.to_owned(), ItemId::new());
                    }
                }
            }
            ItemIdsData::Sequence(_) => {
                self.data = ItemIdsData::Map(
                    keys.into_iter()
                        .map(|k| (k.to_owned(), ItemId::new()))
                        .collect(),
                );
            }
        }
    }
}
