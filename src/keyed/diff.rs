use std::{collections::HashMap, hash::Hash};


/// One emitted list, indexed by identity.
///
/// When several items share a key, the last one determines the key's item and index.
pub struct Snapshot<K, T> {
    keys: Vec<K>,
    items: Vec<T>,
    by_key: HashMap<K, usize>,
}

impl<K: Eq + Hash + Clone, T> Snapshot<K, T> {
    pub fn new(items: Vec<T>, mut identity: impl FnMut(&T) -> K) -> Self {
        let mut keys = Vec::with_capacity(items.len());
        let mut by_key = HashMap::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let key = identity(item);
            by_key.insert(key.clone(), index);
            keys.push(key);
        }
        Self {
            keys,
            items,
            by_key,
        }
    }

    /// Keys of all items in list order, duplicates included.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<(usize, &T)> {
        let index = *self.by_key.get(key)?;
        Some((index, &self.items[index]))
    }

    /// Returns `true` if `keys` has the same length and the same key at every position.
    pub fn same_keys(&self, keys: &[K]) -> bool {
        self.keys == keys
    }

    fn into_placed(self) -> impl Iterator<Item = Placed<K, T>> {
        let Self {
            keys,
            items,
            by_key,
        } = self;
        keys.into_iter()
            .zip(items)
            .enumerate()
            .filter(move |(index, (key, _))| by_key.get(key) == Some(index))
            .map(|(index, (key, item))| Placed { key, index, item })
    }
}

/// A key that is present in the next list, with its position and item.
#[derive(Debug, Clone, PartialEq)]
pub struct Placed<K, T> {
    pub key: K,
    pub index: usize,
    pub item: T,
}

/// Classification of the next list against the keys currently cached.
///
/// `added` and `retained` are in ascending index order.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDiff<K, T> {
    pub added: Vec<Placed<K, T>>,
    pub retained: Vec<Placed<K, T>>,
    pub removed: Vec<K>,
}

impl<K, T> KeyDiff<K, T> {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub fn diff<K, V, T>(previous: &HashMap<K, V>, next: Snapshot<K, T>) -> KeyDiff<K, T>
where
    K: Eq + Hash + Clone,
{
    let removed = previous
        .keys()
        .filter(|key| !next.by_key.contains_key(*key))
        .cloned()
        .collect();
    let mut added = Vec::new();
    let mut retained = Vec::new();
    for placed in next.into_placed() {
        if previous.contains_key(&placed.key) {
            retained.push(placed);
        } else {
            added.push(placed);
        }
    }
    KeyDiff {
        added,
        retained,
        removed,
    }
}

/// Indexes `items` and classifies them against `previous` in one call.
pub fn diff_list<K, V, T>(
    previous: &HashMap<K, V>,
    items: Vec<T>,
    identity: impl FnMut(&T) -> K,
) -> KeyDiff<K, T>
where
    K: Eq + Hash + Clone,
{
    diff(previous, Snapshot::new(items, identity))
}
