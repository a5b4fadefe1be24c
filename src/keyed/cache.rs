use std::{collections::HashMap, fmt::Debug, hash::Hash, mem::take};

use slabmap::SlabMap;
use tracing::{debug, trace};

use super::{
    diff::{diff, Placed, Snapshot},
    view::ViewSlot,
    DedupPolicy, KeyedOptions,
};
use crate::{Error, Obs, Resource, Result};


/// Resources by key, with the list position each key last had.
///
/// Entries live in an arena; `slots` maps each live key to its arena slot.
pub(crate) struct ResourceCache<K, T: 'static, R> {
    entries: SlabMap<CacheEntry<K, T, R>>,
    slots: HashMap<K, usize>,
    last_keys: Option<Vec<K>>,
    options: KeyedOptions,
}

struct CacheEntry<K, T: 'static, R> {
    key: K,
    index: usize,
    resource: R,
    view: ViewSlot<T>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Applied {
    /// The set or order of keys may have changed; the output must be emitted.
    Structural,
    /// Only item values were pushed.
    ValuesOnly,
    Skipped,
    /// `is_cancelled` returned `true` before every new key was created.
    Cancelled,
}

impl<K, T, R> ResourceCache<K, T, R>
where
    K: Eq + Hash + Clone + Debug + 'static,
    T: Clone + 'static,
    R: Resource,
{
    pub fn new(options: KeyedOptions) -> Self {
        Self {
            entries: SlabMap::new(),
            slots: HashMap::new(),
            last_keys: None,
            options,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    #[cfg(test)]
    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }
    pub fn index_of(&self, key: &K) -> Option<usize> {
        Some(self.entries[*self.slots.get(key)?].index)
    }
    #[cfg(test)]
    pub fn value_of(&self, key: &K) -> Option<T> {
        self.entries[*self.slots.get(key)?].view.get()
    }

    /// Creates the entry for a key that is not cached yet.
    ///
    /// The view exists before `factory` runs, so the factory can subscribe to it.
    pub fn insert(
        &mut self,
        placed: Placed<K, T>,
        factory: &mut impl FnMut(&K, Obs<T>) -> Result<R>,
    ) -> Result<()> {
        let Placed { key, index, item } = placed;
        debug_assert!(!self.slots.contains_key(&key));
        let view = ViewSlot::new(item);
        match factory(&key, view.view()) {
            Ok(resource) => {
                debug!(?key, index, "create entry");
                let slot = self.entries.insert(CacheEntry {
                    key: key.clone(),
                    index,
                    resource,
                    view,
                });
                self.slots.insert(key, slot);
                Ok(())
            }
            Err(e) => {
                view.close(self.options.complete_views_on_evict);
                Err(Error::factory(&key, e))
            }
        }
    }

    /// Moves a cached key to `index` and pushes its new item into the view.
    pub fn retain(&mut self, placed: Placed<K, T>) -> bool {
        let Some(&slot) = self.slots.get(&placed.key) else {
            return false;
        };
        let entry = &mut self.entries[slot];
        entry.index = placed.index;
        entry.view.set(placed.item);
        true
    }

    /// Removes a key and disposes its resource.
    pub fn evict(&mut self, key: &K) -> bool {
        let Some(slot) = self.slots.remove(key) else {
            return false;
        };
        let Some(entry) = self.entries.remove(slot) else {
            return false;
        };
        debug!(key = ?entry.key, "evict entry");
        self.dispose_entry(entry);
        true
    }

    fn dispose_entry(&self, entry: CacheEntry<K, T, R>) {
        entry.view.close(self.options.complete_views_on_evict);
        entry.resource.dispose();
    }

    /// Applies one emitted list: removals first, then retained keys, then new keys.
    ///
    /// `is_cancelled` is checked before each call to `factory`.
    pub fn apply(
        &mut self,
        snapshot: Snapshot<K, T>,
        factory: &mut impl FnMut(&K, Obs<T>) -> Result<R>,
        is_cancelled: impl Fn() -> bool,
    ) -> Result<Applied> {
        let same = self
            .last_keys
            .as_deref()
            .is_some_and(|keys| snapshot.same_keys(keys));
        if same && self.options.dedup == DedupPolicy::Skip {
            trace!(len = snapshot.len(), "skip repeated key sequence");
            return Ok(Applied::Skipped);
        }
        let keys = snapshot.keys().to_vec();
        let d = diff(&self.slots, snapshot);

        let mut removed: Vec<(usize, K)> = d
            .removed
            .into_iter()
            .filter_map(|key| Some((self.index_of(&key)?, key)))
            .collect();
        removed.sort_by_key(|(index, _)| *index);
        for (_, key) in &removed {
            self.evict(key);
        }
        for placed in d.retained {
            self.retain(placed);
        }
        for placed in d.added {
            if is_cancelled() {
                debug!("apply cancelled");
                return Ok(Applied::Cancelled);
            }
            self.insert(placed, factory)?;
        }
        self.last_keys = Some(keys);

        if same && self.options.dedup == DedupPolicy::ValuesOnly {
            trace!(len = self.len(), "values only");
            Ok(Applied::ValuesOnly)
        } else {
            Ok(Applied::Structural)
        }
    }

    /// Handles of all entries in ascending index order.
    pub fn handles(&self) -> Vec<R::Handle> {
        let mut entries: Vec<_> = self.entries.iter().map(|(_, e)| e).collect();
        entries.sort_by_key(|e| e.index);
        entries.iter().map(|e| e.resource.handle()).collect()
    }

    /// Disposes every entry in ascending index order and forgets the previous key sequence.
    pub fn dispose_all(&mut self) {
        let entries = take(&mut self.entries);
        self.slots.clear();
        self.last_keys = None;
        if entries.is_empty() {
            return;
        }
        debug!(len = entries.len(), "dispose all entries");
        let mut entries: Vec<_> = entries.into_iter().map(|(_, e)| e).collect();
        entries.sort_by_key(|e| e.index);
        for entry in entries {
            self.dispose_entry(entry);
        }
    }
}
