use crate::cache::config::EvictionMode;
use crate::types::TimestepIndex;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Entry store. The list order of `LruCache` doubles as insertion order as long
/// as reads go through `peek`, which is how FIFO mode is kept.
pub(crate) type Store<M> = LruCache<TimestepIndex, Arc<M>>;

pub(crate) fn new_store<M>(capacity: usize) -> Store<M> {
    LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
}

/// Reads an entry, touching it only in LRU mode.
pub(crate) fn lookup<M>(store: &mut Store<M>, index: TimestepIndex, mode: EvictionMode) -> Option<Arc<M>> {
    match mode {
        EvictionMode::Fifo => store.peek(&index).cloned(),
        EvictionMode::Lru => store.get(&index).cloned(),
    }
}

/// Inserts `payload` and, if the store was full, removes exactly one victim in
/// the same step. Returns the evicted index. Overwriting an existing key evicts
/// nothing.
pub(crate) fn insert_bounded<M>(
    store: &mut Store<M>,
    index: TimestepIndex,
    payload: Arc<M>,
) -> Option<TimestepIndex> {
    match store.push(index, payload) {
        Some((old, _)) if old != index => Some(old),
        _ => None,
    }
}

/// Cached indices, oldest position first.
pub(crate) fn ordered_keys<M>(store: &Store<M>) -> Vec<TimestepIndex> {
    store.iter().rev().map(|(k, _)| *k).collect()
}
