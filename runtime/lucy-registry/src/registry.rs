use std::fmt;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned};
use parking_lot::Mutex;

use crate::stats::{Counters, RegistryStats};
use crate::{Handle, RegistryConfig};

/// One entry of the backing array. `Free` slots are threaded into the free
/// list through `next`; 0 terminates it.
enum Slot<T> {
    Free(usize),
    Used(T),
}

/// An immutable-length backing array. Slot contents are swapped
/// individually; the array itself is only ever replaced by a larger copy.
struct Table<T> {
    slots: Box<[Atomic<Slot<T>>]>,
}

impl<T> Table<T> {
    fn with_free_list(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|index| Atomic::new(Slot::Free(free_link(index, 1, capacity))))
            .collect();
        Self { slots }
    }
}

/// Link stored in a fresh free slot at `index` when `first..len` is being
/// threaded: each slot points at its successor and the last one at 0.
fn free_link(index: usize, first: usize, len: usize) -> usize {
    if index < first || index + 1 == len {
        0
    } else {
        index + 1
    }
}

struct FreeList {
    head: usize,
    live: usize,
}

/// Process-lifetime table mapping [`Handle`]s to values owned by the managed
/// side of an FFI boundary.
///
/// Writers (`store`, `delete`) serialize on one lock. `fetch` takes no lock:
/// it pins an epoch, loads the current table and reads one slot. Tables and
/// slot contents that a writer replaces are reclaimed only once no pinned
/// reader can still see them.
pub struct Registry<T> {
    table: Atomic<Table<T>>,
    free: Mutex<FreeList>,
    counters: Counters,
}

impl<T> Registry<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(initial_capacity: usize) -> Self {
        Self::with_config(RegistryConfig::default().with_initial_capacity(initial_capacity))
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            table: Atomic::new(Table::with_free_list(config.capacity())),
            free: Mutex::new(FreeList { head: 1, live: 0 }),
            counters: Counters::new(config.profile),
        }
    }

    /// Place `value` in a free slot, growing the table when none is left.
    pub fn store(&self, value: T) -> Handle {
        // Pin before locking: `pin` may run deferred drops of `T`, which
        // must not execute under the write lock.
        let guard = epoch::pin();
        let mut free = self.free.lock();
        let head = free.head;
        let index = match head {
            0 => self.grow(&mut free, value, &guard),
            index => {
                let slot = &self.slots(&guard)[index];
                let current = slot.load(Ordering::Acquire, &guard);
                // SAFETY: slots are never null; the guard keeps `current` alive.
                free.head = match unsafe { current.deref() } {
                    Slot::Free(next) => *next,
                    Slot::Used(_) => unreachable!("free-list head {index} is a live slot"),
                };
                slot.store(Owned::new(Slot::Used(value)), Ordering::Release);
                // SAFETY: `current` is unlinked; readers pinned before the
                // store may still hold it, which deferral accounts for.
                unsafe { guard.defer_destroy(current) };
                index
            }
        };
        free.live += 1;
        self.counters.hit(&self.counters.stores);
        Handle::from_index(index)
    }

    /// Retire the value under `handle`. Returns `false` when the slot was
    /// out of range or already free.
    ///
    /// The retired value is not dropped here. It goes to the epoch
    /// collector and is dropped during some later pin, possibly on another
    /// thread, once no reader can still observe it.
    ///
    /// Deleting a handle that has since been handed out again by `store`
    /// frees the new owner's slot; callers must delete each handle once.
    pub fn delete(&self, handle: Handle) -> bool {
        let index = handle.index();
        // Pin before locking: `pin` may run deferred drops of `T`, which
        // must not execute under the write lock.
        let guard = epoch::pin();
        let mut free = self.free.lock();
        let Some(slot) = self.slots(&guard).get(index) else {
            tracing::trace!(handle = index, "ignoring delete of out-of-range handle");
            self.counters.hit(&self.counters.ignored_deletes);
            return false;
        };
        let current = slot.load(Ordering::Acquire, &guard);
        // SAFETY: slots are never null; the guard keeps `current` alive.
        if let Slot::Free(_) = unsafe { current.deref() } {
            tracing::trace!(handle = index, "ignoring delete of free handle");
            self.counters.hit(&self.counters.ignored_deletes);
            return false;
        }
        slot.store(Owned::new(Slot::Free(free.head)), Ordering::Release);
        // SAFETY: as in `store`, the replaced slot is unreachable from the
        // current table and dropped after concurrent readers unpin.
        unsafe { guard.defer_destroy(current) };
        free.head = index;
        free.live -= 1;
        self.counters.hit(&self.counters.deletes);
        true
    }

    /// Double the table. The first new slot receives `value`; the rest form
    /// the new free list. Returns the index of the filled slot.
    fn grow(&self, free: &mut FreeList, value: T, guard: &Guard) -> usize {
        let old = self.slots(guard);
        let index = old.len();
        let len = index * 2;
        let mut slots = Vec::with_capacity(len);
        // Both tables share slot nodes; only the current table owns them.
        slots.extend(
            old.iter()
                .map(|slot| Atomic::from(slot.load(Ordering::Acquire, guard))),
        );
        slots.push(Atomic::new(Slot::Used(value)));
        slots.extend(
            (index + 1..len).map(|i| Atomic::new(Slot::Free(free_link(i, index + 1, len)))),
        );
        let previous = self.table.swap(
            Owned::new(Table {
                slots: slots.into_boxed_slice(),
            }),
            Ordering::AcqRel,
            guard,
        );
        // SAFETY: the old table is no longer published. Dropping a `Table`
        // frees only its pointer array, never the shared slot nodes.
        unsafe { guard.defer_destroy(previous) };
        free.head = index + 1;
        tracing::debug!(from = index, to = len, "grew handle registry");
        self.counters.hit(&self.counters.grows);
        index
    }
}

impl<T> Registry<T> {
    /// Look up `handle` without blocking. `None` for free, stale or
    /// out-of-range handles.
    pub fn fetch(&self, handle: Handle) -> Option<T>
    where
        T: Clone,
    {
        self.fetch_with(handle, T::clone)
    }

    /// Lend the value under `handle` to `f` instead of cloning it out.
    pub fn fetch_with<R, F>(&self, handle: Handle, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        let guard = epoch::pin();
        let found = self.slots(&guard).get(handle.index()).and_then(|slot| {
            // SAFETY: slots are never null; the guard keeps the node alive
            // even if a writer replaces it meanwhile.
            match unsafe { slot.load(Ordering::Acquire, &guard).deref() } {
                Slot::Used(value) => Some(f(value)),
                Slot::Free(_) => None,
            }
        });
        match found {
            Some(_) => self.counters.hit(&self.counters.fetch_hits),
            None => self.counters.hit(&self.counters.fetch_misses),
        }
        found
    }

    /// Length of the current backing array, slot 0 included.
    pub fn capacity(&self) -> usize {
        let guard = epoch::pin();
        self.slots(&guard).len()
    }

    /// Number of handles stored and not yet deleted.
    pub fn live(&self) -> usize {
        self.free.lock().live
    }

    pub fn stats(&self) -> RegistryStats {
        self.counters.snapshot()
    }

    fn slots<'g>(&self, guard: &'g Guard) -> &'g [Atomic<Slot<T>>] {
        let table = self.table.load(Ordering::Acquire, guard);
        // SAFETY: the table is set at construction and only swapped for
        // another non-null table; the guard keeps a swapped-out one alive.
        unsafe { &table.deref().slots }
    }
}

impl<T> Default for Registry<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::with_config(RegistryConfig::default())
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("capacity", &self.capacity())
            .field("live", &self.live())
            .finish()
    }
}

impl<T> Drop for Registry<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` rules out concurrent readers. Every slot node
        // is owned by the current table; superseded nodes were deferred.
        unsafe {
            let guard = epoch::unprotected();
            let table = self.table.load(Ordering::Acquire, guard).into_owned();
            for slot in table.slots.iter() {
                drop(slot.load(Ordering::Acquire, guard).into_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    impl<T> Registry<T> {
        /// Walk the free list from its head, asserting it is acyclic and
        /// only visits free slots.
        fn free_chain(&self) -> Vec<usize> {
            let head = self.free.lock().head;
            let guard = epoch::pin();
            let slots = self.slots(&guard);
            let mut chain = Vec::new();
            let mut index = head;
            while index != 0 {
                assert!(chain.len() < slots.len(), "free list cycles");
                chain.push(index);
                match unsafe { slots[index].load(Ordering::Acquire, &guard).deref() } {
                    Slot::Free(next) => index = *next,
                    Slot::Used(_) => panic!("free list visits live slot {index}"),
                }
            }
            chain
        }

        fn used_count(&self) -> usize {
            let guard = epoch::pin();
            self.slots(&guard)
                .iter()
                .filter(|slot| {
                    matches!(
                        unsafe { slot.load(Ordering::Acquire, &guard).deref() },
                        Slot::Used(_)
                    )
                })
                .count()
        }

        fn assert_consistent(&self) {
            let chain = self.free_chain();
            let used = self.used_count();
            assert_eq!(used, self.live());
            // Every slot except the sentinel is either live or on the list.
            assert_eq!(chain.len() + used + 1, self.capacity());
        }
    }

    fn handle(raw: usize) -> Handle {
        Handle::from_raw(raw).expect("non-zero")
    }

    #[test]
    fn new_threads_free_list_in_order() {
        let reg: Registry<u32> = Registry::new(6);
        assert_eq!(reg.capacity(), 6);
        assert_eq!(reg.free_chain(), vec![1, 2, 3, 4, 5]);
        reg.assert_consistent();
    }

    #[test]
    fn tiny_capacity_is_clamped() {
        let reg: Registry<u32> = Registry::new(0);
        assert_eq!(reg.capacity(), 2);
        assert_eq!(reg.free_chain(), vec![1]);
        let a = reg.store(1);
        let b = reg.store(2);
        assert_eq!(a.into_raw(), 1);
        assert_eq!(b.into_raw(), 2);
        assert_eq!(reg.capacity(), 4);
        reg.assert_consistent();
    }

    #[test]
    fn store_fetch_delete() {
        let reg = Registry::new(4);
        let h = reg.store(42);
        assert_eq!(reg.fetch(h), Some(42));
        assert!(reg.delete(h));
        assert_eq!(reg.fetch(h), None);
        reg.assert_consistent();
    }

    #[test]
    fn delete_pushes_slot_to_front() {
        let reg = Registry::new(4);
        let a = reg.store("x");
        let b = reg.store("y");
        assert!(reg.delete(a));
        assert_eq!(reg.free_chain()[0], a.into_raw());
        let c = reg.store("z");
        assert_eq!(c, a);
        assert_eq!(reg.fetch(b), Some("y"));
        assert_eq!(reg.fetch(c), Some("z"));
        reg.assert_consistent();
    }

    #[test]
    fn growth_uses_old_length_as_first_new_slot() {
        let reg = Registry::new(4);
        let handles: Vec<_> = (0..3).map(|i| reg.store(i)).collect();
        assert_eq!(reg.capacity(), 4);
        assert_eq!(reg.free_chain(), Vec::<usize>::new());
        let grown = reg.store(3);
        assert_eq!(grown.into_raw(), 4);
        assert_eq!(reg.capacity(), 8);
        assert_eq!(reg.free_chain(), vec![5, 6, 7]);
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(reg.fetch(*h), Some(i));
        }
        reg.assert_consistent();
    }

    #[test]
    fn ignored_deletes_leave_structure_intact() {
        let reg = Registry::new(4);
        let h = reg.store(7u8);
        assert!(reg.delete(h));
        let before = reg.free_chain();
        assert!(!reg.delete(h));
        assert!(!reg.delete(handle(3)));
        assert!(!reg.delete(handle(1_000)));
        assert_eq!(reg.free_chain(), before);
        reg.assert_consistent();
    }

    #[test]
    fn fetch_out_of_range_and_never_stored() {
        let reg: Registry<u64> = Registry::new(4);
        assert_eq!(reg.fetch(handle(2)), None);
        assert_eq!(reg.fetch(handle(4)), None);
        assert_eq!(reg.fetch(handle(usize::MAX)), None);
    }

    #[test]
    fn fetch_with_borrows() {
        let reg = Registry::new(4);
        let h = reg.store(String::from("tokenizer"));
        assert_eq!(reg.fetch_with(h, |s| s.len()), Some(9));
        reg.delete(h);
        assert_eq!(reg.fetch_with(h, |s| s.len()), None);
    }

    #[test]
    fn stats_follow_profile_flag() {
        let reg = Registry::with_config(
            RegistryConfig::default()
                .with_initial_capacity(2)
                .with_profile(true),
        );
        let a = reg.store(1);
        let b = reg.store(2);
        reg.fetch(a);
        reg.fetch(handle(99));
        reg.delete(a);
        reg.delete(a);
        let stats = reg.stats();
        assert_eq!(stats.stores, 2);
        assert_eq!(stats.grows, 1);
        assert_eq!(stats.fetch_hits, 1);
        assert_eq!(stats.fetch_misses, 1);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.ignored_deletes, 1);
        assert_eq!(reg.fetch(b), Some(2));

        let quiet = Registry::new(2);
        quiet.store(1);
        assert_eq!(quiet.stats(), RegistryStats::default());
    }

    #[test]
    fn drop_releases_live_values() {
        let value = Arc::new(5);
        {
            let reg = Registry::new(2);
            for _ in 0..10 {
                reg.store(Arc::clone(&value));
            }
            assert_eq!(Arc::strong_count(&value), 11);
        }
        assert_eq!(Arc::strong_count(&value), 1);
    }

    #[test]
    fn debug_shows_capacity_and_live() {
        let reg = Registry::new(4);
        reg.store(1);
        assert_eq!(format!("{reg:?}"), "Registry { capacity: 4, live: 1 }");
    }
}
