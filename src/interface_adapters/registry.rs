// Paged slab allocator used for the user and game tables.
//
// Grounded directly on `original_source/src/utils/list.c`/`list.h`'s `ListManager`:
// entries live in fixed-size pages allocated lazily on demand, a free-list threaded
// through unused slots hands out ids in LIFO order, and a global lock only guards the
// free-list head and page-table growth. The original keeps a *separate* per-node
// mutex that guards only the payload pointer; this port folds the free-list link and
// the payload into one per-slot `std::sync::Mutex` (see DESIGN.md) since nothing here
// ever holds a slot lock across an `.await`.

use std::sync::{Arc, Mutex};

pub const PAGE_SIZE: usize = 256;
pub const MAX_PAGES: usize = 1024;
const FREE_LIST_END: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// All `MAX_PAGES * PAGE_SIZE` slots are occupied.
    Full,
}

struct Slot<T> {
    next_free: i64,
    payload: Option<T>,
}

struct Page<T>(Box<[Mutex<Slot<T>>]>);

impl<T> Page<T> {
    fn new(base: i64) -> Self {
        let slots = (0..PAGE_SIZE)
            .map(|i| {
                let next_free = if i + 1 == PAGE_SIZE {
                    FREE_LIST_END
                } else {
                    base + i as i64 + 1
                };
                Mutex::new(Slot {
                    next_free,
                    payload: None,
                })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Page(slots)
    }
}

struct Inner<T> {
    pages: Vec<Arc<Page<T>>>,
    first_free: i64,
}

/// A process-wide table of `T` indexed by a stable, reused `u32` id.
pub struct Registry<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pages: Vec::new(),
                first_free: FREE_LIST_END,
            }),
        }
    }

    fn locate(id: u32) -> (usize, usize) {
        let id = id as usize;
        (id / PAGE_SIZE, id % PAGE_SIZE)
    }

    /// Inserts `payload`, returning the id it was assigned. Reuses the most recently
    /// released id when one is available (LIFO), otherwise grows the page table.
    pub fn add(&self, payload: T) -> Result<u32, RegistryError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.first_free == FREE_LIST_END {
            let page_index = inner.pages.len();
            if page_index >= MAX_PAGES {
                return Err(RegistryError::Full);
            }
            let base = (page_index * PAGE_SIZE) as i64;
            inner.pages.push(Arc::new(Page::new(base)));
            inner.first_free = base;
        }

        let id = inner.first_free as u32;
        let (page_index, offset) = Self::locate(id);
        let page = Arc::clone(&inner.pages[page_index]);

        let mut slot = page.0[offset].lock().unwrap();
        inner.first_free = slot.next_free;
        slot.next_free = FREE_LIST_END;
        slot.payload = Some(payload);
        drop(slot);

        Ok(id)
    }

    /// Removes the payload at `id` and returns it to the free-list. Idempotent: a
    /// second release of an already-free id is a no-op.
    pub fn release(&self, id: u32) {
        let mut inner = self.inner.lock().unwrap();
        let (page_index, offset) = Self::locate(id);
        let Some(page) = inner.pages.get(page_index).cloned() else {
            return;
        };

        let mut slot = page.0[offset].lock().unwrap();
        if slot.payload.is_none() {
            return;
        }
        slot.payload = None;
        slot.next_free = inner.first_free;
        drop(slot);

        inner.first_free = id as i64;
    }

    /// Runs `f` against the payload at `id`, if occupied, without holding the
    /// registry-wide lock for the duration.
    pub fn with<R>(&self, id: u32, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let (page_index, offset) = Self::locate(id);
        let page = {
            let inner = self.inner.lock().unwrap();
            inner.pages.get(page_index).cloned()?
        };

        let mut slot = page.0[offset].lock().unwrap();
        slot.payload.as_mut().map(f)
    }

    /// Like [`Registry::with`] but for payloads implementing `Clone`, returning a copy
    /// so callers never hold a slot lock across network I/O.
    pub fn get_cloned(&self, id: u32) -> Option<T>
    where
        T: Clone,
    {
        self.with(id, |payload| payload.clone())
    }

    pub fn occupied_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .pages
            .iter()
            .flat_map(|page| page.0.iter())
            .filter(|slot| slot.lock().unwrap().payload.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get_round_trips() {
        let registry: Registry<String> = Registry::new();
        let id = registry.add("alice".to_string()).unwrap();
        assert_eq!(registry.get_cloned(id).as_deref(), Some("alice"));
    }

    #[test]
    fn release_reuses_id_lifo() {
        let registry: Registry<u32> = Registry::new();
        let a = registry.add(1).unwrap();
        let b = registry.add(2).unwrap();
        registry.release(b);
        let c = registry.add(3).unwrap();
        assert_eq!(c, b, "most recently released id should be reused first");
        assert_eq!(registry.get_cloned(a), Some(1));
    }

    #[test]
    fn release_is_idempotent() {
        let registry: Registry<u32> = Registry::new();
        let id = registry.add(42).unwrap();
        registry.release(id);
        registry.release(id);
        let next = registry.add(7).unwrap();
        assert_eq!(next, id);
    }

    #[test]
    fn occupied_count_tracks_adds_and_releases() {
        let registry: Registry<u32> = Registry::new();
        let a = registry.add(1).unwrap();
        let _b = registry.add(2).unwrap();
        assert_eq!(registry.occupied_count(), 2);
        registry.release(a);
        assert_eq!(registry.occupied_count(), 1);
    }

    #[test]
    fn grows_past_a_single_page() {
        let registry: Registry<u32> = Registry::new();
        for i in 0..(PAGE_SIZE as u32 + 10) {
            registry.add(i).unwrap();
        }
        assert_eq!(registry.occupied_count(), PAGE_SIZE + 10);
    }
}
