//! Generational object cache.
//!
//! Objects live in a slot table. A [`CacheKey`] names a slot together with
//! the generation it was handed out in; recycling a slot bumps its generation
//! so stale keys stop resolving instead of aliasing another tile's data.
//!
//! Acquiring pins a slot. Pinned slots are never recycled. Releasing the last
//! pin puts the slot at the back of the idle queue, and recycling takes from
//! the front, so the least recently released object is reused first.

use std::collections::VecDeque;

/// Index and generation of a cached object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    index: u32,
    generation: u32,
}

/// How [`ObjectCache::acquire`] satisfied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// The caller's key was still valid; the object holds whatever the caller
    /// last put there.
    Cached,
    /// An idle object previously used for something else. Contents are stale.
    Recycled,
    /// A freshly allocated object.
    Allocated,
}

impl Acquisition {
    /// Whether the object's contents must be regenerated.
    #[must_use]
    pub fn needs_refresh(self) -> bool {
        !matches!(self, Self::Cached)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquired {
    pub key: CacheKey,
    pub acquisition: Acquisition,
}

/// Cache traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub recycles: u64,
    pub allocations: u64,
    /// Cached objects whose contents were refreshed in place because their
    /// source changed.
    pub stale_refreshes: u64,
    /// Objects currently alive.
    pub live: usize,
    /// Objects currently pinned.
    pub pinned: usize,
}

#[derive(Debug)]
struct Slot<T> {
    object: Option<T>,
    generation: u32,
    pins: u32,
    /// Stamp of the slot's current entry in the idle queue.
    released_at: u64,
}

#[derive(Debug)]
pub struct ObjectCache<T> {
    slots: Vec<Slot<T>>,
    /// Slots in release order, stamped. Entries whose stamp no longer matches
    /// the slot were re-pinned or destroyed and are skipped when popped.
    idle: VecDeque<(u32, u64)>,
    next_stamp: u64,
    /// Slots whose object was destroyed by a shrink.
    vacant: Vec<u32>,
    capacity: usize,
    live: usize,
    stats: CacheStats,
}

impl<T> ObjectCache<T> {
    /// Cache that recycles once `capacity` objects are alive. All pinned
    /// objects stay alive, so the cache can grow past `capacity` when every
    /// object is in use.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            idle: VecDeque::new(),
            next_stamp: 0,
            vacant: Vec::new(),
            capacity: capacity.max(1),
            live: 0,
            stats: CacheStats::default(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Whether `key` still names the object it was issued for.
    #[must_use]
    pub fn contains(&self, key: CacheKey) -> bool {
        self.slot(key).is_some()
    }

    fn slot(&self, key: CacheKey) -> Option<&Slot<T>> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation && slot.object.is_some())
    }

    fn slot_mut(&mut self, key: CacheKey) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation && slot.object.is_some())
    }

    #[must_use]
    pub fn get(&self, key: CacheKey) -> Option<&T> {
        self.slot(key).and_then(|slot| slot.object.as_ref())
    }

    pub fn get_mut(&mut self, key: CacheKey) -> Option<&mut T> {
        self.slot_mut(key).and_then(|slot| slot.object.as_mut())
    }

    /// Pin an object for use.
    ///
    /// Returns the object behind `current` if that key is still valid,
    /// otherwise recycles the least recently released idle object once the
    /// cache is at capacity, otherwise calls `allocate`.
    pub fn acquire<E>(
        &mut self,
        current: Option<CacheKey>,
        allocate: impl FnOnce() -> Result<T, E>,
    ) -> Result<Acquired, E> {
        if let Some(key) = current.filter(|&key| self.contains(key)) {
            self.pin(key);
            self.stats.hits += 1;
            return Ok(Acquired {
                key,
                acquisition: Acquisition::Cached,
            });
        }

        if self.live >= self.capacity {
            if let Some(index) = self.pop_idle() {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.pins = 1;
                self.stats.recycles += 1;
                return Ok(Acquired {
                    key: CacheKey {
                        index,
                        generation: slot.generation,
                    },
                    acquisition: Acquisition::Recycled,
                });
            }
        }

        let object = allocate()?;
        let key = if let Some(index) = self.vacant.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.pins = 1;
            CacheKey {
                index,
                generation: slot.generation,
            }
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                object: Some(object),
                generation: 0,
                pins: 1,
                released_at: 0,
            });
            CacheKey {
                index,
                generation: 0,
            }
        };
        self.live += 1;
        self.stats.allocations += 1;
        Ok(Acquired {
            key,
            acquisition: Acquisition::Allocated,
        })
    }

    fn pin(&mut self, key: CacheKey) {
        if let Some(slot) = self.slot_mut(key) {
            slot.pins += 1;
        }
    }

    fn push_idle(&mut self, index: u32) {
        // Drop skipped entries once they outnumber the live ones.
        if self.idle.len() >= 2 * self.slots.len() + 16 {
            let slots = &self.slots;
            self.idle.retain(|&(index, stamp)| is_idle(&slots[index as usize], stamp));
        }
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.slots[index as usize].released_at = stamp;
        self.idle.push_back((index, stamp));
    }

    fn pop_idle(&mut self) -> Option<u32> {
        while let Some((index, stamp)) = self.idle.pop_front() {
            if is_idle(&self.slots[index as usize], stamp) {
                return Some(index);
            }
        }
        None
    }

    /// Drop one pin. Keys from an older generation are ignored.
    pub fn release(&mut self, key: CacheKey) {
        let Some(slot) = self.slot_mut(key) else {
            return;
        };
        if slot.pins == 0 {
            return;
        }
        slot.pins -= 1;
        if slot.pins == 0 {
            self.push_idle(key.index);
        }
    }

    /// Forget the contents of an object only the caller holds, such as a
    /// freshly recycled one whose refresh failed: bump its generation so the
    /// key stops resolving and return the object to the idle pool. Objects
    /// pinned elsewhere must be released instead.
    pub fn invalidate(&mut self, key: CacheKey) {
        let Some(slot) = self.slot_mut(key) else {
            return;
        };
        debug_assert!(slot.pins <= 1, "invalidated an object pinned by other holders");
        slot.generation = slot.generation.wrapping_add(1);
        if slot.pins > 0 {
            slot.pins = 0;
            self.push_idle(key.index);
        }
    }

    pub fn record_stale_refresh(&mut self) {
        self.stats.stale_refreshes += 1;
    }

    /// Destroy idle objects until no more than `capacity` are alive.
    /// Returns the destroyed objects.
    pub fn shrink_to_capacity(&mut self) -> Vec<T> {
        let mut destroyed = Vec::new();
        while self.live > self.capacity {
            let Some(index) = self.pop_idle() else {
                break;
            };
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            if let Some(object) = slot.object.take() {
                destroyed.push(object);
            }
            self.vacant.push(index);
            self.live -= 1;
        }
        destroyed
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            live: self.live,
            pinned: self
                .slots
                .iter()
                .filter(|slot| slot.object.is_some() && slot.pins > 0)
                .count(),
            ..self.stats
        }
    }
}

fn is_idle<T>(slot: &Slot<T>, stamp: u64) -> bool {
    slot.pins == 0 && slot.object.is_some() && slot.released_at == stamp
}
