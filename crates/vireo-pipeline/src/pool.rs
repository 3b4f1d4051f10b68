//! Bounded reuse pool for media items.
//!
//! Packets and frames are allocation-heavy; every stage owns one pool and
//! recycles consumed items through [`Stage::put_back`](crate::Stage::put_back)
//! instead of reallocating per item.

use parking_lot::Mutex;

/// Types that can be reset and handed out again.
pub trait Reuse: Send + 'static {
    /// Prepare this value for reuse: clear contents and optionally shrink
    /// capacity to `trim` to prevent unbounded growth.
    ///
    /// Returns `false` when the value is not worth keeping (no retained
    /// capacity); it is dropped instead of pooled.
    fn reuse(&mut self, trim: usize) -> bool;
}

impl<T: Send + 'static> Reuse for Vec<T> {
    fn reuse(&mut self, trim: usize) -> bool {
        self.clear();
        self.shrink_to(trim);
        self.capacity() > 0
    }
}

/// Bounded pool of reusable items.
///
/// Returning to a full pool silently drops the item. Safe to use after the
/// owning stage begins closing: recycling into a pool nobody drains is a
/// cheap no-op, not a fault.
pub struct Pool<T: Reuse> {
    items: Mutex<Vec<T>>,
    max_items: usize,
    trim_capacity: usize,
}

impl<T: Reuse> Pool<T> {
    /// `max_items` bounds the number of idle items retained; `trim_capacity`
    /// is the capacity items are shrunk to on return.
    #[must_use]
    pub fn new(max_items: usize, trim_capacity: usize) -> Self {
        Self {
            items: Mutex::new(Vec::with_capacity(max_items.min(16))),
            max_items,
            trim_capacity,
        }
    }

    /// Return an item to the pool for reuse.
    pub fn recycle(&self, mut value: T) {
        let mut items = self.items.lock();
        if items.len() < self.max_items && value.reuse(self.trim_capacity) {
            items.push(value);
        }
    }

    /// Number of idle items currently pooled.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.items.lock().len()
    }
}

impl<T: Reuse + Default> Pool<T> {
    /// Take a pooled item, or allocate a default one when the pool is empty.
    #[must_use]
    pub fn get(&self) -> T {
        self.items.lock().pop().unwrap_or_default()
    }
}
