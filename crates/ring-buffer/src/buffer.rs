//! Ring Buffer Implementation

/// Default buffer capacity
pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded FIFO that evicts the oldest entry when full.
///
/// Single owner, no interior mutability: the collection loop is the only
/// writer, so `&mut self` is enough.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Pre-allocated storage
    storage: Box<[Option<T>]>,
    /// Index of the oldest entry
    tail: usize,
    /// Number of live entries
    len: usize,
    /// Total entries ever pushed (for statistics)
    total_written: usize,
    /// Entries lost to overwrite
    evicted: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with given capacity (at least one slot)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let storage: Vec<Option<T>> = (0..capacity).map(|_| None).collect();
        Self {
            storage: storage.into_boxed_slice(),
            tail: 0,
            len: 0,
            total_written: 0,
            evicted: 0,
        }
    }

    /// Create a buffer with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    fn slot(&self, offset: usize) -> usize {
        (self.tail + offset) % self.storage.len()
    }

    /// Push an entry, returning the evicted oldest entry if the buffer was full
    pub fn push(&mut self, item: T) -> Option<T> {
        self.total_written += 1;
        if self.len < self.capacity() {
            let idx = self.slot(self.len);
            self.storage[idx] = Some(item);
            self.len += 1;
            None
        } else {
            let old = self.storage[self.tail].replace(item);
            self.tail = self.slot(1);
            self.evicted += 1;
            old
        }
    }

    /// Remove and return the oldest entry
    pub fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.storage[self.tail].take();
        self.tail = self.slot(1);
        self.len -= 1;
        item
    }

    /// Get the number of entries currently in the buffer
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.len as f64 / self.capacity() as f64
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |i| self.storage[self.slot(i)].as_ref())
    }

    /// Most recent entry
    pub fn latest(&self) -> Option<&T> {
        self.iter().next_back()
    }

    /// Take every entry, oldest first, leaving the buffer empty
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.len);
        while let Some(item) = self.pop_front() {
            items.push(item);
        }
        items
    }

    /// Get total entries written (for statistics)
    pub fn total_written(&self) -> usize {
        self.total_written
    }

    /// Entries overwritten before they were read
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        for slot in self.storage.iter_mut() {
            *slot = None;
        }
        self.tail = 0;
        self.len = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Read the last N entries (most recent first)
    pub fn read_last(&self, count: usize) -> Vec<T> {
        self.iter().rev().take(count).cloned().collect()
    }
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
