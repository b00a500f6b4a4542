//! Growable circular queue.
//!
//! Fixed-capacity FIFO backed by a boxed slice. Unlike the lock-free rings in
//! the rest of Kaos this one is single-owner and can grow: `resize` moves the
//! live elements to a bigger slice, and `push_growing` doubles the capacity
//! before a push would fail. Used for a pending buffer's waiting chunks, the
//! send window and the array pool free list.

use crate::error::{Result, StreamError};

pub struct RingBuffer<T> {
    slots: Box<[Option<T>]>,
    /// Index of the oldest element
    tail: usize,
    /// Index of the next free slot
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty queue.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            slots: Self::alloc(capacity),
            tail: 0,
            head: 0,
            len: 0,
        }
    }

    fn alloc(capacity: usize) -> Box<[Option<T>]> {
        (0..capacity).map(|_| None).collect::<Vec<_>>().into_boxed_slice()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Append to the back. Fails when full.
    pub fn push(&mut self, item: T) -> Result<()> {
        if self.is_full() {
            return Err(StreamError::QueueFull(self.capacity()));
        }
        self.slots[self.head] = Some(item);
        self.head = (self.head + 1) % self.slots.len();
        self.len += 1;
        Ok(())
    }

    /// Append to the back, doubling the capacity first if the queue is full.
    pub fn push_growing(&mut self, item: T) {
        if self.is_full() {
            self.grow_to(self.capacity() * 2);
        }
        self.slots[self.head] = Some(item);
        self.head = (self.head + 1) % self.slots.len();
        self.len += 1;
    }

    /// Remove from the front.
    pub fn pop(&mut self) -> Result<T> {
        if self.len == 0 {
            return Err(StreamError::QueueEmpty);
        }
        let item = self.slots[self.tail].take().ok_or(StreamError::QueueEmpty)?;
        self.tail = (self.tail + 1) % self.slots.len();
        self.len -= 1;
        Ok(item)
    }

    /// Oldest element.
    pub fn peek(&self) -> Result<&T> {
        if self.len == 0 {
            return Err(StreamError::QueueEmpty);
        }
        self.slots[self.tail].as_ref().ok_or(StreamError::QueueEmpty)
    }

    /// Newest element.
    pub fn peek_last(&self) -> Result<&T> {
        if self.len == 0 {
            return Err(StreamError::QueueEmpty);
        }
        let index = (self.head + self.slots.len() - 1) % self.slots.len();
        self.slots[index].as_ref().ok_or(StreamError::QueueEmpty)
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.tail = 0;
        self.head = 0;
        self.len = 0;
    }

    /// Grow to `new_capacity`, keeping order and count.
    pub fn resize(&mut self, new_capacity: usize) -> Result<()> {
        if new_capacity <= self.capacity() {
            return Err(StreamError::InvalidResize {
                current: self.capacity(),
                new: new_capacity,
            });
        }
        self.grow_to(new_capacity);
        Ok(())
    }

    fn grow_to(&mut self, new_capacity: usize) {
        let mut slots = Self::alloc(new_capacity);
        let cap = self.slots.len();
        for (i, slot) in slots.iter_mut().take(self.len).enumerate() {
            *slot = self.slots[(self.tail + i) % cap].take();
        }
        self.slots = slots;
        self.tail = 0;
        self.head = self.len % new_capacity;
    }

    /// Iterate front to back.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let cap = self.slots.len();
        (0..self.len).filter_map(move |i| self.slots[(self.tail + i) % cap].as_ref())
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}
