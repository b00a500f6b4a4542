//! Fixed-size array pool.
//!
//! Free list of preallocated arrays so the send path does not allocate a new
//! buffer per packet. Grows by doubling when exhausted, never shrinks.
//! Single-threaded: one pool per connection.

use crate::ring::RingBuffer;

/// Outstanding arrays above this count are almost certainly a leak.
const OUTSTANDING_WARN_THRESHOLD: usize = 10_000;

pub struct ArrayPool<T> {
    array_len: usize,
    free: RingBuffer<Vec<T>>,
    outstanding: usize,
}

impl<T: Clone + Default> ArrayPool<T> {
    /// Preallocate `capacity` arrays of `array_len` elements.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(array_len: usize, capacity: usize) -> Self {
        let mut free = RingBuffer::with_capacity(capacity);
        for _ in 0..capacity {
            free.push_growing(vec![T::default(); array_len]);
        }
        Self {
            array_len,
            free,
            outstanding: 0,
        }
    }

    /// Take an array of exactly `array_len` elements.
    pub fn acquire(&mut self) -> Vec<T> {
        if self.free.is_empty() {
            let prev_capacity = self.free.capacity();
            // Grow first so the refill never hits a full queue.
            if self.free.resize(prev_capacity * 2).is_ok() {
                for _ in 0..prev_capacity {
                    self.free.push_growing(vec![T::default(); self.array_len]);
                }
            }
            trace_debug!("[POOL] grew to {} arrays", self.free.capacity());
        }

        self.outstanding += 1;
        if self.outstanding == OUTSTANDING_WARN_THRESHOLD + 1 {
            trace_warn!("[POOL] {} arrays outstanding", self.outstanding);
        }

        self.free
            .pop()
            .unwrap_or_else(|_| vec![T::default(); self.array_len])
    }

    /// Return an array to the pool. Its length is restored to `array_len`.
    pub fn release(&mut self, mut array: Vec<T>) {
        array.clear();
        array.resize(self.array_len, T::default());
        self.outstanding = self.outstanding.saturating_sub(1);
        self.free.push_growing(array);
    }

    /// Total arrays the free list can hold.
    pub fn capacity(&self) -> usize {
        self.free.capacity()
    }

    /// Arrays currently available without growing.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Arrays acquired and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn array_len(&self) -> usize {
        self.array_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_fixed_length() {
        let mut pool: ArrayPool<u8> = ArrayPool::new(16, 2);
        let a = pool.acquire();
        assert_eq!(a.len(), 16);
        assert!(a.iter().all(|&b| b == 0));
        assert_eq!(pool.outstanding(), 1);
    }

    #[test]
    fn test_grows_when_exhausted() {
        let mut pool: ArrayPool<u8> = ArrayPool::new(8, 4);
        let held: Vec<_> = (0..4).map(|_| pool.acquire()).collect();
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.available(), 0);

        let extra = pool.acquire();
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.available(), 3);
        assert_eq!(extra.len(), 8);
        assert_eq!(held.len() + 1, pool.outstanding());
    }

    #[test]
    fn test_release_reuses_array() {
        let mut pool: ArrayPool<u8> = ArrayPool::new(32, 1);
        let mut a = pool.acquire();
        a.clear();
        a.extend_from_slice(b"packet bytes");
        let ptr = a.as_ptr();
        pool.release(a);
        assert_eq!(pool.outstanding(), 0);

        let b = pool.acquire();
        assert_eq!(b.as_ptr(), ptr);
        assert_eq!(b.len(), 32);
        assert!(b.iter().all(|&x| x == 0));
    }

    #[test]
    fn test_never_shrinks() {
        let mut pool: ArrayPool<u8> = ArrayPool::new(4, 1);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.available(), 2);
    }
}
