// slcan-gateway/src/ring.rs
//
// Fixed-capacity circular buffer used for every queue in the gateway.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! A bounded FIFO that never grows and never blocks.
//!
//! The storage is allocated once, at construction. A push onto a full ring
//! hands the item back to the caller, who decides what to drop and what to
//! count.

/// A fixed-capacity first-in, first-out circular buffer.
#[derive(Debug, Clone)]
pub struct Ring<T> {
    slots: Vec<Option<T>>,
    head: usize,
    tail: usize,
    count: usize,
}

impl<T> Ring<T> {
    /// Creates an empty ring that holds up to `capacity` items.
    ///
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Appends an item at the tail.
    ///
    /// If the ring is full, the item is returned in the error and the
    /// contents are left untouched.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.slots[self.tail] = Some(item);
        self.tail = (self.tail + 1) % self.slots.len();
        self.count += 1;
        Ok(())
    }

    /// Puts an item back at the head, ahead of everything queued.
    ///
    /// If the ring is full, the item is returned in the error.
    pub fn push_front(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        let cap = self.slots.len();
        self.head = (self.head + cap - 1) % cap;
        self.slots[self.head] = Some(item);
        self.count += 1;
        Ok(())
    }

    /// Removes the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.count -= 1;
        item
    }

    /// Looks at the oldest item without removing it.
    pub fn peek(&self) -> Option<&T> {
        if self.count == 0 {
            None
        } else {
            self.slots[self.head].as_ref()
        }
    }

    /// Discards every item.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    /// The number of items in the ring
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the ring holds nothing
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether a push would be refused
    #[inline]
    pub fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    /// The maximum number of items
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut ring = Ring::new(4);
        assert!(ring.is_empty());

        for i in 0..4 {
            ring.push(i).unwrap();
        }
        assert!(ring.is_full());
        assert_eq!(ring.peek(), Some(&0));

        for i in 0..4 {
            assert_eq!(ring.pop(), Some(i));
        }
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_full_rejects_newest() {
        let mut ring = Ring::new(2);
        ring.push('a').unwrap();
        ring.push('b').unwrap();

        assert_eq!(ring.push('c'), Err('c'));
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.pop(), Some('a'));
        assert_eq!(ring.pop(), Some('b'));
    }

    #[test]
    fn test_wraparound() {
        let mut ring = Ring::new(3);
        for i in 0..10 {
            ring.push(i).unwrap();
            ring.push(i + 100).unwrap();
            assert_eq!(ring.pop(), Some(i));
            assert_eq!(ring.pop(), Some(i + 100));
        }
        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 3);
    }

    #[test]
    fn test_clear() {
        let mut ring = Ring::new(3);
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        ring.clear();

        assert!(ring.is_empty());
        assert_eq!(ring.pop(), None);
        ring.push(3).unwrap();
        assert_eq!(ring.pop(), Some(3));
    }

    #[test]
    fn test_push_front() {
        let mut ring = Ring::new(3);
        ring.push(2).unwrap();
        ring.push_front(1).unwrap();
        ring.push(3).unwrap();

        assert_eq!(ring.push_front(0), Err(0));
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));

        // Head wraps backwards past slot zero
        ring.push_front(9).unwrap();
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.pop(), Some(9));
        assert_eq!(ring.pop(), Some(3));
        assert!(ring.is_empty());
    }

    #[test]
    fn test_zero_capacity() {
        let mut ring = Ring::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push(1).unwrap();
        assert!(ring.push(2).is_err());
    }
}
