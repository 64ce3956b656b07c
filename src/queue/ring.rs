/// Fixed-capacity circular buffer over an arena of slots.
///
/// One slot is always left unused so that `head == tail` means empty and
/// `tail + 1 == head` means full, without a separate count field.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    tail: usize,
}

impl<T> RingBuffer<T> {
    /// Creates a buffer holding up to `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity + 1).map(|_| None).collect::<Vec<_>>().into_boxed_slice();
        RingBuffer {
            slots,
            head: 0,
            tail: 0,
        }
    }

    /// Number of usable slots
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        (self.tail + self.slots.len() - self.head) % self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.advance(self.tail) == self.head
    }

    /// Appends at the tail, handing the item back if the buffer is full
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.slots[self.tail] = Some(item);
        self.tail = self.advance(self.tail);
        Ok(())
    }

    /// Borrows the oldest entry
    pub fn front(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.head].as_ref()
    }

    /// Removes the oldest entry
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = self.advance(self.head);
        item
    }

    /// Drops every entry
    pub fn clear(&mut self) {
        while self.pop().is_some() {}
    }

    fn advance(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }
}
