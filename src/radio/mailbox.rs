use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Single-slot handoff cell between one producer and one consumer.
///
/// The producer is the radio's receive callback, the consumer the main loop.
/// A value offered while the slot is still occupied is dropped and counted;
/// the unconsumed value is never overwritten.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    ready: AtomicBool,
    overruns: AtomicU64,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Mailbox {
            slot: Mutex::new(None),
            ready: AtomicBool::new(false),
            overruns: AtomicU64::new(0),
        }
    }
}

impl<T> Mailbox<T> {
    /// Creates an empty mailbox
    pub fn new() -> Self {
        Mailbox::default()
    }

    /// Stores `value` unless the slot is occupied. Returns whether it was stored.
    pub fn offer(&self, value: T) -> bool {
        if self.ready.load(Ordering::Acquire) {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        *slot = Some(value);
        self.ready.store(true, Ordering::Release);
        true
    }

    /// Takes the stored value, leaving the slot empty
    pub fn take(&self) -> Option<T> {
        if !self.ready.load(Ordering::Acquire) {
            return None;
        }

        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        let value = slot.take();
        self.ready.store(false, Ordering::Release);
        value
    }

    /// Returns whether a value is waiting, without locking
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Values dropped because the slot was still occupied
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_second_offer_is_dropped() {
        let mailbox = Mailbox::new();
        assert!(mailbox.offer(1));
        assert!(!mailbox.offer(2));
        assert_eq!(mailbox.overruns(), 1);

        assert_eq!(mailbox.take(), Some(1));
        assert_eq!(mailbox.take(), None);
        assert!(!mailbox.is_ready());

        assert!(mailbox.offer(3));
        assert_eq!(mailbox.take(), Some(3));
    }

    #[test]
    fn test_cross_thread_handoff() {
        let mailbox = Arc::new(Mailbox::new());
        let producer = {
            let mailbox = Arc::clone(&mailbox);
            thread::spawn(move || {
                let mut stored = 0u64;
                for value in 0..1000u64 {
                    if mailbox.offer(value) {
                        stored += 1;
                    }
                }
                stored
            })
        };

        let mut taken = 0u64;
        let mut last = None;
        while !producer.is_finished() || mailbox.is_ready() {
            if let Some(value) = mailbox.take() {
                // Values arrive in production order
                assert!(last.map_or(true, |prev| value > prev));
                last = Some(value);
                taken += 1;
            }
        }

        let stored = producer.join().unwrap();
        assert_eq!(stored, taken);
        assert_eq!(stored + mailbox.overruns(), 1000);
    }
}
