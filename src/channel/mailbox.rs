//! Single-slot inbound buffer.
//!
//! At most one item is pending. A new arrival replaces an unconsumed one
//! (last write wins); the consumer takes the whole item atomically, so the
//! availability check and the payload can never disagree.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

pub struct Mailbox<T> {
    slot: Mutex<CriticalSectionRawMutex, RefCell<Option<T>>>,
}

impl<T> Mailbox<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(RefCell::new(None)),
        }
    }

    /// Store `item`. Returns `true` if an unconsumed item was overwritten.
    pub fn post(&self, item: T) -> bool {
        self.slot.lock(|s| s.borrow_mut().replace(item).is_some())
    }

    pub fn take(&self) -> Option<T> {
        self.slot.lock(|s| s.borrow_mut().take())
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock(|s| s.borrow().is_some())
    }

    pub fn clear(&self) {
        let _ = self.take();
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
