//! Single slot channels between interrupt handlers and the main loop
//!
//! A [`Mailbox`] holds at most one value. Posting into a full mailbox
//! replaces the unread value and counts the loss; the value stays readable
//! through [`Mailbox::last`] after it was taken. A [`Flag`] carries a bare
//! "something happened" event.
//!
//! ```
//! use stm32f4xx_drivers::mailbox::Mailbox;
//!
//! static RX: Mailbox<u8> = Mailbox::new();
//!
//! assert!(!RX.post(b'a'));
//! assert!(RX.post(b'b'));
//! assert_eq!(RX.try_receive(), Some(b'b'));
//! assert_eq!(RX.try_receive(), None);
//! assert_eq!(RX.last(), Some(b'b'));
//! assert_eq!(RX.overwrites(), 1);
//! ```

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;

#[derive(Clone, Copy)]
struct Slot<T> {
    value: Option<T>,
    unread: bool,
    overwrites: u32,
}

/// Single slot, overwriting, interrupt safe channel
pub struct Mailbox<T> {
    slot: Mutex<Cell<Slot<T>>>,
}

impl<T: Copy> Mailbox<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Cell::new(Slot {
                value: None,
                unread: false,
                overwrites: 0,
            })),
        }
    }

    /// Stores `value`, returning `true` if an unread value was overwritten
    pub fn post(&self, value: T) -> bool {
        critical_section::with(|cs| {
            let cell = self.slot.borrow(cs);
            let mut slot = cell.get();
            let overwritten = slot.unread;
            if overwritten {
                slot.overwrites = slot.overwrites.wrapping_add(1);
            }
            slot.value = Some(value);
            slot.unread = true;
            cell.set(slot);
            overwritten
        })
    }

    /// Takes the stored value if it was not taken yet
    pub fn try_receive(&self) -> Option<T> {
        critical_section::with(|cs| {
            let cell = self.slot.borrow(cs);
            let mut slot = cell.get();
            if !slot.unread {
                return None;
            }
            slot.unread = false;
            cell.set(slot);
            slot.value
        })
    }

    /// Most recently posted value, taken or not
    pub fn last(&self) -> Option<T> {
        critical_section::with(|cs| self.slot.borrow(cs).get().value)
    }

    pub fn has_unread(&self) -> bool {
        critical_section::with(|cs| self.slot.borrow(cs).get().unread)
    }

    /// Number of values lost to overwriting
    pub fn overwrites(&self) -> u32 {
        critical_section::with(|cs| self.slot.borrow(cs).get().overwrites)
    }

    pub fn clear(&self) {
        critical_section::with(|cs| {
            self.slot.borrow(cs).set(Slot {
                value: None,
                unread: false,
                overwrites: 0,
            })
        })
    }
}

impl<T: Copy> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Event flag raised by an interrupt handler and taken by the main loop
#[derive(Debug, Default)]
pub struct Flag(AtomicBool);

impl Flag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Lowers the flag, returning whether it was raised
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mailbox() {
        let mb = Mailbox::<u16>::new();
        assert_eq!(mb.try_receive(), None);
        assert_eq!(mb.last(), None);
        assert!(!mb.has_unread());
    }

    #[test]
    fn overwrite_is_counted() {
        let mb = Mailbox::new();
        assert!(!mb.post(1u16));
        assert!(mb.post(2));
        assert!(mb.post(3));
        assert_eq!(mb.overwrites(), 2);
        assert_eq!(mb.try_receive(), Some(3));
        assert!(!mb.post(4));
        assert_eq!(mb.overwrites(), 2);

        mb.clear();
        assert_eq!(mb.last(), None);
        assert_eq!(mb.overwrites(), 0);
    }

    #[test]
    fn flag_is_taken_once() {
        let flag = Flag::new();
        assert!(!flag.take());
        flag.raise();
        flag.raise();
        assert!(flag.is_raised());
        assert!(flag.take());
        assert!(!flag.take());
    }
}
