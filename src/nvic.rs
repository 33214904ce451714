//! Interrupt controller access used by the drivers when they register their vectors

use cortex_m::peripheral::NVIC;

pub use crate::pac::Interrupt;

/// Number of priority bits implemented by the STM32F4 NVIC
pub const NVIC_PRIO_BITS: u8 = 4;

/// Lowest urgency a vector can be given
pub const LOWEST_PRIORITY: u8 = (1 << NVIC_PRIO_BITS) - 1;

/// Enable/priority control of the interrupt vectors
///
/// Priorities are logical levels, `0` being the most urgent and
/// [`LOWEST_PRIORITY`] the least.
pub trait InterruptController {
    fn unmask(&mut self, irq: Interrupt);
    fn mask(&mut self, irq: Interrupt);
    fn set_priority(&mut self, irq: Interrupt, priority: u8);
    fn is_enabled(&self, irq: Interrupt) -> bool;
}

impl InterruptController for NVIC {
    #[inline]
    fn unmask(&mut self, irq: Interrupt) {
        // Handlers are bound before any driver unmasks its vector
        unsafe { NVIC::unmask(irq) }
    }

    #[inline]
    fn mask(&mut self, irq: Interrupt) {
        NVIC::mask(irq)
    }

    #[inline]
    fn set_priority(&mut self, irq: Interrupt, priority: u8) {
        let prio = priority.min(LOWEST_PRIORITY) << (8 - NVIC_PRIO_BITS);
        unsafe { NVIC::set_priority(self, irq, prio) }
    }

    #[inline]
    fn is_enabled(&self, irq: Interrupt) -> bool {
        NVIC::is_enabled(irq)
    }
}
