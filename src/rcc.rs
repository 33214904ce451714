//! # Reset & Control Clock
//!
//! Clock gating and reset of the peripherals, plus the frozen clock tree the
//! drivers derive their timing from.

use crate::bus::Bus;
use crate::regs::rcc::{base, AHB1ENR, AHB1RSTR, APB1ENR, APB1RSTR, APB2ENR, APB2RSTR};
use crate::time::Hertz;

mod enable;

/// Frequency of the internal RC oscillator the core runs from after reset
pub const HSI: u32 = 16_000_000; // Hz

/// Peripheral bus a clock gate lives on
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeripheralBus {
    AHB1,
    APB1,
    APB2,
}

impl PeripheralBus {
    const fn enr(self) -> u32 {
        match self {
            Self::AHB1 => AHB1ENR,
            Self::APB1 => APB1ENR,
            Self::APB2 => APB2ENR,
        }
    }

    const fn rstr(self) -> u32 {
        match self {
            Self::AHB1 => AHB1RSTR,
            Self::APB1 => APB1RSTR,
            Self::APB2 => APB2RSTR,
        }
    }

    pub const fn get_frequency(self, clocks: &Clocks) -> Hertz {
        match self {
            Self::AHB1 => clocks.hclk,
            Self::APB1 => clocks.pclk1,
            Self::APB2 => clocks.pclk2,
        }
    }

    pub const fn get_timer_frequency(self, clocks: &Clocks) -> Hertz {
        match self {
            Self::AHB1 => clocks.hclk,
            Self::APB1 => clocks.pclk1_tim(),
            Self::APB2 => clocks.pclk2_tim(),
        }
    }
}

/// Enable bit of one peripheral
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Gate {
    pub bus: PeripheralBus,
    pub bit: u8,
}

impl Gate {
    pub const fn new(bus: PeripheralBus, bit: u8) -> Self {
        Self { bus, bit }
    }
}

/// Enable/disable peripheral
///
/// Enabling is a plain OR of the enable bit, so enabling an already running
/// peripheral changes nothing.
pub trait Enable {
    fn gate(&self) -> Gate;

    #[inline(always)]
    fn enable<B: Bus>(&self, bus: &B) {
        let gate = self.gate();
        bus.reg(base(), gate.bus.enr()).set_bit(gate.bit);
        // Stall the pipeline so the first register access after enabling sees the clock
        #[cfg(all(target_arch = "arm", target_os = "none"))]
        cortex_m::asm::dsb();
    }

    #[inline(always)]
    fn disable<B: Bus>(&self, bus: &B) {
        let gate = self.gate();
        bus.reg(base(), gate.bus.enr()).clear_bit(gate.bit);
    }

    #[inline(always)]
    fn is_enabled<B: Bus>(&self, bus: &B) -> bool {
        let gate = self.gate();
        bus.reg(base(), gate.bus.enr()).bit_is_set(gate.bit)
    }
}

/// Reset peripheral
pub trait Reset: Enable {
    #[inline(always)]
    fn reset<B: Bus>(&self, bus: &B) {
        let gate = self.gate();
        let rstr = bus.reg(base(), gate.bus.rstr());
        rstr.set_bit(gate.bit);
        rstr.clear_bit(gate.bit);
    }
}

impl<T: Enable> Reset for T {}

pub trait GetBusFreq: Enable {
    fn get_frequency(&self, clocks: &Clocks) -> Hertz {
        self.gate().bus.get_frequency(clocks)
    }
    fn get_timer_frequency(&self, clocks: &Clocks) -> Hertz {
        self.gate().bus.get_timer_frequency(clocks)
    }
}

impl<T: Enable> GetBusFreq for T {}

/// Frozen clock frequencies
///
/// The clock tree itself is set up by the startup code; this only records
/// the result. The default is the reset state: everything on HSI.
///
/// ```rust
/// use stm32f4xx_drivers::rcc::Clocks;
///
/// let clocks = Clocks::hsi();
/// assert_eq!(clocks.sysclk().raw(), 16_000_000);
/// ```
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Clocks {
    hclk: Hertz,
    pclk1: Hertz,
    pclk2: Hertz,
    ppre1: u8,
    ppre2: u8,
    sysclk: Hertz,
}

impl Default for Clocks {
    fn default() -> Self {
        Self::hsi()
    }
}

impl Clocks {
    /// Reset clock tree: HSI without any bus prescaling
    pub const fn hsi() -> Self {
        Self {
            hclk: Hertz::from_raw(HSI),
            pclk1: Hertz::from_raw(HSI),
            pclk2: Hertz::from_raw(HSI),
            ppre1: 1,
            ppre2: 1,
            sysclk: Hertz::from_raw(HSI),
        }
    }

    /// Clock tree with the core at `sysclk` and the APB buses divided by
    /// `ppre1` and `ppre2`
    pub const fn new(sysclk: Hertz, ppre1: u8, ppre2: u8) -> Self {
        Self {
            hclk: sysclk,
            pclk1: Hertz::from_raw(sysclk.raw() / ppre1 as u32),
            pclk2: Hertz::from_raw(sysclk.raw() / ppre2 as u32),
            ppre1,
            ppre2,
            sysclk,
        }
    }

    /// Returns the frequency of the AHB
    pub const fn hclk(&self) -> Hertz {
        self.hclk
    }

    /// Returns the frequency of the APB1
    pub const fn pclk1(&self) -> Hertz {
        self.pclk1
    }

    /// Returns the frequency of the APB2
    pub const fn pclk2(&self) -> Hertz {
        self.pclk2
    }

    /// Returns the frequency of the APB1 Timers
    pub const fn pclk1_tim(&self) -> Hertz {
        Hertz::from_raw(self.pclk1.raw() * if self.ppre1 == 1 { 1 } else { 2 })
    }

    /// Returns the frequency of the APB2 Timers
    pub const fn pclk2_tim(&self) -> Hertz {
        Hertz::from_raw(self.pclk2.raw() * if self.ppre2 == 1 { 1 } else { 2 })
    }

    /// Returns the system (core) frequency
    pub const fn sysclk(&self) -> Hertz {
        self.sysclk
    }
}
