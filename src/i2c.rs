//! Inter-Integrated Circuit (I2C) bus
//!
//! Master mode on I2C1, I2C2 and I2C3. [`I2cHandle::configure`] programs the
//! bus timing; transfers go through [`BlockingI2c`], which polls the status
//! flags for every step of the START, address, data, STOP sequence.

// This document describes a correct i2c implementation and is what
// parts of this code is based on
// https://www.st.com/content/ccc/resource/technical/document/application_note/5d/ae/a3/6f/08/69/4e/9b/CD00209826.pdf/files/CD00209826.pdf/jcr:content/translations/en.CD00209826.pdf

use crate::bus::Bus;
use crate::gpio::{PinConfig, PinHandle, Port, Pull, Speed};
use crate::pac;
use crate::rcc::{Clocks, Enable, GetBusFreq};
use crate::regs::address_of;
use crate::regs::i2c::{
    CCR, CCR_DUTY, CCR_FS, CCR_MASK, CR1, CR1_PE, CR1_START, CR1_STOP, CR1_SWRST, CR2, DR, TRISE,
};
use crate::time::Hertz;

pub mod blocking;
mod hal_1;

pub use blocking::{BlockingI2c, Timeouts};
pub use embedded_hal::i2c::NoAcknowledgeSource;

/// Fastest bus clock the peripheral supports
pub const MAX_FREQUENCY: u32 = 400_000;

/// I2C instance
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum I2c {
    I2c1,
    I2c2,
    I2c3,
}

/// Pin of an I2C signal together with its alternate function
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignalPin {
    pub port: Port,
    pub pin: u8,
    pub af: u8,
}

const fn signal(port: Port, pin: u8, af: u8) -> SignalPin {
    SignalPin { port, pin, af }
}

impl I2c {
    pub fn base(self) -> u32 {
        match self {
            I2c::I2c1 => address_of(pac::I2C1::PTR),
            I2c::I2c2 => address_of(pac::I2C2::PTR),
            I2c::I2c3 => address_of(pac::I2C3::PTR),
        }
    }

    /// SCL and SDA pins
    pub const fn pins(self) -> (SignalPin, SignalPin) {
        match self {
            I2c::I2c1 => (signal(Port::B, 6, 4), signal(Port::B, 7, 4)),
            I2c::I2c2 => (signal(Port::B, 10, 4), signal(Port::B, 3, 9)),
            I2c::I2c3 => (signal(Port::A, 8, 4), signal(Port::C, 9, 4)),
        }
    }

    /// Generate START condition
    #[inline(always)]
    pub(crate) fn send_start<B: Bus>(self, bus: &B) {
        bus.reg(self.base(), CR1).set_bit(CR1_START);
    }

    /// Sends the (7-Bit) address on the I2C bus. The 8th bit on the bus is set
    /// depending on wether it is a read or write transfer.
    #[inline(always)]
    pub(crate) fn send_addr<B: Bus>(self, bus: &B, addr: u8, read: bool) {
        bus.reg(self.base(), DR)
            .write(((addr << 1) | read as u8) as u32);
    }

    /// Generate STOP condition
    #[inline(always)]
    pub(crate) fn send_stop<B: Bus>(self, bus: &B) {
        bus.reg(self.base(), CR1).set_bit(CR1_STOP);
    }
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Overrun/underrun
    Overrun,
    /// No ack received
    NoAcknowledge(NoAcknowledgeSource),
    /// A status flag did not show up within the poll budget
    Timeout,
    /// Bus error
    Bus,
    /// Arbitration loss
    ArbitrationLoss,
}

impl Error {
    pub(crate) fn nack_addr(self) -> Self {
        match self {
            Error::NoAcknowledge(NoAcknowledgeSource::Unknown) => {
                Error::NoAcknowledge(NoAcknowledgeSource::Address)
            }
            e => e,
        }
    }
    pub(crate) fn nack_data(self) -> Self {
        match self {
            Error::NoAcknowledge(NoAcknowledgeSource::Unknown) => {
                Error::NoAcknowledge(NoAcknowledgeSource::Data)
            }
            e => e,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum DutyCycle {
    Ratio2to1,
    Ratio16to9,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Mode {
    Standard {
        frequency: Hertz,
    },
    Fast {
        frequency: Hertz,
        duty_cycle: DutyCycle,
    },
}

impl Mode {
    pub fn standard(frequency: Hertz) -> Self {
        Mode::Standard { frequency }
    }

    pub fn fast(frequency: Hertz, duty_cycle: DutyCycle) -> Self {
        Mode::Fast {
            frequency,
            duty_cycle,
        }
    }

    pub fn get_frequency(&self) -> Hertz {
        match *self {
            Mode::Standard { frequency } => frequency,
            Mode::Fast { frequency, .. } => frequency,
        }
    }
}

impl From<Hertz> for Mode {
    fn from(frequency: Hertz) -> Self {
        if frequency.raw() <= 100_000 {
            Self::Standard { frequency }
        } else {
            Self::Fast {
                frequency,
                duty_cycle: DutyCycle::Ratio2to1,
            }
        }
    }
}

/// Contract violations detected by [`I2cHandle::validate`]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ConfigError {
    /// Bus clock above [`MAX_FREQUENCY`] or zero
    Frequency(u32),
    /// Peripheral clock outside the 2..=50 MHz the FREQ field accepts
    PeripheralClock(u32),
    /// Bus clock so slow that the clock divider does not fit in 12 bits
    ClockControl(u32),
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Config {
    pub mode: Mode,
    /// Clock tree the peripheral clock is taken from
    pub clocks: Clocks,
    /// Target addressed by the register helpers of [`BlockingI2c`]
    pub slave_address: u8,
}

impl Config {
    pub fn new(mode: Mode, slave_address: u8) -> Self {
        Self {
            mode,
            clocks: Clocks::hsi(),
            slave_address,
        }
    }

    pub fn clocks(mut self, clocks: Clocks) -> Self {
        self.clocks = clocks;
        self
    }
}

/// I2C instance and its bus settings
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct I2cHandle {
    pub i2c: I2c,
    pub config: Config,
}

impl I2cHandle {
    pub const fn new(i2c: I2c, config: Config) -> Self {
        Self { i2c, config }
    }

    fn pclk(&self) -> u32 {
        self.i2c.get_frequency(&self.config.clocks).raw()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let freq = self.config.mode.get_frequency().raw();
        if freq == 0 || freq > MAX_FREQUENCY {
            return Err(ConfigError::Frequency(freq));
        }
        let pclk = self.pclk();
        if !(2_000_000..=50_000_000).contains(&pclk) {
            return Err(ConfigError::PeripheralClock(pclk));
        }
        let (ccr, _) = self.clock_control();
        if ccr > CCR_MASK {
            return Err(ConfigError::ClockControl(ccr));
        }
        Ok(())
    }

    /// CCR divider and DUTY bit for the configured mode
    fn clock_control(&self) -> (u32, bool) {
        let pclk1 = self.pclk();
        let freq = self.config.mode.get_frequency().raw();
        match self.config.mode {
            Mode::Standard { .. } => ((pclk1 / (freq * 2)).max(4), false),
            Mode::Fast { duty_cycle, .. } => match duty_cycle {
                DutyCycle::Ratio2to1 => ((pclk1 / (freq * 3)).max(1), false),
                DutyCycle::Ratio16to9 => ((pclk1 / (freq * 25)).max(1), true),
            },
        }
    }

    /// Sets up the pins and the clock of the instance, then initializes it
    ///
    /// # Panics
    ///
    /// Panics if the handle does not [validate](I2cHandle::validate).
    pub fn configure<B: Bus>(&self, bus: &B) {
        if let Err(e) = self.validate() {
            error!("invalid I2C configuration: {}", e);
            panic!("invalid I2C configuration: {:?}", e);
        }

        let (scl, sda) = self.i2c.pins();
        for signal in [scl, sda] {
            PinHandle::new(
                signal.port,
                signal.pin,
                PinConfig::alternate(signal.af)
                    .open_drain()
                    .pull(Pull::Up)
                    .speed(Speed::VeryHigh),
            )
            .configure(bus);
        }

        self.i2c.enable(bus);
        self.init(bus);
        debug!("{} configured at {} Hz", self.i2c, self.config.mode.get_frequency().raw());
    }

    /// Resets the peripheral and programs `CR2.FREQ`, `CCR` and `TRISE`
    /// according to the peripheral clock and the I2C mode.
    pub fn init<B: Bus>(&self, bus: &B) {
        let base = self.i2c.base();
        let pclk1 = self.pclk();
        let pclk1_mhz = pclk1 / 1_000_000;

        let cr1 = bus.reg(base, CR1);
        cr1.clear_bit(CR1_PE);
        cr1.set_bit(CR1_SWRST);
        cr1.clear_bit(CR1_SWRST);

        bus.reg(base, CR2).write_field(0, 6, pclk1_mhz);

        let (ccr, duty) = self.clock_control();
        let ccr = ccr & CCR_MASK;
        match self.config.mode {
            Mode::Standard { .. } => {
                bus.reg(base, TRISE).write(pclk1_mhz + 1);
                bus.reg(base, CCR).write(ccr);
            }
            Mode::Fast { .. } => {
                bus.reg(base, TRISE).write(pclk1_mhz * 300 / 1000 + 1);
                bus.reg(base, CCR)
                    .write(ccr | (duty as u32) << CCR_DUTY | 1 << CCR_FS);
            }
        };

        cr1.set_bit(CR1_PE);
    }

    /// Blocking master on top of the configured instance
    pub fn blocking<B: Bus>(self, bus: &B, start_retries: u8, timeouts: Timeouts) -> BlockingI2c<'_, B> {
        BlockingI2c::new(self, bus, start_retries, timeouts)
    }

    pub fn blocking_default<B: Bus>(self, bus: &B) -> BlockingI2c<'_, B> {
        self.blocking(bus, 10, Timeouts::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::gpio::{AFRH, AFRL, OTYPER, PUPDR};
    use crate::regs::rcc;
    use crate::sim::Sim;
    use crate::time::RateExtU32;

    #[test]
    fn standard_mode_timing() {
        let sim = Sim::new();
        let handle = I2cHandle::new(I2c::I2c1, Config::new(Mode::standard(100.kHz()), 0x50));
        handle.configure(&sim);

        let base = I2c::I2c1.base();
        assert_eq!(sim.peek(base + CR2) & 0x3F, 16);
        assert_eq!(sim.peek(base + CCR), 80);
        assert_eq!(sim.peek(base + TRISE), 17);
        assert_eq!(sim.peek(base + CR1), 1 << CR1_PE);
        assert_ne!(sim.peek(rcc::base() + rcc::APB1ENR) & (1 << 21), 0);
    }

    #[test]
    fn fast_mode_timing() {
        let sim = Sim::new();
        let handle = I2cHandle::new(
            I2c::I2c3,
            Config::new(Mode::fast(400.kHz(), DutyCycle::Ratio2to1), 0x68),
        );
        handle.configure(&sim);

        let base = I2c::I2c3.base();
        assert_eq!(sim.peek(base + CCR), 13 | 1 << CCR_FS);
        assert_eq!(sim.peek(base + TRISE), 5);

        let handle = I2cHandle::new(
            I2c::I2c3,
            Config::new(Mode::fast(400.kHz(), DutyCycle::Ratio16to9), 0x68)
                .clocks(Clocks::new(84.MHz(), 2, 1)),
        );
        handle.configure(&sim);
        assert_eq!(sim.peek(base + CCR), 4 | 1 << CCR_DUTY | 1 << CCR_FS);
        assert_eq!(sim.peek(base + TRISE), 13);
    }

    #[test]
    fn mode_from_frequency() {
        let standard: Hertz = 100.kHz();
        let fast: Hertz = 400.kHz();
        assert_eq!(Mode::from(standard), Mode::standard(standard));
        assert_eq!(Mode::from(fast), Mode::fast(fast, DutyCycle::Ratio2to1));
    }

    #[test]
    fn pins_are_open_drain_with_pull_up() {
        let sim = Sim::new();
        I2cHandle::new(I2c::I2c2, Config::new(Mode::standard(100.kHz()), 0)).configure(&sim);

        let gpiob = Port::B.base();
        assert_eq!(sim.peek(gpiob + OTYPER), (1 << 10) | (1 << 3));
        assert_eq!(sim.peek(gpiob + PUPDR), (0b01 << 20) | (0b01 << 6));
        assert_eq!(sim.peek(gpiob + AFRL), 9 << 12);
        assert_eq!(sim.peek(gpiob + AFRH), 4 << 8);
    }

    #[test]
    fn validation() {
        let handle = I2cHandle::new(I2c::I2c1, Config::new(Mode::fast(1.MHz(), DutyCycle::Ratio2to1), 0));
        assert_eq!(handle.validate(), Err(ConfigError::Frequency(1_000_000)));

        let handle = I2cHandle::new(
            I2c::I2c1,
            Config::new(Mode::standard(100.kHz()), 0).clocks(Clocks::new(84.MHz(), 1, 1)),
        );
        assert_eq!(
            handle.validate(),
            Err(ConfigError::PeripheralClock(84_000_000))
        );
    }

    #[test]
    fn slow_bus_clock_does_not_fit_the_divider() {
        // 16 MHz / (2 * 200 Hz) = 40_000
        let handle = I2cHandle::new(I2c::I2c1, Config::new(Mode::standard(200.Hz()), 0x50));
        assert_eq!(handle.validate(), Err(ConfigError::ClockControl(40_000)));

        // Slowest standard clock whose divider still fits
        let handle = I2cHandle::new(I2c::I2c1, Config::new(Mode::standard(1_954.Hz()), 0x50));
        assert_eq!(handle.validate(), Ok(()));
        let sim = Sim::new();
        handle.configure(&sim);
        let ccr = sim.peek(I2c::I2c1.base() + CCR);
        assert_eq!(ccr, 4_094);
        assert_eq!(ccr & (1 << CCR_FS | 1 << CCR_DUTY), 0);
    }

    #[test]
    #[should_panic(expected = "invalid I2C configuration")]
    fn configure_rejects_slow_clock() {
        let sim = Sim::new();
        I2cHandle::new(I2c::I2c1, Config::new(Mode::standard(200.Hz()), 0x50)).configure(&sim);
    }

    #[test]
    #[should_panic(expected = "invalid I2C configuration")]
    fn configure_rejects_fast_clock() {
        let sim = Sim::new();
        I2cHandle::new(I2c::I2c1, Config::new(Mode::fast(1.MHz(), DutyCycle::Ratio2to1), 0)).configure(&sim);
    }
}
