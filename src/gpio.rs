//! # General Purpose I/Os
//!
//! A pin is described by a [`PinHandle`]: the port, the pin number and the
//! [`PinConfig`] it should run with. Applying the handle programs the port
//! registers; afterwards the handle is used to drive or sample the pin.
//!
//! ```rust,ignore
//! use stm32f4xx_drivers::gpio::{PinConfig, PinHandle, PinState, Port};
//!
//! let led = PinHandle::new(Port::A, 5, PinConfig::output());
//! led.configure(&bus);
//! led.write(&bus, PinState::High);
//! assert_eq!(led.read(&bus), PinState::High);
//! ```
//!
//! ## Modes
//!
//! - **Input**: digital input, optionally with a weak pull up or pull down
//! - **Output**: push-pull or open-drain output
//! - **Alternate**: the pin is driven by another peripheral, selected by the
//!   alternate function code (`AF0`..`AF15`)
//! - **Analog**: the pin is connected to the ADC
//!
//! ## Configuration order
//!
//! [`PinHandle::configure`] enables the port clock and then writes MODER,
//! OTYPER (output modes only), OSPEEDR, PUPDR and finally AFRL/AFRH (alternate
//! mode only). Every step clears the pin's field before setting it, so applying
//! the same handle again leaves the registers unchanged and other pins on the
//! port are never touched.
//!
//! ## Output writes
//!
//! Writes go through BSRR: the low half sets, the high half resets. There is
//! no read-modify-write of ODR, so a write can not race an interrupt handler
//! writing another pin of the same port. [`PinHandle::toggle`] does read ODR
//! first and is therefore not atomic against an ISR toggling the same pin.

use core::ops::Not;

use crate::bus::Bus;
use crate::pac;
use crate::rcc::Enable;
use crate::regs::address_of;
use crate::regs::gpio::{AFRH, AFRL, BSRR, IDR, MODER, ODR, OSPEEDR, OTYPER, PUPDR};

mod hal_1;

/// GPIO port
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Port {
    A,
    B,
    C,
    D,
    E,
    H,
}

impl Port {
    pub const ALL: [Port; 6] = [Port::A, Port::B, Port::C, Port::D, Port::E, Port::H];

    /// Base address of the port registers
    pub fn base(self) -> u32 {
        match self {
            Port::A => address_of(pac::GPIOA::PTR),
            Port::B => address_of(pac::GPIOB::PTR),
            Port::C => address_of(pac::GPIOC::PTR),
            Port::D => address_of(pac::GPIOD::PTR),
            Port::E => address_of(pac::GPIOE::PTR),
            Port::H => address_of(pac::GPIOH::PTR),
        }
    }

    /// Port selector code used by the SYSCFG external interrupt routing
    pub const fn exti_code(self) -> u8 {
        match self {
            Port::A => 0,
            Port::B => 1,
            Port::C => 2,
            Port::D => 3,
            Port::E => 4,
            Port::H => 7,
        }
    }

    /// Inverse of [`Port::exti_code`]
    pub const fn from_exti_code(code: u8) -> Option<Port> {
        match code {
            0 => Some(Port::A),
            1 => Some(Port::B),
            2 => Some(Port::C),
            3 => Some(Port::D),
            4 => Some(Port::E),
            7 => Some(Port::H),
            _ => None,
        }
    }
}

/// Pin mode, encoded as in MODER
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Input = 0b00,
    Output = 0b01,
    Alternate = 0b10,
    Analog = 0b11,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputType {
    PushPull = 0,
    OpenDrain = 1,
}

/// Output slew rate
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Speed {
    Low = 0b00,
    Medium = 0b01,
    High = 0b10,
    VeryHigh = 0b11,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pull {
    None = 0b00,
    Up = 0b01,
    Down = 0b10,
}

/// Digital pin level
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinState {
    Low = 0,
    High = 1,
}

impl From<bool> for PinState {
    fn from(high: bool) -> Self {
        if high {
            PinState::High
        } else {
            PinState::Low
        }
    }
}

impl Not for PinState {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            PinState::Low => PinState::High,
            PinState::High => PinState::Low,
        }
    }
}

/// Highest valid alternate function code
pub const MAX_AF: u8 = 15;

/// Electrical configuration of a pin
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinConfig {
    pub mode: Mode,
    pub otype: OutputType,
    pub speed: Speed,
    pub pull: Pull,
    /// Alternate function code, only meaningful in [`Mode::Alternate`]
    pub af: u8,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self::input()
    }
}

impl PinConfig {
    /// Floating digital input
    pub const fn input() -> Self {
        Self {
            mode: Mode::Input,
            otype: OutputType::PushPull,
            speed: Speed::Low,
            pull: Pull::None,
            af: 0,
        }
    }

    /// Push-pull output
    pub const fn output() -> Self {
        Self {
            mode: Mode::Output,
            ..Self::input()
        }
    }

    pub const fn analog() -> Self {
        Self {
            mode: Mode::Analog,
            ..Self::input()
        }
    }

    /// Push-pull pin driven by the peripheral selected by `af`
    pub const fn alternate(af: u8) -> Self {
        Self {
            mode: Mode::Alternate,
            af,
            ..Self::input()
        }
    }

    pub const fn otype(mut self, otype: OutputType) -> Self {
        self.otype = otype;
        self
    }

    pub const fn open_drain(self) -> Self {
        self.otype(OutputType::OpenDrain)
    }

    pub const fn speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }

    pub const fn pull(mut self, pull: Pull) -> Self {
        self.pull = pull;
        self
    }

    const fn drives_output(&self) -> bool {
        matches!(self.mode, Mode::Output | Mode::Alternate)
    }
}

/// Pin handle that breaks its contract
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Pin number outside `0..=15`
    InvalidPin(u8),
    /// Alternate function code above [`MAX_AF`]
    InvalidAlternateFunction(u8),
    /// Alternate function code given for a pin that is not in alternate mode
    UnusedAlternateFunction(u8),
}

/// One GPIO pin and the configuration it should run with
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinHandle {
    pub port: Port,
    pub pin: u8,
    pub config: PinConfig,
}

impl PinHandle {
    pub const fn new(port: Port, pin: u8, config: PinConfig) -> Self {
        Self { port, pin, config }
    }

    /// Checks the handle against the pin and alternate function constraints
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.pin > 15 {
            return Err(ConfigError::InvalidPin(self.pin));
        }
        match self.config.mode {
            Mode::Alternate if self.config.af > MAX_AF => {
                Err(ConfigError::InvalidAlternateFunction(self.config.af))
            }
            Mode::Alternate => Ok(()),
            _ if self.config.af != 0 => Err(ConfigError::UnusedAlternateFunction(self.config.af)),
            _ => Ok(()),
        }
    }

    /// Applies the configuration to the port registers
    ///
    /// # Panics
    ///
    /// Panics if the handle does not [validate](PinHandle::validate).
    pub fn configure<B: Bus>(&self, bus: &B) {
        if let Err(e) = self.validate() {
            error!("invalid pin configuration: {}", e);
            panic!("invalid pin configuration: {:?}", e);
        }

        self.port.enable(bus);

        let base = self.port.base();
        let pin = self.pin;
        let config = &self.config;

        bus.reg(base, MODER).write_field(2 * pin, 2, config.mode as u32);
        if config.drives_output() {
            bus.reg(base, OTYPER).write_field(pin, 1, config.otype as u32);
        }
        bus.reg(base, OSPEEDR).write_field(2 * pin, 2, config.speed as u32);
        bus.reg(base, PUPDR).write_field(2 * pin, 2, config.pull as u32);
        if config.mode == Mode::Alternate {
            let (afr, offset) = if pin < 8 { (AFRL, pin) } else { (AFRH, pin - 8) };
            bus.reg(base, afr).write_field(4 * offset, 4, config.af as u32);
        }

        trace!("P{}{} configured", self.port, pin);
    }

    /// Bit of the pin in the 16-bit port registers
    ///
    /// # Panics
    ///
    /// Panics if the pin number is above 15.
    #[inline]
    fn mask(&self) -> u32 {
        if self.pin > 15 {
            error!("invalid pin P{}{}", self.port, self.pin);
            panic!("invalid pin configuration: {:?}", ConfigError::InvalidPin(self.pin));
        }
        1 << self.pin
    }

    /// Drives the pin through the set/reset register
    ///
    /// # Panics
    ///
    /// Panics if the pin number is above 15.
    #[inline]
    pub fn write<B: Bus>(&self, bus: &B, state: PinState) {
        let bits = match state {
            PinState::High => self.mask(),
            PinState::Low => self.mask() << 16,
        };
        bus.reg(self.port.base(), BSRR).write(bits);
    }

    #[inline]
    pub fn set_high<B: Bus>(&self, bus: &B) {
        self.write(bus, PinState::High)
    }

    #[inline]
    pub fn set_low<B: Bus>(&self, bus: &B) {
        self.write(bus, PinState::Low)
    }

    /// Samples the input data register
    #[inline]
    pub fn read<B: Bus>(&self, bus: &B) -> PinState {
        let idr = bus.reg(self.port.base(), IDR).read();
        PinState::from(idr & self.mask() != 0)
    }

    #[inline]
    pub fn is_high<B: Bus>(&self, bus: &B) -> bool {
        self.read(bus) == PinState::High
    }

    #[inline]
    pub fn is_low<B: Bus>(&self, bus: &B) -> bool {
        self.read(bus) == PinState::Low
    }

    /// Level the output data register currently drives
    #[inline]
    pub fn output_state<B: Bus>(&self, bus: &B) -> PinState {
        let odr = bus.reg(self.port.base(), ODR).read();
        PinState::from(odr & self.mask() != 0)
    }

    /// Drives the complement of the current output level
    #[inline]
    pub fn toggle<B: Bus>(&self, bus: &B) {
        self.write(bus, !self.output_state(bus))
    }

    /// Ties the handle to a bus, giving a pin that implements the
    /// `embedded-hal` digital traits
    pub fn bind<B: Bus>(self, bus: &B) -> Pin<'_, B> {
        Pin { handle: self, bus }
    }
}

/// Configured pin bound to its register bus
pub struct Pin<'a, B> {
    handle: PinHandle,
    bus: &'a B,
}

impl<'a, B: Bus> Pin<'a, B> {
    pub fn handle(&self) -> &PinHandle {
        &self.handle
    }

    #[inline]
    pub fn set_high(&mut self) {
        self.handle.set_high(self.bus)
    }

    #[inline]
    pub fn set_low(&mut self) {
        self.handle.set_low(self.bus)
    }

    #[inline]
    pub fn set_state(&mut self, state: PinState) {
        self.handle.write(self.bus, state)
    }

    #[inline]
    pub fn toggle(&mut self) {
        self.handle.toggle(self.bus)
    }

    #[inline]
    pub fn is_high(&self) -> bool {
        self.handle.is_high(self.bus)
    }

    #[inline]
    pub fn is_low(&self) -> bool {
        self.handle.is_low(self.bus)
    }

    #[inline]
    pub fn is_set_high(&self) -> bool {
        self.handle.output_state(self.bus) == PinState::High
    }

    #[inline]
    pub fn is_set_low(&self) -> bool {
        !self.is_set_high()
    }

    pub fn release(self) -> PinHandle {
        self.handle
    }
}
