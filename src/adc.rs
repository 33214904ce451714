//! # API for the Analog to Digital converter
//!
//! ADC1 in single channel, single conversion mode. A configuration selects
//! one channel and its pin is switched to analog mode. Conversions are
//! started explicitly and finish either with the EOC interrupt, whose result
//! lands in the [`Shared`] ADC mailbox, or by polling with
//! [`read_blocking`](AdcHandle::read_blocking).
//!
//! Reconfiguring with a different [`AdcConfig`] switches the converter to
//! another channel.

use crate::bus::Bus;
use crate::gpio::{PinConfig, PinHandle, Port};
use crate::irq::Shared;
use crate::nvic::{Interrupt, InterruptController};
use crate::pac;
use crate::rcc::Enable;
use crate::regs::address_of;
use crate::regs::adc::{
    CR1, CR1_EOCIE, CR1_OVRIE, CR1_RES, CR1_SCAN, CR2, CR2_ADON, CR2_ALIGN, CR2_CONT,
    CR2_SWSTART, DR, SMPR1, SMPR2, SQR1, SQR1_L, SQR3, SR, SR_EOC, SR_OVR,
};

mod hal_02;

pub use hal_02::AdcChannel;

/// Polls of the status register before a blocking conversion gives up
pub const POLL_BUDGET: u32 = 100_000;

/// Highest channel number, including the internal ones
pub const MAX_CHANNEL: u8 = 18;

/// ADC instance
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Adc {
    Adc1,
}

impl Adc {
    pub fn base(self) -> u32 {
        match self {
            Adc::Adc1 => address_of(pac::ADC1::PTR),
        }
    }

    pub const fn interrupt(self) -> Interrupt {
        Interrupt::ADC
    }

    /// Interrupt service routine body
    ///
    /// Returns `None` if neither a finished conversion nor an overrun is
    /// pending.
    pub fn on_interrupt<B: Bus>(self, bus: &B) -> Option<Result<u16, Error>> {
        let sr = bus.reg(self.base(), SR);
        if sr.bit_is_set(SR_OVR) {
            // rc_w0
            sr.write(!(1 << SR_OVR));
            Some(Err(Error::Overrun))
        } else if sr.bit_is_set(SR_EOC) {
            Some(Ok(self.read_data(bus)))
        } else {
            None
        }
    }

    /// Reads the data register, which clears EOC
    #[inline(always)]
    pub fn read_data<B: Bus>(self, bus: &B) -> u16 {
        bus.reg(self.base(), DR).read() as u16
    }

    #[inline(always)]
    pub fn start_conversion<B: Bus>(self, bus: &B) {
        bus.reg(self.base(), CR2).set_bit(CR2_SWSTART);
    }

    /// Selects the single channel of the regular sequence
    pub fn select_channel<B: Bus>(
        self,
        bus: &B,
        channel: u8,
        sample_time: SampleTime,
    ) -> Result<(), Error> {
        if channel > MAX_CHANNEL {
            return Err(Error::InvalidChannel(channel));
        }
        self.write_channel(bus, channel, sample_time);
        Ok(())
    }

    fn write_channel<B: Bus>(self, bus: &B, channel: u8, sample_time: SampleTime) {
        let (smpr, shift) = if channel >= 10 {
            (SMPR1, 3 * (channel - 10))
        } else {
            (SMPR2, 3 * channel)
        };
        bus.reg(self.base(), smpr)
            .write_field(shift, 3, u8::from(sample_time) as u32);
        bus.reg(self.base(), SQR1).write_field(SQR1_L, 4, 0);
        bus.reg(self.base(), SQR3).write_field(0, 5, channel as u32);
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A conversion finished before the previous result was read
    Overrun,
    /// The conversion did not finish within [`POLL_BUDGET`] polls
    Timeout,
    /// Channel above [`MAX_CHANNEL`]
    InvalidChannel(u8),
}

/// Conversion resolution
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Resolution {
    /// 12 bits, 15 ADC clock cycles
    #[default]
    Twelve = 0,
    /// 10 bits, 13 ADC clock cycles
    Ten = 1,
    /// 8 bits, 11 ADC clock cycles
    Eight = 2,
    /// 6 bits, 9 ADC clock cycles
    Six = 3,
}

impl Resolution {
    pub const fn bits(self) -> u8 {
        match self {
            Resolution::Twelve => 12,
            Resolution::Ten => 10,
            Resolution::Eight => 8,
            Resolution::Six => 6,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// ADC data register alignment
pub enum Align {
    /// Right alignment of output data
    #[default]
    Right,
    /// Left alignment of output data
    Left,
}

impl From<Align> for bool {
    fn from(val: Align) -> Self {
        match val {
            Align::Right => false,
            Align::Left => true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(non_camel_case_types)]
/// ADC sampling time
pub enum SampleTime {
    /// 3 cycles sampling time
    T_3,
    /// 15 cycles sampling time
    T_15,
    /// 28 cycles sampling time
    #[default]
    T_28,
    /// 56 cycles sampling time
    T_56,
    /// 84 cycles sampling time
    T_84,
    /// 112 cycles sampling time
    T_112,
    /// 144 cycles sampling time
    T_144,
    /// 480 cycles sampling time
    T_480,
}

impl From<SampleTime> for u8 {
    fn from(val: SampleTime) -> Self {
        use SampleTime::*;
        match val {
            T_3 => 0,
            T_15 => 1,
            T_28 => 2,
            T_56 => 3,
            T_84 => 4,
            T_112 => 5,
            T_144 => 6,
            T_480 => 7,
        }
    }
}

/// Pin wired to an external channel, `None` for the internal ones
pub const fn channel_pin(channel: u8) -> Option<(Port, u8)> {
    match channel {
        0..=7 => Some((Port::A, channel)),
        8..=9 => Some((Port::B, channel - 8)),
        10..=15 => Some((Port::C, channel - 10)),
        _ => None,
    }
}

/// Single channel configuration
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdcConfig {
    pub channel: u8,
    pub resolution: Resolution,
    pub align: Align,
    pub sample_time: SampleTime,
    /// Report finished conversions through the ADC interrupt
    pub interrupt: bool,
    pub priority: u8,
}

impl AdcConfig {
    pub const fn new(channel: u8) -> Self {
        Self {
            channel,
            resolution: Resolution::Twelve,
            align: Align::Right,
            sample_time: SampleTime::T_28,
            interrupt: false,
            priority: 0,
        }
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn sample_time(mut self, sample_time: SampleTime) -> Self {
        self.sample_time = sample_time;
        self
    }

    pub fn interrupt(mut self, enable: bool) -> Self {
        self.interrupt = enable;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Largest value the data register can hold
    pub const fn max_sample(&self) -> u16 {
        let bits = self.resolution.bits();
        let max = (1u16 << bits) - 1;
        match self.align {
            Align::Right => max,
            // 6 bit results are aligned on the low byte
            Align::Left if bits == 6 => max << 2,
            Align::Left => max << (16 - bits),
        }
    }
}

/// ADC instance and the channel it converts
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdcHandle {
    pub adc: Adc,
    pub config: AdcConfig,
}

impl AdcHandle {
    pub const fn new(adc: Adc, config: AdcConfig) -> Self {
        Self { adc, config }
    }

    /// Programs the converter for one channel and powers it up
    ///
    /// # Panics
    ///
    /// Panics if the channel is above [`MAX_CHANNEL`].
    pub fn configure_single_channel<B: Bus, N: InterruptController>(&self, bus: &B, nvic: &mut N) {
        let adc = self.adc;
        let config = &self.config;
        if config.channel > MAX_CHANNEL {
            error!("invalid ADC channel {}", config.channel);
            panic!("invalid ADC channel {}", config.channel);
        }

        if let Some((port, pin)) = channel_pin(config.channel) {
            PinHandle::new(port, pin, PinConfig::analog()).configure(bus);
        }

        adc.enable(bus);
        let cr1 = bus.reg(adc.base(), CR1);
        let cr2 = bus.reg(adc.base(), CR2);
        cr1.write(0);
        cr2.write(0);

        cr1.write_field(CR1_RES, 2, config.resolution as u32);
        cr2.write_bit(CR2_ALIGN, config.align.into());
        cr1.clear_bit(CR1_SCAN);
        cr2.clear_bit(CR2_CONT);
        adc.write_channel(bus, config.channel, config.sample_time);

        if config.interrupt {
            cr1.set_bits((1 << CR1_EOCIE) | (1 << CR1_OVRIE));
            nvic.set_priority(adc.interrupt(), config.priority);
            nvic.unmask(adc.interrupt());
        }

        cr2.set_bit(CR2_ADON);
        debug!("ADC channel {} configured", config.channel);
    }

    /// Starts one conversion of the configured channel
    pub fn start_single_conversion<B: Bus>(&self, bus: &B) {
        self.adc.start_conversion(bus)
    }

    /// Most recent result stored by the interrupt handler, 0 before the first
    pub fn get_value(&self, shared: &Shared) -> u16 {
        shared.adc().last().unwrap_or(0)
    }

    /// Takes the stored result if it was not taken yet
    pub fn try_receive(&self, shared: &Shared) -> Option<u16> {
        shared.adc().try_receive()
    }

    /// Raw data register, aligned per configuration
    pub fn read_data<B: Bus>(&self, bus: &B) -> u16 {
        self.adc.read_data(bus)
    }

    /// Starts a conversion and polls for its end
    pub fn read_blocking<B: Bus>(&self, bus: &B) -> Result<u16, Error> {
        let adc = self.adc;
        let sr = bus.reg(adc.base(), SR);
        sr.write(!((1 << SR_OVR) | (1 << SR_EOC)));
        adc.start_conversion(bus);

        for _ in 0..POLL_BUDGET {
            let status = sr.read();
            if status & (1 << SR_OVR) != 0 {
                sr.write(!(1 << SR_OVR));
                warn!("ADC overrun");
                return Err(Error::Overrun);
            }
            if status & (1 << SR_EOC) != 0 {
                return Ok(adc.read_data(bus));
            }
        }
        Err(Error::Timeout)
    }

    pub fn max_sample(&self) -> u16 {
        self.config.max_sample()
    }

    /// Ties the handle to a bus, giving a converter that implements
    /// `embedded_hal_02::adc::OneShot`
    pub fn bind<B: Bus>(self, bus: &B) -> Converter<'_, B> {
        Converter { handle: self, bus }
    }
}

/// Configured ADC bound to its register bus
pub struct Converter<'a, B> {
    handle: AdcHandle,
    bus: &'a B,
}

impl<B: Bus> Converter<'_, B> {
    pub fn handle(&self) -> &AdcHandle {
        &self.handle
    }

    /// Converts `channel` once, leaving it selected
    pub fn convert(&mut self, channel: u8) -> Result<u16, Error> {
        if channel != self.handle.config.channel {
            self.handle
                .adc
                .select_channel(self.bus, channel, self.handle.config.sample_time)?;
            self.handle.config.channel = channel;
        }
        self.handle.read_blocking(self.bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::gpio::MODER;
    use crate::sim::Sim;

    #[test]
    fn max_sample_per_resolution_and_alignment() {
        let config = AdcConfig::new(0);
        assert_eq!(config.max_sample(), 0x0FFF);
        assert_eq!(config.resolution(Resolution::Eight).max_sample(), 0x00FF);
        assert_eq!(config.align(Align::Left).max_sample(), 0xFFF0);
        assert_eq!(
            config
                .resolution(Resolution::Six)
                .align(Align::Left)
                .max_sample(),
            0x00FC
        );
    }

    #[test]
    fn channel_pins() {
        assert_eq!(channel_pin(0), Some((Port::A, 0)));
        assert_eq!(channel_pin(9), Some((Port::B, 1)));
        assert_eq!(channel_pin(15), Some((Port::C, 5)));
        assert_eq!(channel_pin(16), None);
    }

    #[test]
    fn configure_single_channel() {
        let sim = Sim::new();
        let mut nvic = sim.nvic();
        let handle = AdcHandle::new(
            Adc::Adc1,
            AdcConfig::new(11)
                .resolution(Resolution::Ten)
                .sample_time(SampleTime::T_480)
                .interrupt(true),
        );
        handle.configure_single_channel(&sim, &mut nvic);

        // PC1 analog
        assert_eq!((sim.peek(Port::C.base() + MODER) >> 2) & 0b11, 0b11);
        assert_eq!(sim.peek(Adc::Adc1.base() + CR1), (1 << CR1_RES) | (1 << CR1_EOCIE) | (1 << CR1_OVRIE));
        assert_eq!(sim.peek(Adc::Adc1.base() + CR2), 1 << CR2_ADON);
        assert_eq!(sim.peek(Adc::Adc1.base() + SMPR1), 0b111 << 3);
        assert_eq!(sim.peek(Adc::Adc1.base() + SQR3), 11);
        assert!(nvic.is_enabled(Interrupt::ADC));
    }

    #[test]
    fn blocking_conversion_honors_resolution() {
        let sim = Sim::new();
        let mut nvic = sim.nvic();
        sim.set_analog(3, 0xABC);

        let handle = AdcHandle::new(Adc::Adc1, AdcConfig::new(3));
        handle.configure_single_channel(&sim, &mut nvic);
        assert_eq!(handle.read_blocking(&sim), Ok(0xABC));

        let handle = AdcHandle::new(Adc::Adc1, AdcConfig::new(3).resolution(Resolution::Eight));
        handle.configure_single_channel(&sim, &mut nvic);
        assert_eq!(handle.read_blocking(&sim), Ok(0xAB));

        let handle = AdcHandle::new(Adc::Adc1, AdcConfig::new(3).align(Align::Left));
        handle.configure_single_channel(&sim, &mut nvic);
        assert_eq!(handle.read_blocking(&sim), Ok(0xABC0));
    }

    #[test]
    fn unread_result_overruns() {
        let sim = Sim::new();
        let mut nvic = sim.nvic();
        let handle = AdcHandle::new(Adc::Adc1, AdcConfig::new(0).interrupt(true));
        handle.configure_single_channel(&sim, &mut nvic);
        sim.set_analog(0, 100);

        handle.start_single_conversion(&sim);
        handle.start_single_conversion(&sim);
        assert_eq!(Adc::Adc1.on_interrupt(&sim), Some(Err(Error::Overrun)));
        assert_eq!(Adc::Adc1.on_interrupt(&sim), Some(Ok(100)));
        assert_eq!(Adc::Adc1.on_interrupt(&sim), None);
    }

    #[test]
    fn converter_switches_channels() {
        let sim = Sim::new();
        let mut nvic = sim.nvic();
        sim.set_analog(1, 1);
        sim.set_analog(2, 2);
        let handle = AdcHandle::new(Adc::Adc1, AdcConfig::new(1));
        handle.configure_single_channel(&sim, &mut nvic);

        let mut adc = handle.bind(&sim);
        assert_eq!(adc.convert(2), Ok(2));
        assert_eq!(adc.convert(1), Ok(1));
        assert_eq!(sim.peek(Adc::Adc1.base() + SQR3), 1);
    }

    #[test]
    fn channels_past_the_last_are_refused() {
        let sim = Sim::new();
        let mut nvic = sim.nvic();
        sim.set_analog(4, 44);
        let handle = AdcHandle::new(Adc::Adc1, AdcConfig::new(4).sample_time(SampleTime::T_3));
        handle.configure_single_channel(&sim, &mut nvic);

        assert_eq!(
            Adc::Adc1.select_channel(&sim, 19, SampleTime::T_480),
            Err(Error::InvalidChannel(19))
        );
        assert_eq!(sim.peek(Adc::Adc1.base() + SQR3), 4);
        assert_eq!(sim.peek(Adc::Adc1.base() + SMPR1), 0);

        let mut adc = handle.bind(&sim);
        assert_eq!(adc.convert(200), Err(Error::InvalidChannel(200)));
        assert_eq!(adc.handle().config.channel, 4);
        assert_eq!(adc.convert(4), Ok(44));

        assert_eq!(Adc::Adc1.select_channel(&sim, MAX_CHANNEL, SampleTime::T_3), Ok(()));
        assert_eq!(sim.peek(Adc::Adc1.base() + SQR3), 18);
    }
}
