/*!
  # Timer

  General purpose timers TIM2..TIM5 used as periodic tick sources.

  A [`TimerHandle`] holds the timer instance and its [`Config`]. The
  prescaler and the period are divisor counts: with a prescaler `P` and a
  period `A` the counter overflows every `P * A` timer clock cycles, so a
  timer clocked at 16 MHz with `P = 16000` and `A = 1000` ticks once per
  second. The registers receive `P - 1` and `A - 1`.

  The life cycle is `configure` (counter stopped), then
  [`set_state`](TimerHandle::set_state) to start and stop the counter as often
  as needed. `configure` may be applied again while the timer is stopped.

  | Timer | Counter | Vector |
  |:-----:|:-------:|:------:|
  | TIM2  | 32 bit  | TIM2   |
  | TIM3  | 16 bit  | TIM3   |
  | TIM4  | 16 bit  | TIM4   |
  | TIM5  | 32 bit  | TIM5   |
*/

use crate::bus::Bus;
use crate::nvic::{Interrupt, InterruptController};
use crate::pac;
use crate::rcc::{Clocks, Enable, GetBusFreq};
use crate::regs::address_of;
use crate::regs::tim::{
    ARR, CCER, CCMR1, CCMR2, CCMR_OCFE, CCMR_OCM, CCMR_OCPE, CCR1, CNT, CR1, CR1_ARPE, CR1_CEN,
    CR1_DIR, CR1_URS, DIER, EGR, EGR_UG, PSC, SR,
};
use crate::time::MicroSecondsU64;

/// General purpose timer instance
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tim {
    Tim2,
    Tim3,
    Tim4,
    Tim5,
}

bitflags::bitflags! {
    pub struct Event: u32 {
        const Update  = 1 << 0;
        const C1 = 1 << 1;
        const C2 = 1 << 2;
        const C3 = 1 << 3;
        const C4 = 1 << 4;
    }
}

/// Capture/compare channel
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Channel {
    C1 = 1,
    C2 = 2,
    C3 = 3,
    C4 = 4,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::C1, Channel::C2, Channel::C3, Channel::C4];

    /// Zero based channel index
    pub const fn index(self) -> u8 {
        self as u8 - 1
    }
}

impl TryFrom<u8> for Channel {
    type Error = u8;

    fn try_from(n: u8) -> Result<Self, u8> {
        match n {
            1 => Ok(Channel::C1),
            2 => Ok(Channel::C2),
            3 => Ok(Channel::C3),
            4 => Ok(Channel::C4),
            n => Err(n),
        }
    }
}

/// Compare/PWM polarity
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

/// Output compare mode
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ocm {
    Frozen = 0,
    ActiveOnMatch = 1,
    InactiveOnMatch = 2,
    Toggle = 3,
    ForceInactive = 4,
    ForceActive = 5,
    PwmMode1 = 6,
    PwmMode2 = 7,
}

/// Count direction
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Counter state requested through [`TimerHandle::set_state`]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    On,
    Off,
}

/// Smallest prescaler that passes validation
pub const MIN_PRESCALER: u32 = 2;
/// Largest prescaler that passes validation
pub const MAX_PRESCALER: u32 = 0xFFFD;
/// Smallest period that passes validation
pub const MIN_PERIOD: u32 = 2;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ConfigError {
    /// Prescaler outside `MIN_PRESCALER..=MAX_PRESCALER`
    PrescalerOutOfRange(u32),
    /// Period below [`MIN_PERIOD`] or above what the counter can hold
    PeriodOutOfRange(u32),
}

impl Tim {
    pub const ALL: [Tim; 4] = [Tim::Tim2, Tim::Tim3, Tim::Tim4, Tim::Tim5];

    /// Base address of the timer registers
    pub fn base(self) -> u32 {
        match self {
            Tim::Tim2 => address_of(pac::TIM2::PTR),
            Tim::Tim3 => address_of(pac::TIM3::PTR),
            Tim::Tim4 => address_of(pac::TIM4::PTR),
            Tim::Tim5 => address_of(pac::TIM5::PTR),
        }
    }

    /// Update/global interrupt vector
    pub const fn interrupt(self) -> Interrupt {
        match self {
            Tim::Tim2 => Interrupt::TIM2,
            Tim::Tim3 => Interrupt::TIM3,
            Tim::Tim4 => Interrupt::TIM4,
            Tim::Tim5 => Interrupt::TIM5,
        }
    }

    pub const fn from_interrupt(irq: Interrupt) -> Option<Tim> {
        match irq {
            Interrupt::TIM2 => Some(Tim::Tim2),
            Interrupt::TIM3 => Some(Tim::Tim3),
            Interrupt::TIM4 => Some(Tim::Tim4),
            Interrupt::TIM5 => Some(Tim::Tim5),
            _ => None,
        }
    }

    pub const fn max_auto_reload(self) -> u32 {
        match self {
            Tim::Tim2 | Tim::Tim5 => u32::MAX,
            Tim::Tim3 | Tim::Tim4 => u16::MAX as u32,
        }
    }

    #[inline(always)]
    pub fn set_prescaler<B: Bus>(self, bus: &B, psc: u16) {
        bus.reg(self.base(), PSC).write(psc as u32);
    }

    #[inline(always)]
    pub fn read_prescaler<B: Bus>(self, bus: &B) -> u16 {
        bus.reg(self.base(), PSC).read() as u16
    }

    #[inline(always)]
    pub fn set_auto_reload<B: Bus>(self, bus: &B, arr: u32) {
        bus.reg(self.base(), ARR).write(arr);
    }

    #[inline(always)]
    pub fn read_auto_reload<B: Bus>(self, bus: &B) -> u32 {
        bus.reg(self.base(), ARR).read()
    }

    #[inline(always)]
    pub fn set_direction<B: Bus>(self, bus: &B, direction: Direction) {
        bus.reg(self.base(), CR1)
            .write_bit(CR1_DIR, direction == Direction::Down);
    }

    #[inline(always)]
    pub fn enable_preload<B: Bus>(self, bus: &B, b: bool) {
        bus.reg(self.base(), CR1).write_bit(CR1_ARPE, b);
    }

    #[inline(always)]
    pub fn enable_counter<B: Bus>(self, bus: &B, b: bool) {
        bus.reg(self.base(), CR1).write_bit(CR1_CEN, b);
    }

    #[inline(always)]
    pub fn is_counter_enabled<B: Bus>(self, bus: &B) -> bool {
        bus.reg(self.base(), CR1).bit_is_set(CR1_CEN)
    }

    #[inline(always)]
    pub fn reset_counter<B: Bus>(self, bus: &B) {
        bus.reg(self.base(), CNT).write(0);
    }

    #[inline(always)]
    pub fn read_count<B: Bus>(self, bus: &B) -> u32 {
        bus.reg(self.base(), CNT).read()
    }

    /// Loads the prescaler and the period without raising an update interrupt
    #[inline(always)]
    pub fn trigger_update<B: Bus>(self, bus: &B) {
        // Sets the URS bit to prevent an interrupt from being triggered by
        // the UG bit
        let cr1 = bus.reg(self.base(), CR1);
        cr1.set_bit(CR1_URS);
        bus.reg(self.base(), EGR).write(1 << EGR_UG);
        cr1.clear_bit(CR1_URS);
    }

    /// Clears the given flags, leaving every other flag untouched
    #[inline(always)]
    pub fn clear_interrupt_flag<B: Bus>(self, bus: &B, event: Event) {
        // rc_w0: writing 1 leaves a flag as it is
        bus.reg(self.base(), SR).write(0xffff & !event.bits());
    }

    #[inline(always)]
    pub fn listen_interrupt<B: Bus>(self, bus: &B, event: Event, b: bool) {
        let dier = bus.reg(self.base(), DIER);
        if b {
            dier.set_bits(event.bits())
        } else {
            dier.clear_bits(event.bits())
        }
    }

    #[inline(always)]
    pub fn get_interrupt_flag<B: Bus>(self, bus: &B) -> Event {
        Event::from_bits_truncate(bus.reg(self.base(), SR).read())
    }

    #[inline(always)]
    pub fn get_listened<B: Bus>(self, bus: &B) -> Event {
        Event::from_bits_truncate(bus.reg(self.base(), DIER).read())
    }

    /// Output compare mode of `channel`, with fast mode and preload enabled
    pub fn preload_output_channel_in_mode<B: Bus>(self, bus: &B, channel: Channel, mode: Ocm) {
        let (ccmr, shift) = ccmr_of(channel);
        let ccmr = bus.reg(self.base(), ccmr);
        ccmr.write_field(shift + CCMR_OCM, 3, mode as u32);
        ccmr.set_bits((1 << (shift + CCMR_OCFE)) | (1 << (shift + CCMR_OCPE)));
    }

    /// Capture/compare enable and polarity of `channel`
    pub fn enable_channel<B: Bus>(self, bus: &B, channel: Channel, polarity: Polarity) {
        let shift = 4 * channel.index();
        let ccer = bus.reg(self.base(), CCER);
        ccer.write_bit(shift + 1, polarity == Polarity::ActiveLow);
        ccer.set_bit(shift);
    }

    pub fn disable_channel<B: Bus>(self, bus: &B, channel: Channel) {
        bus.reg(self.base(), CCER).clear_bit(4 * channel.index());
    }

    #[inline(always)]
    pub fn set_cc_value<B: Bus>(self, bus: &B, channel: Channel, value: u32) {
        bus.reg(self.base(), ccr_of(channel)).write(value);
    }

    #[inline(always)]
    pub fn read_cc_value<B: Bus>(self, bus: &B, channel: Channel) -> u32 {
        bus.reg(self.base(), ccr_of(channel)).read()
    }

    /// Interrupt service routine body
    ///
    /// Clears every flag that is both raised and listened to and returns them.
    pub fn on_interrupt<B: Bus>(self, bus: &B) -> Event {
        let pending = self.get_interrupt_flag(bus) & self.get_listened(bus);
        if !pending.is_empty() {
            self.clear_interrupt_flag(bus, pending);
        }
        pending
    }
}

const fn ccmr_of(channel: Channel) -> (u32, u8) {
    match channel {
        Channel::C1 => (CCMR1, 0),
        Channel::C2 => (CCMR1, 8),
        Channel::C3 => (CCMR2, 0),
        Channel::C4 => (CCMR2, 8),
    }
}

const fn ccr_of(channel: Channel) -> u32 {
    CCR1 + 4 * channel.index() as u32
}

/// Divisors `(prescaler, period)` that make a timer clocked at `clock`
/// overflow at `freq`
///
/// The prescaler never drops below [`MIN_PRESCALER`] and the period never
/// exceeds `max_period`.
#[inline(always)]
pub(crate) const fn compute_arr_presc(freq: u32, clock: u32, max_period: u64) -> (u32, u32) {
    let ticks = (clock / freq) as u64;
    let mut psc = (ticks - 1) / max_period + 1;
    if psc < MIN_PRESCALER as u64 {
        psc = MIN_PRESCALER as u64;
    }
    // Both are at most `ticks`, which came from a u32
    (psc as u32, (ticks / psc) as u32)
}

/// Timer settings
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Clock divisor, `MIN_PRESCALER..=MAX_PRESCALER`
    pub prescaler: u32,
    /// Counter ticks per overflow, at least [`MIN_PERIOD`]
    pub period: u32,
    pub direction: Direction,
    /// Raise the update interrupt on every overflow
    pub interrupt: bool,
    /// NVIC priority of the update interrupt
    pub priority: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prescaler: 16_000,
            period: 1_000,
            direction: Direction::Up,
            interrupt: false,
            priority: 0,
        }
    }
}

impl Config {
    pub fn prescaler(mut self, prescaler: u32) -> Self {
        self.prescaler = prescaler;
        self
    }

    pub fn period(mut self, period: u32) -> Self {
        self.period = period;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
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
}

/// Timer instance and the configuration it should run with
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    pub tim: Tim,
    pub config: Config,
}

impl TimerHandle {
    pub const fn new(tim: Tim, config: Config) -> Self {
        Self { tim, config }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let Config {
            prescaler, period, ..
        } = self.config;
        if !(MIN_PRESCALER..=MAX_PRESCALER).contains(&prescaler) {
            return Err(ConfigError::PrescalerOutOfRange(prescaler));
        }
        if period < MIN_PERIOD || period - 1 > self.tim.max_auto_reload() {
            return Err(ConfigError::PeriodOutOfRange(period));
        }
        Ok(())
    }

    /// Programs the timer, leaving the counter stopped
    ///
    /// # Panics
    ///
    /// Panics if the handle does not [validate](TimerHandle::validate).
    pub fn configure<B: Bus, N: InterruptController>(&self, bus: &B, nvic: &mut N) {
        if let Err(e) = self.validate() {
            error!("invalid timer configuration: {}", e);
            panic!("invalid timer configuration: {:?}", e);
        }

        let tim = self.tim;
        tim.enable(bus);
        tim.enable_counter(bus, false);

        tim.set_prescaler(bus, (self.config.prescaler - 1) as u16);
        tim.set_auto_reload(bus, self.config.period - 1);
        tim.set_direction(bus, self.config.direction);
        tim.trigger_update(bus);

        tim.clear_interrupt_flag(bus, Event::Update);
        tim.listen_interrupt(bus, Event::Update, self.config.interrupt);
        if self.config.interrupt {
            nvic.set_priority(tim.interrupt(), self.config.priority);
            nvic.unmask(tim.interrupt());
        }

        debug!(
            "{} configured: psc {} arr {}",
            tim,
            self.config.prescaler,
            self.config.period
        );
    }

    /// Starts or stops the counter
    pub fn set_state<B: Bus>(&self, bus: &B, state: TimerState) {
        self.tim.enable_counter(bus, state == TimerState::On);
    }

    pub fn is_running<B: Bus>(&self, bus: &B) -> bool {
        self.tim.is_counter_enabled(bus)
    }

    /// Starts listening for an `event`
    pub fn listen<B: Bus>(&self, bus: &B, event: Event) {
        self.tim.listen_interrupt(bus, event, true)
    }

    /// Stops listening for an `event`
    pub fn unlisten<B: Bus>(&self, bus: &B, event: Event) {
        self.tim.listen_interrupt(bus, event, false)
    }

    pub fn clear_interrupt<B: Bus>(&self, bus: &B, event: Event) {
        self.tim.clear_interrupt_flag(bus, event)
    }

    pub fn get_interrupt<B: Bus>(&self, bus: &B) -> Event {
        self.tim.get_interrupt_flag(bus)
    }

    pub fn counter<B: Bus>(&self, bus: &B) -> u32 {
        self.tim.read_count(bus)
    }

    /// Time between two overflows with the timer clocked from `clocks`
    ///
    /// A full 32-bit period with a large prescaler lasts for days, so the
    /// result is 64 bits wide. It saturates instead of wrapping.
    pub fn tick_period(&self, clocks: &Clocks) -> MicroSecondsU64 {
        let clk = self.tim.get_timer_frequency(clocks).raw() as u128;
        let cycles = self.config.prescaler as u128 * self.config.period as u128;
        let micros = cycles * 1_000_000 / clk.max(1);
        MicroSecondsU64::from_ticks(u64::try_from(micros).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::rcc;
    use crate::sim::Sim;

    fn handle(config: Config) -> TimerHandle {
        TimerHandle::new(Tim::Tim3, config)
    }

    #[test]
    fn configure_programs_divisors_minus_one() {
        let sim = Sim::new();
        let mut nvic = sim.nvic();
        handle(Config::default().prescaler(16_000).period(1_000)).configure(&sim, &mut nvic);

        let base = Tim::Tim3.base();
        assert_eq!(sim.peek(base + PSC), 15_999);
        assert_eq!(sim.peek(base + ARR), 999);
        assert_eq!(sim.peek(rcc::base() + rcc::APB1ENR), 1 << 1);
        assert_eq!(sim.peek(base + CR1) & (1 << CR1_CEN), 0);
        assert_eq!(sim.peek(base + CR1) & (1 << CR1_URS), 0);
        assert_eq!(sim.peek(base + SR), 0);
        assert!(!nvic.is_enabled(Interrupt::TIM3));
    }

    #[test]
    fn configure_registers_update_interrupt() {
        let sim = Sim::new();
        let mut nvic = sim.nvic();
        handle(Config::default().interrupt(true).priority(3)).configure(&sim, &mut nvic);

        assert_eq!(sim.peek(Tim::Tim3.base() + DIER), Event::Update.bits());
        assert!(nvic.is_enabled(Interrupt::TIM3));
        assert_eq!(sim.priority(Interrupt::TIM3), 3);
    }

    #[test]
    fn direction_selects_dir_bit() {
        let sim = Sim::new();
        let mut nvic = sim.nvic();
        let down = handle(Config::default().direction(Direction::Down));
        down.configure(&sim, &mut nvic);
        assert_ne!(sim.peek(Tim::Tim3.base() + CR1) & (1 << CR1_DIR), 0);

        handle(Config::default()).configure(&sim, &mut nvic);
        assert_eq!(sim.peek(Tim::Tim3.base() + CR1) & (1 << CR1_DIR), 0);
    }

    #[test]
    fn set_state_toggles_the_counter() {
        let sim = Sim::new();
        let mut nvic = sim.nvic();
        let timer = handle(Config::default());
        timer.configure(&sim, &mut nvic);

        timer.set_state(&sim, TimerState::On);
        assert!(timer.is_running(&sim));
        timer.set_state(&sim, TimerState::Off);
        assert!(!timer.is_running(&sim));
        timer.set_state(&sim, TimerState::On);
        assert!(timer.is_running(&sim));
    }

    #[test]
    fn validation_limits() {
        let ok = handle(Config::default().prescaler(MIN_PRESCALER).period(MIN_PERIOD));
        assert_eq!(ok.validate(), Ok(()));
        assert_eq!(
            handle(Config::default().prescaler(1)).validate(),
            Err(ConfigError::PrescalerOutOfRange(1))
        );
        assert_eq!(
            handle(Config::default().prescaler(0xFFFE)).validate(),
            Err(ConfigError::PrescalerOutOfRange(0xFFFE))
        );
        assert_eq!(
            handle(Config::default().period(1)).validate(),
            Err(ConfigError::PeriodOutOfRange(1))
        );
        assert_eq!(
            handle(Config::default().period(0x1_0001)).validate(),
            Err(ConfigError::PeriodOutOfRange(0x1_0001))
        );
        let wide = TimerHandle::new(Tim::Tim2, Config::default().period(0x1_0001));
        assert_eq!(wide.validate(), Ok(()));
    }

    #[test]
    #[should_panic(expected = "invalid timer configuration")]
    fn configure_halts_on_bad_prescaler() {
        let sim = Sim::new();
        handle(Config::default().prescaler(0)).configure(&sim, &mut sim.nvic());
    }

    #[test]
    fn clearing_one_flag_keeps_the_others() {
        let sim = Sim::new();
        let tim = Tim::Tim4;
        sim.poke(tim.base() + SR, (Event::Update | Event::C2).bits());
        tim.clear_interrupt_flag(&sim, Event::Update);
        assert_eq!(tim.get_interrupt_flag(&sim), Event::C2);
    }

    #[test]
    fn on_interrupt_only_takes_listened_flags() {
        let sim = Sim::new();
        let tim = Tim::Tim5;
        sim.poke(tim.base() + SR, (Event::Update | Event::C1).bits());
        tim.listen_interrupt(&sim, Event::Update, true);
        assert_eq!(tim.on_interrupt(&sim), Event::Update);
        assert_eq!(tim.get_interrupt_flag(&sim), Event::C1);
        assert_eq!(tim.on_interrupt(&sim), Event::empty());
    }

    #[test]
    fn one_second_tick() {
        let timer = handle(Config::default().prescaler(16_000).period(1_000));
        assert_eq!(timer.tick_period(&Clocks::hsi()), MicroSecondsU64::secs(1));
    }

    #[test]
    fn long_period_does_not_wrap() {
        let config = Config::default().prescaler(MAX_PRESCALER).period(u32::MAX);
        let timer = TimerHandle::new(Tim::Tim2, config);
        // 65_533 * (2^32 - 1) cycles of 16 MHz, about 203 days
        assert_eq!(
            timer.tick_period(&Clocks::hsi()).ticks(),
            17_591_380_733_952
        );
        assert!(timer.tick_period(&Clocks::hsi()) > MicroSecondsU64::secs(u32::MAX as u64));
    }

    #[test]
    fn channel_registers() {
        let sim = Sim::new();
        let tim = Tim::Tim2;
        for channel in Channel::ALL {
            tim.set_cc_value(&sim, channel, 100 + channel as u32);
        }
        assert_eq!(sim.peek(tim.base() + CCR1), 101);
        assert_eq!(sim.peek(tim.base() + CCR1 + 12), 104);
        assert_eq!(Channel::try_from(5), Err(5));
    }
}
