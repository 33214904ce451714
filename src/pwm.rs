/*!
  # Pulse width modulation

  The general purpose timers (`TIM2`, `TIM3`, `TIM4` and `TIM5`) can output
  pulse width modulated signals on up to 4 channels each.

  A [`PwmHandle`] drives one channel. Prescaler and period are divisor counts
  as for [`timer`](crate::timer); the duty cycle is given in timer ticks, so
  a duty equal to the period keeps the output active for the whole cycle.
  Larger duties are clamped to the period.

  The timer runs with auto-reload preload and the channel with compare
  preload, so [`update_duty_cycle`](PwmHandle::update_duty_cycle) and
  [`update_frequency`](PwmHandle::update_frequency) take effect at the next
  overflow without glitching the running cycle.

  ```rust,ignore
  // TIM3 channel 1 on PA6
  PinHandle::new(Port::A, 6, PinConfig::alternate(2)).configure(&bus);

  let mut buzzer = PwmHandle::new(Tim::Tim3, Config::default().period(4_000).duty(2_000));
  buzzer.configure(&bus);
  buzzer.start_signal(&bus);

  buzzer.update_duty_cycle(&bus, 1_000);
  ```
*/

use core::convert::Infallible;

use crate::bus::Bus;
use crate::rcc::{Clocks, Enable, GetBusFreq};
use crate::time::Hertz;
use crate::timer::{self, compute_arr_presc, Channel, Direction, Ocm, Polarity, Tim, TimerHandle};

/// PWM settings of one channel
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub channel: Channel,
    /// Clock divisor, as for [`timer::Config::prescaler`]
    pub prescaler: u32,
    /// Timer ticks per PWM cycle
    pub period: u32,
    /// Active ticks per PWM cycle
    pub duty: u32,
    pub polarity: Polarity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel: Channel::C1,
            prescaler: 16,
            period: 1_000,
            duty: 500,
            polarity: Polarity::ActiveHigh,
        }
    }
}

impl Config {
    pub fn channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    pub fn prescaler(mut self, prescaler: u32) -> Self {
        self.prescaler = prescaler;
        self
    }

    pub fn period(mut self, period: u32) -> Self {
        self.period = period;
        self
    }

    pub fn duty(mut self, duty: u32) -> Self {
        self.duty = duty;
        self
    }

    pub fn polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Compare value actually programmed
    pub const fn compare(&self) -> u32 {
        if self.duty < self.period {
            self.duty
        } else {
            self.period
        }
    }
}

/// One PWM channel of a general purpose timer
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmHandle {
    pub tim: Tim,
    pub config: Config,
}

impl PwmHandle {
    pub const fn new(tim: Tim, config: Config) -> Self {
        Self { tim, config }
    }

    /// Checks prescaler and period the way a timer configuration is checked
    pub fn validate(&self) -> Result<(), timer::ConfigError> {
        TimerHandle::new(
            self.tim,
            timer::Config::default()
                .prescaler(self.config.prescaler)
                .period(self.config.period),
        )
        .validate()
    }

    fn assert_valid(&self) {
        if let Err(e) = self.validate() {
            error!("invalid PWM configuration: {}", e);
            panic!("invalid PWM configuration: {:?}", e);
        }
    }

    fn write_timing<B: Bus>(&self, bus: &B) {
        self.tim.set_prescaler(bus, (self.config.prescaler - 1) as u16);
        self.tim.set_auto_reload(bus, self.config.period - 1);
        self.write_compare(bus);
    }

    fn write_compare<B: Bus>(&self, bus: &B) {
        self.tim
            .set_cc_value(bus, self.config.channel, self.config.compare());
    }

    /// Programs the timer and the channel, leaving the counter stopped
    ///
    /// # Panics
    ///
    /// Panics if prescaler or period do not [validate](PwmHandle::validate).
    pub fn configure<B: Bus>(&self, bus: &B) {
        self.assert_valid();

        let tim = self.tim;
        tim.enable(bus);
        tim.enable_counter(bus, false);

        self.write_timing(bus);
        tim.set_direction(bus, Direction::Up);
        tim.enable_preload(bus, true);
        tim.preload_output_channel_in_mode(bus, self.config.channel, Ocm::PwmMode1);
        tim.trigger_update(bus);

        self.enable_output(bus);
        debug!(
            "{} {} PWM: psc {} period {} duty {}",
            tim,
            self.config.channel,
            self.config.prescaler,
            self.config.period,
            self.config.duty
        );
    }

    /// Enables the channel output with the configured polarity
    pub fn enable_output<B: Bus>(&self, bus: &B) {
        self.tim
            .enable_channel(bus, self.config.channel, self.config.polarity);
    }

    pub fn disable_output<B: Bus>(&self, bus: &B) {
        self.tim.disable_channel(bus, self.config.channel);
    }

    /// Starts the waveform from the beginning of a cycle
    pub fn start_signal<B: Bus>(&self, bus: &B) {
        self.tim.reset_counter(bus);
        self.tim.enable_counter(bus, true);
    }

    /// Stops the counter and rewinds it, so the next start begins a new cycle
    pub fn stop_signal<B: Bus>(&self, bus: &B) {
        self.tim.reset_counter(bus);
        self.tim.enable_counter(bus, false);
    }

    /// Sets the active ticks per cycle
    pub fn update_duty_cycle<B: Bus>(&mut self, bus: &B, duty: u32) {
        self.config.duty = duty;
        self.write_compare(bus);
    }

    /// Sets the ticks per cycle, clamping the duty to the new period
    ///
    /// # Panics
    ///
    /// Panics if `period` does not fit the timer.
    pub fn update_frequency<B: Bus>(&mut self, bus: &B, period: u32) {
        self.config.period = period;
        self.assert_valid();
        self.tim.set_auto_reload(bus, period - 1);
        self.write_compare(bus);
    }

    /// Derives prescaler and period from a target frequency
    ///
    /// The duty keeps its tick count, so callers usually follow up with
    /// [`update_duty_cycle`](PwmHandle::update_duty_cycle).
    ///
    /// # Panics
    ///
    /// Panics if `freq` is zero, above a quarter of the timer clock or too
    /// low for the largest prescaler.
    pub fn set_frequency<B: Bus>(&mut self, bus: &B, freq: Hertz, clocks: &Clocks) {
        let clk = self.tim.get_timer_frequency(clocks).raw();
        if freq.raw() == 0 || freq.raw() > clk / (timer::MIN_PRESCALER * timer::MIN_PERIOD) {
            error!("PWM frequency {} Hz out of range", freq.raw());
            panic!("PWM frequency {} Hz out of range", freq.raw());
        }

        let max_period = self.tim.max_auto_reload() as u64 + 1;
        let (prescaler, period) = compute_arr_presc(freq.raw(), clk, max_period);
        let retimed = PwmHandle::new(
            self.tim,
            Config {
                prescaler,
                period,
                ..self.config
            },
        );
        retimed.assert_valid();

        self.config = retimed.config;
        self.write_timing(bus);
        self.tim.trigger_update(bus);
    }

    /// Compare value currently in the channel register
    pub fn duty<B: Bus>(&self, bus: &B) -> u32 {
        self.tim.read_cc_value(bus, self.config.channel)
    }

    /// Ticks per cycle currently in the auto-reload register
    pub fn period<B: Bus>(&self, bus: &B) -> u32 {
        self.tim.read_auto_reload(bus) + 1
    }

    /// Ties the handle to a bus, giving a channel that implements
    /// `embedded_hal::pwm::SetDutyCycle`
    pub fn bind<B: Bus>(self, bus: &B) -> Pwm<'_, B> {
        Pwm { handle: self, bus }
    }
}

/// Configured PWM channel bound to its register bus
pub struct Pwm<'a, B> {
    handle: PwmHandle,
    bus: &'a B,
}

impl<B: Bus> Pwm<'_, B> {
    pub fn handle(&self) -> &PwmHandle {
        &self.handle
    }

    pub fn release(self) -> PwmHandle {
        self.handle
    }
}

impl<B: Bus> embedded_hal::pwm::ErrorType for Pwm<'_, B> {
    type Error = Infallible;
}

impl<B: Bus> embedded_hal::pwm::SetDutyCycle for Pwm<'_, B> {
    fn max_duty_cycle(&self) -> u16 {
        self.handle.config.period.min(u16::MAX as u32) as u16
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        self.handle.update_duty_cycle(self.bus, duty as u32);
        Ok(())
    }
}
