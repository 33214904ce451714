//! # Interrupt driven peripheral drivers for the STM32F401
//!
//! Register level drivers for GPIO, general purpose timers, external
//! interrupts, USART, ADC, I2C and PWM. Every driver is a plain `Copy` handle
//! holding its instance and configuration; the register accesses go through a
//! [`Bus`](bus::Bus), which is [`Mmio`](bus::Mmio) on the target and the
//! [`sim`] register model in host tests.
//!
//! Interrupt vectors are routed through [`irq::Dispatcher`], which lets the
//! owning driver acknowledge the source and then calls the application's
//! [`irq::Callbacks`]. With the `rt` feature the [`rt`] module binds the
//! hardware vectors to an installed dispatcher.
//!
//! # Usage
//!
//! ## Building an application (binary crate)
//!
//! Follow the [cortex-m-quickstart] instructions, add this crate as a
//! dependency and enable the "rt" Cargo feature. The supported
//! microcontrollers are:
//!
//! - stm32f401
//! - stm32f411
//!
//! ```toml
//! [dependencies.stm32f4xx-drivers]
//! version = "0.1.0"
//! features = ["stm32f401", "rt"]
//! ```
//!
//! [cortex-m-quickstart]: https://docs.rs/cortex-m-quickstart/~0.3
//!
//! ## Usage example
//!
//! The following example blinks the LED on PA5 of the Nucleo-F401RE from
//! the TIM2 update interrupt, once per second.
//!
//! ```ignore
//! #![no_std]
//! #![no_main]
//!
//! use panic_halt as _;
//!
//! use cortex_m_rt::entry;
//! use stm32f4xx_drivers::{
//!     bus::Mmio,
//!     gpio::{PinConfig, PinHandle, Port},
//!     irq::{Callbacks, Dispatcher, Shared},
//!     pac, rt,
//!     timer::{self, Tim, TimerHandle, TimerState},
//! };
//!
//! const LED: PinHandle = PinHandle::new(Port::A, 5, PinConfig::output());
//! static SHARED: Shared = Shared::new();
//!
//! struct Blink(&'static Mmio);
//!
//! impl Callbacks for Blink {
//!     fn timer_update(&mut self, _tim: Tim) {
//!         LED.toggle(self.0);
//!     }
//! }
//!
//! #[entry]
//! fn main() -> ! {
//!     let cp = cortex_m::Peripherals::take().unwrap();
//!     let dp = pac::Peripherals::take().unwrap();
//!     let mut nvic = cp.NVIC;
//!
//!     let bus: &'static Mmio = cortex_m::singleton!(: Mmio = Mmio::new(dp)).unwrap();
//!     LED.configure(bus);
//!
//!     let dispatcher = cortex_m::singleton!(
//!         : Dispatcher<'static, Mmio, Blink> = Dispatcher::new(bus, &SHARED, Blink(bus))
//!     )
//!     .unwrap();
//!     let _ = rt::install(pac::Interrupt::TIM2, dispatcher);
//!
//!     let config = timer::Config::default()
//!         .prescaler(16_000)
//!         .period(1_000)
//!         .interrupt(true);
//!     let tim2 = TimerHandle::new(Tim::Tim2, config);
//!     tim2.configure(bus, &mut nvic);
//!     tim2.set_state(bus, TimerState::On);
//!
//!     loop {
//!         cortex_m::asm::wfi();
//!     }
//! }
//! ```
//!
//! # More examples
//!
//! See the `demos/` folder.

#![cfg_attr(not(any(test, feature = "sim")), no_std)]

#[cfg(not(any(feature = "stm32f401", feature = "stm32f411")))]
compile_error!("Target not found. A `--features <target-name>` is required.");

// This must go first so the macros are visible to the other modules
#[macro_use]
mod fmt;

#[cfg(feature = "stm32f401")]
pub use stm32f4::stm32f401 as pac;

#[cfg(feature = "stm32f411")]
pub use stm32f4::stm32f411 as pac;

pub use crate::pac as device;

pub mod adc;
pub mod bus;
pub mod exti;
pub mod gpio;
pub mod i2c;
pub mod irq;
pub mod mailbox;
pub mod nvic;
pub mod prelude;
pub mod pwm;
pub mod rcc;
pub mod regs;
#[cfg(feature = "rt")]
pub mod rt;
pub mod serial;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod time;
pub mod timer;
