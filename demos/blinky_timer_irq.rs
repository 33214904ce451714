//! Blinks the LED on PA5 from the TIM2 update interrupt
//!
//! This assumes a Nucleo-F401RE, whose user LED sits on PA5.

#![no_main]
#![no_std]

use panic_halt as _;

use cortex_m_rt::entry;
use stm32f4xx_drivers::{
    bus::Mmio,
    gpio::{PinConfig, PinHandle, Port},
    irq::{Callbacks, Dispatcher, Shared},
    pac, rt,
    timer::{self, Tim, TimerHandle, TimerState},
};

const LED: PinHandle = PinHandle::new(Port::A, 5, PinConfig::output());

static SHARED: Shared = Shared::new();

struct Blink {
    bus: &'static Mmio,
}

impl Callbacks for Blink {
    fn timer_update(&mut self, _tim: Tim) {
        LED.toggle(self.bus);
    }
}

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();
    let dp = pac::Peripherals::take().unwrap();
    let mut nvic = cp.NVIC;

    let bus: &'static Mmio = cortex_m::singleton!(: Mmio = Mmio::new(dp)).unwrap();
    LED.configure(bus);

    let dispatcher = cortex_m::singleton!(
        : Dispatcher<'static, Mmio, Blink> = Dispatcher::new(bus, &SHARED, Blink { bus })
    )
    .unwrap();
    let _ = rt::install(pac::Interrupt::TIM2, dispatcher);

    // 16 MHz / 16_000 / 500 = 2 Hz, so the LED blinks at 1 Hz
    let tim2 = TimerHandle::new(
        Tim::Tim2,
        timer::Config::default()
            .prescaler(16_000)
            .period(500)
            .interrupt(true),
    );
    tim2.configure(bus, &mut nvic);
    tim2.set_state(bus, TimerState::On);

    loop {
        cortex_m::asm::wfi();
    }
}
