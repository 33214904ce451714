//! Toggles the LED on PA5 whenever the user button on PC13 is pressed
//!
//! The Nucleo button pulls PC13 low, so the line triggers on the falling edge.

#![no_main]
#![no_std]

use panic_halt as _;

use cortex_m_rt::entry;
use stm32f4xx_drivers::{
    bus::Mmio,
    exti::{Edge, ExtiConfig},
    gpio::{PinConfig, PinHandle, Port, Pull},
    irq::{Callbacks, Dispatcher, Shared},
    mailbox::Flag,
    pac, rt,
};

const LED: PinHandle = PinHandle::new(Port::A, 5, PinConfig::output());
const BUTTON: PinHandle = PinHandle::new(Port::C, 13, PinConfig::input().pull(Pull::Up));

static SHARED: Shared = Shared::new();
static PRESSED: Flag = Flag::new();

struct Button;

impl Callbacks for Button {
    fn exti_line(&mut self, line: u8) {
        if line == BUTTON.pin {
            PRESSED.raise();
        }
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
        : Dispatcher<'static, Mmio, Button> = Dispatcher::new(bus, &SHARED, Button)
    )
    .unwrap();
    let _ = rt::install(pac::Interrupt::EXTI15_10, dispatcher);

    ExtiConfig::new(BUTTON, Edge::Falling)
        .priority(2)
        .configure(bus, &mut nvic)
        .unwrap();

    loop {
        if PRESSED.take() {
            LED.toggle(bus);
        }
        cortex_m::asm::wfi();
    }
}
