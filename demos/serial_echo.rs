//! Echoes every byte received on USART2
//!
//! On the Nucleo-F401RE USART2 (PA2/PA3) is wired to the ST-LINK virtual
//! COM port. Bytes arrive through the receive interrupt and are sent back
//! from the main loop.

#![no_main]
#![no_std]

use panic_halt as _;

use cortex_m_rt::entry;
use stm32f4xx_drivers::{
    bus::Mmio,
    gpio::{PinConfig, PinHandle, Port},
    irq::{Dispatcher, NoCallbacks, Shared},
    pac, rt,
    serial::{BaudRate, Config, Usart, UsartHandle},
};

const TX: PinHandle = PinHandle::new(Port::A, 2, PinConfig::alternate(7));
const RX: PinHandle = PinHandle::new(Port::A, 3, PinConfig::alternate(7));

static SHARED: Shared = Shared::new();

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();
    let dp = pac::Peripherals::take().unwrap();
    let mut nvic = cp.NVIC;

    let bus: &'static Mmio = cortex_m::singleton!(: Mmio = Mmio::new(dp)).unwrap();
    TX.configure(bus);
    RX.configure(bus);

    let dispatcher = cortex_m::singleton!(
        : Dispatcher<'static, Mmio, NoCallbacks> = Dispatcher::new(bus, &SHARED, NoCallbacks)
    )
    .unwrap();
    let _ = rt::install(pac::Interrupt::USART2, dispatcher);

    let serial = UsartHandle::new(
        Usart::Usart2,
        Config::default()
            .baudrate(BaudRate::B115200)
            .rx_interrupt(true),
    );
    serial.configure(bus, &mut nvic);
    serial.write_str(bus, "echo ready\r\n");

    loop {
        if let Some(byte) = serial.try_receive(&SHARED) {
            serial.write_char(bus, byte);
        }
    }
}
