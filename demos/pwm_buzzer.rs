//! Plays a two tone alarm on a buzzer driven by TIM3 channel 1 (PA6)

#![no_main]
#![no_std]

use panic_halt as _;

use cortex_m::asm;
use cortex_m_rt::entry;
use stm32f4xx_drivers::{
    bus::Mmio,
    gpio::{PinConfig, PinHandle, Port},
    pac,
    prelude::*,
    pwm::{Config, PwmHandle},
    rcc::Clocks,
    timer::{Channel, Tim},
};

const BUZZER: PinHandle = PinHandle::new(Port::A, 6, PinConfig::alternate(2));

#[entry]
fn main() -> ! {
    let dp = pac::Peripherals::take().unwrap();
    let bus = Mmio::new(dp);
    let clocks = Clocks::hsi();

    BUZZER.configure(&bus);

    let mut buzzer = PwmHandle::new(Tim::Tim3, Config::default().channel(Channel::C1));
    buzzer.configure(&bus);
    buzzer.start_signal(&bus);

    let tones = [440.Hz(), 880.Hz()];
    loop {
        for tone in tones {
            buzzer.set_frequency(&bus, tone, &clocks);
            // 50 % duty
            let half = buzzer.period(&bus) / 2;
            buzzer.update_duty_cycle(&bus, half);
            asm::delay(clocks.sysclk().raw() / 2);
        }
    }
}
