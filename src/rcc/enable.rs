use super::*;
use crate::adc::Adc;
use crate::exti::Syscfg;
use crate::gpio::Port;
use crate::i2c::I2c;
use crate::serial::Usart;
use crate::timer::Tim;

macro_rules! bus {
    ($PER:ty { $($variant:pat => ($busX:ident, $bit:literal),)+ }) => {
        impl Enable for $PER {
            #[inline(always)]
            fn gate(&self) -> Gate {
                match self {
                    $($variant => Gate::new(PeripheralBus::$busX, $bit),)+
                }
            }
        }
    };
}

bus!(Port {
    Port::A => (AHB1, 0),
    Port::B => (AHB1, 1),
    Port::C => (AHB1, 2),
    Port::D => (AHB1, 3),
    Port::E => (AHB1, 4),
    Port::H => (AHB1, 7),
});

bus!(Tim {
    Tim::Tim2 => (APB1, 0),
    Tim::Tim3 => (APB1, 1),
    Tim::Tim4 => (APB1, 2),
    Tim::Tim5 => (APB1, 3),
});

bus!(Usart {
    Usart::Usart1 => (APB2, 4),
    Usart::Usart2 => (APB1, 17),
    Usart::Usart6 => (APB2, 5),
});

bus!(I2c {
    I2c::I2c1 => (APB1, 21),
    I2c::I2c2 => (APB1, 22),
    I2c::I2c3 => (APB1, 23),
});

bus!(Adc {
    Adc::Adc1 => (APB2, 8),
});

bus!(Syscfg {
    Syscfg => (APB2, 14),
});
