pub use crate::bus::Bus as _stm32f4xx_drivers_bus_Bus;
pub use crate::irq::Callbacks as _stm32f4xx_drivers_irq_Callbacks;
pub use crate::irq::Service as _stm32f4xx_drivers_irq_Service;
pub use crate::nvic::InterruptController as _stm32f4xx_drivers_nvic_InterruptController;
pub use crate::rcc::Enable as _stm32f4xx_drivers_rcc_Enable;
pub use crate::time::ExtU32 as _fugit_ExtU32;
pub use crate::time::RateExtU32 as _fugit_RateExtU32;
pub use embedded_hal::digital::InputPin as _embedded_hal_digital_InputPin;
pub use embedded_hal::digital::OutputPin as _embedded_hal_digital_OutputPin;
pub use embedded_hal::digital::StatefulOutputPin as _embedded_hal_digital_StatefulOutputPin;
pub use embedded_hal::i2c::I2c as _embedded_hal_i2c_I2c;
pub use embedded_hal::pwm::SetDutyCycle as _embedded_hal_pwm_SetDutyCycle;
pub use embedded_hal_02::adc::OneShot as _embedded_hal_02_adc_OneShot;
pub use embedded_hal_nb::serial::Read as _embedded_hal_nb_serial_Read;
pub use embedded_hal_nb::serial::Write as _embedded_hal_nb_serial_Write;
