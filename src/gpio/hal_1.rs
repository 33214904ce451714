use core::convert::Infallible;

use super::{Pin, PinState};
use crate::bus::Bus;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin, StatefulOutputPin};

fn from_state(state: embedded_hal::digital::PinState) -> PinState {
    match state {
        embedded_hal::digital::PinState::Low => PinState::Low,
        embedded_hal::digital::PinState::High => PinState::High,
    }
}

impl<B: Bus> ErrorType for Pin<'_, B> {
    type Error = Infallible;
}

impl<B: Bus> OutputPin for Pin<'_, B> {
    #[inline]
    fn set_high(&mut self) -> Result<(), Self::Error> {
        Pin::set_high(self);
        Ok(())
    }

    #[inline]
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Pin::set_low(self);
        Ok(())
    }

    #[inline]
    fn set_state(&mut self, state: embedded_hal::digital::PinState) -> Result<(), Self::Error> {
        Pin::set_state(self, from_state(state));
        Ok(())
    }
}

impl<B: Bus> StatefulOutputPin for Pin<'_, B> {
    #[inline]
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(Pin::is_set_high(self))
    }

    #[inline]
    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(Pin::is_set_low(self))
    }

    #[inline]
    fn toggle(&mut self) -> Result<(), Self::Error> {
        Pin::toggle(self);
        Ok(())
    }
}

impl<B: Bus> InputPin for Pin<'_, B> {
    #[inline]
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(Pin::is_high(self))
    }

    #[inline]
    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(Pin::is_low(self))
    }
}

#[cfg(test)]
mod tests {
    use crate::gpio::{PinConfig, PinHandle, Port};
    use crate::sim::Sim;
    use embedded_hal::digital::{InputPin, OutputPin, PinState, StatefulOutputPin};

    fn blink<P: OutputPin + StatefulOutputPin>(pin: &mut P) -> Result<bool, P::Error> {
        pin.set_state(PinState::High)?;
        pin.toggle()?;
        pin.is_set_low()
    }

    #[test]
    fn generic_output_driver() {
        let sim = Sim::new();
        let handle = PinHandle::new(Port::A, 5, PinConfig::output());
        handle.configure(&sim);
        let mut pin = handle.bind(&sim);
        assert_eq!(blink(&mut pin), Ok(true));
    }

    #[test]
    fn generic_input_driver() {
        let sim = Sim::new();
        let handle = PinHandle::new(Port::B, 7, PinConfig::input());
        handle.configure(&sim);
        sim.set_input(Port::B, 7, true);
        let mut pin = handle.bind(&sim);
        assert_eq!(InputPin::is_high(&mut pin), Ok(true));
    }
}
