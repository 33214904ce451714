use embedded_hal_02::adc::{Channel, OneShot};

use super::{Adc, Converter, Error};
use crate::bus::Bus;

/// ADC input channel `C`, for use with [`OneShot`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdcChannel<const C: u8>;

impl<const C: u8> Channel<Adc> for AdcChannel<C> {
    type ID = u8;

    fn channel() -> u8 {
        C
    }
}

impl<B, WORD, PIN> OneShot<Adc, WORD, PIN> for Converter<'_, B>
where
    B: Bus,
    WORD: From<u16>,
    PIN: Channel<Adc, ID = u8>,
{
    type Error = Error;

    fn read(&mut self, _pin: &mut PIN) -> nb::Result<WORD, Self::Error> {
        let res = self.convert(PIN::channel())?;
        Ok(res.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adc::{AdcConfig, AdcHandle};
    use crate::sim::Sim;

    #[test]
    fn one_shot_reads_the_pin_channel() {
        let sim = Sim::new();
        let mut nvic = sim.nvic();
        sim.set_analog(5, 0x321);
        let handle = AdcHandle::new(Adc::Adc1, AdcConfig::new(0));
        handle.configure_single_channel(&sim, &mut nvic);

        let mut adc = handle.bind(&sim);
        let mut pa5 = AdcChannel::<5>;
        let value: u16 = nb::block!(adc.read(&mut pa5)).unwrap();
        assert_eq!(value, 0x321);
    }
}
