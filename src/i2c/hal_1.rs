use embedded_hal::i2c::{Error, ErrorKind, ErrorType};

use super::BlockingI2c;
use crate::bus::Bus;

impl Error for super::Error {
    fn kind(&self) -> ErrorKind {
        match *self {
            Self::Overrun => ErrorKind::Overrun,
            Self::Bus => ErrorKind::Bus,
            Self::ArbitrationLoss => ErrorKind::ArbitrationLoss,
            Self::NoAcknowledge(nack) => ErrorKind::NoAcknowledge(nack),
            Self::Timeout => ErrorKind::Other,
        }
    }
}

impl<B: Bus> ErrorType for BlockingI2c<'_, B> {
    type Error = super::Error;
}

mod blocking {
    use super::{BlockingI2c, Bus};
    use embedded_hal::i2c::Operation;

    impl<B: Bus> embedded_hal::i2c::I2c for BlockingI2c<'_, B> {
        fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
            BlockingI2c::read(self, addr, buffer)
        }

        fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), Self::Error> {
            BlockingI2c::write(self, addr, bytes)
        }

        fn write_read(
            &mut self,
            addr: u8,
            bytes: &[u8],
            buffer: &mut [u8],
        ) -> Result<(), Self::Error> {
            BlockingI2c::write_read(self, addr, bytes, buffer)
        }

        fn transaction(
            &mut self,
            addr: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            BlockingI2c::transaction(self, addr, operations)
        }
    }
}
