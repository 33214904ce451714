use super::*;

mod nb {
    use super::{Bus, Error, Serial};
    use embedded_hal_nb::serial::ErrorKind;
    use embedded_hal_nb::{serial, serial::ErrorType};

    impl embedded_hal_nb::serial::Error for Error {
        fn kind(&self) -> ErrorKind {
            match self {
                Error::Overrun => ErrorKind::Overrun,
                Error::FrameFormat => ErrorKind::FrameFormat,
                Error::Parity => ErrorKind::Parity,
                Error::Noise => ErrorKind::Noise,
                Error::Other => ErrorKind::Other,
            }
        }
    }

    impl<B: Bus> ErrorType for Serial<'_, B> {
        type Error = Error;
    }

    impl<B: Bus> serial::Write<u8> for Serial<'_, B> {
        fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
            self.write_u8(word)
        }

        fn flush(&mut self) -> nb::Result<(), Self::Error> {
            Serial::flush(self)
        }
    }

    impl<B: Bus> serial::Read<u8> for Serial<'_, B> {
        fn read(&mut self) -> nb::Result<u8, Self::Error> {
            Serial::read(self)
        }
    }
}

mod io {
    use super::{Bus, Error, Serial};
    use embedded_io::Write;

    impl embedded_io::Error for Error {
        fn kind(&self) -> embedded_io::ErrorKind {
            match self {
                Error::Overrun => embedded_io::ErrorKind::OutOfMemory,
                Error::FrameFormat | Error::Parity | Error::Noise => {
                    embedded_io::ErrorKind::InvalidData
                }
                Error::Other => embedded_io::ErrorKind::Other,
            }
        }
    }

    impl<B: Bus> embedded_io::ErrorType for Serial<'_, B> {
        type Error = Error;
    }

    impl<B: Bus> Write for Serial<'_, B> {
        /// Blocks for the first byte, then writes as long as the data
        /// register keeps accepting
        fn write(&mut self, bytes: &[u8]) -> Result<usize, Self::Error> {
            let Some((&first, rest)) = bytes.split_first() else {
                return Ok(0);
            };
            nb::block!(self.write_u8(first))?;

            let mut i = 1;
            for &byte in rest {
                match self.write_u8(byte) {
                    Ok(()) => i += 1,
                    Err(nb::Error::WouldBlock) => break,
                    Err(nb::Error::Other(e)) => return Err(e),
                }
            }
            Ok(i)
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            self.bflush()
        }
    }
}
