//! # Serial Communication (USART)
//!
//! USART1, USART2 and USART6 with a fixed baud table, blocking transmit and
//! interrupt driven receive.
//!
//! Receiving is single slot: the interrupt handler moves each byte from the
//! data register into the instance's [`Mailbox`] in [`Shared`]. A byte that
//! arrives before the previous one was taken replaces it; the mailbox counts
//! those overwrites.
//!
//! [`write_char`](UsartHandle::write_char) busy waits for the transmit data
//! register to empty and has no timeout.

use core::fmt;

use crate::bus::Bus;
use crate::irq::Shared;
use crate::mailbox::Mailbox;
use crate::nvic::{Interrupt, InterruptController};
use crate::pac;
use crate::rcc::Enable;
use crate::regs::address_of;
use crate::regs::usart::{
    BRR, CR1, CR1_M, CR1_PCE, CR1_PS, CR1_RE, CR1_RXNEIE, CR1_TE, CR1_TXEIE, CR1_UE, CR2,
    CR2_STOP, CR3, DR, SR, SR_FE, SR_NF, SR_ORE, SR_PE, SR_RXNE, SR_TC, SR_TXE,
};

pub mod config;
mod hal_1;

pub use config::{BaudRate, Config, Mode, Parity, StopBits, WordLength};

/// USART instance
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Usart {
    Usart1,
    Usart2,
    Usart6,
}

/// Interrupt event
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// New data has been received
    Rxne,
    /// New data can be sent
    Txe,
}

/// Serial error
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The peripheral receive buffer was overrun.
    Overrun,
    /// Received data does not conform to the peripheral configuration.
    /// Can be caused by a misconfigured device on either end of the serial line.
    FrameFormat,
    /// Parity check failed.
    Parity,
    /// Serial line is too noisy to read valid data.
    Noise,
    /// A different error occurred. The original error may contain more information.
    Other,
}

/// What one pass of the interrupt handler found
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IrqStatus {
    /// Byte moved out of the data register
    pub received: Option<u8>,
    pub error: Option<Error>,
    /// The transmit register emptied while the TXE interrupt was enabled
    pub tx_ready: bool,
}

impl Usart {
    pub const ALL: [Usart; 3] = [Usart::Usart1, Usart::Usart2, Usart::Usart6];

    pub fn base(self) -> u32 {
        match self {
            Usart::Usart1 => address_of(pac::USART1::PTR),
            Usart::Usart2 => address_of(pac::USART2::PTR),
            Usart::Usart6 => address_of(pac::USART6::PTR),
        }
    }

    pub const fn interrupt(self) -> Interrupt {
        match self {
            Usart::Usart1 => Interrupt::USART1,
            Usart::Usart2 => Interrupt::USART2,
            Usart::Usart6 => Interrupt::USART6,
        }
    }

    pub const fn from_interrupt(irq: Interrupt) -> Option<Usart> {
        match irq {
            Interrupt::USART1 => Some(Usart::Usart1),
            Interrupt::USART2 => Some(Usart::Usart2),
            Interrupt::USART6 => Some(Usart::Usart6),
            _ => None,
        }
    }

    /// Position in per-instance tables
    pub const fn index(self) -> usize {
        match self {
            Usart::Usart1 => 0,
            Usart::Usart2 => 1,
            Usart::Usart6 => 2,
        }
    }

    fn error_of(sr: u32) -> Option<Error> {
        if sr & (1 << SR_PE) != 0 {
            Some(Error::Parity)
        } else if sr & (1 << SR_FE) != 0 {
            Some(Error::FrameFormat)
        } else if sr & (1 << SR_NF) != 0 {
            Some(Error::Noise)
        } else if sr & (1 << SR_ORE) != 0 {
            Some(Error::Overrun)
        } else {
            None
        }
    }

    /// Reads a byte without blocking
    pub fn read<B: Bus>(self, bus: &B) -> nb::Result<u8, Error> {
        let sr = bus.reg(self.base(), SR).read();

        if let Some(err) = Self::error_of(sr) {
            // Some error occured. In order to clear that error flag, you have to
            // do a read from the sr register followed by a read from the dr
            // register
            bus.reg(self.base(), DR).read();
            Err(nb::Error::Other(err))
        } else if sr & (1 << SR_RXNE) != 0 {
            Ok(bus.reg(self.base(), DR).read() as u8)
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Writes a byte if the transmit data register is empty
    pub fn write<B: Bus>(self, bus: &B, byte: u8) -> nb::Result<(), Error> {
        if bus.reg(self.base(), SR).bit_is_set(SR_TXE) {
            bus.reg(self.base(), DR).write(byte as u32);
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Completes once the last frame left the shift register
    pub fn flush<B: Bus>(self, bus: &B) -> nb::Result<(), Error> {
        if bus.reg(self.base(), SR).bit_is_set(SR_TC) {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    pub fn listen<B: Bus>(self, bus: &B, event: Event) {
        bus.reg(self.base(), CR1).set_bit(event_bit(event));
    }

    pub fn unlisten<B: Bus>(self, bus: &B, event: Event) {
        bus.reg(self.base(), CR1).clear_bit(event_bit(event));
    }

    pub fn is_listening<B: Bus>(self, bus: &B, event: Event) -> bool {
        bus.reg(self.base(), CR1).bit_is_set(event_bit(event))
    }

    /// Interrupt service routine body
    ///
    /// Drains the data register when receive interrupts are on and disarms
    /// the TXE interrupt after it fired. It has to be re-armed with
    /// [`listen`](Usart::listen) for the next notification.
    pub fn on_interrupt<B: Bus>(self, bus: &B) -> IrqStatus {
        let sr = bus.reg(self.base(), SR).read();
        let cr1 = bus.reg(self.base(), CR1).read();
        let mut status = IrqStatus::default();

        if cr1 & (1 << CR1_RXNEIE) != 0 {
            let error = Self::error_of(sr);
            if sr & (1 << SR_RXNE) != 0 || error.is_some() {
                let byte = bus.reg(self.base(), DR).read() as u8;
                status.error = error;
                if sr & (1 << SR_RXNE) != 0 && matches!(error, None | Some(Error::Overrun)) {
                    status.received = Some(byte);
                }
            }
        }

        if cr1 & (1 << CR1_TXEIE) != 0 && sr & (1 << SR_TXE) != 0 {
            self.unlisten(bus, Event::Txe);
            status.tx_ready = true;
        }

        status
    }
}

const fn event_bit(event: Event) -> u8 {
    match event {
        Event::Rxne => CR1_RXNEIE,
        Event::Txe => CR1_TXEIE,
    }
}

/// USART instance and the configuration it should run with
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsartHandle {
    pub usart: Usart,
    pub config: Config,
}

impl UsartHandle {
    pub const fn new(usart: Usart, config: Config) -> Self {
        Self { usart, config }
    }

    /// Programs and enables the USART
    ///
    /// Runs with interrupts masked so no handler sees a half configured
    /// peripheral.
    pub fn configure<B: Bus, N: InterruptController>(&self, bus: &B, nvic: &mut N) {
        let usart = self.usart;
        let base = usart.base();
        let config = &self.config;

        critical_section::with(|_| {
            usart.enable(bus);

            let cr1 = bus.reg(base, CR1);
            cr1.write(0);
            bus.reg(base, CR2).write(0);
            bus.reg(base, CR3).write(0);

            match config.parity {
                Parity::ParityNone => cr1.clear_bit(CR1_PCE),
                Parity::ParityEven => {
                    cr1.set_bit(CR1_PCE);
                    cr1.clear_bit(CR1_PS);
                }
                Parity::ParityOdd => {
                    cr1.set_bit(CR1_PCE);
                    cr1.set_bit(CR1_PS);
                }
            }
            cr1.write_bit(CR1_M, config.nine_bit_frame());
            bus.reg(base, CR2)
                .write_field(CR2_STOP, 2, config.stopbits as u32);
            bus.reg(base, BRR).write(config.baudrate.brr());

            cr1.write_bit(CR1_TE, config.mode.tx());
            cr1.write_bit(CR1_RE, config.mode.rx());

            cr1.write_bit(CR1_RXNEIE, config.rx_interrupt);
            cr1.write_bit(CR1_TXEIE, config.tx_interrupt);
            if config.rx_interrupt || config.tx_interrupt {
                nvic.set_priority(usart.interrupt(), config.priority);
                nvic.unmask(usart.interrupt());
            }

            cr1.set_bit(CR1_UE);
        });

        debug!("{} configured: {}", usart, config.baudrate);
    }

    /// Blocks until the transmit data register is empty, then writes `byte`
    pub fn write_char<B: Bus>(&self, bus: &B, byte: u8) {
        let sr = bus.reg(self.usart.base(), SR);
        while !sr.bit_is_set(SR_TXE) {}
        bus.reg(self.usart.base(), DR).write(byte as u32);
    }

    /// Writes `msg` up to its first NUL byte, or all of it if there is none
    pub fn write_msg<B: Bus>(&self, bus: &B, msg: &[u8]) {
        for &byte in msg.iter().take_while(|&&b| b != 0) {
            self.write_char(bus, byte);
        }
    }

    pub fn write_str<B: Bus>(&self, bus: &B, s: &str) {
        self.write_msg(bus, s.as_bytes())
    }

    /// Non-blocking read of the data register, for use without receive interrupts
    pub fn read<B: Bus>(&self, bus: &B) -> nb::Result<u8, Error> {
        self.usart.read(bus)
    }

    pub fn listen<B: Bus>(&self, bus: &B, event: Event) {
        self.usart.listen(bus, event)
    }

    pub fn unlisten<B: Bus>(&self, bus: &B, event: Event) {
        self.usart.unlisten(bus, event)
    }

    pub fn rx_mailbox<'s>(&self, shared: &'s Shared) -> &'s Mailbox<u8> {
        shared.usart_rx(self.usart)
    }

    /// Last byte the interrupt handler stored, 0 before the first reception
    pub fn rx_data(&self, shared: &Shared) -> u8 {
        self.rx_mailbox(shared).last().unwrap_or(0)
    }

    /// Takes the stored byte if it was not taken yet
    pub fn try_receive(&self, shared: &Shared) -> Option<u8> {
        self.rx_mailbox(shared).try_receive()
    }

    /// Ties the handle to a bus, giving a serial port that implements
    /// `core::fmt::Write` and the `embedded-hal-nb` and `embedded-io` traits
    pub fn bind<B: Bus>(self, bus: &B) -> Serial<'_, B> {
        Serial { usart: self.usart, bus }
    }
}

/// Configured USART bound to its register bus
pub struct Serial<'a, B> {
    usart: Usart,
    bus: &'a B,
}

impl<B: Bus> Serial<'_, B> {
    pub fn usart(&self) -> Usart {
        self.usart
    }

    pub fn read(&mut self) -> nb::Result<u8, Error> {
        self.usart.read(self.bus)
    }

    pub fn write_u8(&mut self, byte: u8) -> nb::Result<(), Error> {
        self.usart.write(self.bus, byte)
    }

    pub fn flush(&mut self) -> nb::Result<(), Error> {
        self.usart.flush(self.bus)
    }

    pub fn bwrite_all(&mut self, buffer: &[u8]) -> Result<(), Error> {
        for &b in buffer {
            nb::block!(self.write_u8(b))?;
        }
        Ok(())
    }

    pub fn bflush(&mut self) -> Result<(), Error> {
        nb::block!(self.flush())
    }
}

impl<B: Bus> fmt::Write for Serial<'_, B> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.bwrite_all(s.as_bytes()).map_err(|_| fmt::Error)
    }
}
