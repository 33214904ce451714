use embedded_hal::i2c::Operation;
use nb::Error::{Other, WouldBlock};
use nb::Result as NbResult;

use super::*;
use crate::regs::i2c::{
    CR1_ACK, CR1_POS, SR1, SR1_ADDR, SR1_AF, SR1_ARLO, SR1_BERR, SR1_BTF, SR1_OVR, SR1_RXNE,
    SR1_SB, SR1_TXE, SR2,
};

/// Poll budgets of the blocking waits
///
/// Each budget is the number of status register reads after which a wait
/// gives up with [`Error::Timeout`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub start: u32,
    pub addr: u32,
    pub data: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            start: 10_000,
            addr: 10_000,
            data: 10_000,
        }
    }
}

/// embedded-hal compatible blocking I2C implementation
pub struct BlockingI2c<'a, B> {
    handle: I2cHandle,
    bus: &'a B,
    start_retries: u8,
    timeouts: Timeouts,
}

macro_rules! wait_for_flag {
    ($bus:expr, $base:expr, $flag:expr) => {{
        let sr1 = $bus.reg($base, SR1);
        let status = sr1.read();

        // error flags are rc_w0
        if status & (1 << SR1_BERR) != 0 {
            sr1.write(!(1 << SR1_BERR));
            Err(Other(Error::Bus))
        } else if status & (1 << SR1_ARLO) != 0 {
            sr1.write(!(1 << SR1_ARLO));
            Err(Other(Error::ArbitrationLoss))
        } else if status & (1 << SR1_AF) != 0 {
            sr1.write(!(1 << SR1_AF));
            Err(Other(Error::NoAcknowledge(NoAcknowledgeSource::Unknown)))
        } else if status & (1 << SR1_OVR) != 0 {
            sr1.write(!(1 << SR1_OVR));
            Err(Other(Error::Overrun))
        } else if status & (1 << $flag) != 0 {
            Ok(())
        } else {
            Err(WouldBlock)
        }
    }};
}

macro_rules! busy_wait {
    ($nb_expr:expr, $exit_cond:expr) => {{
        loop {
            let res = $nb_expr;
            if !matches!(res, Err(WouldBlock)) {
                break res;
            }
            if $exit_cond {
                break res;
            }
        }
    }};
}

macro_rules! busy_wait_polls {
    ($nb_expr:expr, $polls:expr) => {{
        let mut polls_left: u32 = $polls;
        let res: NbResult<(), Error> = busy_wait!($nb_expr, {
            if polls_left == 0 {
                true
            } else {
                polls_left -= 1;
                false
            }
        });
        res.map_err(|e| match e {
            WouldBlock => Error::Timeout,
            Other(e) => e,
        })
    }};
}

/// Writes bytes into consecutive read operations of a transaction
struct ReadCursor<'o, 'b> {
    ops: &'o mut [Operation<'b>],
    op: usize,
    pos: usize,
}

impl ReadCursor<'_, '_> {
    fn store(&mut self, byte: u8) {
        while let Some(Operation::Read(buf)) = self.ops.get_mut(self.op) {
            if let Some(slot) = buf.get_mut(self.pos) {
                *slot = byte;
                self.pos += 1;
                return;
            }
            self.op += 1;
            self.pos = 0;
        }
    }
}

fn op_len(op: &Operation<'_>) -> usize {
    match op {
        Operation::Read(buf) => buf.len(),
        Operation::Write(bytes) => bytes.len(),
    }
}

impl<'a, B: Bus> BlockingI2c<'a, B> {
    pub fn new(handle: I2cHandle, bus: &'a B, start_retries: u8, timeouts: Timeouts) -> Self {
        Self {
            handle,
            bus,
            start_retries: start_retries.max(1),
            timeouts,
        }
    }

    pub fn handle(&self) -> &I2cHandle {
        &self.handle
    }

    /// Releases the handle
    pub fn release(self) -> I2cHandle {
        self.handle
    }

    fn base(&self) -> u32 {
        self.handle.i2c.base()
    }

    fn cr1_write_bit(&self, bit: u8, value: bool) {
        self.bus.reg(self.base(), CR1).write_bit(bit, value);
    }

    /// Clears ADDR by reading SR1 then SR2
    fn clear_addr(&self) {
        self.bus.reg(self.base(), SR1).read();
        self.bus.reg(self.base(), SR2).read();
    }

    fn read_dr(&self) -> u8 {
        self.bus.reg(self.base(), DR).read() as u8
    }

    fn wait_for(&self, flag: u8, polls: u32) -> Result<(), Error> {
        busy_wait_polls!(wait_for_flag!(self.bus, self.base(), flag), polls)
    }

    /// Check if STOP condition is generated. If the condition is not generated, this
    /// method returns `WouldBlock` so the program can act accordingly
    /// (busy wait, async, ...)
    fn wait_for_stop(&mut self) -> NbResult<(), Error> {
        if self.bus.reg(self.base(), CR1).bit_is_set(CR1_STOP) {
            Err(WouldBlock)
        } else {
            Ok(())
        }
    }

    fn send_start_and_wait(&mut self) -> Result<(), Error> {
        // According to http://www.st.com/content/ccc/resource/technical/document/errata_sheet/f5/50/c9/46/56/db/4a/f6/CD00197763.pdf/files/CD00197763.pdf/jcr:content/translations/en.CD00197763.pdf
        // 2.14.4 Wrong behavior of I2C peripheral in master mode after a misplaced STOP
        let mut retries_left = self.start_retries;
        let mut last_ret = Err(Error::Timeout);
        while retries_left > 0 {
            self.handle.i2c.send_start(self.bus);
            last_ret = self.wait_for(SR1_SB, self.timeouts.start);
            if last_ret.is_err() {
                warn!("no START condition, resetting {}", self.handle.i2c);
                self.handle.init(self.bus);
            } else {
                break;
            }
            retries_left -= 1;
        }
        last_ret
    }

    fn send_addr_and_wait(&mut self, addr: u8, read: bool) -> Result<(), Error> {
        self.bus.reg(self.base(), SR1).read();
        self.handle.i2c.send_addr(self.bus, addr, read);
        let ret = self.wait_for(SR1_ADDR, self.timeouts.addr);
        if let Err(Error::NoAcknowledge(_)) = ret {
            self.handle.i2c.send_stop(self.bus);
        }
        ret.map_err(Error::nack_addr)
    }

    fn write_bytes_and_wait(&mut self, bytes: impl Iterator<Item = u8>) -> Result<(), Error> {
        self.clear_addr();

        let mut sent = false;
        for byte in bytes {
            self.wait_for(SR1_TXE, self.timeouts.data)?;
            self.bus.reg(self.base(), DR).write(byte as u32);
            sent = true;
        }
        // BTF never rises for an address-only transfer
        if sent {
            self.wait_for(SR1_BTF, self.timeouts.data)?;
        }

        Ok(())
    }

    fn write_without_stop(
        &mut self,
        addr: u8,
        bytes: impl Iterator<Item = u8>,
    ) -> Result<(), Error> {
        self.send_start_and_wait()?;
        self.send_addr_and_wait(addr, false)?;

        let ret = self.write_bytes_and_wait(bytes);
        if let Err(Error::NoAcknowledge(_)) = ret {
            self.handle.i2c.send_stop(self.bus);
        }
        ret.map_err(Error::nack_data)
    }

    fn send_stop_and_wait(&mut self) -> Result<(), Error> {
        self.handle.i2c.send_stop(self.bus);
        busy_wait_polls!(self.wait_for_stop(), self.timeouts.data)
    }

    /// Ends the current transfer with a STOP, or with a repeated START if
    /// `restart` is set
    fn finish_transfer(&mut self, restart: bool) {
        if restart {
            self.handle.i2c.send_start(self.bus);
        } else {
            self.handle.i2c.send_stop(self.bus);
        }
    }

    /// Receives `len` bytes after the address was acknowledged
    ///
    /// Follows the one, two and N byte reception sequences of the reference
    /// manual, so the last byte is NACKed.
    fn read_bytes(&mut self, len: usize, restart: bool, mut store: impl FnMut(u8)) -> Result<(), Error> {
        match len {
            0 => {
                self.clear_addr();
                self.finish_transfer(restart);
            }
            1 => {
                self.cr1_write_bit(CR1_ACK, false);
                self.clear_addr();
                self.finish_transfer(restart);

                self.wait_for(SR1_RXNE, self.timeouts.data)?;
                store(self.read_dr());
            }
            2 => {
                self.cr1_write_bit(CR1_POS, true);
                self.cr1_write_bit(CR1_ACK, true);
                self.clear_addr();
                self.cr1_write_bit(CR1_ACK, false);

                self.wait_for(SR1_BTF, self.timeouts.data)?;
                self.finish_transfer(restart);
                store(self.read_dr());
                store(self.read_dr());

                self.cr1_write_bit(CR1_POS, false);
            }
            len => {
                self.cr1_write_bit(CR1_ACK, true);
                self.clear_addr();

                for _ in 0..len - 3 {
                    self.wait_for(SR1_RXNE, self.timeouts.data)?;
                    store(self.read_dr());
                }

                self.wait_for(SR1_BTF, self.timeouts.data)?;
                self.cr1_write_bit(CR1_ACK, false);
                store(self.read_dr());
                self.finish_transfer(restart);
                store(self.read_dr());
                self.wait_for(SR1_RXNE, self.timeouts.data)?;
                store(self.read_dr());
            }
        }

        if !restart {
            busy_wait_polls!(self.wait_for_stop(), self.timeouts.data)?;
        }
        self.cr1_write_bit(CR1_ACK, true);
        Ok(())
    }

    pub fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), Error> {
        self.write_without_stop(addr, bytes.iter().copied())?;
        self.send_stop_and_wait()
    }

    pub fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<(), Error> {
        self.send_start_and_wait()?;
        self.send_addr_and_wait(addr, true)?;

        let len = buffer.len();
        let mut slots = buffer.iter_mut();
        self.read_bytes(len, false, |byte| {
            if let Some(slot) = slots.next() {
                *slot = byte;
            }
        })
    }

    pub fn write_read(&mut self, addr: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Error> {
        if !bytes.is_empty() {
            self.write_without_stop(addr, bytes.iter().copied())?;
        }

        if !buffer.is_empty() {
            self.read(addr, buffer)?;
        } else if !bytes.is_empty() {
            self.send_stop_and_wait()?;
        }

        Ok(())
    }

    /// Runs `operations` as one transaction
    ///
    /// Adjacent operations of the same direction are merged into one transfer.
    /// Transfers are separated by a repeated START and the last one ends with
    /// a STOP.
    pub fn transaction(&mut self, addr: u8, operations: &mut [Operation<'_>]) -> Result<(), Error> {
        let mut start = 0;
        while start < operations.len() {
            let read = matches!(operations[start], Operation::Read(_));
            let end = operations[start..]
                .iter()
                .position(|op| matches!(op, Operation::Read(_)) != read)
                .map_or(operations.len(), |n| start + n);
            let last = end == operations.len();
            let run = &mut operations[start..end];

            if read {
                self.send_start_and_wait()?;
                self.send_addr_and_wait(addr, true)?;
                let len = run.iter().map(op_len).sum();
                let mut cursor = ReadCursor {
                    ops: run,
                    op: 0,
                    pos: 0,
                };
                self.read_bytes(len, !last, |byte| cursor.store(byte))?;
            } else {
                let bytes = run.iter().flat_map(|op| match op {
                    Operation::Write(bytes) => bytes.iter().copied(),
                    Operation::Read(_) => (&[] as &[u8]).iter().copied(),
                });
                self.write_without_stop(addr, bytes)?;
                if last {
                    self.send_stop_and_wait()?;
                }
            }

            start = end;
        }
        Ok(())
    }

    /// Writes `value` to register `reg` of the configured slave
    pub fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Error> {
        let addr = self.handle.config.slave_address;
        self.write(addr, &[reg, value])
    }

    /// Reads consecutive registers of the configured slave, starting at `reg`
    pub fn read_registers(&mut self, reg: u8, buffer: &mut [u8]) -> Result<(), Error> {
        let addr = self.handle.config.slave_address;
        self.write_read(addr, &[reg], buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::Sim;
    use crate::time::RateExtU32;

    const TARGET: u8 = 0x50;

    fn handle() -> I2cHandle {
        I2cHandle::new(I2c::I2c1, Config::new(Mode::standard(100.kHz()), TARGET))
    }

    fn setup() -> Sim {
        let sim = Sim::new();
        sim.attach_i2c_target(I2c::I2c1, TARGET);
        handle().configure(&sim);
        sim
    }

    #[test]
    fn write_sets_pointer_then_stores() {
        let sim = setup();
        let mut i2c = handle().blocking_default(&sim);

        i2c.write(TARGET, &[0x10, 1, 2, 3]).unwrap();
        assert_eq!(&sim.i2c_target_memory(I2c::I2c1, TARGET)[0x10..0x13], &[1, 2, 3]);
        assert!(!sim.i2c_bus_busy(I2c::I2c1));
    }

    #[test]
    fn reads_of_every_length_sequence() {
        let sim = setup();
        sim.load_i2c_target(I2c::I2c1, TARGET, 0x20, &[9, 8, 7, 6, 5]);
        let mut i2c = handle().blocking_default(&sim);

        for len in 1..=5 {
            let mut buf = [0; 5];
            i2c.write_read(TARGET, &[0x20], &mut buf[..len]).unwrap();
            assert_eq!(&buf[..len], &[9, 8, 7, 6, 5][..len], "len {}", len);
        }
        assert!(!sim.i2c_bus_busy(I2c::I2c1));
    }

    #[test]
    fn register_helpers_use_slave_address() {
        let sim = setup();
        let mut i2c = handle().blocking_default(&sim);

        i2c.write_register(0x6B, 0x80).unwrap();
        let mut value = [0];
        i2c.read_registers(0x6B, &mut value).unwrap();
        assert_eq!(value, [0x80]);
    }

    #[test]
    fn missing_target_nacks_the_address() {
        let sim = setup();
        let mut i2c = handle().blocking_default(&sim);

        assert_eq!(
            i2c.write(0x23, &[0]),
            Err(Error::NoAcknowledge(NoAcknowledgeSource::Address))
        );
        // the bus is usable afterwards
        i2c.write(TARGET, &[0, 42]).unwrap();
        assert_eq!(sim.i2c_target_memory(I2c::I2c1, TARGET)[0], 42);
    }

    #[test]
    fn stuck_start_times_out_after_retries() {
        let sim = setup();
        sim.stall_i2c(I2c::I2c1, true);
        let timeouts = Timeouts {
            start: 5,
            addr: 5,
            data: 5,
        };
        let mut i2c = handle().blocking(&sim, 3, timeouts);

        assert_eq!(i2c.write(TARGET, &[0]), Err(Error::Timeout));
        // every retry re-initializes the peripheral
        assert_eq!(sim.write_count(I2c::I2c1.base() + TRISE), 4);
    }

    #[test]
    fn transaction_merges_adjacent_operations() {
        let sim = setup();
        sim.load_i2c_target(I2c::I2c1, TARGET, 0x40, &[1, 2, 3, 4]);
        let mut i2c = handle().blocking_default(&sim);

        let mut first = [0; 1];
        let mut rest = [0; 3];
        i2c.transaction(
            TARGET,
            &mut [
                Operation::Write(&[]),
                Operation::Write(&[0x40]),
                Operation::Read(&mut first),
                Operation::Read(&mut rest),
            ],
        )
        .unwrap();
        assert_eq!(first, [1]);
        assert_eq!(rest, [2, 3, 4]);

        i2c.transaction(
            TARGET,
            &mut [
                Operation::Write(&[0x41]),
                Operation::Read(&mut first),
                Operation::Write(&[0x41, 0xAA]),
            ],
        )
        .unwrap();
        assert_eq!(first, [2]);
        assert_eq!(sim.i2c_target_memory(I2c::I2c1, TARGET)[0x41], 0xAA);
        assert!(!sim.i2c_bus_busy(I2c::I2c1));
    }
}
