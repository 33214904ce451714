//! Register bus
//!
//! Every driver performs its register programming through a [`Bus`]. On the
//! target that is [`Mmio`], plain volatile accesses to the memory-mapped
//! peripherals. On the host the [`sim`](crate::sim) register model implements
//! the same trait, so the exact write sequence of each driver can be observed.

use vcell::VolatileCell;

/// 32-bit register access
pub trait Bus {
    /// Reads the register at `addr`
    fn read(&self, addr: u32) -> u32;

    /// Writes `value` to the register at `addr`
    fn write(&self, addr: u32, value: u32);

    /// Proxy for the register `offset` bytes above `base`
    #[inline(always)]
    fn reg(&self, base: u32, offset: u32) -> Reg<'_, Self>
    where
        Self: Sized,
    {
        Reg {
            bus: self,
            addr: base + offset,
        }
    }
}

impl<B: Bus + ?Sized> Bus for &B {
    #[inline(always)]
    fn read(&self, addr: u32) -> u32 {
        (**self).read(addr)
    }

    #[inline(always)]
    fn write(&self, addr: u32, value: u32) {
        (**self).write(addr, value)
    }
}

/// Memory-mapped peripheral bus of the running MCU
///
/// Owning an `Mmio` stands for owning the device peripherals.
#[derive(Debug)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// Takes the register bus, consuming the device peripherals singleton
    pub fn new(_dp: crate::pac::Peripherals) -> Self {
        Self { _private: () }
    }

    /// Creates the register bus without ownership of the device peripherals
    ///
    /// # Safety
    ///
    /// The caller must make sure no other code programs the same registers
    /// concurrently.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl Bus for Mmio {
    #[inline(always)]
    fn read(&self, addr: u32) -> u32 {
        unsafe { (*(addr as usize as *const VolatileCell<u32>)).get() }
    }

    #[inline(always)]
    fn write(&self, addr: u32, value: u32) {
        unsafe { (*(addr as usize as *const VolatileCell<u32>)).set(value) }
    }
}

/// Single register behind a [`Bus`]
pub struct Reg<'a, B> {
    bus: &'a B,
    addr: u32,
}

impl<'a, B: Bus> Reg<'a, B> {
    #[inline(always)]
    pub fn addr(&self) -> u32 {
        self.addr
    }

    #[inline(always)]
    pub fn read(&self) -> u32 {
        self.bus.read(self.addr)
    }

    #[inline(always)]
    pub fn write(&self, value: u32) {
        self.bus.write(self.addr, value)
    }

    /// Read-modify-write
    #[inline(always)]
    pub fn modify(&self, f: impl FnOnce(u32) -> u32) {
        let r = self.read();
        self.write(f(r));
    }

    #[inline(always)]
    pub fn set_bits(&self, mask: u32) {
        self.modify(|r| r | mask)
    }

    #[inline(always)]
    pub fn clear_bits(&self, mask: u32) {
        self.modify(|r| r & !mask)
    }

    #[inline(always)]
    pub fn set_bit(&self, bit: u8) {
        self.set_bits(1 << bit)
    }

    #[inline(always)]
    pub fn clear_bit(&self, bit: u8) {
        self.clear_bits(1 << bit)
    }

    #[inline(always)]
    pub fn write_bit(&self, bit: u8, value: bool) {
        if value {
            self.set_bit(bit)
        } else {
            self.clear_bit(bit)
        }
    }

    #[inline(always)]
    pub fn bit_is_set(&self, bit: u8) -> bool {
        (self.read() >> bit) & 1 != 0
    }

    /// Clears the `width`-bit field at `offset`, then ORs in `value`
    #[inline(always)]
    pub fn write_field(&self, offset: u8, width: u8, value: u32) {
        let mask = field_mask(width) << offset;
        self.modify(|r| (r & !mask) | ((value << offset) & mask))
    }

    #[inline(always)]
    pub fn read_field(&self, offset: u8, width: u8) -> u32 {
        (self.read() >> offset) & field_mask(width)
    }
}

#[inline(always)]
const fn field_mask(width: u8) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}
