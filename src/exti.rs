//! # External interrupts
//!
//! Routes the edges of a GPIO input to one of the 16 EXTI lines. The line
//! number is the pin number: PA3, PB3 and PC3 all share line 3, and SYSCFG
//! selects which port actually drives it.
//!
//! Lines 0 to 4 own a vector each, lines 5 to 9 share `EXTI9_5` and lines
//! 10 to 15 share `EXTI15_10`. The routing of every line is kept in the
//! [`LINES`] table.
//!
//! Routing a line that is already enabled for another port is refused with
//! [`Error::LineInUse`]; [`release`] frees a line again.

use crate::bus::Bus;
use crate::gpio::{Mode, PinConfig, PinHandle, Port};
use crate::nvic::{Interrupt, InterruptController};
use crate::rcc::Enable;
use crate::regs::exti::{base, FTSR, IMR, PR, RTSR, SWIER};
use crate::regs::syscfg;

/// System configuration controller clock gate
///
/// SYSCFG holds the port selectors of the external interrupt lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Syscfg;

/// Number of GPIO backed EXTI lines
pub const LINE_COUNT: u8 = 16;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Edge {
    Rising,
    Falling,
    RisingFalling,
}

impl Edge {
    const fn rising(self) -> bool {
        matches!(self, Edge::Rising | Edge::RisingFalling)
    }

    const fn falling(self) -> bool {
        matches!(self, Edge::Falling | Edge::RisingFalling)
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Error {
    /// The line is enabled and routed to `port`
    LineInUse { line: u8, port: Port },
    /// No GPIO backs this line
    InvalidLine(u8),
}

/// Where a line is selected and which vector it raises
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineRoute {
    /// Index of the SYSCFG_EXTICRx register, 0 for EXTICR1
    pub exticr: u8,
    /// Position of the 4-bit port selector inside that register
    pub shift: u8,
    pub irq: Interrupt,
}

impl LineRoute {
    const fn exticr_offset(&self) -> u32 {
        syscfg::EXTICR1 + 4 * self.exticr as u32
    }
}

macro_rules! lines {
    ($($line:literal => $irq:ident,)+) => {
        [$(
            LineRoute {
                exticr: $line / 4,
                shift: 4 * ($line % 4),
                irq: Interrupt::$irq,
            },
        )+]
    };
}

/// Routing of the lines, indexed by line number
pub const LINES: [LineRoute; LINE_COUNT as usize] = lines![
    0 => EXTI0,
    1 => EXTI1,
    2 => EXTI2,
    3 => EXTI3,
    4 => EXTI4,
    5 => EXTI9_5,
    6 => EXTI9_5,
    7 => EXTI9_5,
    8 => EXTI9_5,
    9 => EXTI9_5,
    10 => EXTI15_10,
    11 => EXTI15_10,
    12 => EXTI15_10,
    13 => EXTI15_10,
    14 => EXTI15_10,
    15 => EXTI15_10,
];

fn route_of(line: u8) -> Result<&'static LineRoute, Error> {
    LINES.get(line as usize).ok_or(Error::InvalidLine(line))
}

/// Mask of the lines serviced by the vector `irq`, 0 for non EXTI vectors
pub fn lines_of(irq: Interrupt) -> u16 {
    LINES
        .iter()
        .enumerate()
        .filter(|(_, route)| route.irq == irq)
        .fold(0, |mask, (line, _)| mask | 1 << line)
}

/// Port currently selected for `line`, `None` past the GPIO lines
pub fn routed_port<B: Bus>(bus: &B, line: u8) -> Option<Port> {
    let route = route_of(line).ok()?;
    let code = bus
        .reg(syscfg::base(), route.exticr_offset())
        .read_field(route.shift, 4);
    Port::from_exti_code(code as u8)
}

/// `false` past the GPIO lines
pub fn is_enabled<B: Bus>(bus: &B, line: u8) -> bool {
    line < LINE_COUNT && bus.reg(base(), IMR).bit_is_set(line)
}

/// `false` past the GPIO lines
pub fn is_pending<B: Bus>(bus: &B, line: u8) -> bool {
    line < LINE_COUNT && bus.reg(base(), PR).bit_is_set(line)
}

/// Clears the pending bit of `line` only
pub fn clear_pending<B: Bus>(bus: &B, line: u8) -> Result<(), Error> {
    route_of(line)?;
    // rc_w1
    bus.reg(base(), PR).write(1 << line);
    Ok(())
}

/// Raises `line` from software
pub fn trigger<B: Bus>(bus: &B, line: u8) -> Result<(), Error> {
    route_of(line)?;
    bus.reg(base(), SWIER).write(1 << line);
    Ok(())
}

/// Disables `line` and clears its edge selection
///
/// The vector is masked once no other line sharing it is enabled.
pub fn release<B: Bus, N: InterruptController>(
    bus: &B,
    nvic: &mut N,
    line: u8,
) -> Result<(), Error> {
    let route = route_of(line)?;
    critical_section::with(|_| {
        bus.reg(base(), IMR).clear_bit(line);
        bus.reg(base(), RTSR).clear_bit(line);
        bus.reg(base(), FTSR).clear_bit(line);
        bus.reg(base(), PR).write(1 << line);
        let still_used = bus.reg(base(), IMR).read() as u16 & lines_of(route.irq);
        if still_used == 0 {
            nvic.mask(route.irq);
        }
    });
    debug!("EXTI{} released", line);
    Ok(())
}

/// Interrupt service routine body for the vector `irq`
///
/// Clears the pending bit of every enabled line behind the vector that has
/// fired and returns the mask of those lines.
pub fn on_interrupt<B: Bus>(bus: &B, irq: Interrupt) -> u16 {
    let pending = bus.reg(base(), PR).read() as u16
        & bus.reg(base(), IMR).read() as u16
        & lines_of(irq);
    if pending != 0 {
        bus.reg(base(), PR).write(pending as u32);
    }
    pending
}

/// External interrupt on one GPIO pin
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtiConfig {
    /// Pin driving the line, forced to digital input when configured
    pub pin: PinHandle,
    pub edge: Edge,
    /// NVIC priority of the line's vector
    pub priority: u8,
}

impl ExtiConfig {
    pub const fn new(pin: PinHandle, edge: Edge) -> Self {
        Self {
            pin,
            edge,
            priority: 0,
        }
    }

    /// Floating input on `port`/`pin`
    pub const fn on(port: Port, pin: u8, edge: Edge) -> Self {
        Self::new(PinHandle::new(port, pin, PinConfig::input()), edge)
    }

    pub const fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub const fn line(&self) -> u8 {
        self.pin.pin
    }

    /// Routing of the pin's line, `None` for pins past 15
    pub fn route(&self) -> Option<&'static LineRoute> {
        route_of(self.line()).ok()
    }

    /// Input configuration actually applied to the pin
    fn input_pin(&self) -> PinHandle {
        let mut pin = self.pin;
        pin.config.mode = Mode::Input;
        pin.config.af = 0;
        pin
    }

    /// Configures the pin as input, routes it to its line and enables the
    /// line's interrupt
    ///
    /// Configuring the same port and pin again is allowed.
    ///
    /// # Panics
    ///
    /// Panics if the pin handle is invalid.
    pub fn configure<B: Bus, N: InterruptController>(
        &self,
        bus: &B,
        nvic: &mut N,
    ) -> Result<(), Error> {
        let pin = self.input_pin();
        if let Err(e) = pin.validate() {
            error!("invalid external interrupt pin: {}", e);
            panic!("invalid external interrupt pin: {:?}", e);
        }

        let line = self.line();
        let port = pin.port;
        if is_enabled(bus, line) {
            if let Some(current) = routed_port(bus, line).filter(|p| *p != port) {
                warn!("EXTI{} already routed to P{}", line, current);
                return Err(Error::LineInUse {
                    line,
                    port: current,
                });
            }
        }

        pin.configure(bus);
        Syscfg.enable(bus);

        let route = route_of(line)?;
        bus.reg(syscfg::base(), route.exticr_offset())
            .write_field(route.shift, 4, port.exti_code() as u32);

        bus.reg(base(), RTSR).write_bit(line, self.edge.rising());
        bus.reg(base(), FTSR).write_bit(line, self.edge.falling());

        critical_section::with(|_| {
            bus.reg(base(), IMR).set_bit(line);
            nvic.set_priority(route.irq, self.priority);
            nvic.unmask(route.irq);
        });

        debug!("EXTI{} routed to P{}{} on {}", line, port, line, self.edge);
        Ok(())
    }
}
