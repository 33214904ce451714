//! Host side register model of the STM32F401
//!
//! [`Sim`] implements [`Bus`] on top of a plain register file and adds the
//! side effects the drivers rely on, so driver code runs unchanged in host
//! tests. Unknown addresses behave as plain memory.
//!
//! Modeled behavior:
//!
//! - GPIO: BSRR into ODR, IDR from ODR for outputs and from the external
//!   level or pull for every other mode.
//! - EXTI: edge detection through the SYSCFG routing, software trigger,
//!   write-1-to-clear PR.
//! - Timers: prescaled counting with [`Sim::run_timer`], update events, rc_w0
//!   status flags.
//! - USART: TX log, RX injection with overrun, optional loopback.
//! - ADC: single software-started conversions honoring resolution and
//!   alignment.
//! - I2C: master state machine against register addressed targets.
//! - NVIC: enable and priority state; [`Sim::run_pending`] services every
//!   enabled vector whose source is active.
//!
//! ```
//! use stm32f4xx_drivers::gpio::{PinConfig, PinHandle, Port};
//! use stm32f4xx_drivers::sim::Sim;
//!
//! let sim = Sim::new();
//! let led = PinHandle::new(Port::A, 5, PinConfig::output());
//! led.configure(&sim);
//! led.set_high(&sim);
//! assert!(led.is_high(&sim));
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use cortex_m::interrupt::InterruptNumber;

use crate::adc::Adc;
use crate::bus::Bus;
use crate::exti;
use crate::gpio::Port;
use crate::i2c::I2c;
use crate::irq::Service;
use crate::nvic::{Interrupt, InterruptController};
use crate::regs;
use crate::serial::Usart;
use crate::timer::Tim;

/// Vectors whose sources the model evaluates
const VECTORS: [Interrupt; 15] = [
    Interrupt::EXTI0,
    Interrupt::EXTI1,
    Interrupt::EXTI2,
    Interrupt::EXTI3,
    Interrupt::EXTI4,
    Interrupt::ADC,
    Interrupt::EXTI9_5,
    Interrupt::TIM2,
    Interrupt::TIM3,
    Interrupt::TIM4,
    Interrupt::USART1,
    Interrupt::USART2,
    Interrupt::EXTI15_10,
    Interrupt::TIM5,
    Interrupt::USART6,
];

/// Handler invocations after which [`Sim::run_pending`] gives up
const STORM_LIMIT: usize = 10_000;

const I2CS: [I2c; 3] = [I2c::I2c1, I2c::I2c2, I2c::I2c3];

#[derive(Default)]
struct NvicState {
    enabled: BTreeMap<u16, bool>,
    priority: BTreeMap<u16, u8>,
    pending: BTreeMap<u16, bool>,
}

impl NvicState {
    fn is_enabled(&self, irq: Interrupt) -> bool {
        self.enabled.get(&irq.number()).copied().unwrap_or(false)
    }
}

/// [`InterruptController`] view of a [`Sim`]
///
/// Every controller obtained from the same simulator shares its state.
#[derive(Clone)]
pub struct SimNvic {
    state: Rc<RefCell<NvicState>>,
}

impl InterruptController for SimNvic {
    fn unmask(&mut self, irq: Interrupt) {
        self.state.borrow_mut().enabled.insert(irq.number(), true);
    }

    fn mask(&mut self, irq: Interrupt) {
        self.state.borrow_mut().enabled.insert(irq.number(), false);
    }

    fn set_priority(&mut self, irq: Interrupt, priority: u8) {
        self.state
            .borrow_mut()
            .priority
            .insert(irq.number(), priority);
    }

    fn is_enabled(&self, irq: Interrupt) -> bool {
        self.state.borrow().is_enabled(irq)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Idle,
    Transmit,
    Receive,
}

struct Target {
    memory: [u8; 256],
    pointer: u8,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            memory: [0; 256],
            pointer: 0,
        }
    }
}

struct I2cBus {
    stalled: bool,
    targets: BTreeMap<u8, Target>,
    active: Option<u8>,
    direction: Direction,
    pointer_pending: bool,
}

impl Default for I2cBus {
    fn default() -> Self {
        Self {
            stalled: false,
            targets: BTreeMap::new(),
            active: None,
            direction: Direction::Idle,
            pointer_pending: false,
        }
    }
}

#[derive(Default)]
struct UsartLine {
    tx: Vec<u8>,
    loopback: bool,
}

/// Everything behind the bus
#[derive(Default)]
struct Registers {
    words: BTreeMap<u32, u32>,
    writes: BTreeMap<u32, u32>,
    trace: Option<Vec<(u32, u32)>>,
    inputs: BTreeMap<(u32, u8), bool>,
    analog: BTreeMap<u8, u16>,
    usart: [UsartLine; 3],
    prescaler_count: [u64; 4],
    i2c: [I2cBus; 3],
}

/// Simulated STM32F401 register space
pub struct Sim {
    regs: RefCell<Registers>,
    nvic: Rc<RefCell<NvicState>>,
}

impl Default for Sim {
    fn default() -> Self {
        Self::new()
    }
}

fn bit(value: u32, n: u8) -> bool {
    (value >> n) & 1 != 0
}

fn port_of(addr: u32) -> Option<(Port, u32)> {
    Port::ALL
        .into_iter()
        .find(|port| (port.base()..port.base() + 0x400).contains(&addr))
        .map(|port| (port, addr - port.base()))
}

fn timer_of(addr: u32) -> Option<(usize, Tim, u32)> {
    Tim::ALL
        .into_iter()
        .enumerate()
        .find(|(_, tim)| (tim.base()..tim.base() + 0x400).contains(&addr))
        .map(|(n, tim)| (n, tim, addr - tim.base()))
}

fn usart_of(addr: u32) -> Option<(usize, u32)> {
    Usart::ALL
        .into_iter()
        .find(|usart| (usart.base()..usart.base() + 0x400).contains(&addr))
        .map(|usart| (usart.index(), addr - usart.base()))
}

fn i2c_of(addr: u32) -> Option<(usize, u32)> {
    I2CS.into_iter()
        .enumerate()
        .find(|(_, i2c)| (i2c.base()..i2c.base() + 0x400).contains(&addr))
        .map(|(n, i2c)| (n, addr - i2c.base()))
}

fn i2c_index(i2c: I2c) -> usize {
    match i2c {
        I2c::I2c1 => 0,
        I2c::I2c2 => 1,
        I2c::I2c3 => 2,
    }
}

impl Registers {
    fn get(&self, addr: u32) -> u32 {
        self.words.get(&addr).copied().unwrap_or_else(|| reset_value(addr))
    }

    fn set(&mut self, addr: u32, value: u32) {
        self.words.insert(addr, value);
    }

    fn update(&mut self, addr: u32, f: impl FnOnce(u32) -> u32) {
        let value = f(self.get(addr));
        self.set(addr, value);
    }

    fn load(&mut self, addr: u32) -> u32 {
        if let Some((port, offset)) = port_of(addr) {
            if offset == regs::gpio::IDR {
                return self.idr(port);
            }
        } else if let Some((_, offset)) = usart_of(addr) {
            if offset == regs::usart::DR {
                return self.usart_read_dr(addr);
            }
        } else if addr == Adc::Adc1.base() + regs::adc::DR {
            self.update(Adc::Adc1.base() + regs::adc::SR, |sr| {
                sr & !(1 << regs::adc::SR_EOC)
            });
        } else if let Some((n, offset)) = i2c_of(addr) {
            return self.i2c_load(n, addr - offset, offset);
        }
        self.get(addr)
    }

    fn store(&mut self, addr: u32, value: u32) {
        if let Some((port, offset)) = port_of(addr) {
            let before = self.idr(port);
            self.gpio_store(port, offset, value);
            let after = self.idr(port);
            self.detect_edges(port, before, after);
        } else if (regs::exti::base()..regs::exti::base() + 0x400).contains(&addr) {
            self.exti_store(addr - regs::exti::base(), value);
        } else if let Some((n, tim, offset)) = timer_of(addr) {
            self.timer_store(n, tim, offset, value);
        } else if let Some((n, offset)) = usart_of(addr) {
            self.usart_store(n, addr - offset, offset, value);
        } else if (Adc::Adc1.base()..Adc::Adc1.base() + 0x100).contains(&addr) {
            self.adc_store(addr - Adc::Adc1.base(), value);
        } else if let Some((n, offset)) = i2c_of(addr) {
            self.i2c_store(n, addr - offset, offset, value);
        } else {
            self.set(addr, value);
        }
    }

    // GPIO

    fn idr(&self, port: Port) -> u32 {
        use crate::regs::gpio::{MODER, ODR, PUPDR};

        let base = port.base();
        let moder = self.get(base + MODER);
        let pupdr = self.get(base + PUPDR);
        let odr = self.get(base + ODR);
        (0..16u8).fold(0, |idr, pin| {
            let level = if (moder >> (2 * pin)) & 0b11 == 0b01 {
                bit(odr, pin)
            } else {
                self.inputs
                    .get(&(base, pin))
                    .copied()
                    .unwrap_or((pupdr >> (2 * pin)) & 0b11 == 0b01)
            };
            idr | (level as u32) << pin
        })
    }

    fn gpio_store(&mut self, port: Port, offset: u32, value: u32) {
        use crate::regs::gpio::{BSRR, IDR, ODR};

        let base = port.base();
        match offset {
            BSRR => {
                let set = value & 0xFFFF;
                let reset = value >> 16;
                self.update(base + ODR, |odr| (odr & !reset) | set);
            }
            IDR => {}
            _ => self.set(base + offset, value & if offset == ODR { 0xFFFF } else { !0 }),
        }
    }

    // EXTI

    fn detect_edges(&mut self, port: Port, before: u32, after: u32) {
        use crate::regs::exti::{base, FTSR, IMR, PR, RTSR};

        let changed = before ^ after;
        for line in 0..exti::LINE_COUNT {
            if !bit(changed, line) {
                continue;
            }
            let exticr = self.get(regs::syscfg::base() + regs::syscfg::EXTICR1 + 4 * (line as u32 / 4));
            let code = (exticr >> (4 * (line % 4))) & 0xF;
            if code != port.exti_code() as u32 {
                continue;
            }
            let rising = bit(after, line);
            let selected = if rising {
                bit(self.get(base() + RTSR), line)
            } else {
                bit(self.get(base() + FTSR), line)
            };
            if selected && bit(self.get(base() + IMR), line) {
                self.update(base() + PR, |pr| pr | 1 << line);
            }
        }
    }

    fn exti_store(&mut self, offset: u32, value: u32) {
        use crate::regs::exti::{base, IMR, PR, SWIER};

        match offset {
            PR => self.update(base() + PR, |pr| pr & !value),
            SWIER => {
                let imr = self.get(base() + IMR);
                self.update(base() + PR, |pr| pr | (value & imr));
            }
            _ => self.set(base() + offset, value),
        }
    }

    // Timers

    fn timer_store(&mut self, n: usize, tim: Tim, offset: u32, value: u32) {
        use crate::regs::tim::{ARR, CNT, CR1, CR1_DIR, CR1_URS, EGR, EGR_UG, SR, SR_UIF};

        let base = tim.base();
        match offset {
            SR => self.update(base + SR, |sr| sr & value),
            EGR => {
                if bit(value, EGR_UG) {
                    let cr1 = self.get(base + CR1);
                    let start = if bit(cr1, CR1_DIR) { self.get(base + ARR) } else { 0 };
                    self.set(base + CNT, start);
                    self.prescaler_count[n] = 0;
                    if !bit(cr1, CR1_URS) {
                        self.update(base + SR, |sr| sr | 1 << SR_UIF);
                    }
                }
            }
            _ => self.set(base + offset, value),
        }
    }

    /// Advances `tim` by up to `cycles` timer clock cycles, stopping right
    /// after the first overflow
    ///
    /// Returns the cycles consumed and whether an update event happened.
    fn timer_advance(&mut self, n: usize, tim: Tim, cycles: u64) -> (u64, bool) {
        use crate::regs::tim::{ARR, CNT, CR1, CR1_CEN, CR1_DIR, PSC, SR, SR_UIF};

        let base = tim.base();
        let cr1 = self.get(base + CR1);
        if !bit(cr1, CR1_CEN) {
            return (cycles, false);
        }
        let psc = self.get(base + PSC) as u64 + 1;
        let arr = self.get(base + ARR) as u64;
        self.prescaler_count[n] = self.prescaler_count[n].min(psc - 1);
        let cnt = self.get(base + CNT) as u64;
        let down = bit(cr1, CR1_DIR);

        let ticks_to_update = if down { cnt + 1 } else { arr.saturating_sub(cnt) + 1 };
        let to_update = (psc - self.prescaler_count[n]) + (ticks_to_update - 1) * psc;

        if cycles >= to_update {
            self.prescaler_count[n] = 0;
            self.set(base + CNT, if down { arr as u32 } else { 0 });
            self.update(base + SR, |sr| sr | 1 << SR_UIF);
            (to_update, true)
        } else {
            let total = self.prescaler_count[n] + cycles;
            let ticks = total / psc;
            self.prescaler_count[n] = total % psc;
            let cnt = if down { cnt - ticks } else { cnt + ticks };
            self.set(base + CNT, cnt as u32);
            (cycles, false)
        }
    }

    // USART

    fn usart_store(&mut self, n: usize, base: u32, offset: u32, value: u32) {
        use crate::regs::usart::{CR1, CR1_TE, CR1_UE, DR, SR, SR_RXNE, SR_TC, SR_TXE};

        match offset {
            SR => {
                let clearable = (1 << SR_RXNE) | (1 << SR_TC);
                self.update(base + SR, |sr| sr & (value | !clearable));
            }
            DR => {
                let cr1 = self.get(base + CR1);
                if bit(cr1, CR1_UE) && bit(cr1, CR1_TE) {
                    let byte = value as u8;
                    self.usart[n].tx.push(byte);
                    self.update(base + SR, |sr| sr | 1 << SR_TXE | 1 << SR_TC);
                    if self.usart[n].loopback {
                        self.usart_receive(base, byte);
                    }
                }
            }
            _ => self.set(base + offset, value),
        }
    }

    fn usart_read_dr(&mut self, addr: u32) -> u32 {
        use crate::regs::usart::{SR, SR_FE, SR_NF, SR_ORE, SR_PE, SR_RXNE};

        let base = addr - regs::usart::DR;
        let errors = (1 << SR_RXNE) | (1 << SR_ORE) | (1 << SR_FE) | (1 << SR_NF) | (1 << SR_PE);
        self.update(base + SR, |sr| sr & !errors);
        self.get(addr)
    }

    fn usart_receive(&mut self, base: u32, byte: u8) {
        use crate::regs::usart::{CR1, CR1_RE, CR1_UE, DR, SR, SR_ORE, SR_RXNE};

        let cr1 = self.get(base + CR1);
        if !(bit(cr1, CR1_UE) && bit(cr1, CR1_RE)) {
            return;
        }
        if bit(self.get(base + SR), SR_RXNE) {
            self.update(base + SR, |sr| sr | 1 << SR_ORE);
        } else {
            self.set(base + DR, byte as u32);
            self.update(base + SR, |sr| sr | 1 << SR_RXNE);
        }
    }

    // ADC

    fn adc_store(&mut self, offset: u32, value: u32) {
        use crate::regs::adc::{CR2, CR2_ADON, CR2_SWSTART, SR};

        let base = Adc::Adc1.base();
        match offset {
            SR => self.update(base + SR, |sr| sr & value),
            CR2 => {
                self.set(base + CR2, value & !(1 << CR2_SWSTART));
                if bit(value, CR2_SWSTART) && bit(value, CR2_ADON) {
                    self.adc_convert();
                }
            }
            _ => self.set(base + offset, value),
        }
    }

    fn adc_convert(&mut self) {
        use crate::regs::adc::{CR1, CR1_RES, CR2, CR2_ALIGN, DR, SQR3, SR, SR_EOC, SR_OVR};

        let base = Adc::Adc1.base();
        let channel = (self.get(base + SQR3) & 0x1F) as u8;
        let raw = self.analog.get(&channel).copied().unwrap_or(0) as u32 & 0xFFF;
        let res = (self.get(base + CR1) >> CR1_RES) & 0b11;
        let bits = 12 - 2 * res;
        let mut value = raw >> (2 * res);
        if bit(self.get(base + CR2), CR2_ALIGN) {
            value <<= if bits == 6 { 2 } else { 16 - bits };
        }

        self.set(base + DR, value);
        self.update(base + SR, |sr| {
            if bit(sr, SR_EOC) {
                sr | 1 << SR_OVR
            } else {
                sr | 1 << SR_EOC
            }
        });
    }

    // I2C

    fn i2c_store(&mut self, n: usize, base: u32, offset: u32, value: u32) {
        use crate::regs::i2c::{
            CR1, CR1_PE, CR1_START, CR1_STOP, CR1_SWRST, DR, SR1, SR1_ADDR, SR1_AF, SR1_BTF,
            SR1_RXNE, SR1_SB, SR1_TXE, SR2, SR2_BUSY, SR2_MSL, SR2_TRA,
        };

        match offset {
            CR1 => {
                let mut cr1 = value;
                if bit(cr1, CR1_SWRST) {
                    cr1 &= !((1 << CR1_START) | (1 << CR1_STOP));
                    self.set(base + SR1, 0);
                    self.set(base + SR2, 0);
                    let bus = &mut self.i2c[n];
                    bus.active = None;
                    bus.direction = Direction::Idle;
                } else if bit(cr1, CR1_PE) {
                    if bit(cr1, CR1_START) && !self.i2c[n].stalled {
                        cr1 &= !(1 << CR1_START);
                        self.update(base + SR1, |sr1| sr1 | 1 << SR1_SB);
                        self.update(base + SR2, |sr2| sr2 | 1 << SR2_MSL | 1 << SR2_BUSY);
                    }
                    if bit(cr1, CR1_STOP) {
                        cr1 &= !(1 << CR1_STOP);
                        self.update(base + SR2, |sr2| {
                            sr2 & !((1 << SR2_MSL) | (1 << SR2_BUSY) | (1 << SR2_TRA))
                        });
                        // received bytes stay readable after STOP
                        if self.i2c[n].direction != Direction::Receive {
                            self.update(base + SR1, |sr1| {
                                sr1 & !((1 << SR1_TXE) | (1 << SR1_BTF) | (1 << SR1_ADDR))
                            });
                            self.i2c[n].direction = Direction::Idle;
                            self.i2c[n].active = None;
                        }
                    }
                }
                self.set(base + CR1, cr1);
            }
            SR1 => self.update(base + SR1, |sr1| sr1 & value),
            SR2 => {}
            DR => {
                let byte = value as u8;
                let sr1 = self.get(base + SR1);
                if bit(sr1, SR1_SB) {
                    let addr = byte >> 1;
                    let read = byte & 1 != 0;
                    let mut sr1 = sr1 & !((1 << SR1_SB) | (1 << SR1_RXNE) | (1 << SR1_BTF) | (1 << SR1_TXE));
                    let bus = &mut self.i2c[n];
                    if bus.targets.contains_key(&addr) {
                        bus.active = Some(addr);
                        sr1 |= 1 << SR1_ADDR;
                        bus.direction = if read {
                            Direction::Receive
                        } else {
                            bus.pointer_pending = true;
                            Direction::Transmit
                        };
                        self.update(base + SR2, |sr2| {
                            if read {
                                sr2 & !(1 << SR2_TRA)
                            } else {
                                sr2 | 1 << SR2_TRA
                            }
                        });
                    } else {
                        bus.active = None;
                        bus.direction = Direction::Idle;
                        sr1 |= 1 << SR1_AF;
                    }
                    self.set(base + SR1, sr1);
                } else {
                    let bus = &mut self.i2c[n];
                    if bus.direction == Direction::Transmit {
                        let pointer_pending = bus.pointer_pending;
                        bus.pointer_pending = false;
                        if let Some(target) = bus.active.and_then(|a| bus.targets.get_mut(&a)) {
                            if pointer_pending {
                                target.pointer = byte;
                            } else {
                                target.memory[target.pointer as usize] = byte;
                                target.pointer = target.pointer.wrapping_add(1);
                            }
                        }
                        self.update(base + SR1, |sr1| sr1 | 1 << SR1_BTF | 1 << SR1_TXE);
                    }
                    self.set(base + DR, value & 0xFF);
                }
            }
            _ => self.set(base + offset, value),
        }
    }

    fn i2c_load(&mut self, n: usize, base: u32, offset: u32) -> u32 {
        use crate::regs::i2c::{DR, SR1, SR1_ADDR, SR1_BTF, SR1_RXNE, SR1_TXE, SR2};

        match offset {
            SR2 => {
                let sr2 = self.get(base + SR2);
                let sr1 = self.get(base + SR1);
                if bit(sr1, SR1_ADDR) {
                    let flags = match self.i2c[n].direction {
                        Direction::Transmit => 1 << SR1_TXE,
                        Direction::Receive => (1 << SR1_RXNE) | (1 << SR1_BTF),
                        Direction::Idle => 0,
                    };
                    self.set(base + SR1, (sr1 & !(1 << SR1_ADDR)) | flags);
                }
                sr2
            }
            DR => {
                let bus = &mut self.i2c[n];
                if bus.direction == Direction::Receive {
                    if let Some(target) = bus.active.and_then(|a| bus.targets.get_mut(&a)) {
                        let byte = target.memory[target.pointer as usize];
                        target.pointer = target.pointer.wrapping_add(1);
                        return byte as u32;
                    }
                }
                self.get(base + DR)
            }
            _ => self.get(base + offset),
        }
    }

    // NVIC sources

    fn is_active(&self, irq: Interrupt) -> bool {
        if let Some(tim) = Tim::from_interrupt(irq) {
            let base = tim.base();
            return self.get(base + regs::tim::SR) & self.get(base + regs::tim::DIER) & 0x1F != 0;
        }
        let lines = exti::lines_of(irq);
        if lines != 0 {
            let base = regs::exti::base();
            return self.get(base + regs::exti::PR) & self.get(base + regs::exti::IMR) & lines as u32
                != 0;
        }
        if let Some(usart) = Usart::from_interrupt(irq) {
            use crate::regs::usart::{CR1, CR1_RXNEIE, CR1_TXEIE, SR, SR_ORE, SR_RXNE, SR_TXE};

            let sr = self.get(usart.base() + SR);
            let cr1 = self.get(usart.base() + CR1);
            return (bit(cr1, CR1_RXNEIE) && (bit(sr, SR_RXNE) || bit(sr, SR_ORE)))
                || (bit(cr1, CR1_TXEIE) && bit(sr, SR_TXE));
        }
        if irq == Adc::Adc1.interrupt() {
            use crate::regs::adc::{CR1, CR1_EOCIE, CR1_OVRIE, SR, SR_EOC, SR_OVR};

            let sr = self.get(Adc::Adc1.base() + SR);
            let cr1 = self.get(Adc::Adc1.base() + CR1);
            return (bit(cr1, CR1_EOCIE) && bit(sr, SR_EOC))
                || (bit(cr1, CR1_OVRIE) && bit(sr, SR_OVR));
        }
        false
    }
}

/// Reset values that differ from zero
fn reset_value(addr: u32) -> u32 {
    match usart_of(addr) {
        Some((_, regs::usart::SR)) => (1 << regs::usart::SR_TXE) | (1 << regs::usart::SR_TC),
        _ => 0,
    }
}

impl Sim {
    pub fn new() -> Self {
        Self {
            regs: RefCell::new(Registers::default()),
            nvic: Rc::new(RefCell::new(NvicState::default())),
        }
    }

    /// Interrupt controller sharing this simulator's NVIC state
    pub fn nvic(&self) -> SimNvic {
        SimNvic {
            state: Rc::clone(&self.nvic),
        }
    }

    /// Reads a register without side effects
    pub fn peek(&self, addr: u32) -> u32 {
        let regs = self.regs.borrow();
        match port_of(addr) {
            Some((port, regs::gpio::IDR)) => regs.idr(port),
            _ => regs.get(addr),
        }
    }

    /// Writes a register without side effects
    pub fn poke(&self, addr: u32, value: u32) {
        self.regs.borrow_mut().set(addr, value);
    }

    /// Number of bus writes to `addr` so far
    pub fn write_count(&self, addr: u32) -> u32 {
        self.regs.borrow().writes.get(&addr).copied().unwrap_or(0)
    }

    /// Starts recording every bus write
    pub fn start_trace(&self) {
        self.regs.borrow_mut().trace = Some(Vec::new());
    }

    /// Stops recording, returning the `(address, value)` writes seen
    pub fn take_trace(&self) -> Vec<(u32, u32)> {
        self.regs.borrow_mut().trace.take().unwrap_or_default()
    }

    /// Drives the external level of an input pin
    pub fn set_input(&self, port: Port, pin: u8, high: bool) {
        let mut regs = self.regs.borrow_mut();
        let before = regs.idr(port);
        regs.inputs.insert((port.base(), pin), high);
        let after = regs.idr(port);
        regs.detect_edges(port, before, after);
    }

    /// Sets the 12-bit sample the ADC reads on `channel`
    pub fn set_analog(&self, channel: u8, raw: u16) {
        self.regs.borrow_mut().analog.insert(channel, raw & 0xFFF);
    }

    /// Delivers `byte` on the RX line of `usart`
    pub fn usart_inject(&self, usart: Usart, byte: u8) {
        self.regs.borrow_mut().usart_receive(usart.base(), byte);
    }

    /// Bytes transmitted by `usart` so far
    pub fn usart_tx(&self, usart: Usart) -> Vec<u8> {
        self.regs.borrow().usart[usart.index()].tx.clone()
    }

    /// Connects TX of `usart` to its own RX
    pub fn set_loopback(&self, usart: Usart, enable: bool) {
        self.regs.borrow_mut().usart[usart.index()].loopback = enable;
    }

    /// Places a target that acknowledges `addr` on the bus of `i2c`
    pub fn attach_i2c_target(&self, i2c: I2c, addr: u8) {
        self.regs.borrow_mut().i2c[i2c_index(i2c)]
            .targets
            .entry(addr)
            .or_default();
    }

    /// Fills target registers starting at `reg`, attaching the target if needed
    pub fn load_i2c_target(&self, i2c: I2c, addr: u8, reg: u8, data: &[u8]) {
        let mut regs = self.regs.borrow_mut();
        let target = regs.i2c[i2c_index(i2c)].targets.entry(addr).or_default();
        for (n, byte) in data.iter().enumerate() {
            target.memory[reg.wrapping_add(n as u8) as usize] = *byte;
        }
    }

    /// Register file of a target
    pub fn i2c_target_memory(&self, i2c: I2c, addr: u8) -> [u8; 256] {
        self.regs.borrow().i2c[i2c_index(i2c)]
            .targets
            .get(&addr)
            .map_or([0; 256], |target| target.memory)
    }

    pub fn i2c_bus_busy(&self, i2c: I2c) -> bool {
        bit(self.peek(i2c.base() + regs::i2c::SR2), regs::i2c::SR2_BUSY)
    }

    /// Keeps `i2c` from ever generating a START condition
    pub fn stall_i2c(&self, i2c: I2c, stalled: bool) {
        self.regs.borrow_mut().i2c[i2c_index(i2c)].stalled = stalled;
    }

    /// Logical priority given to `irq`
    pub fn priority(&self, irq: Interrupt) -> u8 {
        self.nvic
            .borrow()
            .priority
            .get(&irq.number())
            .copied()
            .unwrap_or(0)
    }

    /// Marks `irq` pending from software
    pub fn pend(&self, irq: Interrupt) {
        self.nvic.borrow_mut().pending.insert(irq.number(), true);
    }

    fn next_vector(&self) -> Option<Interrupt> {
        let nvic = self.nvic.borrow();
        let regs = self.regs.borrow();
        VECTORS
            .into_iter()
            .filter(|irq| nvic.is_enabled(*irq))
            .filter(|irq| {
                regs.is_active(*irq) || nvic.pending.get(&irq.number()).copied().unwrap_or(false)
            })
            .min_by_key(|irq| {
                (
                    nvic.priority.get(&irq.number()).copied().unwrap_or(0),
                    irq.number(),
                )
            })
    }

    /// Runs handlers until no enabled vector has an active source
    ///
    /// Returns the number of handler invocations. Panics if sources stay
    /// active, which means a handler does not acknowledge its interrupt.
    pub fn run_pending<S: Service + ?Sized>(&self, service: &mut S) -> usize {
        let mut serviced = 0;
        while let Some(irq) = self.next_vector() {
            assert!(serviced < STORM_LIMIT, "interrupt storm on {:?}", irq);
            self.nvic.borrow_mut().pending.remove(&irq.number());
            service.service(irq);
            serviced += 1;
        }
        serviced
    }

    /// Lets `tim` count for `cycles` timer clock cycles, servicing
    /// interrupts after every update event
    ///
    /// Returns the number of update events.
    pub fn run_timer<S: Service + ?Sized>(&self, tim: Tim, cycles: u64, service: &mut S) -> u32 {
        let n = Tim::ALL.iter().position(|t| *t == tim).unwrap_or(0);
        let mut left = cycles;
        let mut updates = 0;
        while left > 0 {
            let (used, update) = self.regs.borrow_mut().timer_advance(n, tim, left);
            left -= used;
            if update {
                updates += 1;
                self.run_pending(service);
            }
        }
        updates
    }
}

impl Bus for Sim {
    fn read(&self, addr: u32) -> u32 {
        self.regs.borrow_mut().load(addr)
    }

    fn write(&self, addr: u32, value: u32) {
        let mut regs = self.regs.borrow_mut();
        *regs.writes.entry(addr).or_insert(0) += 1;
        if let Some(trace) = regs.trace.as_mut() {
            trace.push((addr, value));
        }
        regs.store(addr, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Count(u32);

    impl Service for Count {
        fn service(&mut self, _irq: Interrupt) {
            self.0 += 1;
        }
    }

    #[test]
    fn bsrr_set_wins_over_reset() {
        let sim = Sim::new();
        let base = Port::A.base();
        sim.write(base + regs::gpio::BSRR, (1 << 16) | 1);
        assert_eq!(sim.peek(base + regs::gpio::ODR), 1);
        sim.write(base + regs::gpio::BSRR, 1 << 16);
        assert_eq!(sim.peek(base + regs::gpio::ODR), 0);
    }

    #[test]
    fn pull_up_reads_high() {
        let sim = Sim::new();
        let base = Port::B.base();
        sim.write(base + regs::gpio::PUPDR, 0b01 << 4);
        assert_eq!(sim.read(base + regs::gpio::IDR), 1 << 2);
    }

    #[test]
    fn free_running_timer_without_handler() {
        let sim = Sim::new();
        let base = Tim::Tim2.base();
        sim.write(base + regs::tim::PSC, 1);
        sim.write(base + regs::tim::ARR, 9);
        sim.write(base + regs::tim::CR1, 1);
        let updates = sim.run_timer(Tim::Tim2, 45, &mut Count(0));
        assert_eq!(updates, 2);
        assert_eq!(sim.peek(base + regs::tim::CNT), 2);
    }

    #[test]
    fn software_pending_is_serviced_once() {
        let sim = Sim::new();
        let mut nvic = sim.nvic();
        let mut count = Count(0);
        sim.pend(Interrupt::TIM4);
        assert_eq!(sim.run_pending(&mut count), 0);
        nvic.unmask(Interrupt::TIM4);
        assert_eq!(sim.run_pending(&mut count), 1);
        assert_eq!(count.0, 1);
    }

    #[test]
    #[should_panic(expected = "interrupt storm")]
    fn unacknowledged_source_is_a_storm() {
        let sim = Sim::new();
        let mut nvic = sim.nvic();
        let base = Tim::Tim3.base();
        sim.poke(base + regs::tim::DIER, 1);
        sim.poke(base + regs::tim::SR, 1);
        nvic.unmask(Interrupt::TIM3);
        sim.run_pending(&mut Count(0));
    }
}
