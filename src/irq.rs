//! Interrupt dispatch
//!
//! Hardware vectors end up in one place: [`Dispatcher::service`]. It hands
//! the vector to the owning driver, which acknowledges the interrupt source,
//! and then calls the matching [`Callbacks`] method. Applications implement
//! only the callbacks they care about; the rest default to doing nothing.
//!
//! Data produced in interrupt context travels to the main loop through the
//! mailboxes in [`Shared`].
//!
//! ```
//! use stm32f4xx_drivers::irq::{Callbacks, Shared};
//! use stm32f4xx_drivers::mailbox::Flag;
//! use stm32f4xx_drivers::timer::Tim;
//!
//! static SHARED: Shared = Shared::new();
//! static TICK: Flag = Flag::new();
//!
//! struct App;
//!
//! impl Callbacks for App {
//!     fn timer_update(&mut self, tim: Tim) {
//!         if tim == Tim::Tim2 {
//!             TICK.raise();
//!         }
//!     }
//! }
//! ```

use core::cell::RefCell;

use critical_section::Mutex;

use crate::adc::{self, Adc};
use crate::bus::Bus;
use crate::exti;
use crate::mailbox::Mailbox;
use crate::nvic::Interrupt;
use crate::serial::{self, Usart};
use crate::timer::{Event, Tim};

/// Application hooks run in interrupt context
///
/// They preempt the main loop and must return quickly.
pub trait Callbacks {
    /// Timer overflow
    fn timer_update(&mut self, _tim: Tim) {}

    /// Edge on EXTI line `line`
    fn exti_line(&mut self, _line: u8) {}

    /// Byte received, already stored in the instance's mailbox
    fn usart_rx(&mut self, _usart: Usart, _byte: u8) {}

    /// Transmit data register empty
    fn usart_tx(&mut self, _usart: Usart) {}

    fn usart_error(&mut self, _usart: Usart, _error: serial::Error) {}

    /// Conversion finished, result already stored in the ADC mailbox
    fn adc_complete(&mut self, _value: u16) {}

    fn adc_error(&mut self, _error: adc::Error) {}
}

/// Callbacks that do nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCallbacks;

impl Callbacks for NoCallbacks {}

impl<C: Callbacks + ?Sized> Callbacks for &mut C {
    fn timer_update(&mut self, tim: Tim) {
        (**self).timer_update(tim)
    }

    fn exti_line(&mut self, line: u8) {
        (**self).exti_line(line)
    }

    fn usart_rx(&mut self, usart: Usart, byte: u8) {
        (**self).usart_rx(usart, byte)
    }

    fn usart_tx(&mut self, usart: Usart) {
        (**self).usart_tx(usart)
    }

    fn usart_error(&mut self, usart: Usart, error: serial::Error) {
        (**self).usart_error(usart, error)
    }

    fn adc_complete(&mut self, value: u16) {
        (**self).adc_complete(value)
    }

    fn adc_error(&mut self, error: adc::Error) {
        (**self).adc_error(error)
    }
}

/// Values handed from interrupt handlers to the main loop
pub struct Shared {
    usart_rx: [Mailbox<u8>; 3],
    adc: Mailbox<u16>,
}

impl Shared {
    pub const fn new() -> Self {
        Self {
            usart_rx: [Mailbox::new(), Mailbox::new(), Mailbox::new()],
            adc: Mailbox::new(),
        }
    }

    /// Last received byte of `usart`
    pub fn usart_rx(&self, usart: Usart) -> &Mailbox<u8> {
        &self.usart_rx[usart.index()]
    }

    /// Last conversion result
    pub fn adc(&self) -> &Mailbox<u16> {
        &self.adc
    }
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that handles interrupt vectors
pub trait Service {
    fn service(&mut self, irq: Interrupt);
}

/// Routes vectors to the drivers and then to the application callbacks
pub struct Dispatcher<'a, B, C> {
    bus: &'a B,
    shared: &'a Shared,
    callbacks: C,
}

impl<'a, B: Bus, C: Callbacks> Dispatcher<'a, B, C> {
    pub fn new(bus: &'a B, shared: &'a Shared, callbacks: C) -> Self {
        Self {
            bus,
            shared,
            callbacks,
        }
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    pub fn shared(&self) -> &'a Shared {
        self.shared
    }

    fn timer(&mut self, tim: Tim) {
        if tim.on_interrupt(self.bus).contains(Event::Update) {
            self.callbacks.timer_update(tim);
        }
    }

    fn exti(&mut self, irq: Interrupt) {
        let fired = exti::on_interrupt(self.bus, irq);
        for line in 0..exti::LINE_COUNT {
            if fired & (1 << line) != 0 {
                self.callbacks.exti_line(line);
            }
        }
    }

    fn usart(&mut self, usart: Usart) {
        let status = usart.on_interrupt(self.bus);
        if let Some(error) = status.error {
            warn!("{} receive error {}", usart, error);
            self.callbacks.usart_error(usart, error);
        }
        if let Some(byte) = status.received {
            if self.shared.usart_rx(usart).post(byte) {
                trace!("{} byte overwritten", usart);
            }
            self.callbacks.usart_rx(usart, byte);
        }
        if status.tx_ready {
            self.callbacks.usart_tx(usart);
        }
    }

    fn adc(&mut self, adc: Adc) {
        match adc.on_interrupt(self.bus) {
            Some(Ok(value)) => {
                self.shared.adc().post(value);
                self.callbacks.adc_complete(value);
            }
            Some(Err(error)) => {
                warn!("{} error {}", adc, error);
                self.callbacks.adc_error(error);
            }
            None => {}
        }
    }
}

impl<B: Bus, C: Callbacks> Service for Dispatcher<'_, B, C> {
    fn service(&mut self, irq: Interrupt) {
        if let Some(tim) = Tim::from_interrupt(irq) {
            self.timer(tim);
        } else if exti::lines_of(irq) != 0 {
            self.exti(irq);
        } else if let Some(usart) = Usart::from_interrupt(irq) {
            self.usart(usart);
        } else if irq == Adc::Adc1.interrupt() {
            self.adc(Adc::Adc1);
        }
    }
}

/// A service installed for the lifetime of the program
pub type Installed = Option<&'static mut (dyn Service + Send)>;

/// One installable service per interrupt vector
///
/// [`run`](VectorTable::run) takes the vector's service out of its slot for
/// the duration of the call, so the service runs with interrupts enabled and
/// other vectors can preempt it according to their NVIC priority. A vector
/// never preempts itself, so the service is never entered twice.
pub struct VectorTable<const N: usize> {
    vectors: [Interrupt; N],
    slots: [Mutex<RefCell<Installed>>; N],
}

impl<const N: usize> VectorTable<N> {
    const EMPTY: Mutex<RefCell<Installed>> = Mutex::new(RefCell::new(None));

    pub const fn new(vectors: [Interrupt; N]) -> Self {
        Self {
            vectors,
            slots: [Self::EMPTY; N],
        }
    }

    fn slot(&self, irq: Interrupt) -> Option<&Mutex<RefCell<Installed>>> {
        let index = self.vectors.iter().position(|v| *v == irq)?;
        Some(&self.slots[index])
    }

    /// Routes `irq` to `service`, returning the service it replaces
    ///
    /// Hands `service` back as the error if `irq` is not in the table.
    pub fn install(
        &self,
        irq: Interrupt,
        service: &'static mut (dyn Service + Send),
    ) -> Result<Installed, &'static mut (dyn Service + Send)> {
        match self.slot(irq) {
            Some(slot) => Ok(critical_section::with(|cs| slot.borrow(cs).replace(Some(service)))),
            None => Err(service),
        }
    }

    /// Stops routing `irq`, handing back its service
    ///
    /// Returns `None` while the service is running.
    pub fn uninstall(&self, irq: Interrupt) -> Installed {
        let slot = self.slot(irq)?;
        critical_section::with(|cs| slot.borrow(cs).take())
    }

    /// Runs the service installed for `irq`
    ///
    /// Returns `false` if no service is installed or it is already running.
    pub fn run(&self, irq: Interrupt) -> bool {
        let Some(slot) = self.slot(irq) else {
            return false;
        };
        let Some(service) = critical_section::with(|cs| slot.borrow(cs).take()) else {
            return false;
        };

        service.service(irq);

        critical_section::with(|cs| {
            let mut slot = slot.borrow_ref_mut(cs);
            // A service installed meanwhile wins
            if slot.is_none() {
                *slot = Some(service);
            }
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exti::{Edge, ExtiConfig};
    use crate::gpio::Port;
    use crate::serial::{Config, UsartHandle};
    use crate::sim::Sim;
    use crate::timer::TimerHandle;

    #[derive(Default)]
    struct Recorder {
        ticks: u32,
        lines: u16,
        rx: Option<(Usart, u8)>,
        errors: u32,
    }

    impl Callbacks for Recorder {
        fn timer_update(&mut self, _tim: Tim) {
            self.ticks += 1;
        }

        fn exti_line(&mut self, line: u8) {
            self.lines |= 1 << line;
        }

        fn usart_rx(&mut self, usart: Usart, byte: u8) {
            self.rx = Some((usart, byte));
        }

        fn usart_error(&mut self, _usart: Usart, _error: serial::Error) {
            self.errors += 1;
        }
    }

    #[test]
    fn timer_vector_reaches_callback() {
        let sim = Sim::new();
        let shared = Shared::new();
        let mut nvic = sim.nvic();
        let timer = TimerHandle::new(
            Tim::Tim2,
            crate::timer::Config::default()
                .prescaler(2)
                .period(2)
                .interrupt(true),
        );
        timer.configure(&sim, &mut nvic);

        let mut dispatcher = Dispatcher::new(&sim, &shared, Recorder::default());
        sim.poke(Tim::Tim2.base() + crate::regs::tim::SR, 1);
        dispatcher.service(Interrupt::TIM2);
        dispatcher.service(Interrupt::TIM2);
        assert_eq!(dispatcher.callbacks().ticks, 1);
    }

    #[test]
    fn shared_exti_vector_reports_each_line() {
        let sim = Sim::new();
        let shared = Shared::new();
        let mut nvic = sim.nvic();
        ExtiConfig::on(Port::A, 5, Edge::Rising)
            .configure(&sim, &mut nvic)
            .unwrap();
        ExtiConfig::on(Port::C, 7, Edge::Rising)
            .configure(&sim, &mut nvic)
            .unwrap();

        let mut dispatcher = Dispatcher::new(&sim, &shared, Recorder::default());
        exti::trigger(&sim, 5).unwrap();
        exti::trigger(&sim, 7).unwrap();
        dispatcher.service(Interrupt::EXTI9_5);
        assert_eq!(dispatcher.callbacks().lines, (1 << 5) | (1 << 7));
        assert!(!exti::is_pending(&sim, 5));
        assert!(!exti::is_pending(&sim, 7));
    }

    #[test]
    fn usart_byte_lands_in_mailbox() {
        let sim = Sim::new();
        let shared = Shared::new();
        let mut nvic = sim.nvic();
        let serial = UsartHandle::new(Usart::Usart6, Config::default().rx_interrupt(true));
        serial.configure(&sim, &mut nvic);

        let mut dispatcher = Dispatcher::new(&sim, &shared, Recorder::default());
        sim.usart_inject(Usart::Usart6, b'z');
        dispatcher.service(Interrupt::USART6);

        assert_eq!(dispatcher.callbacks().rx, Some((Usart::Usart6, b'z')));
        assert_eq!(serial.rx_data(&shared), b'z');
        assert_eq!(serial.try_receive(&shared), Some(b'z'));
        assert_eq!(serial.try_receive(&shared), None);
        assert_eq!(serial.rx_data(&shared), b'z');
        assert_eq!(dispatcher.callbacks().errors, 0);
    }

    #[test]
    fn no_callbacks_still_acknowledges() {
        let sim = Sim::new();
        let shared = Shared::new();
        let mut nvic = sim.nvic();
        ExtiConfig::on(Port::B, 0, Edge::Falling)
            .configure(&sim, &mut nvic)
            .unwrap();

        let mut dispatcher = Dispatcher::new(&sim, &shared, NoCallbacks);
        exti::trigger(&sim, 0).unwrap();
        dispatcher.service(Interrupt::EXTI0);
        assert!(!exti::is_pending(&sim, 0));
    }

    static TABLE: VectorTable<2> = VectorTable::new([Interrupt::TIM2, Interrupt::USART2]);

    struct Log {
        entries: &'static Mutex<RefCell<Vec<Interrupt>>>,
        nested: Option<Interrupt>,
    }

    impl Service for Log {
        fn service(&mut self, irq: Interrupt) {
            critical_section::with(|cs| self.entries.borrow_ref_mut(cs).push(irq));
            if let Some(inner) = self.nested {
                // What a higher priority vector does when it preempts this one
                assert!(TABLE.run(inner));
                // The running vector cannot be entered again
                assert!(!TABLE.run(irq));
            }
        }
    }

    #[test]
    fn other_vectors_preempt_a_running_service() {
        let entries: &'static Mutex<RefCell<Vec<Interrupt>>> =
            Box::leak(Box::new(Mutex::new(RefCell::new(Vec::new()))));
        let timer = Box::leak(Box::new(Log {
            entries,
            nested: Some(Interrupt::USART2),
        }));
        let usart = Box::leak(Box::new(Log {
            entries,
            nested: None,
        }));
        assert!(matches!(TABLE.install(Interrupt::TIM2, timer), Ok(None)));
        assert!(matches!(TABLE.install(Interrupt::USART2, usart), Ok(None)));

        assert!(TABLE.run(Interrupt::TIM2));
        assert!(TABLE.run(Interrupt::TIM2));
        assert!(!TABLE.run(Interrupt::EXTI0));

        let seen = critical_section::with(|cs| entries.borrow_ref(cs).clone());
        assert_eq!(
            seen,
            [Interrupt::TIM2, Interrupt::USART2, Interrupt::TIM2, Interrupt::USART2]
        );

        assert!(TABLE.uninstall(Interrupt::USART2).is_some());
        assert!(TABLE.uninstall(Interrupt::USART2).is_none());
        assert!(TABLE.uninstall(Interrupt::TIM2).is_some());
        assert!(!TABLE.run(Interrupt::TIM2));

        let stray = Box::leak(Box::new(Log {
            entries,
            nested: None,
        }));
        assert!(TABLE.install(Interrupt::EXTI0, stray).is_err());
    }
}
