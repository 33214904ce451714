//! Hardware vector binding
//!
//! Defines the device interrupt handlers for every vector the drivers use
//! and forwards each one to the [`Service`] installed for it with
//! [`install`]. Services run with interrupts enabled, so a vector with a
//! more urgent NVIC priority preempts a running one. Vectors fired before
//! anything is installed are ignored.
//!
//! Each vector owns its service. Applications that handle several vectors
//! create one [`Dispatcher`](crate::irq::Dispatcher) per vector, all
//! sharing the bus and the [`Shared`](crate::irq::Shared) mailboxes.
//!
//! ```ignore
//! static SHARED: Shared = Shared::new();
//!
//! let bus: &'static Mmio = cortex_m::singleton!(: Mmio = Mmio::new(dp)).unwrap();
//! let dispatcher = cortex_m::singleton!(
//!     : Dispatcher<'static, Mmio, App> = Dispatcher::new(bus, &SHARED, App)
//! )
//! .unwrap();
//! rt::install(Interrupt::TIM2, dispatcher).ok();
//! ```

use crate::irq::{Installed, Service, VectorTable};
use crate::nvic::Interrupt;
use crate::pac::interrupt;

/// Routes `irq` to `service` from now on
///
/// Returns the previously installed service, or hands `service` back if
/// `irq` is not bound here.
pub fn install(
    irq: Interrupt,
    service: &'static mut (dyn Service + Send),
) -> Result<Installed, &'static mut (dyn Service + Send)> {
    VECTORS.install(irq, service)
}

/// Stops routing `irq`, handing back its service
pub fn uninstall(irq: Interrupt) -> Installed {
    VECTORS.uninstall(irq)
}

macro_rules! bind {
    ($count:literal: $($vector:ident),+ $(,)?) => {
        static VECTORS: VectorTable<$count> = VectorTable::new([$(Interrupt::$vector),+]);

        $(
            #[interrupt]
            fn $vector() {
                VECTORS.run(Interrupt::$vector);
            }
        )+
    };
}

bind!(15:
    EXTI0, EXTI1, EXTI2, EXTI3, EXTI4, EXTI9_5, EXTI15_10, TIM2, TIM3, TIM4, TIM5, USART1,
    USART2, USART6, ADC,
);
