use stm32f4xx_drivers::irq::{Callbacks, Dispatcher, Shared};
use stm32f4xx_drivers::regs::usart::{SR, SR_FE};
use stm32f4xx_drivers::serial::{BaudRate, Config, Error, Event, Usart, UsartHandle};
use stm32f4xx_drivers::sim::Sim;

#[derive(Default)]
struct Received {
    bytes: Vec<(Usart, u8)>,
    tx_ready: Vec<Usart>,
    errors: Vec<(Usart, Error)>,
}

impl Callbacks for Received {
    fn usart_rx(&mut self, usart: Usart, byte: u8) {
        self.bytes.push((usart, byte));
    }

    fn usart_tx(&mut self, usart: Usart) {
        self.tx_ready.push(usart);
    }

    fn usart_error(&mut self, usart: Usart, error: Error) {
        self.errors.push((usart, error));
    }
}

#[test]
fn loopback_round_trip() {
    for usart in Usart::ALL {
        let sim = Sim::new();
        let shared = Shared::new();
        let mut nvic = sim.nvic();
        let serial = UsartHandle::new(
            usart,
            Config::default()
                .baudrate(BaudRate::B115200)
                .rx_interrupt(true),
        );
        serial.configure(&sim, &mut nvic);
        sim.set_loopback(usart, true);

        let mut dispatcher = Dispatcher::new(&sim, &shared, Received::default());
        serial.write_char(&sim, b'A');
        sim.run_pending(&mut dispatcher);

        assert_eq!(dispatcher.callbacks().bytes, vec![(usart, b'A')]);
        assert_eq!(serial.rx_data(&shared), b'A');
        assert_eq!(serial.try_receive(&shared), Some(b'A'));
        assert_eq!(sim.usart_tx(usart), b"A");
    }
}

#[test]
fn unread_byte_is_replaced_and_counted() {
    let sim = Sim::new();
    let shared = Shared::new();
    let mut nvic = sim.nvic();
    let serial = UsartHandle::new(Usart::Usart1, Config::default().rx_interrupt(true));
    serial.configure(&sim, &mut nvic);

    let mut dispatcher = Dispatcher::new(&sim, &shared, Received::default());
    for byte in *b"xyz" {
        sim.usart_inject(Usart::Usart1, byte);
        sim.run_pending(&mut dispatcher);
    }

    assert_eq!(dispatcher.callbacks().bytes.len(), 3);
    assert_eq!(serial.try_receive(&shared), Some(b'z'));
    assert_eq!(serial.rx_mailbox(&shared).overwrites(), 2);
    assert_eq!(serial.try_receive(&shared), None);
}

#[test]
fn instances_keep_separate_mailboxes() {
    let sim = Sim::new();
    let shared = Shared::new();
    let mut nvic = sim.nvic();
    let usart2 = UsartHandle::new(Usart::Usart2, Config::default().rx_interrupt(true));
    let usart6 = UsartHandle::new(Usart::Usart6, Config::default().rx_interrupt(true));
    usart2.configure(&sim, &mut nvic);
    usart6.configure(&sim, &mut nvic);

    let mut dispatcher = Dispatcher::new(&sim, &shared, Received::default());
    sim.usart_inject(Usart::Usart2, b'2');
    sim.usart_inject(Usart::Usart6, b'6');
    sim.run_pending(&mut dispatcher);

    assert_eq!(usart2.try_receive(&shared), Some(b'2'));
    assert_eq!(usart6.try_receive(&shared), Some(b'6'));
}

#[test]
fn empty_transmit_register_is_reported_once_per_listen() {
    let sim = Sim::new();
    let shared = Shared::new();
    let mut nvic = sim.nvic();
    let serial = UsartHandle::new(Usart::Usart2, Config::default().rx_interrupt(true));
    serial.configure(&sim, &mut nvic);

    let mut dispatcher = Dispatcher::new(&sim, &shared, Received::default());
    assert_eq!(sim.run_pending(&mut dispatcher), 0);

    serial.listen(&sim, Event::Txe);
    assert_eq!(sim.run_pending(&mut dispatcher), 1);
    assert_eq!(dispatcher.callbacks().tx_ready, vec![Usart::Usart2]);
    assert!(!Usart::Usart2.is_listening(&sim, Event::Txe));

    serial.write_char(&sim, b'!');
    serial.listen(&sim, Event::Txe);
    sim.run_pending(&mut dispatcher);
    assert_eq!(dispatcher.callbacks().tx_ready.len(), 2);
    assert!(dispatcher.callbacks().bytes.is_empty());
    assert!(dispatcher.callbacks().errors.is_empty());
}

#[test]
fn overrun_reports_the_error_and_keeps_the_first_byte() {
    let sim = Sim::new();
    let shared = Shared::new();
    let mut nvic = sim.nvic();
    let serial = UsartHandle::new(Usart::Usart1, Config::default().rx_interrupt(true));
    serial.configure(&sim, &mut nvic);

    let mut dispatcher = Dispatcher::new(&sim, &shared, Received::default());
    sim.usart_inject(Usart::Usart1, b'a');
    sim.usart_inject(Usart::Usart1, b'b');
    assert_eq!(sim.run_pending(&mut dispatcher), 1);

    assert_eq!(
        dispatcher.callbacks().errors,
        vec![(Usart::Usart1, Error::Overrun)]
    );
    assert_eq!(dispatcher.callbacks().bytes, vec![(Usart::Usart1, b'a')]);
    assert_eq!(serial.try_receive(&shared), Some(b'a'));
    assert_eq!(sim.run_pending(&mut dispatcher), 0);
}

#[test]
fn framing_error_drops_the_byte() {
    let sim = Sim::new();
    let shared = Shared::new();
    let mut nvic = sim.nvic();
    let serial = UsartHandle::new(Usart::Usart6, Config::default().rx_interrupt(true));
    serial.configure(&sim, &mut nvic);

    let mut dispatcher = Dispatcher::new(&sim, &shared, Received::default());
    let sr = Usart::Usart6.base() + SR;
    sim.usart_inject(Usart::Usart6, b'c');
    sim.poke(sr, sim.peek(sr) | 1 << SR_FE);
    assert_eq!(sim.run_pending(&mut dispatcher), 1);

    assert_eq!(
        dispatcher.callbacks().errors,
        vec![(Usart::Usart6, Error::FrameFormat)]
    );
    assert!(dispatcher.callbacks().bytes.is_empty());
    assert_eq!(serial.try_receive(&shared), None);
    assert_eq!(sim.peek(sr) & (1 << SR_FE), 0);

    // The next clean byte gets through
    sim.usart_inject(Usart::Usart6, b'd');
    sim.run_pending(&mut dispatcher);
    assert_eq!(dispatcher.callbacks().bytes, vec![(Usart::Usart6, b'd')]);
    assert_eq!(serial.try_receive(&shared), Some(b'd'));
}
