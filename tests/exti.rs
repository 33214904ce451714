use stm32f4xx_drivers::exti::{self, Edge, ExtiConfig};
use stm32f4xx_drivers::gpio::Port;
use stm32f4xx_drivers::irq::{Callbacks, Dispatcher, Shared};
use stm32f4xx_drivers::sim::Sim;

#[derive(Default)]
struct Lines {
    fired: Vec<u8>,
}

impl Callbacks for Lines {
    fn exti_line(&mut self, line: u8) {
        self.fired.push(line);
    }
}

#[test]
fn every_port_and_pin_reaches_its_own_line() {
    for port in Port::ALL {
        for pin in 0..16 {
            let sim = Sim::new();
            let shared = Shared::new();
            let mut nvic = sim.nvic();
            ExtiConfig::on(port, pin, Edge::Rising)
                .configure(&sim, &mut nvic)
                .unwrap();

            let mut dispatcher = Dispatcher::new(&sim, &shared, Lines::default());
            sim.set_input(port, pin, true);
            sim.run_pending(&mut dispatcher);

            assert_eq!(dispatcher.callbacks().fired, vec![pin], "P{:?}{}", port, pin);
            assert!(!exti::is_pending(&sim, pin));
        }
    }
}

#[test]
fn rising_edge_on_pb2() {
    let sim = Sim::new();
    let shared = Shared::new();
    let mut nvic = sim.nvic();
    // Neighbours on other lines and another port's pin 2 stay quiet
    ExtiConfig::on(Port::B, 2, Edge::Rising)
        .configure(&sim, &mut nvic)
        .unwrap();
    ExtiConfig::on(Port::B, 3, Edge::Rising)
        .configure(&sim, &mut nvic)
        .unwrap();
    ExtiConfig::on(Port::A, 1, Edge::Falling)
        .configure(&sim, &mut nvic)
        .unwrap();

    let mut dispatcher = Dispatcher::new(&sim, &shared, Lines::default());
    sim.set_input(Port::A, 2, true);
    sim.run_pending(&mut dispatcher);
    assert!(dispatcher.callbacks().fired.is_empty());

    sim.set_input(Port::B, 2, true);
    sim.run_pending(&mut dispatcher);
    assert_eq!(dispatcher.callbacks().fired, vec![2]);

    // Falling edge is not selected
    sim.set_input(Port::B, 2, false);
    sim.run_pending(&mut dispatcher);
    assert_eq!(dispatcher.callbacks().fired, vec![2]);
}

#[test]
fn both_edges() {
    let sim = Sim::new();
    let shared = Shared::new();
    let mut nvic = sim.nvic();
    ExtiConfig::on(Port::C, 13, Edge::RisingFalling)
        .configure(&sim, &mut nvic)
        .unwrap();

    let mut dispatcher = Dispatcher::new(&sim, &shared, Lines::default());
    for level in [true, false, true] {
        sim.set_input(Port::C, 13, level);
        sim.run_pending(&mut dispatcher);
    }
    assert_eq!(dispatcher.callbacks().fired, vec![13, 13, 13]);
}

#[test]
fn shared_vector_serves_simultaneous_lines() {
    let sim = Sim::new();
    let shared = Shared::new();
    let mut nvic = sim.nvic();
    for pin in [5, 9] {
        ExtiConfig::on(Port::D, pin, Edge::Rising)
            .configure(&sim, &mut nvic)
            .unwrap();
    }

    let mut dispatcher = Dispatcher::new(&sim, &shared, Lines::default());
    sim.set_input(Port::D, 5, true);
    sim.set_input(Port::D, 9, true);
    assert_eq!(sim.run_pending(&mut dispatcher), 1);
    assert_eq!(dispatcher.callbacks().fired, vec![5, 9]);
}

#[test]
fn released_line_stays_silent() {
    let sim = Sim::new();
    let shared = Shared::new();
    let mut nvic = sim.nvic();
    ExtiConfig::on(Port::E, 0, Edge::Rising)
        .configure(&sim, &mut nvic)
        .unwrap();
    exti::release(&sim, &mut nvic, 0).unwrap();

    let mut dispatcher = Dispatcher::new(&sim, &shared, Lines::default());
    sim.set_input(Port::E, 0, true);
    assert_eq!(sim.run_pending(&mut dispatcher), 0);
    assert!(dispatcher.callbacks().fired.is_empty());
}
