use stm32f4xx_drivers::irq::{Callbacks, Dispatcher, Shared};
use stm32f4xx_drivers::rcc::Clocks;
use stm32f4xx_drivers::sim::Sim;
use stm32f4xx_drivers::time::MicroSecondsU64;
use stm32f4xx_drivers::timer::{Config, Direction, Tim, TimerHandle, TimerState};

#[derive(Default)]
struct Ticks {
    count: [u32; 4],
}

impl Callbacks for Ticks {
    fn timer_update(&mut self, tim: Tim) {
        let n = Tim::ALL.iter().position(|t| *t == tim).unwrap();
        self.count[n] += 1;
    }
}

/// Runs `tim` for `ticks` counter ticks and returns the callbacks seen
fn run(tim: Tim, config: Config, ticks: u64) -> [u32; 4] {
    let sim = Sim::new();
    let shared = Shared::new();
    let mut nvic = sim.nvic();
    let timer = TimerHandle::new(tim, config.interrupt(true));
    timer.configure(&sim, &mut nvic);
    timer.set_state(&sim, TimerState::On);

    let mut dispatcher = Dispatcher::new(&sim, &shared, Ticks::default());
    sim.run_timer(tim, ticks * config.prescaler as u64, &mut dispatcher);
    dispatcher.callbacks().count
}

#[test]
fn callbacks_follow_the_period_law() {
    let cases: [(u32, u32, u64); 6] = [
        (2, 2, 0),
        (2, 2, 1),
        (2, 2, 7),
        (3, 10, 100),
        (16, 7, 50),
        (1_000, 333, 1_000),
    ];
    for (prescaler, period, ticks) in cases {
        let config = Config::default().prescaler(prescaler).period(period);
        let expected = (ticks / period as u64) as u32;
        assert_eq!(
            run(Tim::Tim3, config, ticks)[1],
            expected,
            "P={} A={} N={}",
            prescaler,
            period,
            ticks
        );
    }
}

#[test]
fn down_counting_has_the_same_rate() {
    let config = Config::default()
        .prescaler(4)
        .period(5)
        .direction(Direction::Down);
    assert_eq!(run(Tim::Tim4, config, 23)[2], 4);
}

#[test]
fn only_the_running_timer_reports() {
    let config = Config::default().prescaler(2).period(2);
    assert_eq!(run(Tim::Tim5, config, 10), [0, 0, 0, 5]);
}

#[test]
fn one_second_at_16_mhz() {
    let config = Config::default().prescaler(16_000).period(1_000);
    let timer = TimerHandle::new(Tim::Tim2, config);
    assert_eq!(timer.tick_period(&Clocks::hsi()), MicroSecondsU64::millis(1_000));

    // 3 s of core clock
    let sim = Sim::new();
    let shared = Shared::new();
    let mut nvic = sim.nvic();
    let timer = TimerHandle::new(Tim::Tim2, config.interrupt(true));
    timer.configure(&sim, &mut nvic);
    timer.set_state(&sim, TimerState::On);
    let mut dispatcher = Dispatcher::new(&sim, &shared, Ticks::default());

    sim.run_timer(Tim::Tim2, 16_000_000 - 1, &mut dispatcher);
    assert_eq!(dispatcher.callbacks().count[0], 0);
    sim.run_timer(Tim::Tim2, 1, &mut dispatcher);
    assert_eq!(dispatcher.callbacks().count[0], 1);
    sim.run_timer(Tim::Tim2, 32_000_000, &mut dispatcher);
    assert_eq!(dispatcher.callbacks().count[0], 3);
}

#[test]
fn stopped_timer_never_fires() {
    let sim = Sim::new();
    let shared = Shared::new();
    let mut nvic = sim.nvic();
    let timer = TimerHandle::new(Tim::Tim2, Config::default().period(2).interrupt(true));
    timer.configure(&sim, &mut nvic);

    let mut dispatcher = Dispatcher::new(&sim, &shared, Ticks::default());
    sim.run_timer(Tim::Tim2, 1_000, &mut dispatcher);
    assert_eq!(dispatcher.callbacks().count, [0; 4]);
}
