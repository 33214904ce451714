use stm32f4xx_drivers::pwm::{Config, PwmHandle};
use stm32f4xx_drivers::sim::Sim;
use stm32f4xx_drivers::timer::{Channel, Tim};

#[test]
fn duty_lands_in_the_channel_register_clamped_to_the_period() {
    let cases = [(250, 1_000), (1_500, 1_000), (1_000, 1_000), (0, 2), (7, 2)];
    for tim in Tim::ALL {
        for channel in Channel::ALL {
            for (duty, period) in cases {
                let sim = Sim::new();
                let mut pwm = PwmHandle::new(tim, Config::default().channel(channel));
                pwm.configure(&sim);

                pwm.update_duty_cycle(&sim, duty);
                pwm.update_frequency(&sim, period);

                for other in Channel::ALL {
                    let expected = if other == channel {
                        duty.min(period)
                    } else {
                        0
                    };
                    assert_eq!(
                        tim.read_cc_value(&sim, other),
                        expected,
                        "{:?} {:?} d={} f={}",
                        tim,
                        channel,
                        duty,
                        period
                    );
                }
            }
        }
    }
}

#[test]
fn output_follows_start_and_stop() {
    let sim = Sim::new();
    let pwm = PwmHandle::new(Tim::Tim4, Config::default().channel(Channel::C2));
    pwm.configure(&sim);
    assert!(!Tim::Tim4.is_counter_enabled(&sim));
    pwm.start_signal(&sim);
    assert!(Tim::Tim4.is_counter_enabled(&sim));
    pwm.stop_signal(&sim);
    assert!(!Tim::Tim4.is_counter_enabled(&sim));
}
