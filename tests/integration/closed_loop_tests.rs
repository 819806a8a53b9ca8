//! Channels against a simulated coil.
//!
//! The plant is first order: full SSR power heats at `HEAT_RATE` °F/s and
//! the coil loses heat to ambient in proportion to the difference. An
//! optional transport delay models the thermocouple lagging the coil.

use std::collections::VecDeque;

use coilctl::app::commands::{Command, CommandKind};
use coilctl::app::service::ControlLoop;
use coilctl::channel::ChannelState;
use coilctl::config::ControllerConfig;
use coilctl::control::AutotunePhase;
use coilctl::link::Links;

use crate::mock_hw::{MockSensor, RecordingSsr, TwoProfiles, mock_channel};

const AMBIENT_F: f32 = 70.0;
const HEAT_RATE: f32 = 9.3;
const LOSS: f32 = 0.01;
const STEP_MS: u64 = 250;

struct Coil {
    temp_f: f32,
    /// Readings in flight between the coil and the sensor.
    lag: VecDeque<f32>,
}

impl Coil {
    fn new(temp_f: f32, delay_steps: usize) -> Self {
        Self {
            temp_f,
            lag: VecDeque::from(vec![temp_f; delay_steps]),
        }
    }

    fn step(&mut self, heater_on: bool) -> f32 {
        let dt = STEP_MS as f32 / 1000.0;
        let power = if heater_on { HEAT_RATE } else { 0.0 };
        self.temp_f += dt * (power - LOSS * (self.temp_f - AMBIENT_F));
        self.lag.push_back(self.temp_f);
        self.lag.pop_front().unwrap_or(self.temp_f)
    }
}

type Loop = ControlLoop<MockSensor, RecordingSsr, TwoProfiles>;

fn rig(temp_f: f32) -> (Loop, Links) {
    let config = ControllerConfig::default();
    let mut control = ControlLoop::new(TwoProfiles);
    control.add_channel(mock_channel(0, temp_f, &config)).unwrap();
    (control, Links::new())
}

/// Advance `steps` control cycles from `start`, feeding the plant.
fn simulate(control: &mut Loop, links: &Links, coil: &mut Coil, start: u64, steps: u64, mut each: impl FnMut(&Loop)) -> u64 {
    let mut t = start;
    for _ in 0..steps {
        control.run_cycle(links, t);
        let Some(ch) = control.channel_mut(0) else {
            break;
        };
        let reading = coil.step(ch.is_ssr_on());
        ch.sensor_mut().temp_f = reading;
        each(control);
        t += STEP_MS;
    }
    t
}

#[test]
fn heats_to_target_and_holds() {
    let (mut control, links) = rig(AMBIENT_F);
    let mut coil = Coil::new(AMBIENT_F, 0);

    links.send_command(Command::set_temp(0, 500.0));
    links.send_command(Command::enable(0));

    // 20 minutes to settle.
    let t = simulate(&mut control, &links, &mut coil, 0, 4_800, |_| {});
    assert_eq!(control.channel(0).unwrap().state(), ChannelState::Holding);

    // Then 5 minutes that must stay in band.
    let mut worst = 0.0f32;
    let mut on_cycles = 0u32;
    simulate(&mut control, &links, &mut coil, t, 1_200, |c| {
        let ch = c.channel(0).unwrap();
        assert_eq!(ch.state(), ChannelState::Holding);
        worst = worst.max((ch.current_temp_f() - 500.0).abs());
        on_cycles += u32::from(ch.is_ssr_on());
    });
    assert!(worst < 8.0, "worst deviation {worst:.2}F");

    // Holding 500F against the losses needs about 47 % power.
    let on_fraction = on_cycles as f32 / 1_200.0;
    assert!((0.35..0.6).contains(&on_fraction), "on fraction {on_fraction}");
}

#[test]
fn never_reaches_abs_max_with_target_at_ceiling() {
    let (mut control, links) = rig(AMBIENT_F);
    let mut coil = Coil::new(AMBIENT_F, 0);

    links.send_command(Command::set_temp(0, 2_000.0));
    links.send_command(Command::enable(0));

    let mut peak = 0.0f32;
    simulate(&mut control, &links, &mut coil, 0, 2_400, |c| {
        peak = peak.max(c.channel(0).unwrap().current_temp_f());
    });
    let ch = control.channel(0).unwrap();
    assert_eq!(ch.target_temp_f(), 999.0);
    assert!(peak < 1_050.0);
    assert!(!ch.is_faulted());
}

#[test]
fn autotune_on_lagging_coil_yields_gains() {
    let (mut control, links) = rig(480.0);
    // 5 s of thermocouple lag.
    let mut coil = Coil::new(480.0, 20);

    links.send_command(Command::set_temp(0, 500.0));
    links.send_command(Command::new(0, CommandKind::StartAutotune));

    let mut t = simulate(&mut control, &links, &mut coil, 0, 1, |_| {});
    assert_eq!(control.channel(0).unwrap().state(), ChannelState::Autotuning);
    while control.channel(0).unwrap().state() == ChannelState::Autotuning && t < 400_000 {
        t = simulate(&mut control, &links, &mut coil, t, 1, |_| {});
    }

    let ch = control.channel(0).unwrap();
    assert_eq!(ch.state(), ChannelState::Heating);
    assert!(matches!(ch.autotune_phase(), AutotunePhase::Complete(_)));
    let result = ch.last_autotune().expect("autotune should complete");
    assert!(result.valid);
    assert!(result.ultimate_period_s > 5.0, "Tu = {}", result.ultimate_period_s);
    assert_eq!(ch.pid().tunings(), (result.kp, result.ki, result.kd));
}
