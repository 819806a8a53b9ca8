//! ControlLoop: command draining, safety reactions, publication.

use coilctl::app::commands::{Command, CommandKind};
use coilctl::app::events::SafetyStatus;
use coilctl::app::service::ControlLoop;
use coilctl::channel::ChannelState;
use coilctl::config::{COMMAND_QUEUE_DEPTH, ControllerConfig};
use coilctl::link::Links;
use coilctl::sensors::Calibration;

use crate::mock_hw::{MockSensor, RecordingSsr, TwoProfiles, mock_channel};

type Loop = ControlLoop<MockSensor, RecordingSsr, TwoProfiles>;

fn control(channels: u8, temp_f: f32) -> Loop {
    let config = ControllerConfig::default();
    let mut control = ControlLoop::new(TwoProfiles);
    for ch in 0..channels {
        control.add_channel(mock_channel(ch, temp_f, &config)).unwrap();
    }
    control
}

fn shutdown_status() -> SafetyStatus {
    SafetyStatus {
        shutdown: true,
        ..SafetyStatus::default()
    }
}

#[test]
fn commands_apply_before_channel_update() {
    let links = Links::new();
    let mut c = control(2, 70.0);

    links.send_command(Command::set_temp(1, 500.0));
    links.send_command(Command::enable(1));
    c.run_cycle(&links, 0);

    // The same cycle's snapshot already reflects both commands.
    let snap = links.latest_temp(1).unwrap();
    assert_eq!(snap.target_temp_f, 500.0);
    assert_eq!(snap.state, ChannelState::Heating);
    assert_eq!(links.latest_temp(0).unwrap().state, ChannelState::Off);
    assert_eq!(links.pending_commands(), 0);
}

#[test]
fn applied_commands_count_as_activity() {
    let links = Links::new();
    let mut c = control(1, 70.0);

    c.run_cycle(&links, 0);
    assert_eq!(links.take_activity(), None);

    links.send_command(Command::new(0, CommandKind::AdjustTemp { delta: -10.0 }));
    c.run_cycle(&links, 250);
    assert_eq!(links.take_activity(), Some(250));
    assert_eq!(c.channel(0).unwrap().target_temp_f(), 700.0);
}

#[test]
fn unknown_channel_is_ignored() {
    let links = Links::new();
    let mut c = control(2, 70.0);

    links.send_command(Command::enable(3));
    c.run_cycle(&links, 0);

    assert_eq!(links.take_activity(), None);
    assert!(c.channels().iter().all(|ch| ch.state() == ChannelState::Off));
}

#[test]
fn every_cycle_stamps_heartbeat_and_publishes() {
    let links = Links::new();
    let mut c = control(3, 70.0);
    assert_eq!(links.last_heartbeat(), None);

    c.run_cycle(&links, 0);
    c.run_cycle(&links, 250);

    assert_eq!(links.last_heartbeat(), Some(250));
    assert_eq!(c.cycles(), 2);
    for ch in 0..3 {
        assert_eq!(links.latest_temp(ch).unwrap().channel, ch);
    }
    assert!(links.latest_temp(3).is_none());
}

#[test]
fn heater_output_follows_pid() {
    let links = Links::new();
    let mut c = control(1, 70.0);

    links.send_command(Command::enable(0));
    for i in 0..4 {
        c.run_cycle(&links, i * 250);
    }

    let ch = c.channel(0).unwrap();
    assert_eq!(ch.output_percent(), 100.0);
    assert!(ch.ssr().is_on());
    assert_eq!(links.latest_temp(0).unwrap().output_percent, 100.0);
}

#[test]
fn idle_edge_disables_active_channels_once() {
    let links = Links::new();
    let mut c = control(2, 500.0);
    links.send_command(Command::enable(0));
    links.send_command(Command::enable(1));
    c.run_cycle(&links, 0);
    assert!(c.channels().iter().all(|ch| ch.is_active()));

    links.publish_safety(SafetyStatus {
        idle_timed_out: true,
        ..SafetyStatus::default()
    });
    c.run_cycle(&links, 250);
    assert!(c.channels().iter().all(|ch| !ch.is_active()));
    assert_eq!(c.channel(0).unwrap().state(), ChannelState::Cooldown);
    assert!(!c.channel(0).unwrap().ssr().is_on());

    // Flag still set, but the edge has passed: the operator may re-enable.
    links.send_command(Command::enable(0));
    c.run_cycle(&links, 500);
    assert!(c.channel(0).unwrap().is_active());
}

#[test]
fn shutdown_holds_channels_off() {
    let links = Links::new();
    let mut c = control(2, 70.0);
    links.send_command(Command::enable(0));
    for i in 0..3 {
        c.run_cycle(&links, i * 250);
    }
    assert!(c.channel(0).unwrap().ssr().is_on());

    links.publish_safety(shutdown_status());
    c.run_cycle(&links, 750);
    assert_eq!(c.channel(0).unwrap().state(), ChannelState::Off);
    assert!(!c.channel(0).unwrap().ssr().is_on());

    links.send_command(Command::enable(0));
    links.send_command(Command::new(1, CommandKind::StartAutotune));
    links.send_command(Command::set_temp(0, 400.0));
    for i in 4..10 {
        c.run_cycle(&links, i * 250);
    }
    let ch0 = c.channel(0).unwrap();
    assert_eq!(ch0.state(), ChannelState::Off);
    assert_eq!(ch0.target_temp_f(), 400.0);
    assert_eq!(c.channel(1).unwrap().state(), ChannelState::Off);
    assert!(!c.channel(1).unwrap().ssr().ever_on());
}

#[test]
fn load_profile_applies_target_and_optional_gains() {
    let links = Links::new();
    let mut c = control(2, 70.0);

    links.send_command(Command::new(0, CommandKind::LoadProfile { index: 0 }));
    links.send_command(Command::new(1, CommandKind::LoadProfile { index: 1 }));
    c.run_cycle(&links, 0);

    let ch0 = c.channel(0).unwrap();
    assert_eq!(ch0.target_temp_f(), 450.0);
    assert_eq!(ch0.pid().tunings(), (8.0, 0.2, 2.0));

    let ch1 = c.channel(1).unwrap();
    assert_eq!(ch1.target_temp_f(), 600.0);
    assert_eq!(ch1.pid().tunings(), (12.0, 0.4, 3.0));
}

#[test]
fn missing_profile_changes_nothing() {
    let links = Links::new();
    let mut c = control(1, 70.0);

    links.send_command(Command::new(0, CommandKind::LoadProfile { index: 5 }));
    c.run_cycle(&links, 0);

    assert_eq!(c.channel(0).unwrap().target_temp_f(), 710.0);
    assert_eq!(links.take_activity(), None);
}

#[test]
fn sensor_fault_then_clear_fault() {
    let links = Links::new();
    let mut c = control(1, 70.0);
    links.send_command(Command::enable(0));
    c.run_cycle(&links, 0);

    c.channel_mut(0).unwrap().sensor_mut().fail(10);
    c.run_cycle(&links, 250);
    let snap = links.latest_temp(0).unwrap();
    assert_eq!(snap.state, ChannelState::Fault);
    assert_eq!(snap.current_temp_f, 0.0);
    assert!(!snap.sensor_status.is_ok());

    // Enable is refused until the fault is cleared.
    links.send_command(Command::enable(0));
    c.run_cycle(&links, 500);
    assert_eq!(c.channel(0).unwrap().state(), ChannelState::Fault);

    c.channel_mut(0).unwrap().sensor_mut().recover();
    links.send_command(Command::new(0, CommandKind::ClearFault));
    c.run_cycle(&links, 750);
    assert_eq!(c.channel(0).unwrap().state(), ChannelState::Off);
    assert_eq!(c.channel(0).unwrap().fault(), None);
}

#[test]
fn full_queue_drops_newest() {
    let links = Links::new();
    let mut c = control(1, 70.0);

    for _ in 0..COMMAND_QUEUE_DEPTH {
        assert!(links.send_command(Command::new(0, CommandKind::AdjustTemp { delta: -1.0 })));
    }
    assert!(!links.send_command(Command::set_temp(0, 100.0)));

    c.run_cycle(&links, 0);
    let expected = 710.0 - COMMAND_QUEUE_DEPTH as f32;
    assert_eq!(c.channel(0).unwrap().target_temp_f(), expected);
}

#[test]
fn channels_must_be_added_in_order() {
    let config = ControllerConfig::default();
    let mut c: Loop = ControlLoop::new(TwoProfiles);
    assert!(c.add_channel(mock_channel(1, 70.0, &config)).is_err());
    assert!(c.add_channel(mock_channel(0, 70.0, &config)).is_ok());
    assert!(c.add_channel(mock_channel(1, 70.0, &config)).is_ok());
    assert_eq!(c.channels().len(), 2);
}

#[test]
fn autotune_runs_and_can_be_cancelled() {
    let links = Links::new();
    let mut c = control(1, 300.0);

    links.send_command(Command::set_temp(0, 400.0));
    links.send_command(Command::new(0, CommandKind::StartAutotune));
    c.run_cycle(&links, 0);
    assert_eq!(c.channel(0).unwrap().state(), ChannelState::Autotuning);
    assert!(c.channel(0).unwrap().ssr().is_on());

    links.send_command(Command::new(0, CommandKind::CancelAutotune));
    c.run_cycle(&links, 250);
    let ch = c.channel(0).unwrap();
    assert_eq!(ch.state(), ChannelState::Heating);
    assert_eq!(ch.pid().tunings(), (8.0, 0.2, 2.0));
}

#[test]
fn calibration_command_shifts_published_reading() {
    let links = Links::new();
    let mut c = control(2, 650.0);

    links.send_command(Command::set_calibration(1, Calibration::offset(-20.0)));
    c.run_cycle(&links, 0);
    assert_eq!(links.take_activity(), Some(0));

    let snap = links.latest_temp(1).unwrap();
    assert_eq!(snap.current_temp_f, 630.0);
    assert_eq!(snap.raw_temp_f, 650.0);
    assert_eq!(links.latest_temp(0).unwrap().current_temp_f, 650.0);

    // Out-of-range offsets are ignored and are not activity.
    links.send_command(Command::set_calibration(1, Calibration::offset(250.0)));
    c.run_cycle(&links, 250);
    assert_eq!(links.take_activity(), None);
    assert_eq!(links.latest_temp(1).unwrap().current_temp_f, 630.0);
}
