//! SafetyLoop: channel fault edges, idle handling, heartbeat supervision.

use std::sync::Arc;

use coilctl::app::events::{FaultScope, TempUpdate};
use coilctl::app::service::SafetyLoop;
use coilctl::channel::ChannelState;
use coilctl::config::ControllerConfig;
use coilctl::error::{SafetyFault, SensorFault};
use coilctl::link::Links;
use coilctl::safety::SafetyManager;
use coilctl::sensors::{Calibration, SensorStatus};

use crate::mock_hw::MockSafetyPort;

type Loop = SafetyLoop<MockSafetyPort, Arc<Links>>;

fn safety(links: &Arc<Links>, idle_min: u16) -> Loop {
    let config = ControllerConfig::default();
    let mut manager = SafetyManager::new(MockSafetyPort::default(), links.clone(), &config.safety, 0);
    manager.set_idle_timeout(idle_min);
    SafetyLoop::new(manager, &config)
}

fn snapshot(channel: u8, state: ChannelState, temp_f: f32, sensor: SensorStatus) -> TempUpdate {
    TempUpdate {
        channel,
        current_temp_f: temp_f,
        raw_temp_f: temp_f,
        target_temp_f: 700.0,
        output_percent: 0.0,
        state,
        sensor_status: sensor,
        calibration: Calibration::default(),
    }
}

/// Run the safety loop every 100 ms over `[from, to)`, keeping the
/// control heartbeat fresh.
fn run(s: &mut Loop, links: &Links, from: u64, to: u64) {
    let mut t = from;
    while t < to {
        links.stamp_heartbeat(t);
        s.run_cycle(links, t);
        t += 100;
    }
}

#[test]
fn over_temperature_edge_raises_one_event() {
    let links = Arc::new(Links::new());
    let mut s = safety(&links, 0);

    links.publish_temp(snapshot(2, ChannelState::Fault, 1060.0, SensorStatus::Ok));
    run(&mut s, &links, 0, 500);

    assert!(s.manager().has(SafetyFault::OverTemperature));
    assert!(links.safety_status().has_fault(SafetyFault::OverTemperature));

    let ev = links.try_recv_fault().unwrap();
    assert_eq!(ev.fault, SafetyFault::OverTemperature);
    assert_eq!(ev.scope, FaultScope::Channel(2));
    assert_eq!(ev.temperature_f, 1060.0);
    assert!(links.try_recv_fault().is_none(), "level must not re-raise");
}

#[test]
fn over_temperature_judged_on_raw_reading() {
    let links = Arc::new(Links::new());
    let mut s = safety(&links, 0);

    let mut update = snapshot(1, ChannelState::Fault, 1052.0, SensorStatus::Ok);
    update.calibration = Calibration::offset(-10.0);
    update.current_temp_f = 1042.0;
    links.publish_temp(update);
    run(&mut s, &links, 0, 200);

    assert!(s.manager().has(SafetyFault::OverTemperature));
    assert_eq!(links.try_recv_fault().unwrap().temperature_f, 1052.0);
}

#[test]
fn sensor_fault_maps_to_sensor_error() {
    let links = Arc::new(Links::new());
    let mut s = safety(&links, 0);

    let failed = SensorStatus::Fault(SensorFault::OpenCircuit);
    links.publish_temp(snapshot(0, ChannelState::Fault, 0.0, failed));
    run(&mut s, &links, 0, 200);

    assert!(s.manager().has(SafetyFault::SensorError));
    assert!(!s.manager().has(SafetyFault::OverTemperature));
}

#[test]
fn bits_clear_once_no_channel_is_faulted() {
    let links = Arc::new(Links::new());
    let mut s = safety(&links, 0);

    links.publish_temp(snapshot(0, ChannelState::Fault, 1060.0, SensorStatus::Ok));
    links.publish_temp(snapshot(1, ChannelState::Fault, 0.0, SensorStatus::Fault(SensorFault::ShortToGround)));
    run(&mut s, &links, 0, 200);
    assert_eq!(
        s.manager().faults(),
        SafetyFault::OverTemperature.mask() | SafetyFault::SensorError.mask()
    );

    links.publish_temp(snapshot(0, ChannelState::Cooldown, 900.0, SensorStatus::Ok));
    run(&mut s, &links, 200, 400);
    assert!(s.manager().has_fault(), "channel 1 still faulted");

    links.publish_temp(snapshot(1, ChannelState::Off, 70.0, SensorStatus::Ok));
    run(&mut s, &links, 400, 600);
    assert!(!s.manager().has_fault());
    assert_eq!(links.safety_status().faults, 0);
}

#[test]
fn idle_timeout_latches_and_activity_clears_it() {
    let links = Arc::new(Links::new());
    let mut s = safety(&links, 1);

    links.note_activity(30_000);
    run(&mut s, &links, 0, 89_900);
    assert!(!links.safety_status().idle_timed_out);
    assert_eq!(links.safety_status().idle_remaining_ms, Some(200));

    run(&mut s, &links, 89_900, 90_500);
    let status = links.safety_status();
    assert!(status.idle_timed_out);
    assert!(status.has_fault(SafetyFault::IdleTimeout));
    assert_eq!(links.try_recv_fault().unwrap().fault, SafetyFault::IdleTimeout);
    assert!(s.manager().port().tones().iter().any(|&f| f > 0));

    links.note_activity(91_000);
    run(&mut s, &links, 90_500, 91_500);
    let status = links.safety_status();
    assert!(!status.idle_timed_out);
    assert!(!status.has_fault(SafetyFault::IdleTimeout));
}

#[test]
fn stalled_control_triggers_shutdown() {
    let links = Arc::new(Links::new());
    let mut s = safety(&links, 0);

    run(&mut s, &links, 0, 1_000);
    let feeds = s.manager().port().feeds();
    assert_eq!(feeds, 10);

    // Heartbeat frozen at 900 ms from here on.
    let mut t = 1_000;
    while t <= 2_900 {
        s.run_cycle(&links, t);
        t += 100;
    }
    assert!(!links.safety_status().shutdown);

    s.run_cycle(&links, 3_000);
    let status = links.safety_status();
    assert!(status.shutdown);
    assert!(status.has_fault(SafetyFault::Watchdog));
    assert!(s.manager().port().outputs_killed());

    let fed = s.manager().port().feeds();
    run(&mut s, &links, 3_100, 4_000);
    assert_eq!(s.manager().port().feeds(), fed, "watchdog must starve");
    assert!(links.safety_status().shutdown);
}

#[test]
fn control_that_never_starts_is_caught() {
    let links = Arc::new(Links::new());
    let mut s = safety(&links, 0);

    let mut t = 0;
    while t <= 2_000 {
        s.run_cycle(&links, t);
        t += 100;
    }
    assert!(!s.manager().is_shutdown());
    s.run_cycle(&links, 2_100);
    assert!(s.manager().is_shutdown());
}
