//! All three contexts wired through one `Links`, driven on a virtual clock.

use std::sync::{Arc, Mutex};

use coilctl::adapters::settings::NvsSettings;
use coilctl::app::commands::Command;
use coilctl::app::events::{AppEvent, FaultScope};
use coilctl::app::persist::{self, SettingsPersister};
use coilctl::app::ports::{EventSink, SettingsStore};
use coilctl::app::service::{ControlLoop, SafetyLoop};
use coilctl::channel::ChannelState;
use coilctl::config::ControllerConfig;
use coilctl::error::SafetyFault;
use coilctl::link::Links;
use coilctl::safety::SafetyManager;
use coilctl::sensors::Calibration;
use coilctl::tasks::Monitor;

use crate::mock_hw::{MockSafetyPort, MockSensor, RecordingSsr, TwoProfiles, mock_channel};

#[derive(Default)]
struct RecordingSink {
    events: Vec<AppEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(*event);
    }
}

struct Rig {
    links: Arc<Links>,
    control: ControlLoop<MockSensor, RecordingSsr, TwoProfiles>,
    safety: SafetyLoop<MockSafetyPort, Arc<Links>>,
    monitor: Monitor<RecordingSink, NvsSettings>,
    store: Arc<Mutex<NvsSettings>>,
    now: u64,
    control_stalled: bool,
}

impl Rig {
    fn boot(store: Arc<Mutex<NvsSettings>>, idle_min: u16) -> Self {
        let config = ControllerConfig::default();
        let links = Arc::new(Links::new());

        let (restore, _global) = persist::restore(&store, &config);
        for cmd in &restore {
            assert!(links.send_command(*cmd));
        }
        let mut persister = SettingsPersister::new(store.clone(), &config);
        persister.seed(&restore);

        let mut manager = SafetyManager::new(MockSafetyPort::default(), links.clone(), &config.safety, 0);
        manager.set_idle_timeout(idle_min);

        let mut control = ControlLoop::new(TwoProfiles);
        for ch in 0..config.channel_count() as u8 {
            control.add_channel(mock_channel(ch, 70.0, &config)).unwrap();
        }

        Self {
            safety: SafetyLoop::new(manager, &config),
            monitor: Monitor::new(RecordingSink::default(), persister, config.channel_count()),
            control,
            links,
            store,
            now: 0,
            control_stalled: false,
        }
    }

    fn fresh(idle_min: u16) -> Self {
        let store = NvsSettings::new(&ControllerConfig::default()).unwrap();
        Self::boot(Arc::new(Mutex::new(store)), idle_min)
    }

    /// Step the virtual clock to `until_ms`, running each context on its period.
    fn advance(&mut self, until_ms: u64) {
        while self.now < until_ms {
            let t = self.now;
            if t % 100 == 0 {
                self.safety.run_cycle(&self.links, t);
            }
            if t % 250 == 0 && !self.control_stalled {
                self.control.run_cycle(&self.links, t);
            }
            if t % 1000 == 0 {
                self.monitor.run_cycle(&self.links, t);
            }
            self.now += 50;
        }
    }

    fn send(&self, cmd: Command) {
        assert!(self.links.send_command(cmd));
    }

    fn emitted_faults(&self) -> Vec<SafetyFault> {
        self.monitor
            .sink()
            .events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Fault(f) => Some(f.fault),
                _ => None,
            })
            .collect()
    }
}

#[test]
fn target_survives_restart() {
    let mut rig = Rig::fresh(0);
    rig.advance(1_000);
    assert_eq!(rig.control.channel(1).unwrap().target_temp_f(), 710.0);

    rig.send(Command::set_temp(1, 555.0));
    rig.advance(3_000);
    let saved = rig.store.lock().unwrap().load_channel(1).unwrap();
    assert_eq!(saved.target_f, 555.0);

    let mut rebooted = Rig::boot(rig.store.clone(), 0);
    rebooted.advance(500);
    assert_eq!(rebooted.control.channel(1).unwrap().target_temp_f(), 555.0);
    assert_eq!(rebooted.control.channel(0).unwrap().target_temp_f(), 710.0);
}

#[test]
fn calibration_survives_restart() {
    let mut rig = Rig::fresh(0);
    rig.send(Command::set_calibration(0, Calibration::offset(-15.0)));
    rig.advance(2_000);
    let saved = rig.store.lock().unwrap().load_channel(0).unwrap();
    assert_eq!(saved.calibration, Calibration::offset(-15.0));

    let mut rebooted = Rig::boot(rig.store.clone(), 0);
    rebooted.advance(1_000);
    assert_eq!(rebooted.control.channel(0).unwrap().calibration(), Calibration::offset(-15.0));
    let shown = rebooted.links.latest_temp(0).unwrap();
    assert_eq!(shown.current_temp_f, 55.0);
    assert_eq!(shown.raw_temp_f, 70.0);
}

#[test]
fn runaway_coil_is_reported_end_to_end() {
    let mut rig = Rig::fresh(0);
    rig.send(Command::enable(0));
    rig.advance(2_000);
    assert!(rig.control.channel(0).unwrap().ssr().is_on());

    rig.control.channel_mut(0).unwrap().sensor_mut().temp_f = 1_060.0;
    rig.advance(4_000);

    let ch = rig.control.channel(0).unwrap();
    assert_eq!(ch.state(), ChannelState::Fault);
    assert!(!ch.ssr().is_on());
    assert!(rig.links.safety_status().has_fault(SafetyFault::OverTemperature));
    assert_eq!(rig.emitted_faults(), vec![SafetyFault::OverTemperature]);

    let last_temp = rig.monitor.sink().events.iter().rev().find_map(|e| match e {
        AppEvent::Temperature(u) if u.channel == 0 => Some(*u),
        _ => None,
    });
    assert_eq!(last_temp.unwrap().state, ChannelState::Fault);

    // Disable clears the channel; the bit follows on the next safety cycle.
    rig.control.channel_mut(0).unwrap().sensor_mut().temp_f = 140.0;
    rig.send(Command::disable(0));
    rig.advance(5_000);
    assert_eq!(rig.control.channel(0).unwrap().state(), ChannelState::Off);
    assert!(!rig.links.safety_status().has_fault(SafetyFault::OverTemperature));
}

#[test]
fn idle_timeout_turns_heaters_off() {
    let mut rig = Rig::fresh(1);
    rig.send(Command::enable(0));
    rig.send(Command::enable(1));
    rig.advance(60_000);
    assert!(rig.control.channel(0).unwrap().is_active());

    rig.advance(61_000);
    assert!(rig.links.safety_status().idle_timed_out);
    assert!(rig.control.channels().iter().all(|c| !c.is_active()));
    assert!(rig.control.channels().iter().all(|c| !c.ssr().is_on()));
    assert!(rig.emitted_faults().contains(&SafetyFault::IdleTimeout));

    // Any command restarts the idle timer.
    rig.send(Command::enable(0));
    rig.advance(62_000);
    assert!(!rig.links.safety_status().idle_timed_out);
    assert!(rig.control.channel(0).unwrap().is_active());
}

#[test]
fn control_stall_latches_shutdown() {
    let mut rig = Rig::fresh(0);
    rig.send(Command::enable(0));
    rig.advance(1_000);

    rig.control_stalled = true;
    rig.advance(4_000);
    let status = rig.links.safety_status();
    assert!(status.shutdown);
    assert!(status.has_fault(SafetyFault::Watchdog));
    assert!(rig.safety.manager().port().outputs_killed());

    let watchdog = rig.monitor.sink().events.iter().find_map(|e| match e {
        AppEvent::Fault(f) if f.fault == SafetyFault::Watchdog => Some(*f),
        _ => None,
    });
    assert_eq!(watchdog.unwrap().scope, FaultScope::Global);

    // Control comes back: it must honour the latch and ignore Enable.
    rig.control_stalled = false;
    rig.advance(5_000);
    rig.send(Command::enable(0));
    rig.advance(6_000);
    assert_eq!(rig.control.channel(0).unwrap().state(), ChannelState::Off);
    assert!(rig.links.safety_status().shutdown);
}
