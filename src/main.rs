//! Coil heater controller: ESP32-S3 entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  Max31855 ×N   SsrDriver ×N   BoardSafety   NvsSettings        │
//! │  (Sensor)      (SsrOutput)    (SafetyPort)  (SettingsStore)    │
//! │  BuiltinProfiles              LogEventSink                     │
//! │  (ProfileStore)               (EventSink)                      │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │   safety (P6) ◀──┐                                             │
//! │   control (P5) ◀─┼── Links (queues + latest-value cells)       │
//! │   monitor (P2) ◀─┘                                             │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::spi::config::Config as SpiConfig;
use esp_idf_hal::spi::{SPI2, SpiDeviceDriver, SpiDriver, SpiDriverConfig};
use esp_idf_hal::units::Hertz;
use log::info;

use coilctl::adapters::hardware::BoardSafety;
use coilctl::adapters::log_sink::LogEventSink;
use coilctl::adapters::profiles::BuiltinProfiles;
use coilctl::adapters::settings::NvsSettings;
use coilctl::adapters::time::MonotonicClock;
use coilctl::app::persist::{self, SettingsPersister};
use coilctl::app::service::{ControlLoop, SafetyLoop};
use coilctl::channel::Channel;
use coilctl::config::ControllerConfig;
use coilctl::drivers::buzzer::Buzzer;
use coilctl::drivers::hw_init;
use coilctl::drivers::ssr::{GpioOut, SsrDriver};
use coilctl::drivers::status_led::StatusLed;
use coilctl::drivers::watchdog::Watchdog;
use coilctl::error::Error;
use coilctl::link::Links;
use coilctl::pins;
use coilctl::safety::SafetyManager;
use coilctl::sensors::Max31855;
use coilctl::tasks::{self, Monitor};

type Sensor = Max31855<SpiDeviceDriver<'static, Arc<SpiDriver<'static>>>>;
type Ssr = SsrDriver<GpioOut>;

const LABELS: [&str; 4] = ["TC0", "TC1", "TC2", "TC3"];

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;
    info!("coilctl v{}", env!("CARGO_PKG_VERSION"));

    // SSRs are driven low here, before anything can enable them.
    hw_init::init_peripherals()?;

    let config = ControllerConfig::default();
    let clock = MonotonicClock::new();
    let links = Arc::new(Links::new());

    // ── 2. Restore settings as startup commands ───────────────
    let store = Arc::new(Mutex::new(NvsSettings::new(&config).map_err(Error::from)?));
    let (restore, global) = persist::restore(&store, &config);
    for cmd in &restore {
        links.send_command(*cmd);
    }
    let mut persister = SettingsPersister::new(store, &config);
    persister.seed(&restore);

    // ── 3. Safety context (highest priority) ──────────────────
    let safety_cfg = config.safety;
    let safety_links = links.clone();
    let loop_cfg = config.clone();
    tasks::spawn_safety(
        move |now| {
            let port = BoardSafety::new(
                Watchdog::new(safety_cfg.watchdog_timeout_ms),
                Buzzer::new(),
                StatusLed::new(pins::STATUS_LED_GPIO),
            );
            let mut manager = SafetyManager::new(port, safety_links, &safety_cfg, now);
            manager.set_idle_timeout(global.idle_timeout_min);
            SafetyLoop::new(manager, &loop_cfg)
        },
        links.clone(),
        clock,
        &config.tasks,
    )?;

    // ── 4. Control context ────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let spi = peripherals.spi2;
    let control_cfg = config.clone();
    tasks::spawn_control(
        move || build_control(spi, &control_cfg),
        links.clone(),
        clock,
        &config.tasks,
    )?;

    // ── 5. Monitor context ────────────────────────────────────
    let monitor = Monitor::new(LogEventSink::new(), persister, config.channel_count());
    tasks::spawn_monitor(monitor, links, clock, &config.tasks)?;

    info!("Startup complete: {} channel(s)", config.channel_count());
    loop {
        std::thread::park();
    }
}

fn build_control(
    spi: SPI2,
    config: &ControllerConfig,
) -> coilctl::error::Result<ControlLoop<Sensor, Ssr, BuiltinProfiles>> {
    // SAFETY: pin numbers come from the board map and nothing else claims them.
    let (sclk, mosi, miso) = unsafe {
        (
            AnyIOPin::new(pins::TC_SCK_GPIO),
            AnyIOPin::new(pins::TC_MOSI_GPIO),
            AnyIOPin::new(pins::TC_MISO_GPIO),
        )
    };
    let bus = Arc::new(
        SpiDriver::new(spi, sclk, mosi, Some(miso), &SpiDriverConfig::new())
            .map_err(|_| Error::Init("thermocouple SPI bus"))?,
    );
    let spi_cfg = SpiConfig::new().baudrate(Hertz(pins::TC_SPI_BAUD_HZ));

    let mut control = ControlLoop::new(BuiltinProfiles::new(config));
    for ch in 0..config.channel_count() {
        // SAFETY: as above.
        let cs = unsafe { AnyIOPin::new(pins::TC_CS_GPIOS[ch]) };
        let device = SpiDeviceDriver::new(bus.clone(), Some(cs), &spi_cfg)
            .map_err(|_| Error::Init("thermocouple SPI device"))?;
        let sensor = Max31855::new(device, LABELS[ch], config.channel.sensor_poll_interval_ms);
        let ssr = SsrDriver::new(GpioOut::new(pins::SSR_GPIOS[ch]), ch as u8);
        control.add_channel(Channel::new(ch as u8, sensor, ssr, config))?;
    }
    Ok(control)
}
