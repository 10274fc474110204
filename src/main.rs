//! Arctic link firmware: demo entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  main thread            │  arctic-link thread            │
//! │                         │                                │
//! │  Console "Main" echo    │  Session::poll_once  (10ms)    │
//! │  Graphics heap plot     │  Session::send_keepalive (2s)  │
//! │  OTA restart watch      │                                │
//! │            │            │            │                   │
//! │            └──── channel handles ────┘                   │
//! │                         ▼                                │
//! │           Transport: BLE | socket | serial               │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The link config is loaded from NVS. `ARCTIC_TRANSPORT` (`ble`, `socket`
//! or `serial`) set at build time overrides the stored transport, and the
//! result is saved back.

#![deny(unused_must_use)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{UartDriver, config::Config as UartConfig};
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{info, warn};

use arctic_link::adapters::ble::BluedroidGatt;
use arctic_link::adapters::ble_transport::BleTransport;
use arctic_link::adapters::firmware::{self, FlashTarget};
use arctic_link::adapters::md5_digest::Md5Digest;
use arctic_link::adapters::nvs::NvsConfigStore;
use arctic_link::adapters::serial_transport::SerialTransport;
use arctic_link::adapters::socket_transport::SocketTransport;
use arctic_link::adapters::time::SystemClock;
use arctic_link::adapters::uart::UartPort;
use arctic_link::adapters::{device_id, wifi};
use arctic_link::app::ports::ConfigStore;
use arctic_link::link::io_task;
use arctic_link::{Console, Error, Graphics, LinkConfig, Session, Transport, TransportKind};

/// Delay between a verified image and the reboot into it.
const RESTART_DELAY: Duration = Duration::from_secs(1);
const APP_LOOP_PERIOD: Duration = Duration::from_millis(50);
const PLOT_EVERY: u32 = 20;

fn transport_override() -> Option<TransportKind> {
    match option_env!("ARCTIC_TRANSPORT")? {
        "ble" => Some(TransportKind::Ble),
        "socket" => Some(TransportKind::Socket),
        "serial" => Some(TransportKind::Serial),
        other => {
            warn!("ARCTIC_TRANSPORT='{}' not recognised, ignored", other);
            None
        }
    }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Arctic link v{}                  ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    firmware::check_rollback();

    // ── 2. Config + identity ──────────────────────────────────
    let nvs = EspDefaultNvsPartition::take()?;
    let mut store = NvsConfigStore::new(nvs.clone()).map_err(Error::from)?;
    let mut config = store.load().unwrap_or_else(|e| {
        warn!("Stored config unusable ({}), using defaults", e);
        LinkConfig::default()
    });
    if let Some(kind) = transport_override().filter(|k| *k != config.transport) {
        config.transport = kind;
        store.save(&config).map_err(Error::from)?;
    }
    config.validate().map_err(Error::from)?;
    let device = device_id::device_info(&config.device_name);
    info!("Device: {} over {}", device.describe(), config.transport);

    // ── 3. Transport ──────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let mut _station = None;

    let transport: Box<dyn Transport> = match config.transport {
        TransportKind::Ble => Box::new(BleTransport::new(
            BluedroidGatt::new(&config.device_name),
            config.connection_params(),
        )),
        TransportKind::Socket => {
            let (ssid, pass) = wifi::credentials()
                .ok_or_else(|| anyhow::anyhow!("ARCTIC_WIFI_SSID not set at build time"))?;
            _station = Some(wifi::connect_station(peripherals.modem, sys_loop, nvs, ssid, pass)?);
            Box::new(SocketTransport::new(config.socket_port))
        }
        TransportKind::Serial => {
            let uart_config = UartConfig::default().baudrate(Hertz(config.serial_baud));
            let driver = UartDriver::new(
                peripherals.uart0,
                peripherals.pins.gpio1,
                peripherals.pins.gpio3,
                Option::<AnyIOPin>::None,
                Option::<AnyIOPin>::None,
                &uart_config,
            )?;
            Box::new(SerialTransport::new(
                UartPort::new(driver),
                config.serial_activity_timeout_ms,
            ))
        }
    };

    // ── 4. Session + channels ─────────────────────────────────
    let target = FlashTarget::from_partition().unwrap_or_else(|| {
        warn!("OTA disabled: no update partition");
        FlashTarget::new(0)
    });
    let mut session = Session::new(
        config.clone(),
        device,
        Box::new(target),
        Box::new(Md5Digest::new()),
    );
    session.begin(transport)?;

    let console = Arc::new(Console::new("Main"));
    let telemetry = Arc::new(Graphics::new("Telemetry"));
    telemetry.setup("heap", &["t", "bytes"], &["free"]);
    session.add(console.clone()).map_err(Error::from)?;
    session.add(telemetry.clone()).map_err(Error::from)?;
    session.start()?;

    let ota = Arc::clone(session.ota());
    let _io = io_task::spawn(session, Arc::new(SystemClock::new()))?;
    info!("System ready. Entering app loop.");

    // ── 5. App loop ───────────────────────────────────────────
    let mut ticks: u32 = 0;
    loop {
        if console.available() {
            let line = console.read();
            if let Err(e) = console.printf(format_args!("> {}", line)) {
                warn!("echo not sent: {}", e);
            }
        }

        ticks = ticks.wrapping_add(1);
        if ticks % PLOT_EVERY == 0 {
            let free = unsafe { esp_idf_svc::sys::esp_get_free_heap_size() };
            let _ = telemetry.plot("heap", &[free as f32]);
        }

        if ota.take_completed() {
            info!("OTA: restarting in {}ms", RESTART_DELAY.as_millis());
            thread::sleep(RESTART_DELAY);
            firmware::restart();
        }

        thread::sleep(APP_LOOP_PERIOD);
    }
}
