use core::convert::TryInto;
use std::{
    io::{ErrorKind, Read, Write},
    net::{TcpListener, TcpStream},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_hal::gpio::{Output, PinDriver};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{gpio::AnyOutputPin, modem::Modem, prelude::Peripherals},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};

use smarthome_common::{
    dispatch, DeviceBank, DeviceId, FirmwareError, NetworkConfig, PinCommand, PinConfig,
    PinLevel, ReadProgress, Request, RequestReader, RuntimeConfig,
};

const ACCEPT_POLL_MS: u64 = 50;

struct Outputs {
    heating_pad: PinDriver<'static, AnyOutputPin, Output>,
    temperature_sensor: PinDriver<'static, AnyOutputPin, Output>,
}

impl Outputs {
    fn new(pins: &PinConfig) -> anyhow::Result<Self> {
        let mut heating_pad =
            PinDriver::output(unsafe { AnyOutputPin::new(pins.heating_pad_pin) })
                .context("failed to claim heating pad GPIO")?;
        let mut temperature_sensor =
            PinDriver::output(unsafe { AnyOutputPin::new(pins.temperature_sensor_pin) })
                .context("failed to claim temperature sensor GPIO")?;

        // Both peripherals start off at boot.
        heating_pad.set_low()?;
        temperature_sensor.set_low()?;

        Ok(Self {
            heating_pad,
            temperature_sensor,
        })
    }

    fn drive(&mut self, command: PinCommand) {
        let driver = match command.device {
            DeviceId::HeatingPad => &mut self.heating_pad,
            DeviceId::TemperatureSensor => &mut self.temperature_sensor,
        };
        let result = match command.level {
            PinLevel::High => driver.set_high(),
            PinLevel::Low => driver.set_low(),
        };
        if let Err(err) = result {
            warn!("failed to drive {:?}: {err}", command.device);
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let mut config = RuntimeConfig::default();
    apply_build_credentials(&mut config.network);

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals { modem, .. } = Peripherals::take()?;

    let mut outputs = Outputs::new(&config.pins)?;

    let _wifi = connect_wifi(modem, sys_loop, nvs_partition, &config.network)
        .context("wifi startup failed")?;

    let listener = TcpListener::bind(("0.0.0.0", config.server.port))
        .with_context(|| format!("failed to bind control server on port {}", config.server.port))?;
    listener.set_nonblocking(true)?;
    info!("control server listening on port {}", config.server.port);

    let mut bank = DeviceBank::new();

    // Single service loop: one connection at a time, next accept only
    // after the current client is closed.
    loop {
        let stream = match listener.accept() {
            Ok((stream, peer)) => {
                info!("client connected: {peer}");
                stream
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(ACCEPT_POLL_MS));
                continue;
            }
            Err(err) => {
                warn!("accept failed: {err}");
                continue;
            }
        };

        if let Err(err) = serve_connection(
            stream,
            &mut bank,
            &mut outputs,
            config.server.request_timeout_ms,
        ) {
            warn!("connection error: {err:#}");
        }
        info!("client disconnected");
    }
}

fn serve_connection(
    mut stream: TcpStream,
    bank: &mut DeviceBank,
    outputs: &mut Outputs,
    timeout_ms: u64,
) -> anyhow::Result<()> {
    match read_request(&mut stream, timeout_ms) {
        Ok(request) => {
            let reply = dispatch(bank, &request);
            if let Some(pin) = reply.pin {
                outputs.drive(pin);
            }
            stream
                .write_all(reply.render().as_bytes())
                .context("failed to write response")?;
            stream.flush().ok();
        }
        Err(err) => {
            // No response for an incomplete request; dropping the
            // stream closes the connection.
            info!("abandoning connection: {err}");
        }
    }
    Ok(())
}

fn read_request(stream: &mut TcpStream, timeout_ms: u64) -> Result<Request, FirmwareError> {
    // The listener polls nonblocking; the per-connection read loop
    // blocks in short slices so the deadline stays accurate.
    stream.set_nonblocking(false).ok();
    stream
        .set_read_timeout(Some(Duration::from_millis(ACCEPT_POLL_MS)))
        .ok();

    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let mut reader = RequestReader::new();
    let mut buf = [0u8; 256];

    while Instant::now() < deadline {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => match reader.extend(&buf[..n]) {
                ReadProgress::Complete => {
                    return Ok(Request::parse(&reader.text()).unwrap_or(Request {
                        method: String::new(),
                        path: String::new(),
                    }));
                }
                ReadProgress::Overflow => break,
                ReadProgress::Incomplete => {}
            },
            Err(err)
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut => {}
            Err(_) => break,
        }
    }

    Err(FirmwareError::RequestIncomplete { timeout_ms })
}

fn apply_build_credentials(network: &mut NetworkConfig) {
    if network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            network.wifi_ssid = ssid.to_string();
        }
    }
    if network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            network.wifi_pass = pass.to_string();
        }
    }
}

/// Bounded-retry station association. Exhausting the configured
/// attempts surfaces `NetworkUnavailable` to the caller.
fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    for attempt in 1..=network.connect_attempts {
        info!("wifi connect attempt {attempt}/{}", network.connect_attempts);
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected and netif up on attempt {attempt}");
                drop(wifi);
                return Ok(esp_wifi);
            }
            Err(err) => {
                warn!("wifi connect failed on attempt {attempt}: {err:#}");
                let _ = wifi.disconnect();
                thread::sleep(Duration::from_millis(network.retry_delay_ms));
            }
        }
    }

    let _ = wifi.stop();
    Err(FirmwareError::NetworkUnavailable {
        attempts: network.connect_attempts,
    }
    .into())
}
