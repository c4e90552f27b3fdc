use core::convert::TryInto;
use std::{thread, time::Duration};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::{client::Client as HttpClient, Method, Status},
    io::Read,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::gpio::{Output, PinDriver};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{gpio::AnyOutputPin, modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};

use smarthome_common::{
    DeviceId, FirmwareError, LinkState, MirrorAction, MirrorEngine, NetworkConfig, PinCommand,
    PinLevel, PollOutcome, RuntimeConfig,
};

type DbClient = HttpClient<EspHttpConnection>;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let mut config = RuntimeConfig::default();
    apply_build_credentials(&mut config.network);

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals { modem, .. } = Peripherals::take()?;

    let mut pin = PinDriver::output(unsafe {
        AnyOutputPin::new(config.pins.temperature_sensor_pin)
    })
    .context("failed to claim mirrored GPIO")?;
    pin.set_low()?;

    let mut wifi = connect_wifi(modem, sys_loop, nvs_partition, &config.network)
        .context("wifi startup failed")?;

    let watch_url = format!(
        "{}/{}.json",
        config.mirror.database_url, config.mirror.watched_path
    );

    let mut engine = MirrorEngine::new(DeviceId::TemperatureSensor);
    engine.observe(PollOutcome::LinkUp);
    let mut client: Option<DbClient> = None;

    loop {
        let outcome = if !is_wifi_station_connected() {
            PollOutcome::LinkDown
        } else if engine.state() == LinkState::Disconnected {
            PollOutcome::LinkUp
        } else {
            match client.as_mut() {
                None => PollOutcome::NotReady,
                Some(client) => poll_value(client, &watch_url, engine.state()),
            }
        };

        for action in engine.observe(outcome) {
            match action {
                MirrorAction::WritePin(command) => drive_pin(&mut pin, command),
                MirrorAction::Resubscribe | MirrorAction::ReconnectClient => {
                    match create_db_client() {
                        Ok(fresh) => {
                            client = Some(fresh);
                            engine.observe(PollOutcome::Subscribed);
                            info!("resubscribed to {}", config.mirror.watched_path);
                        }
                        Err(err) => {
                            client = None;
                            warn!("resubscription failed: {err:#}");
                        }
                    }
                }
                MirrorAction::ReconnectWifi => {
                    // Kick off re-association; the link check above
                    // picks up the result on a later iteration.
                    if let Err(err) = wifi.connect() {
                        warn!("wifi reconnect failed: {err}");
                    }
                }
            }
        }

        thread::sleep(Duration::from_millis(config.mirror.poll_interval_ms));
    }
}

fn create_db_client() -> anyhow::Result<DbClient> {
    let http_conf = HttpClientConfiguration {
        timeout: Some(Duration::from_secs(10)),
        crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
        ..Default::default()
    };
    Ok(HttpClient::wrap(EspHttpConnection::new(&http_conf)?))
}

/// One read of the watched path via the database REST endpoint. The
/// body is the bare integer the dashboard writes (0 or 1).
fn poll_value(client: &mut DbClient, url: &str, state: LinkState) -> PollOutcome {
    match read_watched_value(client, url) {
        Ok(value) => PollOutcome::Value(value),
        Err(err) => {
            if state == LinkState::StreamActive {
                warn!("stream read timed out: {err:#}");
                PollOutcome::StreamTimeout
            } else {
                warn!("database client not ready: {err:#}");
                PollOutcome::NotReady
            }
        }
    }
}

fn read_watched_value(client: &mut DbClient, url: &str) -> anyhow::Result<i64> {
    let request = client.request(Method::Get, url, &[])?;
    let mut response = request.submit().map_err(|e| anyhow!("{e:?}"))?;

    let status = response.status();
    if !(200..300).contains(&status) {
        return Err(anyhow!("database read failed with HTTP {status}"));
    }

    let mut body = [0_u8; 64];
    let mut len = 0;
    loop {
        let read = response.read(&mut body[len..]).map_err(|e| anyhow!("{e:?}"))?;
        if read == 0 || len + read == body.len() {
            len += read;
            break;
        }
        len += read;
    }

    let text = core::str::from_utf8(&body[..len]).context("non utf8 database payload")?;
    let trimmed = text.trim();
    trimmed
        .parse::<i64>()
        .map_err(|err| anyhow!("unexpected payload `{trimmed}`: {err}"))
}

fn drive_pin(
    pin: &mut PinDriver<'static, AnyOutputPin, Output>,
    command: PinCommand,
) {
    let result = match command.level {
        PinLevel::High => pin.set_high(),
        PinLevel::Low => pin.set_low(),
    };
    match result {
        Ok(()) => info!("pin write: {:?} -> {:?}", command.device, command.level),
        Err(err) => warn!("failed to drive {:?}: {err}", command.device),
    }
}

fn is_wifi_station_connected() -> bool {
    let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
    rc == esp_idf_svc::sys::ESP_OK
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

/// Bounded-retry station association, same policy as the HTTP image.
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
