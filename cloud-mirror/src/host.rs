use std::time::Duration;

use anyhow::anyhow;
use firebase_rs::Firebase;
use tracing::{info, warn};

use smarthome_common::{
    DeviceId, LinkState, MirrorAction, MirrorConfig, MirrorEngine, PinCommand, PollOutcome,
    RuntimeConfig,
};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = RuntimeConfig::default();
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.mirror.database_url = url;
    }
    if let Ok(path) = std::env::var("WATCHED_PATH") {
        config.mirror.watched_path = path;
    }

    let mut engine = MirrorEngine::new(DeviceId::TemperatureSensor);

    // No radio on a workstation; the link is up once the process runs.
    engine.observe(PollOutcome::LinkUp);

    let mut client = match subscribe(&config.mirror) {
        Ok(client) => {
            engine.observe(PollOutcome::Subscribed);
            info!(
                "subscribed to {}/{}",
                config.mirror.database_url, config.mirror.watched_path
            );
            Some(client)
        }
        Err(err) => {
            warn!("initial subscription failed: {err:#}");
            None
        }
    };

    let mut interval =
        tokio::time::interval(Duration::from_millis(config.mirror.poll_interval_ms));

    loop {
        interval.tick().await;

        let outcome = match client.as_ref() {
            None => PollOutcome::NotReady,
            Some(client) => poll_value(client, engine.state()).await,
        };

        for action in engine.observe(outcome) {
            match action {
                MirrorAction::WritePin(pin) => drive_pin(pin),
                MirrorAction::Resubscribe | MirrorAction::ReconnectClient => {
                    match subscribe(&config.mirror) {
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
                    // The OS owns the link on host builds; nothing to do
                    // but report it.
                    warn!("wifi reconnect requested; relying on the OS link");
                }
            }
        }
    }
}

fn subscribe(config: &MirrorConfig) -> anyhow::Result<Firebase> {
    let firebase = Firebase::new(&config.database_url)
        .map_err(|err| anyhow!("invalid database url {}: {err:?}", config.database_url))?;
    Ok(firebase.at(&config.watched_path))
}

/// One read of the watched path. A failed read after the stream was
/// active is a stale subscription; before that it just means the
/// client is not ready yet.
async fn poll_value(client: &Firebase, state: LinkState) -> PollOutcome {
    match client.get::<i64>().await {
        Ok(value) => PollOutcome::Value(value),
        Err(err) => {
            if state == LinkState::StreamActive {
                warn!("stream read timed out: {err:?}");
                PollOutcome::StreamTimeout
            } else {
                warn!("database client not ready: {err:?}");
                PollOutcome::NotReady
            }
        }
    }
}

fn drive_pin(pin: PinCommand) {
    // Hardware integration point: the ESP32 image drives PinDriver
    // outputs here.
    info!("pin write: {:?} -> {:?}", pin.device, pin.level);
}
