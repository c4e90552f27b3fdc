use serde::{Deserialize, Serialize};

/// WiFi station credentials. Compiled-in defaults; host builds overlay
/// env vars, ESP32 builds overlay `option_env!` values at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    /// Association attempts before bootstrap gives up with
    /// `NetworkUnavailable`.
    pub connect_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            connect_attempts: 5,
            retry_delay_ms: 3_000,
        }
    }
}

/// GPIO wiring for the two peripherals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PinConfig {
    pub heating_pad_pin: i32,
    pub temperature_sensor_pin: i32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            heating_pad_pin: 5,
            temperature_sensor_pin: 18,
        }
    }
}

/// HTTP control-server knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Wall-clock bound on one connection completing its request.
    /// Past this, the connection is dropped without a response.
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 80,
            request_timeout_ms: 2_000,
        }
    }
}

/// Cloud mirror knobs: which realtime-database path to watch and how
/// often to poll the subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub database_url: String,
    pub watched_path: String,
    pub poll_interval_ms: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            database_url: "https://cat-automated-smart-home-default-rtdb.firebaseio.com".to_string(),
            watched_path: "temperature_sensor/state".to_string(),
            poll_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub network: NetworkConfig,
    pub pins: PinConfig,
    pub server: ServerConfig,
    pub mirror: MirrorConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_device_wiring() {
        let config = RuntimeConfig::default();
        assert_eq!(config.pins.heating_pad_pin, 5);
        assert_eq!(config.pins.temperature_sensor_pin, 18);
        assert_eq!(config.server.port, 80);
        assert_eq!(config.server.request_timeout_ms, 2_000);
        assert_eq!(config.mirror.watched_path, "temperature_sensor/state");
    }
}
