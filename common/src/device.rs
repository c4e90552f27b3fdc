use serde::{Deserialize, Serialize};

/// One controlled peripheral. Wire names match the database paths and
/// JSON bodies the web dashboard expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceId {
    HeatingPad,
    TemperatureSensor,
}

impl DeviceId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeatingPad => "heating_pad",
            Self::TemperatureSensor => "temperature_sensor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    On,
    Off,
}

impl DeviceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }

    pub fn level(self) -> PinLevel {
        match self {
            Self::On => PinLevel::High,
            Self::Off => PinLevel::Low,
        }
    }
}

/// Logical output level for a GPIO pin. The target layer maps this to
/// its driver; the core never touches hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinLevel {
    High,
    Low,
}

/// A pending pin write emitted by the dispatcher or mirror engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinCommand {
    pub device: DeviceId,
    pub level: PinLevel,
}

/// Owned device state for both peripherals. Defaults to all-off at
/// boot; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBank {
    heating_pad: DeviceState,
    temperature_sensor: DeviceState,
}

impl Default for DeviceBank {
    fn default() -> Self {
        Self {
            heating_pad: DeviceState::Off,
            temperature_sensor: DeviceState::Off,
        }
    }
}

impl DeviceBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device: DeviceId) -> DeviceState {
        match device {
            DeviceId::HeatingPad => self.heating_pad,
            DeviceId::TemperatureSensor => self.temperature_sensor,
        }
    }

    /// Records the last successfully matched command and returns the
    /// pin write that realizes it.
    pub fn set(&mut self, device: DeviceId, state: DeviceState) -> PinCommand {
        match device {
            DeviceId::HeatingPad => self.heating_pad = state,
            DeviceId::TemperatureSensor => self.temperature_sensor = state,
        }
        PinCommand {
            device,
            level: state.level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_to_off() {
        let bank = DeviceBank::new();
        assert_eq!(bank.get(DeviceId::HeatingPad), DeviceState::Off);
        assert_eq!(bank.get(DeviceId::TemperatureSensor), DeviceState::Off);
    }

    #[test]
    fn set_emits_matching_pin_command() {
        let mut bank = DeviceBank::new();

        let cmd = bank.set(DeviceId::HeatingPad, DeviceState::On);
        assert_eq!(
            cmd,
            PinCommand {
                device: DeviceId::HeatingPad,
                level: PinLevel::High,
            }
        );
        assert_eq!(bank.get(DeviceId::HeatingPad), DeviceState::On);
        // The other device is untouched.
        assert_eq!(bank.get(DeviceId::TemperatureSensor), DeviceState::Off);

        let cmd = bank.set(DeviceId::HeatingPad, DeviceState::Off);
        assert_eq!(cmd.level, PinLevel::Low);
        assert_eq!(bank.get(DeviceId::HeatingPad), DeviceState::Off);
    }

    #[test]
    fn repeated_set_is_idempotent() {
        let mut bank = DeviceBank::new();
        let first = bank.set(DeviceId::TemperatureSensor, DeviceState::On);
        let second = bank.set(DeviceId::TemperatureSensor, DeviceState::On);
        assert_eq!(first, second);
        assert_eq!(bank.get(DeviceId::TemperatureSensor), DeviceState::On);
    }
}
