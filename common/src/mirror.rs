use crate::device::{DeviceId, DeviceState, PinCommand};

/// Connectivity of the cloud mirror, evaluated once per loop
/// iteration. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    WifiOnly,
    StreamActive,
    StreamStale,
}

/// What the transport observed this iteration. Exactly one outcome is
/// fed to the engine per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// WiFi link is down (checked every iteration).
    LinkDown,
    /// WiFi associated but no subscription yet.
    LinkUp,
    /// Subscription (re-)established, no data yet.
    Subscribed,
    /// The watched path delivered a value.
    Value(i64),
    /// The subscription timed out.
    StreamTimeout,
    /// The cloud client is not ready to serve reads.
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorAction {
    WritePin(PinCommand),
    Resubscribe,
    ReconnectWifi,
    ReconnectClient,
}

/// Mirrors one remote boolean into one GPIO pin. Pure state machine:
/// the transport feeds it a `PollOutcome` each tick and executes the
/// actions it returns.
#[derive(Debug)]
pub struct MirrorEngine {
    device: DeviceId,
    state: LinkState,
    /// Last value actually written to the pin; None until the first
    /// write. Suppresses redundant writes on repeated stream values,
    /// including across reconnects.
    last_applied: Option<bool>,
}

impl MirrorEngine {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            state: LinkState::Disconnected,
            last_applied: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn last_applied(&self) -> Option<bool> {
        self.last_applied
    }

    pub fn observe(&mut self, outcome: PollOutcome) -> Vec<MirrorAction> {
        match outcome {
            PollOutcome::LinkDown => {
                self.state = LinkState::Disconnected;
                vec![MirrorAction::ReconnectWifi]
            }
            PollOutcome::LinkUp => {
                if self.state == LinkState::Disconnected {
                    self.state = LinkState::WifiOnly;
                }
                Vec::new()
            }
            PollOutcome::Subscribed => {
                self.state = LinkState::StreamActive;
                Vec::new()
            }
            PollOutcome::Value(raw) => {
                self.state = LinkState::StreamActive;
                self.apply(raw)
            }
            PollOutcome::StreamTimeout => {
                self.state = LinkState::StreamStale;
                // Immediate attempted transition back via resubscription.
                vec![MirrorAction::Resubscribe]
            }
            PollOutcome::NotReady => {
                if self.state == LinkState::Disconnected {
                    vec![MirrorAction::ReconnectWifi]
                } else {
                    vec![MirrorAction::ReconnectClient]
                }
            }
        }
    }

    fn apply(&mut self, raw: i64) -> Vec<MirrorAction> {
        let value = match raw {
            0 => false,
            1 => true,
            // The path carries exactly one boolean-as-integer signal;
            // anything else is noise.
            _ => return Vec::new(),
        };

        if self.last_applied == Some(value) {
            return Vec::new();
        }
        self.last_applied = Some(value);

        let state = if value { DeviceState::On } else { DeviceState::Off };
        vec![MirrorAction::WritePin(PinCommand {
            device: self.device,
            level: state.level(),
        })]
    }
}
