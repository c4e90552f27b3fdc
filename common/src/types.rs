use serde::Serialize;

use crate::device::{DeviceId, DeviceState};

/// Body for a successful pin command. Field order is the wire order
/// the dashboard parses.
#[derive(Debug, Clone, Serialize)]
pub struct CommandReply {
    pub status: &'static str,
    pub device: &'static str,
    pub state: &'static str,
}

impl CommandReply {
    pub fn new(device: DeviceId, state: DeviceState) -> Self {
        Self {
            status: "success",
            device: device.as_str(),
            state: state.as_str(),
        }
    }
}

/// Body for `GET /status`: current state of every device.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReply {
    pub heating_pad: &'static str,
    pub temperature_sensor: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorReply {
    pub status: &'static str,
    pub message: &'static str,
}

impl ErrorReply {
    pub fn endpoint_not_found() -> Self {
        Self {
            status: "error",
            message: "Endpoint not found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn command_reply_wire_shape() {
        let reply = CommandReply::new(DeviceId::HeatingPad, DeviceState::On);
        assert_eq!(
            serde_json::to_string(&reply).unwrap(),
            r#"{"status":"success","device":"heating_pad","state":"on"}"#
        );
    }

    #[test]
    fn error_reply_wire_shape() {
        assert_eq!(
            serde_json::to_string(&ErrorReply::endpoint_not_found()).unwrap(),
            r#"{"status":"error","message":"Endpoint not found"}"#
        );
    }
}
