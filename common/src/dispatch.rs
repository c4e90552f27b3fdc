use crate::{
    device::{DeviceBank, DeviceId, DeviceState, PinCommand},
    error::FirmwareError,
    request::Request,
    types::{CommandReply, ErrorReply, StatusReply},
};

/// The routes this firmware answers. The table is exhaustive; anything
/// else is a 404.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Command(DeviceId, DeviceState),
    Status,
}

impl Route {
    /// Exact (method, path) lookup. The path numbers are the GPIO
    /// labels the dashboard was built against.
    pub fn lookup(request: &Request) -> Result<Route, FirmwareError> {
        if request.method != "GET" {
            return Err(FirmwareError::RouteNotFound {
                method: request.method.clone(),
                path: request.path.clone(),
            });
        }

        match request.path.as_str() {
            "/26/on" => Ok(Route::Command(DeviceId::HeatingPad, DeviceState::On)),
            "/26/off" => Ok(Route::Command(DeviceId::HeatingPad, DeviceState::Off)),
            "/27/on" => Ok(Route::Command(DeviceId::TemperatureSensor, DeviceState::On)),
            "/27/off" => Ok(Route::Command(DeviceId::TemperatureSensor, DeviceState::Off)),
            "/status" => Ok(Route::Status),
            _ => Err(FirmwareError::RouteNotFound {
                method: request.method.clone(),
                path: request.path.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    NotFound,
}

impl ReplyStatus {
    fn status_line(self) -> &'static str {
        match self {
            Self::Ok => "HTTP/1.1 200 OK",
            Self::NotFound => "HTTP/1.1 404 Not Found",
        }
    }
}

/// Outcome of dispatching one request: the response to write and the
/// pin write (if any) for the target layer to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: ReplyStatus,
    pub body: String,
    pub pin: Option<PinCommand>,
}

impl Reply {
    /// Renders the full HTTP response. CRLF line endings, one JSON
    /// line as the body. The permissive CORS header is only sent on
    /// the success path, matching what the dashboard relies on.
    pub fn render(&self) -> String {
        let mut response = String::with_capacity(128 + self.body.len());
        response.push_str(self.status.status_line());
        response.push_str("\r\n");
        response.push_str("Content-type: application/json\r\n");
        if self.status == ReplyStatus::Ok {
            response.push_str("Access-Control-Allow-Origin: *\r\n");
        }
        response.push_str("Connection: close\r\n");
        response.push_str("\r\n");
        response.push_str(&self.body);
        response.push_str("\r\n");
        response
    }
}

/// Maps one completed request onto device state, a pin write, and a
/// response body.
pub fn dispatch(bank: &mut DeviceBank, request: &Request) -> Reply {
    match Route::lookup(request) {
        Ok(Route::Command(device, state)) => {
            let pin = bank.set(device, state);
            let body = CommandReply::new(device, state);
            Reply {
                status: ReplyStatus::Ok,
                // Serialization of these fixed-shape replies cannot fail.
                body: serde_json::to_string(&body).unwrap_or_default(),
                pin: Some(pin),
            }
        }
        Ok(Route::Status) => {
            let body = StatusReply {
                heating_pad: bank.get(DeviceId::HeatingPad).as_str(),
                temperature_sensor: bank.get(DeviceId::TemperatureSensor).as_str(),
            };
            Reply {
                status: ReplyStatus::Ok,
                body: serde_json::to_string(&body).unwrap_or_default(),
                pin: None,
            }
        }
        Err(_) => Reply {
            status: ReplyStatus::NotFound,
            body: serde_json::to_string(&ErrorReply::endpoint_not_found()).unwrap_or_default(),
            pin: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PinLevel;
    use pretty_assertions::assert_eq;

    fn get(path: &str) -> Request {
        Request {
            method: "GET".to_string(),
            path: path.to_string(),
        }
    }

    #[test]
    fn command_routes_mutate_state_and_reply_exactly() {
        let cases = [
            ("/26/on", DeviceId::HeatingPad, DeviceState::On,
             r#"{"status":"success","device":"heating_pad","state":"on"}"#),
            ("/26/off", DeviceId::HeatingPad, DeviceState::Off,
             r#"{"status":"success","device":"heating_pad","state":"off"}"#),
            ("/27/on", DeviceId::TemperatureSensor, DeviceState::On,
             r#"{"status":"success","device":"temperature_sensor","state":"on"}"#),
            ("/27/off", DeviceId::TemperatureSensor, DeviceState::Off,
             r#"{"status":"success","device":"temperature_sensor","state":"off"}"#),
        ];

        let mut bank = DeviceBank::new();
        for (path, device, state, body) in cases {
            let reply = dispatch(&mut bank, &get(path));
            assert_eq!(reply.status, ReplyStatus::Ok);
            assert_eq!(reply.body, body);
            assert_eq!(bank.get(device), state);
            let pin = reply.pin.expect("command must emit a pin write");
            assert_eq!(pin.device, device);
            assert_eq!(pin.level, state.level());
        }
    }

    #[test]
    fn status_reports_without_mutating() {
        let mut bank = DeviceBank::new();
        dispatch(&mut bank, &get("/26/on"));

        let before = bank.clone();
        let reply = dispatch(&mut bank, &get("/status"));

        assert_eq!(reply.status, ReplyStatus::Ok);
        assert_eq!(
            reply.body,
            r#"{"heating_pad":"on","temperature_sensor":"off"}"#
        );
        assert_eq!(reply.pin, None);
        assert_eq!(bank, before);
    }

    #[test]
    fn unknown_path_is_not_found() {
        let mut bank = DeviceBank::new();
        let reply = dispatch(&mut bank, &get("/28/on"));
        assert_eq!(reply.status, ReplyStatus::NotFound);
        assert_eq!(
            reply.body,
            r#"{"status":"error","message":"Endpoint not found"}"#
        );
        assert_eq!(reply.pin, None);
    }

    #[test]
    fn non_get_method_is_not_found() {
        let mut bank = DeviceBank::new();
        let request = Request {
            method: "POST".to_string(),
            path: "/26/on".to_string(),
        };
        let reply = dispatch(&mut bank, &request);
        assert_eq!(reply.status, ReplyStatus::NotFound);
        assert_eq!(bank.get(DeviceId::HeatingPad), DeviceState::Off);
    }

    #[test]
    fn matching_is_exact_not_substring() {
        // The original firmware matched substrings anywhere in the
        // request text; the table only accepts the exact parsed path.
        let mut bank = DeviceBank::new();
        let reply = dispatch(&mut bank, &get("/status/26/on"));
        assert_eq!(reply.status, ReplyStatus::NotFound);
        assert_eq!(bank.get(DeviceId::HeatingPad), DeviceState::Off);
    }

    #[test]
    fn repeated_command_is_idempotent() {
        let mut bank = DeviceBank::new();
        let first = dispatch(&mut bank, &get("/26/on"));
        let second = dispatch(&mut bank, &get("/26/on"));
        assert_eq!(first, second);
        assert_eq!(bank.get(DeviceId::HeatingPad), DeviceState::On);
        assert_eq!(second.pin.unwrap().level, PinLevel::High);
    }

    #[test]
    fn render_success_includes_cors_header() {
        let mut bank = DeviceBank::new();
        let rendered = dispatch(&mut bank, &get("/26/on")).render();
        assert!(rendered.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(rendered.contains("Content-type: application/json\r\n"));
        assert!(rendered.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(rendered.contains("Connection: close\r\n"));
        assert!(rendered.ends_with(
            "\r\n{\"status\":\"success\",\"device\":\"heating_pad\",\"state\":\"on\"}\r\n"
        ));
    }

    #[test]
    fn render_not_found_omits_cors_header() {
        let mut bank = DeviceBank::new();
        let rendered = dispatch(&mut bank, &get("/nope")).render();
        assert!(rendered.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(!rendered.contains("Access-Control-Allow-Origin"));
    }
}
