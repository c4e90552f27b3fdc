pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod mirror;
pub mod request;
pub mod types;

pub use config::{MirrorConfig, NetworkConfig, PinConfig, RuntimeConfig, ServerConfig};
pub use device::{DeviceBank, DeviceId, DeviceState, PinCommand, PinLevel};
pub use dispatch::{dispatch, Reply, ReplyStatus, Route};
pub use error::FirmwareError;
pub use mirror::{LinkState, MirrorAction, MirrorEngine, PollOutcome};
pub use request::{ReadProgress, Request, RequestReader, MAX_REQUEST_BYTES};
pub use types::{CommandReply, ErrorReply, StatusReply};
