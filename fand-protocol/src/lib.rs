//! fand wire protocol
//!
//! Every message is a `(RequestKind, args)` pair serialized to JSON and
//! wrapped in a fixed header:
//!
//! ```text
//! magic "99F9" | length (4 lowercase hex digits) | payload (length bytes)
//! ```
//!
//! Arguments are positional and untyped at this layer; the handler for each
//! request kind extracts them with the helpers in [`args`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use fand_error::{FandError, Result};

pub mod args;
pub mod codec;
pub mod timestamp;

pub use codec::{
    decode_frame, decode_payload, encode_frame, encode_payload, parse_header, recv, send,
    HEADER_DATA_SIZE, HEADER_MAGIC, HEADER_MAGIC_SIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use timestamp::{format_timestamp, localize, parse_timestamp};

/// Default server TCP port
pub const DEFAULT_PORT: u16 = 9999;

/// Socket timeout for client-initiated connections
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// The closed set of requests understood by fand peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Ack,
    Ping,
    /// Sent by the closing side, optionally carrying a reason
    Disconnect,
    GetPwm,
    SetPwm,
    GetRpm,
    SetRpm,
    SetPwmOverride,
    SetPwmExpire,
}

impl RequestKind {
    pub const ALL: [RequestKind; 9] = [
        RequestKind::Ack,
        RequestKind::Ping,
        RequestKind::Disconnect,
        RequestKind::GetPwm,
        RequestKind::SetPwm,
        RequestKind::GetRpm,
        RequestKind::SetRpm,
        RequestKind::SetPwmOverride,
        RequestKind::SetPwmExpire,
    ];

    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Ack => "ack",
            RequestKind::Ping => "ping",
            RequestKind::Disconnect => "disconnect",
            RequestKind::GetPwm => "get_pwm",
            RequestKind::SetPwm => "set_pwm",
            RequestKind::GetRpm => "get_rpm",
            RequestKind::SetRpm => "set_rpm",
            RequestKind::SetPwmOverride => "set_pwm_override",
            RequestKind::SetPwmExpire => "set_pwm_expire",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

impl FromStr for RequestKind {
    type Err = FandError;

    /// Accepts both the wire name (`get_pwm`) and the display name (`GET_PWM`)
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        RequestKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| FandError::UnknownRequest(s.to_string()))
    }
}

/// A decoded protocol message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: RequestKind,
    pub args: Vec<Value>,
}

impl Message {
    pub fn new(kind: RequestKind, args: Vec<Value>) -> Self {
        Self { kind, args }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, Value::Array(self.args.clone()))
    }
}
