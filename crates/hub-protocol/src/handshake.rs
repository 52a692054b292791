//! Handshake frame shapes. These are exchanged once, before either side
//! starts speaking [`crate::message::HubMessage`], so they get their own
//! small types rather than a `HubMessage` variant.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub protocol: String,
    pub version: u32,
}

impl HandshakeRequest {
    pub const PROTOCOL: &'static str = "json";
    pub const VERSION: u32 = 1;

    pub fn json() -> Self {
        Self {
            protocol: Self::PROTOCOL.to_owned(),
            version: Self::VERSION,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandshakeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandshakeResponse {
    pub fn ok() -> Self {
        Self { error: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
        }
    }
}
