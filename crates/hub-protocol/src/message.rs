//! Hub message wire format: a tagged variant discriminated by an integer
//! `type` field. Argument payloads are kept as raw JSON (`Box<RawValue>`)
//! because the destination type of an argument isn't known until a target
//! method has been resolved -- eager decoding here would throw that
//! information away before dispatch gets a chance to use it.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;

/// Message-kind discriminants, matching the wire `type` field.
pub mod kind {
    pub const INVOCATION: i32 = 1;
    pub const STREAM_ITEM: i32 = 2;
    pub const COMPLETION: i32 = 3;
    pub const STREAM_INVOCATION: i32 = 4;
    pub const CANCEL_INVOCATION: i32 = 5;
    pub const PING: i32 = 6;
    pub const CLOSE: i32 = 7;
}

/// One hub protocol frame's logical payload (the JSON object has already
/// been split out of the record-separator stream by [`crate::codec`]).
#[derive(Debug, Clone)]
pub enum HubMessage {
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Box<RawValue>>,
        stream_ids: Vec<String>,
    },
    StreamItem {
        invocation_id: String,
        item: Box<RawValue>,
    },
    Completion {
        invocation_id: String,
        result: Option<Box<RawValue>>,
        error: Option<String>,
    },
    StreamInvocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Box<RawValue>>,
        stream_ids: Vec<String>,
    },
    CancelInvocation {
        invocation_id: String,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

impl HubMessage {
    /// The `invocationId` this message is keyed on, if any.
    pub fn invocation_id(&self) -> Option<&str> {
        match self {
            HubMessage::Invocation { invocation_id, .. }
            | HubMessage::StreamInvocation { invocation_id, .. } => invocation_id.as_deref(),
            HubMessage::StreamItem { invocation_id, .. }
            | HubMessage::Completion { invocation_id, .. }
            | HubMessage::CancelInvocation { invocation_id } => Some(invocation_id),
            HubMessage::Ping | HubMessage::Close { .. } => None,
        }
    }
}

/// Errors produced while decoding a single frame's JSON body. Any of these
/// is a protocol violation and must terminate the connection.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing or non-integer `type` field")]
    MissingType,
    #[error("unknown message type {0}")]
    UnknownType(i32),
    #[error("completion carries both `result` and `error`")]
    CompletionHasBothResultAndError,
    #[error("message of type {0} is missing required field `{1}`")]
    MissingField(i32, &'static str),
}

/// Wire-shape struct: every field optional, present/absent per variant.
/// This is the thing that actually gets serialized -- [`HubMessage`] is
/// the typed view dispatch code works with.
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    r#type: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<Vec<Box<RawValue>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    item: Option<Box<RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Box<RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allow_reconnect: Option<bool>,
}

impl HubMessage {
    /// Parse one JSON object (the bytes between two record separators).
    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        // Peek `type` first so an unknown/missing discriminant is reported
        // before we try to match the rest of the shape against any variant.
        let probe: serde_json::Value = serde_json::from_slice(bytes)?;
        let ty = probe
            .get("type")
            .and_then(serde_json::Value::as_i64)
            .ok_or(MessageError::MissingType)? as i32;

        let wire: WireMessage = serde_json::from_slice(bytes)?;
        wire.into_typed(ty)
    }

    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        let wire = self.to_wire();
        Ok(serde_json::to_vec(&wire)?)
    }

    fn to_wire(&self) -> WireMessage {
        match self {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
                stream_ids,
            } => WireMessage {
                r#type: kind::INVOCATION,
                invocation_id: invocation_id.clone(),
                target: Some(target.clone()),
                arguments: Some(arguments.clone()),
                stream_ids: if stream_ids.is_empty() {
                    None
                } else {
                    Some(stream_ids.clone())
                },
                item: None,
                result: None,
                error: None,
                allow_reconnect: None,
            },
            HubMessage::StreamItem { invocation_id, item } => WireMessage {
                r#type: kind::STREAM_ITEM,
                invocation_id: Some(invocation_id.clone()),
                target: None,
                arguments: None,
                stream_ids: None,
                item: Some(item.clone()),
                result: None,
                error: None,
                allow_reconnect: None,
            },
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => WireMessage {
                r#type: kind::COMPLETION,
                invocation_id: Some(invocation_id.clone()),
                target: None,
                arguments: None,
                stream_ids: None,
                item: None,
                result: result.clone(),
                error: error.clone(),
                allow_reconnect: None,
            },
            HubMessage::StreamInvocation {
                invocation_id,
                target,
                arguments,
                stream_ids,
            } => WireMessage {
                r#type: kind::STREAM_INVOCATION,
                invocation_id: invocation_id.clone(),
                target: Some(target.clone()),
                arguments: Some(arguments.clone()),
                stream_ids: if stream_ids.is_empty() {
                    None
                } else {
                    Some(stream_ids.clone())
                },
                item: None,
                result: None,
                error: None,
                allow_reconnect: None,
            },
            HubMessage::CancelInvocation { invocation_id } => WireMessage {
                r#type: kind::CANCEL_INVOCATION,
                invocation_id: Some(invocation_id.clone()),
                target: None,
                arguments: None,
                stream_ids: None,
                item: None,
                result: None,
                error: None,
                allow_reconnect: None,
            },
            HubMessage::Ping => WireMessage {
                r#type: kind::PING,
                invocation_id: None,
                target: None,
                arguments: None,
                stream_ids: None,
                item: None,
                result: None,
                error: None,
                allow_reconnect: None,
            },
            HubMessage::Close {
                error,
                allow_reconnect,
            } => WireMessage {
                r#type: kind::CLOSE,
                invocation_id: None,
                target: None,
                arguments: None,
                stream_ids: None,
                item: None,
                result: None,
                error: error.clone(),
                allow_reconnect: Some(*allow_reconnect),
            },
        }
    }
}

impl WireMessage {
    fn into_typed(self, ty: i32) -> Result<HubMessage, MessageError> {
        match ty {
            kind::INVOCATION => Ok(HubMessage::Invocation {
                invocation_id: self.invocation_id,
                target: self
                    .target
                    .ok_or(MessageError::MissingField(ty, "target"))?,
                arguments: self.arguments.unwrap_or_default(),
                stream_ids: self.stream_ids.unwrap_or_default(),
            }),
            kind::STREAM_ITEM => Ok(HubMessage::StreamItem {
                invocation_id: self
                    .invocation_id
                    .ok_or(MessageError::MissingField(ty, "invocationId"))?,
                item: self.item.ok_or(MessageError::MissingField(ty, "item"))?,
            }),
            kind::COMPLETION => {
                if self.result.is_some() && self.error.is_some() {
                    return Err(MessageError::CompletionHasBothResultAndError);
                }
                Ok(HubMessage::Completion {
                    invocation_id: self
                        .invocation_id
                        .ok_or(MessageError::MissingField(ty, "invocationId"))?,
                    result: self.result,
                    error: self.error,
                })
            }
            kind::STREAM_INVOCATION => Ok(HubMessage::StreamInvocation {
                invocation_id: self.invocation_id,
                target: self
                    .target
                    .ok_or(MessageError::MissingField(ty, "target"))?,
                arguments: self.arguments.unwrap_or_default(),
                stream_ids: self.stream_ids.unwrap_or_default(),
            }),
            kind::CANCEL_INVOCATION => Ok(HubMessage::CancelInvocation {
                invocation_id: self
                    .invocation_id
                    .ok_or(MessageError::MissingField(ty, "invocationId"))?,
            }),
            kind::PING => Ok(HubMessage::Ping),
            kind::CLOSE => Ok(HubMessage::Close {
                error: self.error,
                allow_reconnect: self.allow_reconnect.unwrap_or(false),
            }),
            other => Err(MessageError::UnknownType(other)),
        }
    }
}

impl fmt::Display for HubMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubMessage::Invocation { target, invocation_id, .. } => {
                write!(f, "Invocation({target}, id={invocation_id:?})")
            }
            HubMessage::StreamItem { invocation_id, .. } => {
                write!(f, "StreamItem(id={invocation_id})")
            }
            HubMessage::Completion { invocation_id, .. } => {
                write!(f, "Completion(id={invocation_id})")
            }
            HubMessage::StreamInvocation { target, invocation_id, .. } => {
                write!(f, "StreamInvocation({target}, id={invocation_id:?})")
            }
            HubMessage::CancelInvocation { invocation_id } => {
                write!(f, "CancelInvocation(id={invocation_id})")
            }
            HubMessage::Ping => write!(f, "Ping"),
            HubMessage::Close { error, .. } => write!(f, "Close(error={error:?})"),
        }
    }
}
