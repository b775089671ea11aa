//! Message envelope for endpoint-to-endpoint delivery
//!
//! An envelope travels as one queue line, so the wire form is
//! `base64(json)` and never contains a line terminator. The payload is
//! opaque bytes, carried base64-encoded inside the JSON.

use crate::io::error::IpcError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Envelope version written by this implementation
pub const UIPC_VERSION: u32 = 1;

/// Decoded message envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Wire format version
    pub version: u32,

    /// Sending endpoint
    pub source: String,

    /// Receiving endpoint
    pub destination: String,

    /// Account the sender ran as
    pub user: String,

    /// Unix seconds at creation
    pub timestamp: i64,

    /// Base64 of the payload bytes
    pub data: String,
}

impl Envelope {
    /// Build an envelope stamped with the current time.
    pub fn new(source: &str, destination: &str, payload: &[u8], user: &str) -> Self {
        Self {
            version: UIPC_VERSION,
            source: source.to_string(),
            destination: destination.to_string(),
            user: user.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            data: STANDARD.encode(payload),
        }
    }

    /// Serialize to the line-safe wire token.
    pub fn encode(&self) -> Result<String, IpcError> {
        let json = serde_json::to_vec(self).map_err(|e| IpcError::MalformedEnvelope {
            reason: e.to_string(),
        })?;
        Ok(STANDARD.encode(json))
    }

    /// Parse a wire token, rejecting versions other than [`UIPC_VERSION`].
    pub fn decode(msg: &str) -> Result<Self, IpcError> {
        let value = decode_value(msg)?;
        check_version(&value)?;
        serde_json::from_value(value).map_err(|e| IpcError::MalformedEnvelope {
            reason: e.to_string(),
        })
    }

    /// Payload bytes.
    pub fn payload(&self) -> Result<Vec<u8>, IpcError> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| IpcError::MalformedEnvelope {
                reason: format!("payload: {e}"),
            })
    }

    /// Payload as text; invalid UTF-8 is an error.
    pub fn payload_utf8(&self) -> Result<String, IpcError> {
        String::from_utf8(self.payload()?).map_err(|e| IpcError::MalformedEnvelope {
            reason: format!("payload: {e}"),
        })
    }
}

/// Project one top-level field out of a wire token
///
/// No version check is made; callers that act on the result should check
/// [`version_supported`] first.
pub fn field(msg: &str, name: &str) -> Result<serde_json::Value, IpcError> {
    let mut value = decode_value(msg)?;
    value
        .as_object_mut()
        .and_then(|obj| obj.remove(name))
        .ok_or_else(|| IpcError::MissingField {
            field: name.to_string(),
        })
}

/// Whether a wire token carries the supported version.
pub fn version_supported(msg: &str) -> bool {
    matches!(field(msg, "version"), Ok(v) if v == serde_json::Value::from(UIPC_VERSION))
}

fn decode_value(msg: &str) -> Result<serde_json::Value, IpcError> {
    let bytes = STANDARD
        .decode(msg.trim())
        .map_err(|e| IpcError::MalformedEnvelope {
            reason: format!("base64: {e}"),
        })?;
    serde_json::from_slice(&bytes).map_err(|e| IpcError::MalformedEnvelope {
        reason: format!("json: {e}"),
    })
}

fn check_version(value: &serde_json::Value) -> Result<(), IpcError> {
    match value.get("version") {
        Some(v) if *v == serde_json::Value::from(UIPC_VERSION) => Ok(()),
        Some(v) => Err(IpcError::UnsupportedVersion { found: v.clone() }),
        None => Err(IpcError::MissingField {
            field: "version".to_string(),
        }),
    }
}
