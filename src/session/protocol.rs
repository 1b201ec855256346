//! Wire messages exchanged with the recognition service.
//!
//! The protocol itself is owned by the service; only the message shapes the
//! drawing pad actually sends or reacts to are modeled here. Everything is
//! tagged JSON over the websocket.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use uuid::Uuid;

use super::SessionError;

/// One captured pen stroke: parallel coordinate, timestamp and pressure arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InkStroke {
    pub id: Uuid,
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    /// Timestamps in milliseconds.
    pub t: Vec<u64>,
    pub p: Vec<f32>,
}

impl InkStroke {
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Messages the client sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    NewContentPackage {
        application_key: String,
        protocol_version: String,
    },
    /// Answer to the server's HMAC challenge.
    Hmac { hmac: String },
    #[serde(rename_all = "camelCase")]
    NewContentPart {
        content_type: String,
        mime_types: Vec<String>,
    },
    AddStrokes { strokes: Vec<InkStroke> },
    Clear,
    Undo,
    Redo,
    Convert,
}

/// Messages the server sends that this client reacts to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    HmacChallenge { challenge: String },
    /// The content part is open; recognition is live.
    PartChanged,
    #[serde(rename_all = "camelCase")]
    ContentChanged {
        empty: bool,
        can_undo: bool,
        can_redo: bool,
    },
    Exported { exports: HashMap<String, String> },
    Error { message: String },
}

/// Compute the handshake challenge answer: HMAC-SHA512 keyed by the
/// concatenated credential pair, hex encoded.
pub fn hmac_answer(
    application_key: &str,
    hmac_key: &str,
    challenge: &str,
) -> Result<String, SessionError> {
    let key = format!("{application_key}{hmac_key}");
    let mut mac = Hmac::<Sha512>::new_from_slice(key.as_bytes())
        .map_err(|err| SessionError::Transport(format!("hmac key rejected: {err}")))?;
    mac.update(challenge.as_bytes());
    let digest = mac.finalize().into_bytes();
    Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
}
