//! Client-facing protocol: inbound messages and outbound events.
//!
//! Inbound shapes (JSON over the client WebSocket):
//!
//! - `{"setup": {"systemInstruction": "...", "responseModality": "TEXT"|"AUDIO"}}`
//! - `{"text": "..."}`
//! - `{"realtimeInput": ...}` — forwarded upstream verbatim
//! - `{"endMessage": true}`
//!
//! Outbound shapes:
//!
//! - `{"id": ..., "text": "...", "sender": "ai"}`
//! - `{"id": ..., "audio": "<base64>", "mimeType": "...", "sender": "ai"}`
//! - `{"interrupted": true}`
//! - upstream error frames, passed through verbatim

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

use crate::config::Modality;
use crate::errors::ProtocolError;

/// One message received from the client.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    /// Establish or reconfigure the session.
    Setup {
        /// System instruction text for the upstream session.
        system_instruction: String,
        /// Requested response modality (defaults to text).
        response_modality: Modality,
    },
    /// One complete user text turn.
    Text(String),
    /// Raw realtime input (streamed media). The full envelope is retained
    /// so it can be forwarded upstream without transformation.
    Realtime(Value),
    /// Explicit end-of-turn marker.
    EndOfTurn,
}

impl ClientMessage {
    /// Parse a raw client text frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw)?;

        if let Some(setup) = value.get("setup") {
            let Some(instruction) = setup.get("systemInstruction").and_then(Value::as_str) else {
                return Err(ProtocolError::MissingSystemInstruction);
            };
            let modality = Modality::from_client(setup.get("responseModality").and_then(Value::as_str));
            return Ok(Self::Setup {
                system_instruction: instruction.to_string(),
                response_modality: modality,
            });
        }
        if let Some(text) = value.get("text").and_then(Value::as_str) {
            return Ok(Self::Text(text.to_string()));
        }
        if value.get("realtimeInput").is_some() {
            return Ok(Self::Realtime(value));
        }
        if value.get("endMessage").is_some() {
            return Ok(Self::EndOfTurn);
        }
        Err(ProtocolError::UnrecognizedShape)
    }
}

/// One event to deliver to the client.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// A completed text response.
    Text {
        /// Response id the text belongs to.
        id: Option<String>,
        /// Concatenated response text.
        text: String,
    },
    /// A completed audio response.
    Audio {
        /// Response id the audio belongs to.
        id: Option<String>,
        /// Raw audio bytes (base64-encoded on the wire).
        audio: Vec<u8>,
        /// Mime type reported by the first chunk of the response.
        mime_type: Option<String>,
    },
    /// The model's turn was interrupted.
    Interrupted,
    /// An upstream error frame, forwarded untouched.
    UpstreamError(Value),
}

impl ClientEvent {
    /// Wire representation sent to the client.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text { id, text } => json!({
                "id": id,
                "text": text,
                "sender": "ai",
            }),
            Self::Audio { id, audio, mime_type } => json!({
                "id": id,
                "audio": BASE64.encode(audio),
                "mimeType": mime_type,
                "sender": "ai",
            }),
            Self::Interrupted => json!({ "interrupted": true }),
            Self::UpstreamError(frame) => frame.clone(),
        }
    }
}
