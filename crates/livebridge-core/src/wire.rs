//! Gemini Live wire frames.
//!
//! Outbound builders produce the `setup` and `clientContent` frames; inbound
//! server frames are parsed into one [`ChunkEvent`] per message. Inline audio
//! data is base64-decoded at parse time so the rest of the relay only deals
//! in raw bytes.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::config::{Modality, SessionConfig};
use crate::errors::ProtocolError;

// ─────────────────────────────────────────────────────────────────────────────
// Outbound frames
// ─────────────────────────────────────────────────────────────────────────────

/// The `setup` control frame sent once per connection.
pub fn setup_frame(config: &SessionConfig) -> Value {
    let generation_config = match config.modality {
        Modality::Audio => json!({
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": config.voice}}
            },
        }),
        Modality::Text => json!({"responseModalities": ["TEXT"]}),
    };
    json!({
        "setup": {
            "model": config.model,
            "generationConfig": generation_config,
            "systemInstruction": {"parts": [{"text": config.system_instruction}]},
        }
    })
}

/// A complete user text turn.
pub fn text_turn_frame(text: &str) -> Value {
    json!({
        "clientContent": {
            "turnComplete": true,
            "turns": [{"role": "user", "parts": [{"text": text}]}],
        }
    })
}

/// Bare end-of-turn signal (no content).
pub fn end_of_turn_frame() -> Value {
    json!({"clientContent": {"turnComplete": true}})
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound frames
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerFrame {
    response_id: Option<String>,
    server_content: Option<ServerContent>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    turn_complete: Option<bool>,
    interrupted: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ModelTurn {
    parts: Option<Vec<FramePart>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FramePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

/// One content part of a chunk, already decoded.
#[derive(Clone, Debug, PartialEq)]
pub enum ChunkPart {
    /// A text fragment.
    Text(String),
    /// Raw audio bytes and their mime type.
    Audio {
        /// Mime type reported for the inline data.
        mime_type: String,
        /// Decoded payload bytes.
        data: Vec<u8>,
    },
}

/// One upstream message, normalized for aggregation. Ephemeral: consumed by
/// the aggregator and not retained.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkEvent {
    /// Opaque id grouping all chunks of one streamed response.
    pub response_id: Option<String>,
    /// The full original frame when it carried an error payload.
    pub error: Option<Value>,
    /// The model's turn was interrupted.
    pub interrupted: bool,
    /// The model's turn is complete.
    pub turn_complete: bool,
    /// Ordered content parts.
    pub parts: Vec<ChunkPart>,
}

impl ChunkEvent {
    /// Parse a raw upstream text frame into a chunk event.
    ///
    /// Undecodable inline data is logged and the part skipped; the rest of
    /// the chunk is still usable.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw)?;
        let frame: ServerFrame = serde_json::from_value(value.clone())?;

        let mut event = Self {
            response_id: frame.response_id,
            ..Self::default()
        };
        if frame.error.is_some() {
            event.error = Some(value);
            return Ok(event);
        }

        let Some(content) = frame.server_content else {
            return Ok(event);
        };
        event.interrupted = content.interrupted.unwrap_or(false);
        event.turn_complete = content.turn_complete.unwrap_or(false);

        let parts = content.model_turn.and_then(|t| t.parts).unwrap_or_default();
        for part in parts {
            if let Some(text) = part.text {
                event.parts.push(ChunkPart::Text(text));
            } else if let Some(inline) = part.inline_data {
                match BASE64.decode(&inline.data) {
                    Ok(bytes) => event.parts.push(ChunkPart::Audio {
                        mime_type: inline.mime_type,
                        data: bytes,
                    }),
                    Err(e) => warn!(mime_type = %inline.mime_type, error = %e, "skipping undecodable inline data part"),
                }
            }
        }
        Ok(event)
    }
}
